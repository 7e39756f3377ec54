use crate::error::ParseError;
use crate::models::{normalize_roll, StudentRecord, Subject, SubjectLayout};
use std::collections::{BTreeMap, HashMap};

/// Summary table rows after parsing, before ranking.
#[derive(Debug, Clone, Default)]
pub struct ParsedDataset {
    pub records: Vec<StudentRecord>,
    /// Data rows dropped because a required field did not parse.
    pub skipped_rows: usize,
    /// Records with no matching row in the subject table.
    pub join_misses: usize,
    pub has_subject_table: bool,
}

/// Per-subject marks keyed by the roll exactly as written in the subject table.
#[derive(Debug, Clone, Default)]
pub struct SubjectTable {
    by_roll: HashMap<String, BTreeMap<Subject, u32>>,
    by_normalized_roll: HashMap<String, String>,
}

impl SubjectTable {
    pub fn len(&self) -> usize {
        self.by_roll.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_roll.is_empty()
    }

    /// Exact roll match first, then the leading-zero-stripped roll.
    pub fn marks_for(&self, roll: &str) -> Option<&BTreeMap<Subject, u32>> {
        self.by_roll.get(roll).or_else(|| {
            self.by_normalized_roll
                .get(&normalize_roll(roll))
                .and_then(|raw| self.by_roll.get(raw))
        })
    }
}

fn tab_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes())
}

fn field<'a>(row: &'a csv::StringRecord, index: usize) -> &'a str {
    row.get(index).map(str::trim).unwrap_or("")
}

/// Parse a summary table: one header row, then
/// `serial, name, roll, gpa, total, institution` rows.
pub fn parse_summary(text: &str) -> Result<(Vec<StudentRecord>, usize), ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if !text.contains('\t') {
        return Err(ParseError::NoDelimiter);
    }

    let mut records = Vec::new();
    let mut skipped = 0;
    let mut data_rows = 0;

    for (i, row) in tab_reader(text.trim()).records().enumerate() {
        // Header
        if i == 0 {
            continue;
        }
        data_rows += 1;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                log::debug!("summary row {}: unreadable: {}", i, e);
                skipped += 1;
                continue;
            }
        };
        match parse_summary_row(&row) {
            Some(record) => records.push(record),
            None => {
                log::debug!("summary row {}: dropped malformed row", i);
                skipped += 1;
            }
        }
    }

    if data_rows == 0 || records.is_empty() {
        return Err(ParseError::NoDataRows);
    }
    Ok((records, skipped))
}

fn parse_summary_row(row: &csv::StringRecord) -> Option<StudentRecord> {
    if row.len() < 5 {
        return None;
    }
    let serial = field(row, 0).parse::<u32>().ok();
    let name = field(row, 1).to_string();
    let roll_raw = field(row, 2).to_string();
    let roll = roll_raw.parse::<u64>().ok();
    let gpa = field(row, 3).parse::<f64>().ok().filter(|g| g.is_finite())?;
    let total = field(row, 4).parse::<u32>().ok()?;
    let institution = field(row, 5).to_string();

    Some(StudentRecord {
        serial,
        name,
        roll,
        roll_raw,
        gpa,
        total,
        institution,
        subject_marks: BTreeMap::new(),
    })
}

/// Parse a headerless subject table: the roll, then one mark per subject in layout order.
/// Rows without a roll or without any numeric mark are ignored.
pub fn parse_subjects(text: &str, layout: SubjectLayout) -> SubjectTable {
    let mut table = SubjectTable::default();
    let columns = layout.columns();

    for row in tab_reader(text.trim()).records().flatten() {
        let roll = field(&row, 0);
        if roll.is_empty() {
            continue;
        }
        let marks: BTreeMap<Subject, u32> = columns
            .iter()
            .enumerate()
            .filter_map(|(i, subject)| {
                field(&row, i + 1).parse::<u32>().ok().map(|mark| (*subject, mark))
            })
            .collect();
        if marks.is_empty() {
            continue;
        }
        table
            .by_normalized_roll
            .entry(normalize_roll(roll))
            .or_insert_with(|| roll.to_string());
        table.by_roll.insert(roll.to_string(), marks);
    }

    table
}

/// Fill each record's subject marks from the subject table.
/// Returns how many records had no subject row.
pub fn join(records: &mut [StudentRecord], subjects: &SubjectTable) -> usize {
    let mut misses = 0;
    for record in records.iter_mut() {
        match subjects.marks_for(&record.roll_raw) {
            Some(marks) => record.subject_marks = marks.clone(),
            None => misses += 1,
        }
    }
    misses
}

pub fn parse_dataset(
    summary: &str,
    subjects: Option<&str>,
    layout: SubjectLayout,
) -> Result<ParsedDataset, ParseError> {
    let (mut records, skipped_rows) = parse_summary(summary)?;

    let join_misses = match subjects {
        Some(text) => {
            let table = parse_subjects(text, layout);
            let misses = join(&mut records, &table);
            if misses > 0 {
                log::debug!(
                    "{} of {} records have no subject row ({} subject rows)",
                    misses,
                    records.len(),
                    table.len()
                );
            }
            misses
        }
        None => records.len(),
    };

    Ok(ParsedDataset {
        records,
        skipped_rows,
        join_misses,
        has_subject_table: subjects.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExamType, Group};

    const HEADER: &str = "Serial\tName\tRoll\tGPA\tTotal\tInstitution";

    fn layout() -> SubjectLayout {
        SubjectLayout::new(ExamType::Ssc, Group::Science)
    }

    #[test]
    fn summary_rows_become_records() {
        let text = format!(
            "{HEADER}\n1\tJohn Doe\t100234\t5.00\t980\tABC School\n2\tJane Roe\t100235\t4.50\t910\tXYZ School\n"
        );
        let (records, skipped) = parse_summary(&text).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "John Doe");
        assert_eq!(records[0].roll, Some(100234));
        assert_eq!(records[0].gpa, 5.0);
        assert_eq!(records[1].total, 910);
        assert_eq!(records[1].institution, "XYZ School");
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let text = format!(
            "{HEADER}\n1\tJohn Doe\t100234\t5.00\t980\tABC School\n2\tBroken\t100236\tabsent\t\tXYZ\n3\tNaN Gpa\t100237\tNaN\t700\tXYZ\nshort row\n"
        );
        let (records, skipped) = parse_summary(&text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 3);
    }

    #[test]
    fn blank_serial_does_not_drop_the_row() {
        let text = format!(
            "{HEADER}\n\tJohn Doe\t100234\t5.00\t980\tABC School\n2\tJane Roe\t100235\t4.50\t910\tXYZ School\n"
        );
        let (records, skipped) = parse_summary(&text).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "John Doe");
        assert_eq!(records[0].serial, None);
        assert_eq!(records[1].serial, Some(2));

        let only_blank = format!("{HEADER}\n\tJohn Doe\t100234\t5.00\t980\tABC\n\tJane Roe\t100235\t4.50\t910\tXYZ");
        assert_eq!(parse_summary(&only_blank).unwrap().0.len(), 2);
    }

    #[test]
    fn non_numeric_roll_still_joins_by_raw_roll() {
        let text = format!("{HEADER}\n1\tJohn Doe\tA-17\t5.00\t980\tABC");
        let subjects = "A-17\t1\t2\t3\t4\t5\t95";
        let parsed = parse_dataset(&text, Some(subjects), layout()).unwrap();
        assert_eq!(parsed.records[0].roll, None);
        assert_eq!(parsed.records[0].roll_raw, "A-17");
        assert_eq!(parsed.join_misses, 0);
        assert_eq!(parsed.records[0].mark(Subject::Physics), Some(95));
    }

    #[test]
    fn carriage_returns_are_tolerated() {
        let text = format!("{HEADER}\r\n1\tJohn Doe\t100234\t5.00\t980\tABC School\r\n");
        let (records, _) = parse_summary(&text).unwrap();
        assert_eq!(records[0].institution, "ABC School");
    }

    #[test]
    fn structural_failures_are_parse_errors() {
        assert_eq!(parse_summary("   \n").unwrap_err(), ParseError::Empty);
        assert_eq!(parse_summary("a,b,c\n1,2,3").unwrap_err(), ParseError::NoDelimiter);
        assert_eq!(parse_summary(HEADER).unwrap_err(), ParseError::NoDataRows);
    }

    #[test]
    fn subject_rows_map_to_layout_columns() {
        let text = "100234\t80\t75\t99\t70\t88\t95\t90\t85\t50\t91\t49\t50\nbad\n\n";
        let table = parse_subjects(text, layout());
        assert_eq!(table.len(), 1);
        let marks = table.marks_for("100234").unwrap();
        assert_eq!(marks[&Subject::Physics], 95);
        assert_eq!(marks[&Subject::Chemistry], 90);
        assert_eq!(marks[&Subject::Compulsory], 85);
        assert_eq!(marks[&Subject::Career], 50);
    }

    #[test]
    fn non_numeric_marks_are_left_out() {
        let table = parse_subjects("100234\t80\t75\t99\t70\t88\tA\t90", layout());
        let marks = table.marks_for("100234").unwrap();
        assert!(!marks.contains_key(&Subject::Physics));
        assert_eq!(marks[&Subject::Chemistry], 90);
    }

    #[test]
    fn join_uses_exact_roll_then_normalized_roll() {
        let text = format!(
            "{HEADER}\n1\tJohn Doe\t100234\t5.00\t980\tABC\n2\tZero Pad\t00045\t4.00\t800\tABC\n3\tNo Row\t100999\t3.00\t700\tABC"
        );
        let subjects = "100234\t1\t2\t3\t4\t5\t95\t90\t85\n45\t1\t2\t3\t4\t5\t60\t61\t62";
        let parsed = parse_dataset(&text, Some(subjects), layout()).unwrap();

        assert_eq!(parsed.join_misses, 1);
        assert_eq!(parsed.records[0].mark(Subject::Physics), Some(95));
        assert_eq!(parsed.records[1].mark(Subject::Physics), Some(60));
        assert!(parsed.records[2].subject_marks.is_empty());
    }

    #[test]
    fn missing_subject_table_keeps_every_record() {
        let text = format!("{HEADER}\n1\tJohn Doe\t100234\t5.00\t980\tABC");
        let parsed = parse_dataset(&text, None, layout()).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(!parsed.has_subject_table);
        assert!(parsed.records[0].subject_marks.is_empty());
    }
}
