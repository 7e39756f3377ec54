use crate::models::{normalize_roll, StudentRecord, Subject, SubjectLayout};
use serde::Serialize;
use std::cmp::Ordering;

/// Board order: GPA, total, then the layout's three tie-break subjects, all descending.
/// A missing subject mark sorts below any present mark on that key.
pub fn compare_students(a: &StudentRecord, b: &StudentRecord, layout: &SubjectLayout) -> Ordering {
    b.gpa
        .total_cmp(&a.gpa)
        .then_with(|| b.total.cmp(&a.total))
        .then_with(|| {
            layout
                .tie_breakers()
                .iter()
                .map(|subject| b.mark(*subject).cmp(&a.mark(*subject)))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        })
}

/// Sort records into board order. Full ties keep their input order.
pub fn rank(mut records: Vec<StudentRecord>, layout: SubjectLayout) -> RankedList {
    records.sort_by(|a, b| compare_students(a, b, &layout));
    RankedList { layout, records }
}

/// Students in board order; position + 1 is the displayed rank.
#[derive(Debug, Clone, Serialize)]
pub struct RankedList {
    layout: SubjectLayout,
    records: Vec<StudentRecord>,
}

/// A single student's result page.
#[derive(Debug, Clone, Serialize)]
pub struct StudentDetail {
    pub rank: usize,
    pub record: StudentRecord,
    /// Marks in the layout's column order; `None` when the subject table had no value.
    pub marks: Vec<(Subject, Option<u32>)>,
}

impl RankedList {
    pub fn layout(&self) -> SubjectLayout {
        self.layout
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at a 1-based rank.
    pub fn get(&self, rank: usize) -> Option<&StudentRecord> {
        rank.checked_sub(1).and_then(|i| self.records.get(i))
    }

    /// `(rank, record)` pairs in board order.
    pub fn iter_ranked(&self) -> impl Iterator<Item = (usize, &StudentRecord)> + '_ {
        self.records.iter().enumerate().map(|(i, r)| (i + 1, r))
    }

    pub fn rank_of_roll(&self, roll: &str) -> Option<usize> {
        let wanted = normalize_roll(roll);
        self.records
            .iter()
            .position(|r| r.get_normalized_roll() == wanted)
            .map(|i| i + 1)
    }

    pub fn find_by_roll(&self, roll: &str) -> Option<&StudentRecord> {
        self.rank_of_roll(roll).and_then(|rank| self.get(rank))
    }

    pub fn detail(&self, roll: &str) -> Option<StudentDetail> {
        let rank = self.rank_of_roll(roll)?;
        let record = self.get(rank)?.clone();
        let marks = self
            .layout
            .columns()
            .iter()
            .map(|subject| (*subject, record.mark(*subject)))
            .collect();
        Some(StudentDetail { rank, record, marks })
    }

    /// Distinct trimmed institution names, sorted.
    pub fn institutions(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .map(|r| r.institution.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Distinct GPA values, highest first.
    pub fn gpa_values(&self) -> Vec<f64> {
        let mut values: Vec<f64> = self.records.iter().map(|r| r.gpa).collect();
        values.sort_by(|a, b| b.total_cmp(a));
        values.dedup();
        values
    }
}
