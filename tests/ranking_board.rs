//! Integration tests: dataset loading, ranking and filtering through the public API.
//!
//! Verifies that:
//!   - The two-student example ranks and filters as documented
//!   - Subject tables are joined and drive tie-breaks
//!   - A missing subject table is tolerated, a missing summary is not
//!   - Obfuscated summaries decode before parsing
//!   - Ranking is independent of input permutation
//!   - A stale load never replaces a newer one

use board_rank::decode::{encode_table, TableEncoding};
use board_rank::{
    filter, load_dataset, rank, DataSource, DatasetId, Encodings, ExamType, FilterCriteria, Group, LoadError,
    LoadOutcome, MemorySource, ResultsBoard, StudentRecord, Subject,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

const HEADER: &str = "Serial\tName\tRoll\tGPA\tTotal\tInstitution";

fn ssc_science(year: u16) -> DatasetId {
    DatasetId::new(ExamType::Ssc, year, Group::Science)
}

fn two_students() -> String {
    format!("{HEADER}\n1\tJohn Doe\t100234\t5.00\t980\tABC School\n2\tJane Roe\t100235\t4.50\t910\tXYZ School\n")
}

#[tokio::test]
async fn documented_example_ranks_and_filters() {
    let id = ssc_science(2023);
    let source = MemorySource::new().with_file(id.summary_file(), two_students());

    let loaded = load_dataset(&source, &Encodings::default(), id).await.unwrap();
    let names: Vec<&str> = loaded.ranked.records().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["John Doe", "Jane Roe"]);
    assert!(!loaded.has_subject_table);

    let view = filter(
        &loaded.ranked,
        &FilterCriteria {
            institution: Some("xyz school".into()),
            ..Default::default()
        },
    );
    assert_eq!(view.len(), 1);
    assert_eq!(view.entries[0].record.name, "Jane Roe");
    assert_eq!(view.entries[0].rank, 2);
}

#[tokio::test]
async fn subject_table_breaks_gpa_and_total_ties() {
    let id = ssc_science(2023);
    let summary = format!("{HEADER}\n1\tEighty Five\t100001\t5.00\t980\tABC\n2\tNinety\t100002\t5.00\t980\tABC\n");
    let subjects = "100001\t80\t80\t80\t80\t80\t85\t70\t70\n100002\t80\t80\t80\t80\t80\t90\t60\t60\n";
    let source = MemorySource::new()
        .with_file(id.summary_file(), summary)
        .with_file(id.subject_file(), subjects);

    let loaded = load_dataset(&source, &Encodings::default(), id).await.unwrap();
    assert_eq!(loaded.join_misses, 0);
    let first = loaded.ranked.get(1).unwrap();
    assert_eq!(first.name, "Ninety");
    assert_eq!(first.mark(Subject::Physics), Some(90));
}

#[tokio::test]
async fn missing_summary_is_a_failed_load() {
    let id = ssc_science(2023);
    let source = MemorySource::new().with_file(id.subject_file(), "100001\t1\t2");
    let err = load_dataset(&source, &Encodings::default(), id).await.unwrap_err();
    assert!(matches!(err, LoadError::Fetch(_)));
}

#[tokio::test]
async fn empty_summary_is_a_failed_load() {
    let id = ssc_science(2023);
    let source = MemorySource::new().with_file(id.summary_file(), HEADER);
    let err = load_dataset(&source, &Encodings::default(), id).await.unwrap_err();
    assert!(matches!(err, LoadError::Parse(_)));
}

#[tokio::test]
async fn obfuscated_summary_is_decoded() {
    let id = DatasetId::new(ExamType::Hsc, 2025, Group::Commerce);
    let source = MemorySource::new().with_file(id.summary_file(), encode_table(&two_students(), Some("k3y")));
    let encodings = Encodings {
        summary: TableEncoding::Base64Xor,
        subjects: TableEncoding::Plain,
        xor_key: Some("k3y".into()),
    };

    let loaded = load_dataset(&source, &encodings, id).await.unwrap();
    assert_eq!(loaded.ranked.len(), 2);
    assert_eq!(loaded.ranked.get(1).unwrap().roll, Some(100234));
}

#[test]
fn ranking_ignores_input_permutation() {
    let layout = ssc_science(2023).layout();
    let make = |roll: u64, gpa: f64, total: u32, physics: Option<u32>| StudentRecord {
        serial: Some(roll as u32),
        name: format!("S{roll}"),
        roll: Some(roll),
        roll_raw: roll.to_string(),
        gpa,
        total,
        institution: "ABC".into(),
        subject_marks: physics.map(|p| (Subject::Physics, p)).into_iter().collect(),
    };
    let records = vec![
        make(1, 5.0, 980, Some(90)),
        make(2, 5.0, 980, Some(85)),
        make(3, 4.5, 990, None),
        make(4, 5.0, 990, None),
        make(5, 3.0, 600, Some(100)),
    ];

    let expected: Vec<u64> = rank(records.clone(), layout).records().iter().filter_map(|r| r.roll).collect();
    assert_eq!(expected, vec![4, 1, 2, 3, 5]);

    let mut reversed = records.clone();
    reversed.reverse();
    let mut rotated = records;
    rotated.rotate_left(2);
    for permutation in [reversed, rotated] {
        let got: Vec<u64> = rank(permutation, layout).records().iter().filter_map(|r| r.roll).collect();
        assert_eq!(got, expected);
    }
}

/// Serves files from memory but holds back one file until released.
struct GatedSource {
    inner: MemorySource,
    gated_file: String,
    gate: Notify,
}

impl DataSource for GatedSource {
    fn fetch(
        &self,
        file_name: &str,
    ) -> impl Future<Output = Result<String, board_rank::FetchError>> + Send {
        async move {
            if file_name == self.gated_file {
                self.gate.notified().await;
            }
            self.inner.fetch(file_name).await
        }
    }
}

#[tokio::test]
async fn stale_load_does_not_overwrite_newer_board() {
    let old = ssc_science(2022);
    let new = ssc_science(2023);
    let source = Arc::new(GatedSource {
        inner: MemorySource::new()
            .with_file(old.summary_file(), format!("{HEADER}\n1\tOld Student\t1\t5.00\t900\tOld School"))
            .with_file(new.summary_file(), format!("{HEADER}\n1\tNew Student\t2\t5.00\t900\tNew School")),
        gated_file: old.summary_file(),
        gate: Notify::new(),
    });
    let board = ResultsBoard::new(Arc::clone(&source), Encodings::default());

    let (first, second) = tokio::join!(board.load(old), async {
        tokio::task::yield_now().await;
        let outcome = board.load(new).await;
        source.gate.notify_one();
        outcome
    });

    assert!(matches!(first.unwrap(), LoadOutcome::Superseded));
    assert!(matches!(second.unwrap(), LoadOutcome::Committed(_)));
    let current = board.current().unwrap();
    assert_eq!(current.id, new);
    assert_eq!(current.ranked.get(1).unwrap().name, "New Student");
}

#[tokio::test]
async fn failed_load_clears_the_board() {
    let good = ssc_science(2023);
    let source = Arc::new(MemorySource::new().with_file(good.summary_file(), two_students()));
    let board = ResultsBoard::new(source, Encodings::default());

    assert!(matches!(board.load(good).await.unwrap(), LoadOutcome::Committed(_)));
    assert!(board.current().is_some());

    assert!(board.load(ssc_science(2019)).await.is_err());
    assert!(board.current().is_none());
}
