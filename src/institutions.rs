use crate::ranking::RankedList;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionStats {
    pub name: String,
    pub student_count: usize,
    pub gpa_max_count: usize,
    pub gpa_max_percent: f64,
    pub avg_total: f64,
    /// Students of this institution ranked within the board's top N.
    pub top_n_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstitutionQuery {
    pub top_n: usize,
    pub min_size: usize,
    pub limit: usize,
}

impl Default for InstitutionQuery {
    fn default() -> Self {
        Self {
            top_n: 1000,
            min_size: 20,
            limit: 100,
        }
    }
}

#[derive(Default)]
struct Tally {
    count: usize,
    gpa_max_count: usize,
    total_marks: u64,
    top_n_count: usize,
}

/// Per-institution statistics in order of each institution's first appearance on the board.
pub fn aggregate(ranked: &RankedList, top_n: usize) -> Vec<InstitutionStats> {
    let mut order: Vec<String> = Vec::new();
    let mut tallies: HashMap<String, Tally> = HashMap::new();

    for (rank, student) in ranked.iter_ranked() {
        let name = student.institution.trim();
        if !tallies.contains_key(name) {
            order.push(name.to_string());
        }
        let tally = tallies.entry(name.to_string()).or_default();
        tally.count += 1;
        tally.total_marks += u64::from(student.total);
        if student.has_max_gpa() {
            tally.gpa_max_count += 1;
        }
        if rank <= top_n {
            tally.top_n_count += 1;
        }
    }

    order
        .into_iter()
        .filter_map(|name| {
            let tally = tallies.remove(&name)?;
            let count = tally.count as f64;
            Some(InstitutionStats {
                gpa_max_percent: tally.gpa_max_count as f64 / count * 100.0,
                avg_total: tally.total_marks as f64 / count,
                student_count: tally.count,
                gpa_max_count: tally.gpa_max_count,
                top_n_count: tally.top_n_count,
                name,
            })
        })
        .collect()
}

/// Institutions with at least `min_size` students, best share of GPA 5 first,
/// then best average total. Equal entries stay in first-seen order.
pub fn top_institutions(ranked: &RankedList, query: &InstitutionQuery) -> Vec<InstitutionStats> {
    let mut stats: Vec<InstitutionStats> = aggregate(ranked, query.top_n)
        .into_iter()
        .filter(|s| s.student_count >= query.min_size)
        .collect();

    stats.sort_by(|a, b| {
        b.gpa_max_percent
            .total_cmp(&a.gpa_max_percent)
            .then_with(|| b.avg_total.total_cmp(&a.avg_total))
    });
    stats.truncate(query.limit);

    log::debug!(
        "ranked {} institutions (min size {}, top {})",
        stats.len(),
        query.min_size,
        query.top_n
    );
    stats
}
