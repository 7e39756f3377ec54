use crate::models::StudentRecord;
use crate::ranking::RankedList;
use serde::{Deserialize, Serialize};

/// Search-box and filter-panel fields. Every set field must match; unset or empty fields
/// match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Case-insensitive substring of the student's name.
    pub name: Option<String>,
    /// Substring of the roll.
    pub roll: Option<String>,
    /// Case-insensitive exact institution, compared after trimming.
    pub institution: Option<String>,
    pub gpa_set: Vec<f64>,
    /// Inclusive `(min, max)` range on total marks.
    pub total_range: Option<(u32, u32)>,
}

/// A filtered slice of the board, each entry keeping its board rank.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredView<'a> {
    pub entries: Vec<RankedEntry<'a>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RankedEntry<'a> {
    pub rank: usize,
    pub record: &'a StudentRecord,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        non_empty(&self.name).is_none()
            && non_empty(&self.roll).is_none()
            && non_empty(&self.institution).is_none()
            && self.gpa_set.is_empty()
            && self.total_range.is_none()
    }

    pub fn matches(&self, record: &StudentRecord) -> bool {
        if let Some(name) = non_empty(&self.name) {
            if !record.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(roll) = non_empty(&self.roll) {
            let numeric = record.roll.is_some_and(|r| r.to_string().contains(roll));
            if !record.roll_raw.contains(roll) && !numeric {
                return false;
            }
        }
        if let Some(institution) = non_empty(&self.institution) {
            if record.institution.trim().to_lowercase() != institution.to_lowercase() {
                return false;
            }
        }
        if !self.gpa_set.is_empty() && !self.gpa_set.iter().any(|g| *g == record.gpa) {
            return false;
        }
        if let Some((min, max)) = self.total_range {
            if record.total < min || record.total > max {
                return false;
            }
        }
        true
    }
}

impl<'a> FilteredView<'a> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &'a StudentRecord> + '_ {
        self.entries.iter().map(|e| e.record)
    }
}

/// Apply `criteria` to the whole board. Never re-sorts.
pub fn filter<'a>(ranked: &'a RankedList, criteria: &FilterCriteria) -> FilteredView<'a> {
    let entries = ranked
        .iter_ranked()
        .filter(|(_, record)| criteria.matches(record))
        .map(|(rank, record)| RankedEntry { rank, record })
        .collect();
    FilteredView { entries }
}

/// Students of one institution in board order.
pub fn institution_ranking<'a>(ranked: &'a RankedList, institution: &str) -> FilteredView<'a> {
    let criteria = FilterCriteria {
        institution: Some(institution.to_string()),
        ..Default::default()
    };
    filter(ranked, &criteria)
}
