use crate::error::{MatchError, MatchResult, StoreError};
use crate::index::{CandidateRecord, IndexCache};
use crate::loader::load_dataset;
use crate::models::{normalize_roll, DatasetId, ExamType, Group, SSC_TO_HSC_OFFSET};
use crate::ranking::StudentDetail;
use crate::source::DataSource;
use crate::store::{link_key, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A confirmed link from an HSC student to their SSC record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityLinkMapping {
    pub source_year: u16,
    pub source_roll: String,
    pub target_year: u16,
    pub target_roll: String,
    pub target_group: Group,
    pub matched_name: String,
    pub saved_at: DateTime<Utc>,
}

impl IdentityLinkMapping {
    pub fn target_dataset(&self) -> DatasetId {
        DatasetId::new(ExamType::Ssc, self.target_year, self.target_group)
    }
}

/// The HSC student whose SSC record is wanted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStudent {
    pub year: u16,
    pub roll: String,
    pub name: String,
}

impl SourceStudent {
    pub fn new(year: u16, roll: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            year,
            roll: roll.into(),
            name: name.into(),
        }
    }

    /// The SSC year of the same cohort.
    pub fn target_year(&self) -> u16 {
        self.year.saturating_sub(SSC_TO_HSC_OFFSET)
    }

    /// Key of the stored link. Students without a roll are never cached.
    pub fn store_key(&self) -> Option<String> {
        if self.roll.trim().is_empty() {
            return None;
        }
        Some(link_key(self.year, &normalize_roll(&self.roll)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// `cached` is true when the link came from the store without consulting the index.
    Linked {
        mapping: IdentityLinkMapping,
        cached: bool,
    },
    /// Several SSC records share the name; the user must pick one.
    Ambiguous {
        target_year: u16,
        candidates: Vec<CandidateRecord>,
    },
}

pub struct IdentityMatcher<S, K> {
    indexes: Arc<IndexCache<S>>,
    store: K,
}

impl<S: DataSource, K: KeyValueStore> IdentityMatcher<S, K> {
    pub fn new(indexes: Arc<IndexCache<S>>, store: K) -> Self {
        Self { indexes, store }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// A previously confirmed link, if one is stored and readable.
    pub fn cached_link(&self, student: &SourceStudent) -> Result<Option<IdentityLinkMapping>, StoreError> {
        let Some(key) = student.store_key() else {
            return Ok(None);
        };
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(mapping) => Ok(Some(mapping)),
            Err(e) => {
                log::warn!("{}: ignoring unreadable link: {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn lookup(&self, student: &SourceStudent) -> MatchResult<MatchOutcome> {
        if let Some(mapping) = self.cached_link(student)? {
            log::debug!("HSC {} roll {}: using stored link", student.year, student.roll);
            return Ok(MatchOutcome::Linked {
                mapping,
                cached: true,
            });
        }

        let target_year = student.target_year();
        let index = self.indexes.ensure(target_year).await;
        let mut candidates = index.lookup_name(&student.name);

        match candidates.len() {
            0 => Err(MatchError::NotFound {
                name: student.name.clone(),
                year: target_year,
            }),
            1 => {
                let chosen = candidates.remove(0);
                let mapping = self.persist(student, &chosen)?;
                log::info!(
                    "HSC {} roll {} linked to SSC {} roll {} ({})",
                    student.year,
                    student.roll,
                    mapping.target_year,
                    mapping.target_roll,
                    mapping.target_group
                );
                Ok(MatchOutcome::Linked {
                    mapping,
                    cached: false,
                })
            }
            n => {
                log::debug!("{} SSC {} candidates for \"{}\"", n, target_year, student.name);
                Ok(MatchOutcome::Ambiguous {
                    target_year,
                    candidates,
                })
            }
        }
    }

    /// Record the candidate the user picked.
    pub fn confirm(
        &self,
        student: &SourceStudent,
        candidate: &CandidateRecord,
    ) -> MatchResult<IdentityLinkMapping> {
        self.persist(student, candidate)
    }

    /// Record the candidate whose roll the user typed in.
    pub fn confirm_roll(
        &self,
        student: &SourceStudent,
        candidates: &[CandidateRecord],
        roll_input: &str,
    ) -> MatchResult<IdentityLinkMapping> {
        let roll_input = roll_input.trim();
        if roll_input.is_empty() {
            return Err(MatchError::EmptyRoll);
        }
        let wanted = normalize_roll(roll_input);
        let chosen = candidates
            .iter()
            .find(|c| c.roll_normalized == wanted)
            .ok_or_else(|| MatchError::RollNotAmongCandidates(roll_input.to_string()))?;
        self.persist(student, chosen)
    }

    /// Load the linked SSC dataset and return the student's result.
    pub async fn linked_record(&self, mapping: &IdentityLinkMapping) -> MatchResult<StudentDetail> {
        let id = mapping.target_dataset();
        let loaded = load_dataset(self.indexes.source().as_ref(), self.indexes.encodings(), id).await?;
        loaded
            .ranked
            .detail(&mapping.target_roll)
            .ok_or_else(|| MatchError::RecordMissing {
                roll: mapping.target_roll.clone(),
                dataset: id.to_string(),
            })
    }

    fn persist(
        &self,
        student: &SourceStudent,
        chosen: &CandidateRecord,
    ) -> MatchResult<IdentityLinkMapping> {
        let mapping = IdentityLinkMapping {
            source_year: student.year,
            source_roll: normalize_roll(&student.roll),
            target_year: student.target_year(),
            target_roll: chosen.roll_normalized.clone(),
            target_group: chosen.group,
            matched_name: chosen.name_raw.clone(),
            saved_at: Utc::now(),
        };
        if let Some(key) = student.store_key() {
            let value = serde_json::to_string(&mapping).map_err(StoreError::from)?;
            self.store.set(&key, &value)?;
        }
        Ok(mapping)
    }
}
