use crate::decode::decode_table;
use crate::loader::Encodings;
use crate::models::{normalize_name, normalize_roll, DatasetId, ExamType, Group};
use crate::source::DataSource;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// A student as listed in a summary table, reduced to what identity matching needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub roll: String,
    pub roll_normalized: String,
    pub group: Group,
    pub name_raw: String,
    pub institution: String,
}

/// Name and roll lookup tables over every group of one SSC year.
#[derive(Debug, Default)]
pub struct NormalizedIndex {
    by_name: HashMap<String, Vec<CandidateRecord>>,
    by_roll: HashMap<String, CandidateRecord>,
}

impl NormalizedIndex {
    /// Build from decoded summary tables, one per available group.
    pub fn build<'a>(tables: impl IntoIterator<Item = (Group, &'a str)>) -> Self {
        let mut index = NormalizedIndex::default();
        for (group, text) in tables {
            index.add_table(group, text);
        }
        index
    }

    fn add_table(&mut self, group: Group, text: &str) {
        let mut lines = text.trim().lines().peekable();
        if let Some(first) = lines.peek() {
            if first.contains('\t') && first.to_lowercase().contains("name") {
                lines.next();
            }
        }

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let cols: Vec<&str> = line.split('\t').map(str::trim).collect();
            let name_raw = cols.get(1).copied().unwrap_or("");
            let roll = cols.get(2).copied().unwrap_or("");
            if name_raw.is_empty() || roll.is_empty() {
                continue;
            }

            let candidate = CandidateRecord {
                roll: roll.to_string(),
                roll_normalized: normalize_roll(roll),
                group,
                name_raw: name_raw.to_string(),
                institution: cols.get(5).copied().unwrap_or("").to_string(),
            };

            self.by_roll
                .entry(candidate.roll_normalized.clone())
                .or_insert_with(|| candidate.clone());

            let same_name = self.by_name.entry(normalize_name(name_raw)).or_default();
            if !same_name.iter().any(|c| {
                c.roll_normalized == candidate.roll_normalized && c.group == candidate.group
            }) {
                same_name.push(candidate);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_roll.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_roll.len()
    }

    /// Candidates whose normalized name equals the normalized query, one per (roll, group).
    pub fn lookup_name(&self, name: &str) -> Vec<CandidateRecord> {
        let mut seen = HashSet::new();
        self.by_name
            .get(&normalize_name(name))
            .map(|candidates| {
                candidates
                    .iter()
                    .filter(|c| seen.insert((c.roll_normalized.clone(), c.group)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn lookup_roll(&self, roll: &str) -> Option<&CandidateRecord> {
        self.by_roll.get(&normalize_roll(roll))
    }
}

/// Process-wide SSC index per year, built at most once per year.
///
/// Concurrent `ensure` calls for the same year share one build.
pub struct IndexCache<S> {
    source: Arc<S>,
    encodings: Encodings,
    entries: Mutex<HashMap<u16, Arc<OnceCell<Arc<NormalizedIndex>>>>>,
}

impl<S: DataSource> IndexCache<S> {
    pub fn new(source: Arc<S>, encodings: Encodings) -> Self {
        Self {
            source,
            encodings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn encodings(&self) -> &Encodings {
        &self.encodings
    }

    fn cell(&self, year: u16) -> Arc<OnceCell<Arc<NormalizedIndex>>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(entries.entry(year).or_default())
    }

    /// The index for `year` if it has already been built.
    pub fn get(&self, year: u16) -> Option<Arc<NormalizedIndex>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&year).and_then(|cell| cell.get().cloned())
    }

    /// The index for `year`, building it first if needed.
    pub async fn ensure(&self, year: u16) -> Arc<NormalizedIndex> {
        let cell = self.cell(year);
        cell.get_or_init(|| self.build(year)).await.clone()
    }

    async fn build(&self, year: u16) -> Arc<NormalizedIndex> {
        let [science, commerce, arts] = Group::ALL;
        let (science_text, commerce_text, arts_text) = tokio::join!(
            self.fetch_group(year, science),
            self.fetch_group(year, commerce),
            self.fetch_group(year, arts),
        );

        let tables: Vec<(Group, String)> = [
            (science, science_text),
            (commerce, commerce_text),
            (arts, arts_text),
        ]
        .into_iter()
        .filter_map(|(group, text)| text.map(|t| (group, t)))
        .collect();

        let index = NormalizedIndex::build(tables.iter().map(|(g, t)| (*g, t.as_str())));
        log::info!(
            "SSC {} index: {} students from {} of {} groups",
            year,
            index.len(),
            tables.len(),
            Group::ALL.len()
        );
        Arc::new(index)
    }

    async fn fetch_group(&self, year: u16, group: Group) -> Option<String> {
        let id = DatasetId::new(ExamType::Ssc, year, group);
        let raw = match self.source.fetch(&id.summary_file()).await {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("{}: left out of index: {}", id, e);
                return None;
            }
        };
        match decode_table(&raw, self.encodings.summary, self.encodings.xor_key.as_deref()) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("{}: left out of index: {}", id, e);
                None
            }
        }
    }
}
