use crate::decode::{decode_table, TableEncoding};
use crate::error::LoadError;
use crate::models::{Config, DatasetId};
use crate::parser::parse_dataset;
use crate::ranking::{rank, RankedList};
use crate::source::DataSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// How summary and subject tables are encoded by the publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encodings {
    pub summary: TableEncoding,
    pub subjects: TableEncoding,
    pub xor_key: Option<String>,
}

impl Encodings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            summary: config.summary_encoding,
            subjects: config.subject_encoding,
            xor_key: config.xor_key.clone(),
        }
    }
}

/// One fully loaded and ranked (exam, year, group) dataset.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub id: DatasetId,
    pub ranked: RankedList,
    pub skipped_rows: usize,
    pub join_misses: usize,
    pub has_subject_table: bool,
}

/// Fetch, decode, parse, join and rank one dataset.
///
/// The summary and subject tables are fetched concurrently. A missing or unreadable subject
/// table only leaves subject marks empty; any summary failure fails the load.
pub async fn load_dataset<S: DataSource>(
    source: &S,
    encodings: &Encodings,
    id: DatasetId,
) -> Result<LoadedDataset, LoadError> {
    let summary_file = id.summary_file();
    let subject_file = id.subject_file();
    let (summary, subjects) = tokio::join!(source.fetch(&summary_file), source.fetch(&subject_file));

    let summary = decode_table(&summary?, encodings.summary, encodings.xor_key.as_deref())?;

    let subjects = match subjects {
        Ok(raw) => match decode_table(&raw, encodings.subjects, encodings.xor_key.as_deref()) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("{}: ignoring undecodable subject table: {}", subject_file, e);
                None
            }
        },
        Err(e) => {
            log::info!("{}: no subject table ({})", id, e);
            None
        }
    };

    let layout = id.layout();
    let parsed = parse_dataset(&summary, subjects.as_deref(), layout)?;
    let ranked = rank(parsed.records, layout);

    log::info!(
        "{}: ranked {} students ({} rows skipped, {} without subject marks)",
        id,
        ranked.len(),
        parsed.skipped_rows,
        parsed.join_misses
    );

    Ok(LoadedDataset {
        id,
        ranked,
        skipped_rows: parsed.skipped_rows,
        join_misses: parsed.join_misses,
        has_subject_table: parsed.has_subject_table,
    })
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Committed(Arc<LoadedDataset>),
    /// A newer load started before this one finished; its result was discarded.
    Superseded,
}

/// The dataset currently on display. Only the most recently requested load may replace it.
pub struct ResultsBoard<S> {
    source: Arc<S>,
    encodings: Encodings,
    generation: AtomicU64,
    current: Mutex<Option<Arc<LoadedDataset>>>,
}

impl<S: DataSource> ResultsBoard<S> {
    pub fn new(source: Arc<S>, encodings: Encodings) -> Self {
        Self {
            source,
            encodings,
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Option<Arc<LoadedDataset>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn load(&self, id: DatasetId) -> Result<LoadOutcome, LoadError> {
        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = load_dataset(self.source.as_ref(), &self.encodings, id).await;

        // The token is checked under the lock so a newer commit cannot slip in between.
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if self.generation.load(Ordering::SeqCst) != token {
            log::debug!("{}: load {} superseded, discarding", id, token);
            return Ok(LoadOutcome::Superseded);
        }

        match result {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                *current = Some(Arc::clone(&loaded));
                Ok(LoadOutcome::Committed(loaded))
            }
            Err(e) => {
                // A failed load clears the board.
                *current = None;
                Err(e)
            }
        }
    }
}
