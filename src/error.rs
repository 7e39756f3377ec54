use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("table is empty")]
    Empty,

    #[error("table has no tab-delimited columns")]
    NoDelimiter,

    #[error("table has no data rows")]
    NoDataRows,

    #[error("could not decode table: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request for {url} failed with status: {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not available")]
    Missing(String),
}

/// Failure of one dataset load request.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no data: {0}")]
    Fetch(#[from] FetchError),

    #[error("no data: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Couldn't find SSC {year} result for \"{name}\". Name mismatch or stream change may be the cause.")]
    NotFound { name: String, year: u16 },

    #[error("No SSC record with roll {0} among the candidates")]
    RollNotAmongCandidates(String),

    #[error("No roll entered")]
    EmptyRoll,

    #[error("Roll {roll} is missing from {dataset}")]
    RecordMissing { roll: String, dataset: String },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type MatchResult<T> = Result<T, MatchError>;
