//! Ranking, search and cross-year record linking for SSC/HSC board examination results.
//!
//! Raw tab-delimited tables are fetched through a [`DataSource`], parsed and joined into
//! [`StudentRecord`]s, and ranked into a [`RankedList`]. Filtering and institution statistics
//! are derived from the ranked list without changing it. The [`IdentityMatcher`] links an HSC
//! student to their SSC record two years earlier by normalized name.

pub mod decode;
pub mod error;
pub mod filter;
pub mod index;
pub mod institutions;
pub mod loader;
pub mod matcher;
pub mod models;
pub mod parser;
pub mod ranking;
pub mod source;
pub mod store;

pub use error::{FetchError, LoadError, MatchError, ParseError, StoreError};
pub use filter::{filter, institution_ranking, FilterCriteria, FilteredView, RankedEntry};
pub use index::{CandidateRecord, IndexCache, NormalizedIndex};
pub use institutions::{aggregate, top_institutions, InstitutionQuery, InstitutionStats};
pub use loader::{load_dataset, Encodings, LoadOutcome, LoadedDataset, ResultsBoard};
pub use matcher::{IdentityLinkMapping, IdentityMatcher, MatchOutcome, SourceStudent};
pub use models::{Config, DatasetId, ExamType, Group, StudentRecord, Subject, SubjectLayout};
pub use ranking::{rank, RankedList, StudentDetail};
pub use source::{DataSource, MemorySource};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
