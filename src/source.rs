use crate::error::FetchError;
use crate::models::{Config, DataSourceMode};
use anyhow::Context;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Supplies raw dataset files by name (`data_2023_science.txt`, ...).
pub trait DataSource: Send + Sync {
    fn fetch(&self, file_name: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, file_name: &str) -> String {
        format!("{}/{}", self.base_url, file_name)
    }
}

impl DataSource for HttpSource {
    async fn fetch(&self, file_name: &str) -> Result<String, FetchError> {
        let url = self.url_for(file_name);
        log::debug!("fetching {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| FetchError::Http { url, source })
    }
}

pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DataSource for DirectorySource {
    async fn fetch(&self, file_name: &str) -> Result<String, FetchError> {
        let path = self.root.join(file_name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

/// Tries `primary`, then `secondary`.
pub struct FallbackSource<A, B> {
    primary: A,
    secondary: B,
}

impl<A, B> FallbackSource<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: DataSource, B: DataSource> DataSource for FallbackSource<A, B> {
    async fn fetch(&self, file_name: &str) -> Result<String, FetchError> {
        match self.primary.fetch(file_name).await {
            Ok(text) => Ok(text),
            Err(e) => {
                log::debug!("{}: primary source failed ({}), trying fallback", file_name, e);
                self.secondary.fetch(file_name).await
            }
        }
    }
}

/// Files held in memory. Counts every fetch, including misses.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<String, String>>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, file_name: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(file_name, content);
        self
    }

    pub fn insert(&self, file_name: impl Into<String>, content: impl Into<String>) {
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(file_name.into(), content.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DataSource for MemorySource {
    async fn fetch(&self, file_name: &str) -> Result<String, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .get(file_name)
            .cloned()
            .ok_or_else(|| FetchError::Missing(file_name.to_string()))
    }
}

/// The source selected by `data_source_mode`.
pub enum ConfiguredSource {
    Local(DirectorySource),
    Internet(HttpSource),
    Both(FallbackSource<DirectorySource, HttpSource>),
}

impl ConfiguredSource {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let local = || {
            config
                .data_directory
                .as_deref()
                .map(DirectorySource::new)
                .context("data_directory must be set for local data")
        };
        let internet = || {
            config
                .base_url
                .as_deref()
                .map(HttpSource::new)
                .context("base_url must be set for internet data")
        };

        Ok(match config.data_source_mode {
            DataSourceMode::Local => ConfiguredSource::Local(local()?),
            DataSourceMode::Internet => ConfiguredSource::Internet(internet()?),
            DataSourceMode::Both => ConfiguredSource::Both(FallbackSource::new(local()?, internet()?)),
        })
    }
}

impl DataSource for ConfiguredSource {
    async fn fetch(&self, file_name: &str) -> Result<String, FetchError> {
        match self {
            ConfiguredSource::Local(source) => source.fetch(file_name).await,
            ConfiguredSource::Internet(source) => source.fetch(file_name).await,
            ConfiguredSource::Both(source) => source.fetch(file_name).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_serves_and_counts() {
        let source = MemorySource::new().with_file("data_2023_science.txt", "x\ty");
        assert_eq!(source.fetch("data_2023_science.txt").await.unwrap(), "x\ty");
        assert!(matches!(
            source.fetch("data_2023_arts.txt").await,
            Err(FetchError::Missing(_))
        ));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn fallback_uses_secondary_on_failure() {
        let primary = MemorySource::new().with_file("a.txt", "from primary");
        let secondary = MemorySource::new()
            .with_file("a.txt", "from secondary")
            .with_file("b.txt", "only secondary");
        let source = FallbackSource::new(primary, secondary);

        assert_eq!(source.fetch("a.txt").await.unwrap(), "from primary");
        assert_eq!(source.fetch("b.txt").await.unwrap(), "only secondary");
        assert!(source.fetch("c.txt").await.is_err());
    }

    #[tokio::test]
    async fn directory_source_reports_missing_files() {
        let source = DirectorySource::new(std::env::temp_dir().join("board-rank-missing-dir"));
        assert!(matches!(
            source.fetch("data_2023_science.txt").await,
            Err(FetchError::Io { .. })
        ));
    }

    #[test]
    fn http_urls_join_cleanly() {
        let source = HttpSource::new("https://example.com/rank/");
        assert_eq!(
            source.url_for("data_2023_science.txt"),
            "https://example.com/rank/data_2023_science.txt"
        );
    }
}
