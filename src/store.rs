use crate::error::StoreError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// String-keyed persistence for confirmed identity links.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Store key for a link from an HSC `(year, roll)` to its SSC record.
pub fn link_key(source_year: u16, source_roll_normalized: &str) -> String {
    format!("link:{}:{}", source_year, source_roll_normalized)
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON object on disk, loaded once and rewritten on every `set`.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        log::debug!("opened link store {} ({} entries)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&updated)?)?;
        // Memory only changes once the file holds the new entry.
        *entries = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("board-rank-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn link_keys_use_source_year_and_roll() {
        assert_eq!(link_key(2025, "123456"), "link:2025:123456");
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn json_store_survives_reopen() {
        let path = temp_path("reopen");
        let _ = std::fs::remove_file(&path);

        let store = JsonFileStore::open(&path).unwrap();
        store.set("link:2025:1", "{\"a\":1}").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("link:2025:1").unwrap().as_deref(), Some("{\"a\":1}"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn failed_write_leaves_entries_unchanged() {
        let path = temp_path("unwritable");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir_all(&path);

        let store = JsonFileStore::open(&path).unwrap();
        store.set("link:2025:1", "first").unwrap();

        // A directory in place of the file makes the next write fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(matches!(store.set("link:2025:2", "second"), Err(StoreError::Io(_))));
        assert_eq!(store.get("link:2025:2").unwrap(), None);
        assert_eq!(store.get("link:2025:1").unwrap().as_deref(), Some("first"));

        std::fs::remove_dir(&path).unwrap();
    }

    #[test]
    fn corrupt_store_file_is_an_error() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Serialization(_))));
        std::fs::remove_file(&path).unwrap();
    }
}
