//! Persistence: a small string key-value seam with a file-backed store for
//! production and an in-memory one for tests, plus typed access to the
//! consent flag, theme preference, and the bounded session history.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::{HistoryRecord, Theme};

pub const HISTORY_KEY: &str = "lyvt-speed-history";
pub const CONSENT_KEY: &str = "ndt7-consent";
pub const THEME_KEY: &str = "theme";

/// Only the most recent sessions are kept.
pub const MAX_HISTORY: usize = 8;

/// String key-value storage.
pub trait KvStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: BTreeMap<String, String>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }
}

/// One JSON object on disk, rewritten on every set or remove. An unreadable
/// or unparsable file starts empty rather than failing the open.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    map: BTreeMap<String, String>,
}

impl FileStore {
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .context("no data directory on this platform")?
            .join("ndt7-dash");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(Self::open(dir.join("storage.json")))
    }

    pub fn open(path: PathBuf) -> Self {
        let map = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, map }
    }

    fn persist(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.map).context("serialize storage")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.map.insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.map.remove(key);
        self.persist()
    }
}

/// Typed access over a [`KvStore`].
pub struct Store {
    kv: Box<dyn KvStore>,
}

impl Store {
    pub fn new(kv: Box<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// The platform data-directory store, or an in-memory one when no data
    /// directory resolves. Preferences are session-only in that case.
    pub fn open_default() -> Self {
        match FileStore::open_default() {
            Ok(kv) => Self::new(Box::new(kv)),
            Err(_) => Self::new(Box::new(MemoryStore::default())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::default()))
    }

    /// The persisted history, most recent first. Absent or corrupt data
    /// loads as empty.
    pub fn load_history(&self) -> Vec<HistoryRecord> {
        let Some(raw) = self.kv.get(HISTORY_KEY) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }

    /// Prepend one record and drop everything beyond the cap.
    pub fn push_history(&mut self, record: HistoryRecord) -> Result<()> {
        let mut history = self.load_history();
        history.insert(0, record);
        history.truncate(MAX_HISTORY);
        let text = serde_json::to_string(&history).context("serialize history")?;
        self.kv.set(HISTORY_KEY, &text)
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.kv.remove(HISTORY_KEY)
    }

    pub fn best(&self) -> Option<HistoryRecord> {
        let history = self.load_history();
        best_record(&history).cloned()
    }

    /// Write the current history as pretty JSON to `path`.
    pub fn export_history(&self, path: &Path) -> Result<()> {
        let history = self.load_history();
        let text = serde_json::to_string_pretty(&history).context("serialize history")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn consent(&self) -> bool {
        self.kv.get(CONSENT_KEY).as_deref() == Some("true")
    }

    pub fn set_consent(&mut self, granted: bool) -> Result<()> {
        if granted {
            self.kv.set(CONSENT_KEY, "true")
        } else {
            self.kv.remove(CONSENT_KEY)
        }
    }

    pub fn theme(&self) -> Theme {
        match self.kv.get(THEME_KEY) {
            Some(key) => Theme::from_key(&key),
            None => Theme::default(),
        }
    }

    pub fn set_theme(&mut self, theme: Theme) -> Result<()> {
        self.kv.set(THEME_KEY, theme.as_key())
    }
}

/// Highest download average; the earliest record wins ties.
pub fn best_record(records: &[HistoryRecord]) -> Option<&HistoryRecord> {
    let mut best = records.first()?;
    for record in records {
        if record.download_avg > best.download_avg {
            best = record;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(node: &str, download_avg: f64) -> HistoryRecord {
        HistoryRecord {
            timestamp: 1_720_000_000_000,
            node: node.to_string(),
            download_avg,
            upload_avg: 20.0,
            ping_avg: 15.0,
            jitter: 0.5,
            packet_loss: 0.0,
        }
    }

    #[test]
    fn history_caps_at_eight_newest_first() {
        let mut store = Store::in_memory();
        for i in 0..9 {
            store.push_history(record(&format!("node-{i}"), i as f64)).unwrap();
        }
        let history = store.load_history();
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0].node, "node-8");
        assert_eq!(history[MAX_HISTORY - 1].node, "node-1");
    }

    #[test]
    fn corrupt_history_loads_as_empty() {
        let mut store = Store::in_memory();
        store.kv.set(HISTORY_KEY, "{definitely not json").unwrap();
        assert!(store.load_history().is_empty());

        // Wrong shape rather than broken syntax.
        store.kv.set(HISTORY_KEY, r#"{"a":1}"#).unwrap();
        assert!(store.load_history().is_empty());
    }

    #[test]
    fn clear_removes_all_records() {
        let mut store = Store::in_memory();
        store.push_history(record("fra", 90.0)).unwrap();
        store.clear_history().unwrap();
        assert!(store.load_history().is_empty());
        assert!(store.best().is_none());
    }

    #[test]
    fn best_takes_first_occurrence_on_ties() {
        let records = vec![record("a", 50.0), record("b", 80.0), record("c", 80.0)];
        assert_eq!(best_record(&records).unwrap().node, "b");
        assert!(best_record(&[]).is_none());
    }

    #[test]
    fn consent_and_theme_round_trip() {
        let mut store = Store::in_memory();
        assert!(!store.consent());
        store.set_consent(true).unwrap();
        assert!(store.consent());
        store.set_consent(false).unwrap();
        assert!(!store.consent());

        assert_eq!(store.theme(), Theme::Dark);
        store.set_theme(Theme::Light).unwrap();
        assert_eq!(store.theme(), Theme::Light);
    }

    #[test]
    fn file_store_survives_reopen_and_corruption() {
        let path = std::env::temp_dir().join(format!(
            "ndt7-dash-store-test-{}.json",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let mut kv = FileStore::open(path.clone());
        assert!(kv.get(CONSENT_KEY).is_none());
        kv.set(CONSENT_KEY, "true").unwrap();

        let reopened = FileStore::open(path.clone());
        assert_eq!(reopened.get(CONSENT_KEY).as_deref(), Some("true"));

        std::fs::write(&path, "not a json document").unwrap();
        let corrupted = FileStore::open(path.clone());
        assert!(corrupted.get(CONSENT_KEY).is_none());

        let _ = std::fs::remove_file(&path);
    }
}
