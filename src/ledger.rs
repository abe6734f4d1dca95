//! Persistent record of messages that have already been acted upon
//!
//! The whole id set lives in memory and is rewritten to disk on every
//! [`ProcessedLedger::mark_processed`] call, so the file and the in-memory set
//! never diverge between polls. The ledger only grows.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, WatchError};

/// On-disk representation: `{"processed_ids": [...]}`
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    processed_ids: Vec<String>,
}

#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    ids: HashSet<String>,
}

impl ProcessedLedger {
    /// Load the ledger from disk.
    ///
    /// A missing file is an empty ledger. So is a corrupted or unreadable one:
    /// refusing to start after a truncated file would make the tool unusable.
    pub async fn load(path: &Path) -> Self {
        let ids = match read_ids(path).await {
            Ok(ids) => {
                tracing::info!("Loaded {} processed message ids from {:?}", ids.len(), path);
                ids
            }
            Err(WatchError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No existing ledger found at {:?}, starting fresh", path);
                HashSet::new()
            }
            Err(e) => {
                tracing::warn!("{}; treating ledger at {:?} as empty", e, path);
                HashSet::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            ids,
        }
    }

    pub fn is_processed(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` and persist the full set before returning.
    ///
    /// Marking an id twice is harmless; the file is rewritten either way.
    pub async fn mark_processed(&mut self, id: &str) -> Result<()> {
        if !self.ids.insert(id.to_string()) {
            tracing::debug!("Message {} already in ledger", id);
        }
        self.save().await
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write to a sibling temp file and rename it into place
    async fn save(&self) -> Result<()> {
        let mut processed_ids: Vec<String> = self.ids.iter().cloned().collect();
        processed_ids.sort();
        let json = serde_json::to_string_pretty(&LedgerFile { processed_ids })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    WatchError::LedgerWrite(format!("cannot create {:?}: {}", parent, e))
                })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| WatchError::LedgerWrite(format!("cannot write {:?}: {}", tmp_path, e)))?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            WatchError::LedgerWrite(format!("cannot replace {:?}: {}", self.path, e))
        })?;

        tracing::debug!("Saved {} processed ids to {:?}", self.ids.len(), self.path);
        Ok(())
    }
}

async fn read_ids(path: &Path) -> Result<HashSet<String>> {
    let json = tokio::fs::read_to_string(path).await?;
    let file: LedgerFile = serde_json::from_str(&json)
        .map_err(|e| WatchError::LedgerCorruption(format!("invalid ledger JSON: {}", e)))?;
    Ok(file.processed_ids.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ledger_load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = ProcessedLedger::load(&temp_dir.path().join("missing.json")).await;

        assert!(ledger.is_empty());
        assert!(!ledger.is_processed("1"));
    }

    #[tokio::test]
    async fn test_ledger_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("processed_emails.json");

        let mut ledger = ProcessedLedger::load(&path).await;
        ledger.mark_processed("42").await.unwrap();
        assert!(ledger.is_processed("42"));

        let reloaded = ProcessedLedger::load(&path).await;
        assert!(reloaded.is_processed("42"));
        assert_eq!(reloaded.len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_mark_twice_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");

        let mut ledger = ProcessedLedger::load(&path).await;
        ledger.mark_processed("7").await.unwrap();
        ledger.mark_processed("7").await.unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ProcessedLedger::load(&path).await.len(), 1);
    }

    #[tokio::test]
    async fn test_ledger_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");

        let mut ledger = ProcessedLedger::load(&path).await;
        ledger.mark_processed("2").await.unwrap();
        ledger.mark_processed("1").await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "processed_ids": ["1", "2"] }));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_ledger_corrupted_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");
        tokio::fs::write(&path, "{\"processed_ids\": [\"1\", ").await.unwrap();

        let mut ledger = ProcessedLedger::load(&path).await;
        assert!(ledger.is_empty());

        // The next write replaces the broken file
        ledger.mark_processed("3").await.unwrap();
        let reloaded = ProcessedLedger::load(&path).await;
        assert!(reloaded.is_processed("3"));
        assert!(!reloaded.is_processed("1"));
    }

    #[tokio::test]
    async fn test_ledger_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("ledger.json");

        let mut ledger = ProcessedLedger::load(&path).await;
        ledger.mark_processed("9").await.unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_ledger_accepts_missing_field() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ledger.json");
        tokio::fs::write(&path, "{}").await.unwrap();

        let ledger = ProcessedLedger::load(&path).await;
        assert!(ledger.is_empty());
    }
}
