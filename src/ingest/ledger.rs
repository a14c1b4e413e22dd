//! Persisted set of processed remote file ids.
//!
//! One JSON record per data directory: `.gdrive_sync_state.json` holding
//! `{"processed_ids": [...]}`. Ids are written sorted. Every write goes to a
//! sibling temp file first and is then renamed over the ledger.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::DatabaseError;

/// Ledger file name inside the data directory.
pub const LEDGER_FILE: &str = ".gdrive_sync_state.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerRecord {
    #[serde(default)]
    processed_ids: BTreeSet<String>,
}

/// Handle on the ledger of one data directory.
#[derive(Debug, Clone)]
pub struct SyncLedger {
    dir: PathBuf,
}

impl SyncLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    /// Load the processed set. A missing ledger is an empty set.
    pub async fn load(&self) -> Result<BTreeSet<String>, DatabaseError> {
        let path = self.path();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };
        let record: LedgerRecord = serde_json::from_str(&raw).map_err(|e| {
            DatabaseError::Serialization(format!("ledger {}: {e}", path.display()))
        })?;
        Ok(record.processed_ids)
    }

    /// Replace the ledger contents.
    pub async fn save(&self, ids: &BTreeSet<String>) -> Result<(), DatabaseError> {
        let record = LedgerRecord {
            processed_ids: ids.clone(),
        };
        let body = serde_json::to_string_pretty(&record)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        write_atomic(&self.path(), &body).await?;
        debug!(count = ids.len(), "Sync ledger saved");
        Ok(())
    }

    /// Add one id and persist immediately. Returns false if it was already present.
    pub async fn record(&self, id: &str) -> Result<bool, DatabaseError> {
        let mut ids = self.load().await?;
        if !ids.insert(id.to_string()) {
            return Ok(false);
        }
        self.save(&ids).await?;
        Ok(true)
    }
}

async fn write_atomic(path: &Path, body: &str) -> Result<(), DatabaseError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
