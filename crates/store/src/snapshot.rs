//! Key/value snapshot store.
//!
//! One JSON document per key under the snapshots directory, plus an
//! append-only JSONL variant for committed memory records. Used for
//! fast workspace recovery and for memory_commit persistence.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use qm_domain::error::{Error, Result};

pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    fn doc_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", sanitize(key)))
    }

    fn jsonl_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.jsonl", sanitize(key)))
    }

    /// Write a JSON document, replacing any previous value for the key.
    pub fn save(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.doc_path(key);
        let body = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, body)?;
        tracing::debug!(key, path = %path.display(), "snapshot saved");
        Ok(())
    }

    /// Load a JSON document, `None` if the key has never been saved.
    pub fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.doc_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let value = serde_json::from_str(&raw)
            .map_err(|e| Error::Store(format!("corrupt snapshot {key}: {e}")))?;
        Ok(Some(value))
    }

    /// Append one record to the key's JSONL file.
    pub fn append_record(&self, key: &str, record: &Value) -> Result<()> {
        let path = self.jsonl_path(key);
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read back all records for a key, skipping malformed lines.
    pub fn read_records(&self, key: &str) -> Result<Vec<Value>> {
        let path = self.jsonl_path(key);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&path)?;
        let mut records = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(v) => records.push(v),
                Err(e) => {
                    tracing::warn!(key, error = %e, "skipping malformed record line");
                }
            }
        }
        Ok(records)
    }
}

/// Keys become file names; keep them path-safe.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
