//! Store configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for event logs and snapshots.
    #[serde(default = "d_data_dir")]
    pub data_dir: PathBuf,
    /// When false the event log is memory-only (tests, ephemeral runs).
    #[serde(default = "d_persist_events")]
    pub persist_events: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: d_data_dir(),
            persist_events: d_persist_events(),
        }
    }
}

fn d_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn d_persist_events() -> bool {
    true
}
