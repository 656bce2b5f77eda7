use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::DatabaseResult;
use crate::buffer::{DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_POOL_PAGES};

/// Session settings, loadable from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Maximum number of pages cached by the buffer pool
    pub buffer_pool_pages: usize,
    /// How long a lock request may wait before its transaction is aborted
    pub lock_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            buffer_pool_pages: DEFAULT_POOL_PAGES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}
