//! Store configuration
//!
//! The `[store]` section of `marketkit.toml`. Parsed by the embedding
//! application; every key has a default.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StoreConfig {
    /// Path to the SQLite database (`~/` is expanded)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// How long SQLite waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> String {
    dirs::home_dir()
        .map(|h| {
            h.join(".config")
                .join("marketkit")
                .join("fields.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "fields.db".to_string())
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Get the resolved database path (expanding ~ if needed)
    pub fn resolved_db_path(&self) -> PathBuf {
        let path = &self.db_path;
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Warn about values that will behave badly at runtime
    pub fn validate(&self) {
        if self.busy_timeout_ms == 0 {
            tracing::warn!("store.busy_timeout_ms is 0; concurrent writers will fail immediately");
        }
        if self.db_path.trim().is_empty() {
            tracing::warn!("store.db_path is empty; SQLite will use a temporary database");
        }
    }
}
