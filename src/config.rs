use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Counselbook";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DATABASE_FILE: &str = "counselbook.db";

/// Get the application data directory
/// ~/Counselbook/ when a home directory exists, else relative to the working dir
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => PathBuf::from(APP_NAME),
    }
}

/// Default on-disk scheduling database
pub fn database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Filter used when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "counselbook_lib=info,warn"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Runtime knobs for the scheduler. Every field has a default, so a partial
/// JSON file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// SQLite busy timeout; how long a writer waits for the write lock.
    pub busy_timeout_ms: u64,
    /// Reject preferred times that don't parse instead of falling back to
    /// string equality in conflict checks.
    pub strict_time_ranges: bool,
    pub notifications_enabled: bool,
    /// Age after which terminal records may be purged.
    pub retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            strict_time_ranges: false,
            notifications_enabled: true,
            retention_days: 365,
        }
    }
}

impl SchedulerConfig {
    /// Load from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `config.json` next to the default database.
    pub fn default_path() -> PathBuf {
        app_data_dir().join("config.json")
    }
}
