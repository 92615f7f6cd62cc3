//! Configuration types for replicafs
//!
//! Every section falls back to its defaults, so a partial (or absent)
//! config file is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for replicafs
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Metadata store configuration
    #[serde(default)]
    pub meta: MetaConfig,
    /// Object transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
    /// Replicate/erase batch job configuration
    #[serde(default)]
    pub batch: BatchConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetaConfig {
    /// Path of the redb database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Object transport (WebDAV) configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Whole-request timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Connect timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause between successive MKCOL calls (milliseconds)
    #[serde(default = "default_collection_pause_ms")]
    pub collection_pause_ms: u64,
}

impl TransportConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn collection_pause(&self) -> Duration {
        Duration::from_millis(self.collection_pause_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            collection_pause_ms: default_collection_pause_ms(),
        }
    }
}

/// Batch job configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Directory holding the lock markers
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
    /// Additional copies sought per file when none is given explicitly
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,
    /// Pause between host-to-host copies (milliseconds)
    #[serde(default = "default_pause_ms")]
    pub copy_pause_ms: u64,
    /// Pause between successive erasures (milliseconds)
    #[serde(default = "default_pause_ms")]
    pub erase_pause_ms: u64,
}

impl BatchConfig {
    #[must_use]
    pub const fn copy_pause(&self) -> Duration {
        Duration::from_millis(self.copy_pause_ms)
    }

    #[must_use]
    pub const fn erase_pause(&self) -> Duration {
        Duration::from_millis(self.erase_pause_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            replication_factor: default_replication_factor(),
            copy_pause_ms: default_pause_ms(),
            erase_pause_ms: default_pause_ms(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/replicafs/meta.redb")
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_collection_pause_ms() -> u64 {
    100
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/run/replicafs")
}

fn default_replication_factor() -> usize {
    2
}

fn default_pause_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}
