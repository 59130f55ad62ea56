//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (GRAPHCORE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [query]
//! timeout_secs = 60
//! max_queued = 256
//! thread_pool_size = 0
//!
//! [graph]
//! default_sync_policy = "flush_resize"
//!
//! [index]
//! batch_size = 1000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! GRAPHCORE_QUERY__TIMEOUT_SECS=30
//! GRAPHCORE_INDEX__BATCH_SIZE=5000
//! ```

use crate::matrix::MatrixSyncPolicy;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration struct (spec.md §6 "Environment").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Per-query execution knobs, consumed by [`crate::execution`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Query timeout in seconds (0 = no timeout).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Backlog size for queued queries awaiting a thread-pool slot.
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,

    /// Shared thread-pool size for concurrent client connections.
    /// 0 = `num_cpus::get()`.
    #[serde(default)]
    pub thread_pool_size: usize,
}

impl QueryConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    pub fn resolved_thread_pool_size(&self) -> usize {
        if self.thread_pool_size == 0 {
            num_cpus::get()
        } else {
            self.thread_pool_size
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            timeout_secs: default_timeout_secs(),
            max_queued: default_max_queued(),
            thread_pool_size: 0,
        }
    }
}

/// Graph-facade defaults (spec.md §4.1 matrix-sync policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub default_sync_policy: SyncPolicyConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig { default_sync_policy: SyncPolicyConfig::default() }
    }
}

/// Serde-friendly mirror of [`MatrixSyncPolicy`] (the matrix type itself
/// carries no serde derive, since it is not part of the wire snapshot
/// format — only configuration needs to name it).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicyConfig {
    Nop,
    Resize,
    #[default]
    FlushResize,
}

impl From<SyncPolicyConfig> for MatrixSyncPolicy {
    fn from(value: SyncPolicyConfig) -> Self {
        match value {
            SyncPolicyConfig::Nop => MatrixSyncPolicy::Nop,
            SyncPolicyConfig::Resize => MatrixSyncPolicy::Resize,
            SyncPolicyConfig::FlushResize => MatrixSyncPolicy::FlushResize,
        }
    }
}

/// Index-populator defaults (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig { batch_size: default_index_batch_size() }
    }
}

/// Logging configuration, mirrored from the teacher's `LoggingConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: default_log_level(), format: default_log_format() }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_queued() -> usize {
    256
}
fn default_index_batch_size() -> usize {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`GRAPHCORE_*` prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("GRAPHCORE_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("GRAPHCORE_").split("__"))
            .extract()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            query: QueryConfig::default(),
            graph: GraphConfig::default(),
            index: IndexConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
