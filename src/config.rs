//! Engine settings. Loading them from files or the environment is the
//! embedding process's concern; this crate only defines the shape and the
//! defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory for cached remote index documents
    pub cache_dir: PathBuf,

    /// Freshness window for cached indexes, in seconds
    pub index_ttl_secs: u64,

    /// HTTP connect timeout, in seconds
    pub connect_timeout_secs: u64,

    /// Maximum fetch pipelines in flight at once
    pub concurrency_limit: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("package-fetcher-index"),
            index_ttl_secs: 8 * 60 * 60,
            connect_timeout_secs: 30,
            concurrency_limit: 16,
        }
    }
}

impl FetchConfig {
    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
