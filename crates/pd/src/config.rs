//! Cluster-wide tunables (AMBIENT-4), loadable from JSON or YAML the way
//! the teacher's `ManifestLoader` loads manifests: sniff the extension,
//! fall back to the other format if parsing fails.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    pub max_replicas: u64,
    /// Ordered, most-significant first (e.g. `["zone", "rack", "host"]`).
    pub location_labels: Vec<String>,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_replicas: 3,
            location_labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub leader_schedule_limit: u64,
    pub region_schedule_limit: u64,
    pub replica_schedule_limit: u64,
    pub hot_region_schedule_limit: u64,
    pub max_store_down_time_secs: u64,
    pub max_pending_peer_count: u64,
    pub low_space_ratio: f64,
    pub balance_leader_retry_limit: u32,
    pub schedule_min_interval_ms: u64,
    pub schedule_max_interval_ms: u64,
    pub schedule_backoff_factor: f64,
    pub failure_cache_ttl_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            leader_schedule_limit: 4,
            region_schedule_limit: 4,
            replica_schedule_limit: 8,
            hot_region_schedule_limit: 4,
            max_store_down_time_secs: 30 * 60,
            max_pending_peer_count: 3,
            low_space_ratio: 0.2,
            balance_leader_retry_limit: 10,
            schedule_min_interval_ms: 10,
            schedule_max_interval_ms: 60_000,
            schedule_backoff_factor: 1.3,
            failure_cache_ttl_secs: 5 * 60,
        }
    }
}

impl ScheduleConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_max_interval_ms)
    }

    pub fn failure_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_cache_ttl_secs)
    }

    pub fn max_store_down_time(&self) -> Duration {
        Duration::from_secs(self.max_store_down_time_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Yaml,
}

fn sniff_format(path: &Path) -> ConfigFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => ConfigFormat::Yaml,
        _ => ConfigFormat::Json,
    }
}

/// Loads a config value from a file, sniffing JSON vs. YAML by
/// extension and falling back to the other format on a parse error —
/// mirrors the teacher's `ManifestLoader::load`.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        let primary = sniff_format(path);
        let (first, second) = match primary {
            ConfigFormat::Json => (ConfigFormat::Json, ConfigFormat::Yaml),
            ConfigFormat::Yaml => (ConfigFormat::Yaml, ConfigFormat::Json),
        };
        Self::parse(&raw, first).or_else(|first_err| {
            Self::parse(&raw, second).map_err(|_| first_err)
        })
    }

    fn parse<T: for<'de> Deserialize<'de>>(raw: &str, format: ConfigFormat) -> Result<T, ConfigLoadError> {
        match format {
            ConfigFormat::Json => serde_json::from_str(raw).map_err(|e| ConfigLoadError::Parse(e.to_string())),
            ConfigFormat::Yaml => serde_yaml::from_str(raw).map_err(|e| ConfigLoadError::Parse(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigLoadError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigLoadError::Io(msg) => write!(f, "failed to read config file: {msg}"),
            ConfigLoadError::Parse(msg) => write!(f, "failed to parse config file: {msg}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {}
