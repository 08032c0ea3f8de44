//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Process-level settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Reconciler loop tuning
    #[serde(default)]
    pub reconciler: RawReconcilerConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// Data directory holding the SQLite store
    pub data_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    pub log_level: Option<String>,
}

/// Reconciler settings. Every field is optional and falls back to a default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawReconcilerConfig {
    /// Seconds between reconciler ticks
    pub tick_interval_seconds: Option<u64>,

    /// Delay before the first tick after start-up
    pub startup_delay_seconds: Option<u64>,

    /// Seconds a sensor timestamp may stay unchanged before the outlet is
    /// considered unplugged
    pub unplug_threshold_seconds: Option<u64>,

    /// Timeout applied to every store call
    pub store_timeout_millis: Option<u64>,

    /// Upper bound on devices written concurrently within one tick
    pub max_concurrent_devices: Option<usize>,

    /// Minimum spacing between two automatic relay writes for one device
    pub debounce_seconds: Option<u64>,
}
