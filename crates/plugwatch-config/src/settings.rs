//! Validated settings structures

use crate::schema::{RawConfig, RawDaemonConfig, RawReconcilerConfig};
use plugwatch_util::default_data_dir;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_UNPLUG_THRESHOLD: Duration = Duration::from_secs(30);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_MAX_CONCURRENT_DEVICES: usize = 8;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Validated settings ready for use by the daemon
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub daemon: DaemonConfig,
    pub reconciler: ReconcilerConfig,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
            reconciler: ReconcilerConfig::from_raw(raw.reconciler),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            log_level: raw.log_level.unwrap_or_else(|| "info".to_string()),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_raw(RawDaemonConfig::default())
    }
}

/// Reconciler loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    pub tick_interval: Duration,
    pub startup_delay: Duration,
    pub unplug_threshold: Duration,
    pub store_timeout: Duration,
    pub max_concurrent_devices: usize,
    pub debounce: Duration,
}

impl ReconcilerConfig {
    fn from_raw(raw: RawReconcilerConfig) -> Self {
        Self {
            tick_interval: raw
                .tick_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TICK_INTERVAL),
            startup_delay: raw
                .startup_delay_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_STARTUP_DELAY),
            unplug_threshold: raw
                .unplug_threshold_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_UNPLUG_THRESHOLD),
            store_timeout: raw
                .store_timeout_millis
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_STORE_TIMEOUT),
            max_concurrent_devices: raw
                .max_concurrent_devices
                .unwrap_or(DEFAULT_MAX_CONCURRENT_DEVICES),
            debounce: raw
                .debounce_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DEBOUNCE),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            startup_delay: DEFAULT_STARTUP_DELAY,
            unplug_threshold: DEFAULT_UNPLUG_THRESHOLD,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_concurrent_devices: DEFAULT_MAX_CONCURRENT_DEVICES,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}
