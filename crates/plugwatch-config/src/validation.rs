//! Configuration validation

use crate::schema::{RawConfig, RawReconcilerConfig};
use crate::settings::{DEFAULT_DEBOUNCE, DEFAULT_TICK_INTERVAL};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("reconciler.{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("reconciler.debounce_seconds ({debounce}s) must be shorter than tick_interval_seconds ({tick}s)")]
    DebounceTooLong { debounce: u64, tick: u64 },

    #[error("reconciler.store_timeout_millis ({timeout_ms}ms) must be shorter than the tick interval ({tick}s)")]
    TimeoutTooLong { timeout_ms: u64, tick: u64 },

    #[error("daemon.log_level must not be empty")]
    EmptyLogLevel,
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_reconciler(&config.reconciler);

    if let Some(level) = &config.daemon.log_level {
        if level.trim().is_empty() {
            errors.push(ValidationError::EmptyLogLevel);
        }
    }

    errors
}

fn validate_reconciler(raw: &RawReconcilerConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let positive = [
        ("tick_interval_seconds", raw.tick_interval_seconds),
        ("unplug_threshold_seconds", raw.unplug_threshold_seconds),
        ("store_timeout_millis", raw.store_timeout_millis),
        ("max_concurrent_devices", raw.max_concurrent_devices.map(|n| n as u64)),
    ];
    for (field, value) in positive {
        if value == Some(0) {
            errors.push(ValidationError::ZeroValue { field });
        }
    }

    let tick = raw
        .tick_interval_seconds
        .unwrap_or(DEFAULT_TICK_INTERVAL.as_secs());
    let debounce = raw.debounce_seconds.unwrap_or(DEFAULT_DEBOUNCE.as_secs());

    // A device must be able to converge within one tick
    if tick > 0 && debounce >= tick {
        errors.push(ValidationError::DebounceTooLong { debounce, tick });
    }

    if let Some(timeout_ms) = raw.store_timeout_millis {
        if tick > 0 && timeout_ms >= tick * 1000 {
            errors.push(ValidationError::TimeoutTooLong { timeout_ms, tick });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawDaemonConfig;

    fn config_with(reconciler: RawReconcilerConfig) -> RawConfig {
        RawConfig {
            config_version: 1,
            daemon: RawDaemonConfig::default(),
            reconciler,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&config_with(RawReconcilerConfig::default())).is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let errors = validate_config(&config_with(RawReconcilerConfig {
            tick_interval_seconds: Some(0),
            max_concurrent_devices: Some(0),
            ..Default::default()
        }));

        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ZeroValue { field: "tick_interval_seconds" }
        )));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::ZeroValue { field: "max_concurrent_devices" }
        )));
    }

    #[test]
    fn debounce_must_fit_in_tick() {
        let errors = validate_config(&config_with(RawReconcilerConfig {
            tick_interval_seconds: Some(5),
            debounce_seconds: Some(5),
            ..Default::default()
        }));
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::DebounceTooLong { debounce: 5, tick: 5 }]
        ));
    }

    #[test]
    fn store_timeout_must_fit_in_tick() {
        let errors = validate_config(&config_with(RawReconcilerConfig {
            store_timeout_millis: Some(10_000),
            ..Default::default()
        }));
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::TimeoutTooLong { timeout_ms: 10_000, tick: 10 }]
        ));
    }
}
