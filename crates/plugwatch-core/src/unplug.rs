//! Unplug detection from sensor timestamp staleness

use chrono::{DateTime, Local};
use plugwatch_api::{Device, SensorTimestamp};
use plugwatch_util::DeviceKey;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// How a device's liveness marker looked this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The device reports no sensor timestamp
    Untracked,
    /// Reporting; `changed` is true when the marker moved since last tick
    Fresh { changed: bool },
    /// Marker unchanged for at least the threshold
    Stale,
}

/// Unplug status to enforce for one device this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnplugState {
    Connected,
    /// Force off/OFF/UNPLUG; covers both a new detection and a device that
    /// is still flagged
    Unplugged,
    /// Flag clears and evaluation continues
    Replugged,
}

impl UnplugState {
    pub fn resolve(flagged: bool, liveness: Liveness) -> Self {
        match (flagged, liveness) {
            (_, Liveness::Stale) => UnplugState::Unplugged,
            (true, Liveness::Fresh { changed: true }) => UnplugState::Replugged,
            (true, _) => UnplugState::Unplugged,
            (false, _) => UnplugState::Connected,
        }
    }
}

#[derive(Debug, Clone)]
struct Observation {
    last: SensorTimestamp,
    first_seen_at: DateTime<Local>,
}

/// In-memory per-device staleness tracker. Rebuilt from scratch on restart.
#[derive(Debug)]
pub struct UnplugDetector {
    threshold: Duration,
    observations: HashMap<DeviceKey, Observation>,
}

impl UnplugDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            observations: HashMap::new(),
        }
    }

    /// Record this tick's marker for `device` and classify it
    pub fn observe(&mut self, device: &Device, now: DateTime<Local>) -> Liveness {
        let Some(current) = &device.sensor_timestamp else {
            self.observations.remove(&device.key);
            return Liveness::Untracked;
        };

        match self.observations.get_mut(&device.key) {
            None => {
                self.observations.insert(
                    device.key.clone(),
                    Observation {
                        last: current.clone(),
                        first_seen_at: now,
                    },
                );
                Liveness::Fresh { changed: false }
            }
            Some(obs) if obs.last != *current => {
                obs.last = current.clone();
                obs.first_seen_at = now;
                Liveness::Fresh { changed: true }
            }
            Some(obs) => {
                let unchanged_for = now
                    .signed_duration_since(obs.first_seen_at)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if unchanged_for >= self.threshold {
                    Liveness::Stale
                } else {
                    Liveness::Fresh { changed: false }
                }
            }
        }
    }

    /// Drop state for devices that are no longer in the store
    pub fn retain(&mut self, present: &BTreeSet<DeviceKey>) {
        self.observations.retain(|key, _| present.contains(key));
    }

    pub fn tracked_count(&self) -> usize {
        self.observations.len()
    }
}
