//! Per-device action debouncing

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::time::Duration;

use crate::DeviceKey;

/// Last-action timestamp map used to hold back repeated automatic writes.
///
/// After an action is recorded for a device, further actions for that device
/// are reported as unsettled until `window` has elapsed.
#[derive(Debug)]
pub struct ActionDebouncer {
    window: Duration,
    last_action: HashMap<DeviceKey, DateTime<Local>>,
}

impl ActionDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_action: HashMap::new(),
        }
    }

    /// Returns `true` if no action was recorded for `key` within the window
    pub fn is_settled(&self, key: &DeviceKey, now: DateTime<Local>) -> bool {
        match self.last_action.get(key) {
            Some(last) => {
                let elapsed = now.signed_duration_since(*last);
                // A clock stepping backwards counts as settled
                elapsed < chrono::Duration::zero()
                    || elapsed.to_std().map(|e| e >= self.window).unwrap_or(true)
            }
            None => true,
        }
    }

    /// Record that an action was taken for `key` at `now`
    pub fn record(&mut self, key: &DeviceKey, now: DateTime<Local>) {
        self.last_action.insert(key.clone(), now);
    }

    /// Drop entries whose last action is older than the window
    pub fn cleanup(&mut self, now: DateTime<Local>) {
        let window = self.window;
        self.last_action.retain(|_, last| {
            now.signed_duration_since(*last)
                .to_std()
                .map(|elapsed| elapsed < window)
                .unwrap_or(true)
        });
    }

    pub fn len(&self) -> usize {
        self.last_action.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_action.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs as i64)
    }

    #[test]
    fn test_debouncer_holds_within_window() {
        let mut debouncer = ActionDebouncer::new(Duration::from_secs(5));
        let key = DeviceKey::new("Kettle");

        assert!(debouncer.is_settled(&key, at(0)));
        debouncer.record(&key, at(0));
        assert!(!debouncer.is_settled(&key, at(4)));
        assert!(debouncer.is_settled(&key, at(5)));
    }

    #[test]
    fn test_debouncer_devices_are_independent() {
        let mut debouncer = ActionDebouncer::new(Duration::from_secs(5));
        let kettle = DeviceKey::new("Kettle");
        let printer = DeviceKey::new("Printer");

        debouncer.record(&kettle, at(0));
        assert!(!debouncer.is_settled(&kettle, at(1)));
        assert!(debouncer.is_settled(&printer, at(1)));
    }

    #[test]
    fn test_debouncer_cleanup() {
        let mut debouncer = ActionDebouncer::new(Duration::from_secs(5));
        debouncer.record(&DeviceKey::new("Kettle"), at(0));
        debouncer.record(&DeviceKey::new("Printer"), at(4));

        debouncer.cleanup(at(6));
        assert_eq!(debouncer.len(), 1);

        debouncer.cleanup(at(20));
        assert!(debouncer.is_empty());
    }
}
