//! Schedule evaluation

use chrono::{DateTime, Local};
use plugwatch_api::{ControlState, Device, Schedule};
use plugwatch_util::{DaysOfWeek, PlugwatchError, Result, TimeWindow, WallClock};
use tracing::debug;

/// Parse an operator-entered schedule into a time window
pub fn parse_schedule(schedule: &Schedule) -> Result<TimeWindow> {
    let start = WallClock::parse_12h(&schedule.start_time)?;
    let end = WallClock::parse_12h(&schedule.end_time)?;
    let days = DaysOfWeek::parse_frequency(&schedule.frequency)?;

    if start == end {
        return Err(PlugwatchError::schedule(format!(
            "start and end are both '{}'",
            schedule.start_time
        )));
    }

    Ok(TimeWindow::new(days, start, end))
}

/// The device's schedule as a window, or `None` when it has no schedule or
/// the schedule does not parse
pub fn usable_window(device: &Device) -> Option<TimeWindow> {
    match parse_schedule(device.schedule.as_ref()?) {
        Ok(window) => Some(window),
        Err(e) => {
            debug!(device = %device.key, error = %e, "Unusable schedule");
            None
        }
    }
}

/// What the schedule says the relay should be at `now`.
///
/// A missing or malformed schedule yields the device's last known control
/// state, so a bad record never flips an outlet.
pub fn scheduled_state(device: &Device, now: &DateTime<Local>) -> ControlState {
    match usable_window(device) {
        Some(window) => ControlState::from_bool(window.contains(now)),
        None => device.control_state,
    }
}

/// True when the device has a valid schedule whose window has closed for the
/// day. The day mask is not consulted.
pub fn is_past_schedule_end(device: &Device, now: &DateTime<Local>) -> bool {
    usable_window(device)
        .map(|window| window.is_past_end(now))
        .unwrap_or(false)
}
