//! Monthly energy accounting

use chrono::{DateTime, Local};
use plugwatch_api::{CombinedLimitGroup, Device, EnergyLimit};
use plugwatch_util::{day_key, days_of_month};

/// Daily logs are kW-scale; limits are compared in Wh
pub const KW_TO_WH: f64 = 1000.0;

/// Energy a device logged during the calendar month containing `now`, in Wh.
///
/// Missing days count as zero; negative or non-finite entries are ignored.
pub fn monthly_energy_wh(device: &Device, now: &DateTime<Local>) -> f64 {
    let total: f64 = days_of_month(now)
        .into_iter()
        .filter_map(|day| device.daily_logs.get(&day_key(day)))
        .filter_map(|log| log.total_energy)
        .filter(|energy| energy.is_finite() && *energy >= 0.0)
        .sum();
    total * KW_TO_WH
}

/// Combined monthly energy of several devices, in Wh
pub fn combined_energy_wh<'a>(
    devices: impl IntoIterator<Item = &'a Device>,
    now: &DateTime<Local>,
) -> f64 {
    devices
        .into_iter()
        .map(|device| monthly_energy_wh(device, now))
        .sum()
}

/// The device's own limit converted to Wh
pub fn individual_limit_wh(device: &Device) -> EnergyLimit {
    device.power_limit.scaled(KW_TO_WH)
}

/// Whether the device has used up its own monthly limit
pub fn individual_limit_reached(device: &Device, now: &DateTime<Local>) -> bool {
    individual_limit_wh(device).is_reached_by(monthly_energy_wh(device, now))
}

/// Devices in `devices` that count toward `group`
pub fn group_members<'a>(
    group: &'a CombinedLimitGroup,
    devices: impl IntoIterator<Item = &'a Device> + 'a,
) -> impl Iterator<Item = &'a Device> + 'a {
    devices.into_iter().filter(move |device| {
        group.department.matches(&device.department) && group.has_member(device)
    })
}

/// Whether the group's members have together used up the group limit
pub fn group_limit_reached<'a>(
    group: &'a CombinedLimitGroup,
    devices: impl IntoIterator<Item = &'a Device> + 'a,
    now: &DateTime<Local>,
) -> bool {
    group
        .limit
        .is_reached_by(combined_energy_wh(group_members(group, devices), now))
}
