//! Partial field updates written to the telemetry store

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{
    CombinedLimitGroup, ControlState, Device, EnergyLimit, MainStatus, RootStatus, Schedule,
};

/// A set of device fields to overwrite. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_state: Option<ControlState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_status: Option<MainStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_status: Option<RootStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by_unplug: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis_timestamp: Option<i64>,

    /// `Some(None)` removes the schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Option<Schedule>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_limit: Option<EnergyLimit>,
}

impl DeviceUpdate {
    pub fn control(state: ControlState) -> Self {
        Self {
            control_state: Some(state),
            ..Default::default()
        }
    }

    pub fn main_status(status: MainStatus) -> Self {
        Self {
            main_status: Some(status),
            ..Default::default()
        }
    }

    pub fn root_status(status: RootStatus) -> Self {
        Self {
            root_status: Some(status),
            ..Default::default()
        }
    }

    pub fn unplug_flag(disabled: bool) -> Self {
        Self {
            disabled_by_unplug: Some(disabled),
            ..Default::default()
        }
    }

    pub fn basis(timestamp: i64) -> Self {
        Self {
            basis_timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    pub fn schedule(schedule: Option<Schedule>) -> Self {
        Self {
            schedule: Some(schedule),
            ..Default::default()
        }
    }

    pub fn power_limit(limit: EnergyLimit) -> Self {
        Self {
            power_limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_basis(mut self, timestamp: i64) -> Self {
        self.basis_timestamp = Some(timestamp);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }

    /// Whether this update writes the relay command
    pub fn touches_control(&self) -> bool {
        self.control_state.is_some()
    }

    /// Store field names this update writes, for logging
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.control_state.is_some() {
            names.push("controlState");
        }
        if self.main_status.is_some() {
            names.push("mainStatus");
        }
        if self.root_status.is_some() {
            names.push("rootStatus");
        }
        if self.disabled_by_unplug.is_some() {
            names.push("unplug.disabledByUnplug");
        }
        if self.basis_timestamp.is_some() {
            names.push("unplug.basisTimestamp");
        }
        if self.schedule.is_some() {
            names.push("schedule");
        }
        if self.power_limit.is_some() {
            names.push("powerLimit");
        }
        names
    }

    /// Apply to a device record in place. The unplug record is never touched
    /// by a schedule change.
    pub fn apply_to(&self, device: &mut Device) {
        if let Some(state) = self.control_state {
            device.control_state = state;
        }
        if let Some(status) = self.main_status {
            device.main_status = status;
        }
        if let Some(status) = self.root_status {
            device.root_status = status;
        }
        if let Some(disabled) = self.disabled_by_unplug {
            device.unplug.disabled_by_unplug = disabled;
        }
        if let Some(basis) = self.basis_timestamp {
            device.unplug.basis_timestamp = Some(basis);
        }
        if let Some(schedule) = &self.schedule {
            device.schedule = schedule.clone();
        }
        if let Some(limit) = self.power_limit {
            device.power_limit = limit;
        }
    }
}

/// A set of group fields to overwrite
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_keys: Option<BTreeSet<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<EnergyLimit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_control_gate: Option<ControlState>,
}

impl GroupUpdate {
    pub fn gate(state: ControlState) -> Self {
        Self {
            device_control_gate: Some(state),
            ..Default::default()
        }
    }

    /// Operator-owned fields of a group; the gate is left to the reconciler
    pub fn settings(group: &CombinedLimitGroup) -> Self {
        Self {
            enabled: Some(group.enabled),
            member_keys: Some(group.member_keys.clone()),
            limit: Some(group.limit),
            device_control_gate: None,
        }
    }

    pub fn apply_to(&self, group: &mut CombinedLimitGroup) {
        if let Some(enabled) = self.enabled {
            group.enabled = enabled;
        }
        if let Some(members) = &self.member_keys {
            group.member_keys = members.clone();
        }
        if let Some(limit) = self.limit {
            group.limit = limit;
        }
        if let Some(gate) = self.device_control_gate {
            group.device_control_gate = gate;
        }
    }
}
