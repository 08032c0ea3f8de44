//! Device and group records as stored in the telemetry store

use plugwatch_util::{normalize_member_name, Department, DeviceKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::NO_LIMIT;

/// Relay command for an outlet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    On,
    #[default]
    Off,
}

impl ControlState {
    pub fn is_on(self) -> bool {
        self == ControlState::On
    }

    pub fn from_bool(on: bool) -> Self {
        if on { ControlState::On } else { ControlState::Off }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::On => write!(f, "on"),
            ControlState::Off => write!(f, "off"),
        }
    }
}

/// Manual override latch. `On` means a human bypassed automatic control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MainStatus {
    On,
    #[default]
    Off,
}

impl fmt::Display for MainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MainStatus::On => write!(f, "ON"),
            MainStatus::Off => write!(f, "OFF"),
        }
    }
}

/// Display status shown for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RootStatus {
    On,
    #[default]
    Off,
    Unplug,
    Idle,
}

impl RootStatus {
    /// Status that mirrors a relay state
    pub fn reflecting(control: ControlState) -> Self {
        match control {
            ControlState::On => RootStatus::On,
            ControlState::Off => RootStatus::Off,
        }
    }
}

impl fmt::Display for RootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RootStatus::On => "ON",
            RootStatus::Off => "OFF",
            RootStatus::Unplug => "UNPLUG",
            RootStatus::Idle => "IDLE",
        };
        write!(f, "{}", s)
    }
}

/// An energy ceiling, or the absence of one.
///
/// Encoded as a plain number or the string `"No Limit"`. Numeric strings are
/// accepted when decoding; negative or non-finite values decode as unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EnergyLimit {
    Bounded(f64),
    #[default]
    Unbounded,
}

impl EnergyLimit {
    pub fn bounded(value: f64) -> Self {
        if value.is_finite() && value >= 0.0 {
            EnergyLimit::Bounded(value)
        } else {
            EnergyLimit::Unbounded
        }
    }

    /// True when `consumed` meets or exceeds the limit. Never true for
    /// `Unbounded`.
    pub fn is_reached_by(&self, consumed: f64) -> bool {
        match self {
            EnergyLimit::Bounded(limit) => consumed >= *limit,
            EnergyLimit::Unbounded => false,
        }
    }

    /// Multiply a bounded value, e.g. to convert kWh into Wh
    pub fn scaled(&self, factor: f64) -> Self {
        match self {
            EnergyLimit::Bounded(limit) => EnergyLimit::Bounded(limit * factor),
            EnergyLimit::Unbounded => EnergyLimit::Unbounded,
        }
    }

    fn parse_text(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case(NO_LIMIT) || trimmed.is_empty() {
            return EnergyLimit::Unbounded;
        }
        trimmed
            .parse::<f64>()
            .map(EnergyLimit::bounded)
            .unwrap_or(EnergyLimit::Unbounded)
    }
}

impl fmt::Display for EnergyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyLimit::Bounded(v) => write!(f, "{}", v),
            EnergyLimit::Unbounded => write!(f, "{}", NO_LIMIT),
        }
    }
}

impl Serialize for EnergyLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EnergyLimit::Bounded(v) => serializer.serialize_f64(*v),
            EnergyLimit::Unbounded => serializer.serialize_str(NO_LIMIT),
        }
    }
}

impl<'de> Deserialize<'de> for EnergyLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
            Null(()),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(v) => EnergyLimit::bounded(v),
            Raw::Text(s) => EnergyLimit::parse_text(&s),
            Raw::Null(()) => EnergyLimit::Unbounded,
        })
    }
}

/// Operator-entered schedule, kept as the raw strings the operator typed.
///
/// Parsing happens at evaluation time so that a corrupt record can fall back
/// to the device's last known state instead of failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// 12-hour start time, e.g. `"8:00 AM"`
    #[serde(default)]
    pub start_time: String,
    /// 12-hour end time (exclusive), e.g. `"5:30 PM"`
    #[serde(default)]
    pub end_time: String,
    /// `daily`, `weekdays`, `weekends` or a comma-separated day list
    #[serde(default)]
    pub frequency: String,
}

impl Schedule {
    pub fn new(
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        frequency: impl Into<String>,
    ) -> Self {
        Self {
            start_time: start_time.into(),
            end_time: end_time.into(),
            frequency: frequency.into(),
        }
    }
}

/// Unplug detection bookkeeping, stored beside (not inside) the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UnplugRecord {
    #[serde(default)]
    pub disabled_by_unplug: bool,
    /// Millisecond epoch at which detection state was first established
    #[serde(default)]
    pub basis_timestamp: Option<i64>,
}

/// Energy logged for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    /// kW-scale energy accumulated that day; `None` if missing or unreadable
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_energy: Option<f64>,
}

impl DailyLog {
    pub fn new(total_energy: f64) -> Self {
        Self {
            total_energy: Some(total_energy),
        }
    }
}

/// Accepts numbers, numeric strings and null; anything else becomes `None`
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Opaque liveness marker reported by the outlet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SensorTimestamp(String);

impl SensorTimestamp {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for SensorTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) => Ok(SensorTimestamp(s)),
            serde_json::Value::Number(n) => Ok(SensorTimestamp(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "sensor timestamp must be a string or number, got {}",
                other
            ))),
        }
    }
}

/// A networked outlet as seen in one store snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Filled from the store key when absent in the document
    #[serde(default = "empty_key")]
    pub key: DeviceKey,

    /// Display name; defaults to the key
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub control_state: ControlState,

    #[serde(default)]
    pub main_status: MainStatus,

    #[serde(default)]
    pub root_status: RootStatus,

    #[serde(default)]
    pub schedule: Option<Schedule>,

    #[serde(default)]
    pub unplug: UnplugRecord,

    /// kWh-scale individual monthly limit
    #[serde(default)]
    pub power_limit: EnergyLimit,

    #[serde(default)]
    pub daily_logs: BTreeMap<String, DailyLog>,

    #[serde(default)]
    pub sensor_timestamp: Option<SensorTimestamp>,

    #[serde(default)]
    pub department: String,
}

fn empty_key() -> DeviceKey {
    DeviceKey::new("")
}

impl Device {
    /// A new, switched-off device with no schedule and no limit
    pub fn new(name: impl Into<String>, department: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: DeviceKey::from_display_name(&name),
            name,
            control_state: ControlState::Off,
            main_status: MainStatus::Off,
            root_status: RootStatus::Off,
            schedule: None,
            unplug: UnplugRecord::default(),
            power_limit: EnergyLimit::Unbounded,
            daily_logs: BTreeMap::new(),
            sensor_timestamp: None,
            department: department.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.key.as_str()
        } else {
            &self.name
        }
    }

    /// Names under which group member lists may refer to this device
    pub fn member_aliases(&self) -> [String; 2] {
        [self.key.normalized(), normalize_member_name(self.display_name())]
    }
}

/// Shared monthly limit across several devices of one department
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedLimitGroup {
    #[serde(default = "empty_department")]
    pub department: Department,

    #[serde(default)]
    pub enabled: bool,

    /// Member names as entered; compared after normalization
    #[serde(default)]
    pub member_keys: BTreeSet<String>,

    /// Wh-scale monthly limit
    #[serde(default)]
    pub limit: EnergyLimit,

    /// Reconciler-owned cached verdict; never operator input
    #[serde(default = "default_gate")]
    pub device_control_gate: ControlState,
}

fn empty_department() -> Department {
    Department::new("")
}

fn default_gate() -> ControlState {
    ControlState::On
}

impl CombinedLimitGroup {
    pub fn new(department: impl Into<Department>, limit: EnergyLimit) -> Self {
        Self {
            department: department.into(),
            enabled: true,
            member_keys: BTreeSet::new(),
            limit,
            device_control_gate: ControlState::On,
        }
    }

    pub fn with_member(mut self, name: impl Into<String>) -> Self {
        self.member_keys.insert(name.into());
        self
    }

    /// Normalized member names
    pub fn normalized_members(&self) -> BTreeSet<String> {
        self.member_keys
            .iter()
            .map(|m| normalize_member_name(m))
            .filter(|m| !m.is_empty())
            .collect()
    }

    pub fn has_member(&self, device: &Device) -> bool {
        let members = self.normalized_members();
        device.member_aliases().iter().any(|alias| members.contains(alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_limit_decodes_numbers_and_sentinel() {
        let bounded: EnergyLimit = serde_json::from_str("2").unwrap();
        assert_eq!(bounded, EnergyLimit::Bounded(2.0));

        let text: EnergyLimit = serde_json::from_str("\"2.5\"").unwrap();
        assert_eq!(text, EnergyLimit::Bounded(2.5));

        let sentinel: EnergyLimit = serde_json::from_str("\"No Limit\"").unwrap();
        assert_eq!(sentinel, EnergyLimit::Unbounded);

        let lower: EnergyLimit = serde_json::from_str("\"no limit\"").unwrap();
        assert_eq!(lower, EnergyLimit::Unbounded);

        let negative: EnergyLimit = serde_json::from_str("-4").unwrap();
        assert_eq!(negative, EnergyLimit::Unbounded);

        let null: EnergyLimit = serde_json::from_str("null").unwrap();
        assert_eq!(null, EnergyLimit::Unbounded);
    }

    #[test]
    fn energy_limit_encodes_sentinel_as_string() {
        assert_eq!(serde_json::to_string(&EnergyLimit::Unbounded).unwrap(), "\"No Limit\"");
        assert_eq!(serde_json::to_string(&EnergyLimit::Bounded(500.0)).unwrap(), "500.0");
    }

    #[test]
    fn unbounded_limit_is_never_reached() {
        assert!(!EnergyLimit::Unbounded.is_reached_by(f64::MAX));
        assert!(!EnergyLimit::Unbounded.is_reached_by(f64::INFINITY));
        assert!(EnergyLimit::Bounded(2.0).is_reached_by(2.0));
        assert!(!EnergyLimit::Bounded(2.0).is_reached_by(1.999));
        assert_eq!(EnergyLimit::Bounded(2.0).scaled(1000.0), EnergyLimit::Bounded(2000.0));
    }

    #[test]
    fn device_decodes_store_document() {
        let json = r#"{
            "name": "Lab Printer",
            "controlState": "on",
            "mainStatus": "OFF",
            "rootStatus": "IDLE",
            "schedule": { "startTime": "8:00 AM", "endTime": "5:00 PM", "frequency": "weekdays" },
            "unplug": { "disabledByUnplug": false, "basisTimestamp": 1717000000000 },
            "powerLimit": "No Limit",
            "dailyLogs": {
                "2025-06-01": { "totalEnergy": 0.25 },
                "2025-06-02": { "totalEnergy": "0.5" },
                "2025-06-03": { "totalEnergy": "garbage" }
            },
            "sensorTimestamp": 1717000012345,
            "department": "Engineering"
        }"#;

        let device: Device = serde_json::from_str(json).unwrap();
        assert_eq!(device.control_state, ControlState::On);
        assert_eq!(device.root_status, RootStatus::Idle);
        assert_eq!(device.power_limit, EnergyLimit::Unbounded);
        assert_eq!(device.unplug.basis_timestamp, Some(1717000000000));
        assert_eq!(device.daily_logs["2025-06-02"].total_energy, Some(0.5));
        assert_eq!(device.daily_logs["2025-06-03"].total_energy, None);
        assert_eq!(
            device.sensor_timestamp,
            Some(SensorTimestamp::new("1717000012345"))
        );
    }

    #[test]
    fn group_membership_uses_normalized_names() {
        let group = CombinedLimitGroup::new("Engineering", EnergyLimit::Bounded(500.0))
            .with_member("lab printer")
            .with_member("Coffee_Maker");

        let printer = Device::new("Lab Printer", "Engineering");
        let coffee = Device::new("coffee maker", "Engineering");
        let kettle = Device::new("Kettle", "Engineering");

        assert!(group.has_member(&printer));
        assert!(group.has_member(&coffee));
        assert!(!group.has_member(&kettle));
    }

    #[test]
    fn group_gate_defaults_to_on() {
        let group: CombinedLimitGroup =
            serde_json::from_str(r#"{ "department": "Ops", "enabled": true, "limit": 100 }"#)
                .unwrap();
        assert_eq!(group.device_control_gate, ControlState::On);
        assert!(group.member_keys.is_empty());
    }
}
