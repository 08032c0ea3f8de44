//! Strongly-typed identifiers for plugwatch

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique key of a device in the telemetry store.
///
/// Keys are derived from the device's display name: surrounding whitespace is
/// trimmed and inner whitespace runs become a single underscore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the store key from a display name ("Lab Printer" -> "Lab_Printer")
    pub fn from_display_name(name: &str) -> Self {
        Self(name.split_whitespace().collect::<Vec<_>>().join("_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Form used when comparing against group member lists
    pub fn normalized(&self) -> String {
        normalize_member_name(&self.0)
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Normalize a device or member name for group matching.
///
/// Underscores and spaces are interchangeable and comparison is
/// case-insensitive, so `"Lab_Printer"`, `"lab printer"` and `" LAB  printer "`
/// all normalize to `"lab printer"`.
pub fn normalize_member_name(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Department (office) name scoping a combined limit group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Department(String);

impl Department {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Departments match ignoring case and surrounding whitespace
    pub fn matches(&self, other: &str) -> bool {
        self.0.trim().eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Department {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Department {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of one reconciler pass, attached to tracing spans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TickId(Uuid);

impl TickId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TickId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
