//! Whole-store JSON snapshots, as exported by the outlet backend

use plugwatch_api::{CombinedLimitGroup, Device};
use plugwatch_util::{Department, DeviceKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::{StoreResult, TelemetryStore};

/// Device and group records keyed the way the store keys them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub devices: BTreeMap<String, Device>,

    #[serde(default)]
    pub groups: BTreeMap<String, CombinedLimitGroup>,
}

impl StoreSnapshot {
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Records with their keys filled in from the map keys
    pub fn into_records(self) -> (Vec<Device>, Vec<CombinedLimitGroup>) {
        let devices = self
            .devices
            .into_iter()
            .map(|(key, mut device)| {
                if device.name.is_empty() {
                    device.name = key.clone();
                }
                device.key = DeviceKey::new(key);
                device
            })
            .collect();

        let groups = self
            .groups
            .into_iter()
            .map(|(department, mut group)| {
                group.department = Department::new(department);
                group
            })
            .collect();

        (devices, groups)
    }

    /// Upsert every record into `store`. Returns (devices, groups) written.
    pub async fn import_into<S>(self, store: &S) -> StoreResult<(usize, usize)>
    where
        S: TelemetryStore + ?Sized,
    {
        let (devices, groups) = self.into_records();
        for device in &devices {
            store.upsert_device(device).await?;
        }
        for group in &groups {
            store.upsert_group(group).await?;
        }

        info!(
            devices = devices.len(),
            groups = groups.len(),
            "Snapshot imported"
        );
        Ok((devices.len(), groups.len()))
    }

    /// Read the whole store
    pub async fn export_from<S>(store: &S) -> StoreResult<Self>
    where
        S: TelemetryStore + ?Sized,
    {
        let devices = store
            .read_all_devices()
            .await?
            .into_iter()
            .map(|(key, device)| (key.as_str().to_string(), device))
            .collect();
        let groups = store
            .read_groups()
            .await?
            .into_iter()
            .map(|(dept, group)| (dept.as_str().to_string(), group))
            .collect();
        Ok(Self { devices, groups })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use plugwatch_api::{ControlState, EnergyLimit};

    const SNAPSHOT: &str = r#"{
        "devices": {
            "Lab_Printer": {
                "controlState": "on",
                "powerLimit": 2,
                "department": "Engineering"
            }
        },
        "groups": {
            "Engineering": {
                "enabled": true,
                "memberKeys": ["lab printer"],
                "limit": "No Limit"
            }
        }
    }"#;

    #[tokio::test]
    async fn test_import_fills_keys() {
        let store = MemoryStore::new();
        let counts = StoreSnapshot::from_json(SNAPSHOT)
            .unwrap()
            .import_into(&store)
            .await
            .unwrap();
        assert_eq!(counts, (1, 1));

        let printer = store.device("Lab_Printer").unwrap();
        assert_eq!(printer.name, "Lab_Printer");
        assert_eq!(printer.control_state, ControlState::On);
        assert_eq!(printer.power_limit, EnergyLimit::Bounded(2.0));

        let group = store.group("Engineering").unwrap();
        assert_eq!(group.department.as_str(), "Engineering");
        assert!(group.has_member(&printer));
    }

    #[tokio::test]
    async fn test_export_matches_store() {
        let store = MemoryStore::new();
        StoreSnapshot::from_json(SNAPSHOT)
            .unwrap()
            .import_into(&store)
            .await
            .unwrap();

        let exported = StoreSnapshot::export_from(&store).await.unwrap();
        assert_eq!(exported.devices.len(), 1);
        assert!(exported.to_json().unwrap().contains("\"No Limit\""));
    }
}
