//! Store trait definitions

use async_trait::async_trait;
use plugwatch_api::{ActivityEvent, CombinedLimitGroup, Device, DeviceUpdate, GroupUpdate};
use plugwatch_util::{Department, DeviceKey};
use std::collections::BTreeMap;

use crate::StoreResult;

/// All device records, keyed by device key
pub type DeviceMap = BTreeMap<DeviceKey, Device>;

/// All combined-limit group configs, keyed by department
pub type GroupMap = BTreeMap<Department, CombinedLimitGroup>;

/// Key/value telemetry store shared with the outlets and other operators
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    // Snapshots

    /// Read every device record. Undecodable records are skipped.
    async fn read_all_devices(&self) -> StoreResult<DeviceMap>;

    /// Read every combined-limit group. An empty map means no group settings.
    async fn read_groups(&self) -> StoreResult<GroupMap>;

    // Field-level writes

    /// Overwrite the given fields of one device
    async fn write_device_fields(&self, key: &DeviceKey, update: &DeviceUpdate)
    -> StoreResult<()>;

    /// Overwrite the given fields of one group
    async fn write_group_fields(
        &self,
        department: &Department,
        update: &GroupUpdate,
    ) -> StoreResult<()>;

    // Record management (operator and import paths)

    /// Insert or replace a whole device record
    async fn upsert_device(&self, device: &Device) -> StoreResult<()>;

    /// Insert or replace a whole group record
    async fn upsert_group(&self, group: &CombinedLimitGroup) -> StoreResult<()>;
}

/// Append-only log of manual actions
#[async_trait]
pub trait ActivityLogger: Send + Sync {
    /// Record one manual action
    async fn log_event(&self, event: ActivityEvent) -> StoreResult<()>;

    /// Most recent events, newest first
    async fn recent_events(&self, limit: usize) -> StoreResult<Vec<ActivityEvent>>;
}
