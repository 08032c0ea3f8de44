//! In-memory store for testing, with write recording and fault injection

use async_trait::async_trait;
use plugwatch_api::{
    ActivityEvent, CombinedLimitGroup, DailyLog, Device, DeviceUpdate, GroupUpdate,
    SensorTimestamp,
};
use plugwatch_util::{Department, DeviceKey};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{ActivityLogger, DeviceMap, GroupMap, StoreError, StoreResult, TelemetryStore};

/// A field-level write accepted by the store, in the order it was applied
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedWrite {
    Device { key: DeviceKey, update: DeviceUpdate },
    Group { department: Department, update: GroupUpdate },
}

#[derive(Debug, Default)]
struct MemoryState {
    devices: DeviceMap,
    groups: GroupMap,
    events: Vec<ActivityEvent>,
    writes: Vec<RecordedWrite>,
}

/// In-memory store for unit/integration testing
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,

    /// Configure `read_all_devices` to fail
    pub fail_device_reads: Arc<Mutex<bool>>,

    /// Configure `read_groups` to fail
    pub fail_group_reads: Arc<Mutex<bool>>,

    /// Devices whose every field write fails
    pub fail_device_writes: Arc<Mutex<BTreeSet<DeviceKey>>>,

    /// (device, field name) pairs whose writes fail, e.g. `"mainStatus"`
    pub fail_fields: Arc<Mutex<BTreeSet<(DeviceKey, &'static str)>>>,

    /// Artificial latency added to every call
    pub delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            fail_device_reads: Arc::new(Mutex::new(false)),
            fail_group_reads: Arc::new(Mutex::new(false)),
            fail_device_writes: Arc::new(Mutex::new(BTreeSet::new())),
            fail_fields: Arc::new(Mutex::new(BTreeSet::new())),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_device(self, device: Device) -> Self {
        self.insert_device(device);
        self
    }

    pub fn with_group(self, group: CombinedLimitGroup) -> Self {
        self.insert_group(group);
        self
    }

    pub fn insert_device(&self, device: Device) {
        let mut state = self.state.lock().unwrap();
        state.devices.insert(device.key.clone(), device);
    }

    pub fn insert_group(&self, group: CombinedLimitGroup) {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(group.department.clone(), group);
    }

    pub fn device(&self, key: impl Into<DeviceKey>) -> Option<Device> {
        self.state.lock().unwrap().devices.get(&key.into()).cloned()
    }

    pub fn group(&self, department: impl Into<Department>) -> Option<CombinedLimitGroup> {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(&department.into())
            .cloned()
    }

    /// Simulate the outlet reporting a new liveness marker
    pub fn set_sensor_timestamp(&self, key: impl Into<DeviceKey>, timestamp: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state.devices.get_mut(&key.into()) {
            device.sensor_timestamp = Some(SensorTimestamp::new(timestamp));
        }
    }

    /// Simulate the outlet logging energy for a day (`YYYY-MM-DD`)
    pub fn set_daily_energy(&self, key: impl Into<DeviceKey>, day: &str, total_energy: f64) {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state.devices.get_mut(&key.into()) {
            device
                .daily_logs
                .insert(day.to_string(), DailyLog::new(total_energy));
        }
    }

    /// Every write accepted so far
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Device writes accepted for one device
    pub fn device_writes(&self, key: impl Into<DeviceKey>) -> Vec<DeviceUpdate> {
        let key = key.into();
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter_map(|w| match w {
                RecordedWrite::Device { key: k, update } if *k == key => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn events(&self) -> Vec<ActivityEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_device_reads.lock().unwrap() = fail;
    }

    pub fn set_fail_group_reads(&self, fail: bool) {
        *self.fail_group_reads.lock().unwrap() = fail;
    }

    pub fn fail_writes_for(&self, key: impl Into<DeviceKey>) {
        self.fail_device_writes.lock().unwrap().insert(key.into());
    }

    pub fn fail_field(&self, key: impl Into<DeviceKey>, field: &'static str) {
        self.fail_fields.lock().unwrap().insert((key.into(), field));
    }

    pub fn clear_faults(&self) {
        *self.fail_device_reads.lock().unwrap() = false;
        *self.fail_group_reads.lock().unwrap() = false;
        self.fail_device_writes.lock().unwrap().clear();
        self.fail_fields.lock().unwrap().clear();
        *self.delay.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_device_write(&self, key: &DeviceKey, update: &DeviceUpdate) -> StoreResult<()> {
        if self.fail_device_writes.lock().unwrap().contains(key) {
            return Err(StoreError::Unavailable(format!("mock write failure for {}", key)));
        }

        let fail_fields = self.fail_fields.lock().unwrap();
        if let Some(field) = update
            .field_names()
            .into_iter()
            .find(|f| fail_fields.contains(&(key.clone(), *f)))
        {
            return Err(StoreError::Unavailable(format!(
                "mock write failure for {}.{}",
                key, field
            )));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn read_all_devices(&self) -> StoreResult<DeviceMap> {
        self.simulate_latency().await;
        if *self.fail_device_reads.lock().unwrap() {
            return Err(StoreError::Unavailable("mock device read failure".into()));
        }
        Ok(self.state.lock().unwrap().devices.clone())
    }

    async fn read_groups(&self) -> StoreResult<GroupMap> {
        self.simulate_latency().await;
        if *self.fail_group_reads.lock().unwrap() {
            return Err(StoreError::Unavailable("mock group read failure".into()));
        }
        Ok(self.state.lock().unwrap().groups.clone())
    }

    async fn write_device_fields(
        &self,
        key: &DeviceKey,
        update: &DeviceUpdate,
    ) -> StoreResult<()> {
        self.simulate_latency().await;
        self.check_device_write(key, update)?;

        let mut state = self.state.lock().unwrap();
        let device = state
            .devices
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        update.apply_to(device);
        state.writes.push(RecordedWrite::Device {
            key: key.clone(),
            update: update.clone(),
        });
        Ok(())
    }

    async fn write_group_fields(
        &self,
        department: &Department,
        update: &GroupUpdate,
    ) -> StoreResult<()> {
        self.simulate_latency().await;

        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(department)
            .ok_or_else(|| StoreError::NotFound(department.to_string()))?;
        update.apply_to(group);
        state.writes.push(RecordedWrite::Group {
            department: department.clone(),
            update: update.clone(),
        });
        Ok(())
    }

    async fn upsert_device(&self, device: &Device) -> StoreResult<()> {
        self.simulate_latency().await;
        self.insert_device(device.clone());
        Ok(())
    }

    async fn upsert_group(&self, group: &CombinedLimitGroup) -> StoreResult<()> {
        self.simulate_latency().await;
        self.insert_group(group.clone());
        Ok(())
    }
}

#[async_trait]
impl ActivityLogger for MemoryStore {
    async fn log_event(&self, event: ActivityEvent) -> StoreResult<()> {
        self.simulate_latency().await;
        self.state.lock().unwrap().events.push(event);
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> StoreResult<Vec<ActivityEvent>> {
        let state = self.state.lock().unwrap();
        Ok(state.events.iter().rev().take(limit).cloned().collect())
    }
}
