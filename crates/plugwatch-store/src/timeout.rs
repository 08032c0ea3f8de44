//! Per-call deadline for store access

use async_trait::async_trait;
use plugwatch_api::{ActivityEvent, CombinedLimitGroup, Device, DeviceUpdate, GroupUpdate};
use plugwatch_util::{Department, DeviceKey};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::{ActivityLogger, DeviceMap, GroupMap, StoreError, StoreResult, TelemetryStore};

/// Wraps a store so that every call fails with `StoreError::Timeout` once the
/// deadline passes. A timeout is reported like any other I/O failure.
pub struct TimedStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?self.timeout, "Store call timed out");
                Err(StoreError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<S: TelemetryStore> TelemetryStore for TimedStore<S> {
    async fn read_all_devices(&self) -> StoreResult<DeviceMap> {
        self.bounded("read_all_devices", self.inner.read_all_devices())
            .await
    }

    async fn read_groups(&self) -> StoreResult<GroupMap> {
        self.bounded("read_groups", self.inner.read_groups()).await
    }

    async fn write_device_fields(
        &self,
        key: &DeviceKey,
        update: &DeviceUpdate,
    ) -> StoreResult<()> {
        self.bounded(
            "write_device_fields",
            self.inner.write_device_fields(key, update),
        )
        .await
    }

    async fn write_group_fields(
        &self,
        department: &Department,
        update: &GroupUpdate,
    ) -> StoreResult<()> {
        self.bounded(
            "write_group_fields",
            self.inner.write_group_fields(department, update),
        )
        .await
    }

    async fn upsert_device(&self, device: &Device) -> StoreResult<()> {
        self.bounded("upsert_device", self.inner.upsert_device(device))
            .await
    }

    async fn upsert_group(&self, group: &CombinedLimitGroup) -> StoreResult<()> {
        self.bounded("upsert_group", self.inner.upsert_group(group))
            .await
    }
}

#[async_trait]
impl<S: ActivityLogger> ActivityLogger for TimedStore<S> {
    async fn log_event(&self, event: ActivityEvent) -> StoreResult<()> {
        self.bounded("log_event", self.inner.log_event(event)).await
    }

    async fn recent_events(&self, limit: usize) -> StoreResult<Vec<ActivityEvent>> {
        self.bounded("recent_events", self.inner.recent_events(limit))
            .await
    }
}
