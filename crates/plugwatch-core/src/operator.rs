//! Manual actions taken by people, each recorded in the activity log

use chrono::{DateTime, Local};
use plugwatch_api::{
    ActivityAction, ActivityEvent, CombinedLimitGroup, ControlState, Device, DeviceUpdate,
    EnergyLimit, GroupUpdate, MainStatus, RootStatus, Schedule,
};
use plugwatch_store::{ActivityLogger, StoreError, TelemetryStore};
use plugwatch_util::{DeviceKey, PlugwatchError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::{is_overridden, parse_schedule, policy_verdict, DecisionReason, Snapshot};

/// Errors returned by operator actions
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Rejected(#[from] PlugwatchError),

    #[error("Device {0} is unplugged")]
    Unplugged(DeviceKey),

    #[error("Device {key} is held off ({reason}); confirm a bypass to turn it on")]
    RequiresBypass {
        key: DeviceKey,
        reason: DecisionReason,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type OperatorResult<T> = Result<T, OperatorError>;

/// Performs manual actions against the store on behalf of `actor`
pub struct Operator<S: TelemetryStore + ActivityLogger + ?Sized> {
    store: Arc<S>,
}

impl<S: TelemetryStore + ActivityLogger + ?Sized> Operator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Switch a device on or off by hand.
    ///
    /// Turning a device on while policy holds it off is refused with
    /// `RequiresBypass`; nothing is written in that case.
    pub async fn set_control(
        &self,
        key: &DeviceKey,
        state: ControlState,
        actor: &str,
        now: DateTime<Local>,
    ) -> OperatorResult<()> {
        let snapshot = self.snapshot(now).await?;
        let device = find(&snapshot, key)?;

        if device.unplug.disabled_by_unplug {
            return Err(OperatorError::Unplugged(key.clone()));
        }

        if state.is_on() && !is_overridden(device) {
            let (reason, desired) = policy_verdict(device, &snapshot, &now);
            if desired == ControlState::Off && reason != DecisionReason::NoSchedule {
                info!(device = %key, reason = ?reason, "Manual turn-on needs a bypass");
                return Err(OperatorError::RequiresBypass {
                    key: key.clone(),
                    reason,
                });
            }
        }

        self.write_sequence(
            key,
            &[
                DeviceUpdate::control(state),
                DeviceUpdate::root_status(RootStatus::reflecting(state)),
            ],
        )
        .await?;

        let action = if state.is_on() {
            ActivityAction::TurnedOn
        } else {
            ActivityAction::TurnedOff
        };
        self.record(actor, action, device, now).await;
        Ok(())
    }

    /// Latch a manual override and switch the device on
    pub async fn confirm_bypass(
        &self,
        key: &DeviceKey,
        actor: &str,
        now: DateTime<Local>,
    ) -> OperatorResult<()> {
        let device = self.device(key).await?;
        if device.unplug.disabled_by_unplug {
            return Err(OperatorError::Unplugged(key.clone()));
        }

        self.write_sequence(
            key,
            &[
                DeviceUpdate::main_status(MainStatus::On),
                DeviceUpdate::control(ControlState::On),
                DeviceUpdate::root_status(RootStatus::On),
            ],
        )
        .await?;

        self.record(actor, ActivityAction::BypassConfirmed, &device, now)
            .await;
        Ok(())
    }

    /// Hand the device back to automatic control on the next tick
    pub async fn release_bypass(
        &self,
        key: &DeviceKey,
        actor: &str,
        now: DateTime<Local>,
    ) -> OperatorResult<()> {
        let device = self.device(key).await?;
        self.write_sequence(key, &[DeviceUpdate::main_status(MainStatus::Off)])
            .await?;
        self.record(actor, ActivityAction::BypassReleased, &device, now)
            .await;
        Ok(())
    }

    /// Validate and store a schedule
    pub async fn set_schedule(
        &self,
        key: &DeviceKey,
        schedule: Schedule,
        actor: &str,
        now: DateTime<Local>,
    ) -> OperatorResult<()> {
        parse_schedule(&schedule)?;
        let device = self.device(key).await?;
        self.write_sequence(key, &[DeviceUpdate::schedule(Some(schedule))])
            .await?;
        self.record(actor, ActivityAction::ScheduleSet, &device, now)
            .await;
        Ok(())
    }

    /// Remove the schedule; unplug bookkeeping is kept
    pub async fn remove_schedule(
        &self,
        key: &DeviceKey,
        actor: &str,
        now: DateTime<Local>,
    ) -> OperatorResult<()> {
        let device = self.device(key).await?;
        self.write_sequence(key, &[DeviceUpdate::schedule(None)])
            .await?;
        self.record(actor, ActivityAction::ScheduleRemoved, &device, now)
            .await;
        Ok(())
    }

    /// Set the individual monthly limit (kWh), or remove it
    pub async fn set_power_limit(
        &self,
        key: &DeviceKey,
        limit: EnergyLimit,
        actor: &str,
        now: DateTime<Local>,
    ) -> OperatorResult<()> {
        let device = self.device(key).await?;
        self.write_sequence(key, &[DeviceUpdate::power_limit(limit)])
            .await?;
        self.record(actor, ActivityAction::PowerLimitSet, &device, now)
            .await;
        Ok(())
    }

    /// Create or update a department's combined limit. The gate is left to
    /// the reconciler.
    pub async fn set_group(
        &self,
        group: CombinedLimitGroup,
        actor: &str,
        now: DateTime<Local>,
    ) -> OperatorResult<()> {
        let groups = self.store.read_groups().await?;
        let department = group.department.clone();

        match groups.get(&department) {
            Some(_) => {
                self.store
                    .write_group_fields(&department, &GroupUpdate::settings(&group))
                    .await?;
            }
            None => self.store.upsert_group(&group).await?,
        }

        info!(department = %department, limit = %group.limit, "Combined limit updated");
        self.log(ActivityEvent::new(
            actor,
            ActivityAction::GroupUpdated,
            department.as_str(),
            department.as_str(),
            now,
        ))
        .await;
        Ok(())
    }

    async fn snapshot(&self, now: DateTime<Local>) -> OperatorResult<Snapshot> {
        let devices = self.store.read_all_devices().await?;
        let groups = self.store.read_groups().await?;
        Ok(Snapshot::new(devices, groups, &now))
    }

    async fn device(&self, key: &DeviceKey) -> OperatorResult<Device> {
        let mut devices = self.store.read_all_devices().await?;
        devices
            .remove(key)
            .ok_or_else(|| PlugwatchError::DeviceNotFound(key.clone()).into())
    }

    async fn write_sequence(&self, key: &DeviceKey, updates: &[DeviceUpdate]) -> OperatorResult<()> {
        for update in updates {
            self.store.write_device_fields(key, update).await?;
        }
        Ok(())
    }

    async fn record(&self, actor: &str, action: ActivityAction, device: &Device, now: DateTime<Local>) {
        info!(device = %device.key, actor, %action, "Manual action");
        self.log(ActivityEvent::new(
            actor,
            action,
            device.department.as_str(),
            device.display_name(),
            now,
        ))
        .await;
    }

    async fn log(&self, event: ActivityEvent) {
        if let Err(e) = self.store.log_event(event).await {
            warn!(error = %e, "Failed to record activity event");
        }
    }
}

fn find<'a>(snapshot: &'a Snapshot, key: &DeviceKey) -> OperatorResult<&'a Device> {
    snapshot
        .devices
        .get(key)
        .ok_or_else(|| PlugwatchError::DeviceNotFound(key.clone()).into())
}
