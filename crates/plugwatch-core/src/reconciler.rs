//! Policy reconciler: per-device precedence and diff-only writes

use chrono::{DateTime, Local};
use plugwatch_api::{
    CombinedLimitGroup, ControlState, Device, DeviceUpdate, GroupUpdate, MainStatus, RootStatus,
};
use plugwatch_config::ReconcilerConfig;
use plugwatch_store::{DeviceMap, GroupMap, TelemetryStore};
use plugwatch_util::{ActionDebouncer, Department, DeviceKey, TickId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    group_limit_reached, individual_limit_reached, is_overridden, is_past_schedule_end,
    usable_window, DecisionReason, DeviceOutcome, Liveness, OutcomeStatus, TickReport,
    UnplugDetector, UnplugState,
};

/// One tick's view of the store, discarded after use
#[derive(Debug)]
pub struct Snapshot {
    pub devices: DeviceMap,
    pub groups: GroupMap,
    group_reached: BTreeMap<Department, bool>,
}

impl Snapshot {
    /// Evaluate every enabled group's limit against live energy totals
    pub fn new(devices: DeviceMap, groups: GroupMap, now: &DateTime<Local>) -> Self {
        let group_reached = groups
            .iter()
            .filter(|(_, group)| group.enabled)
            .map(|(dept, group)| {
                (
                    dept.clone(),
                    group_limit_reached(group, devices.values(), now),
                )
            })
            .collect();

        Self {
            devices,
            groups,
            group_reached,
        }
    }

    /// The enabled group that lists this device, if any
    pub fn group_for(&self, device: &Device) -> Option<&CombinedLimitGroup> {
        self.groups.values().find(|group| {
            group.enabled && group.department.matches(&device.department) && group.has_member(device)
        })
    }

    pub fn group_limit_reached(&self, department: &Department) -> bool {
        self.group_reached.get(department).copied().unwrap_or(false)
    }

    /// Gate values that differ from what the store holds
    pub fn stale_gates(&self) -> Vec<(Department, ControlState)> {
        self.group_reached
            .iter()
            .filter_map(|(dept, reached)| {
                let gate = ControlState::from_bool(!reached);
                let group = self.groups.get(dept)?;
                (group.device_control_gate != gate).then(|| (dept.clone(), gate))
            })
            .collect()
    }
}

/// Policy for a device that is neither unplugged nor overridden: schedule
/// cutoff, then the group or individual limit, then the schedule window.
///
/// Returns the deciding rule and the control state it asks for.
pub fn policy_verdict(
    device: &Device,
    snapshot: &Snapshot,
    now: &DateTime<Local>,
) -> (DecisionReason, ControlState) {
    if is_past_schedule_end(device, now) {
        return (DecisionReason::ScheduleEnded, ControlState::Off);
    }

    // A grouped device answers to the group limit only
    if let Some(group) = snapshot.group_for(device) {
        if snapshot.group_limit_reached(&group.department) {
            return (DecisionReason::GroupLimitReached, ControlState::Off);
        }
    } else if individual_limit_reached(device, now) {
        return (DecisionReason::IndividualLimitReached, ControlState::Off);
    }

    match usable_window(device) {
        Some(window) => (
            DecisionReason::Schedule,
            ControlState::from_bool(window.contains(now)),
        ),
        None => (DecisionReason::NoSchedule, device.control_state),
    }
}

/// Relay, override latch and display status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceState {
    pub control: ControlState,
    pub main: MainStatus,
    pub root: RootStatus,
}

impl DeviceState {
    pub fn of(device: &Device) -> Self {
        Self {
            control: device.control_state,
            main: device.main_status,
            root: device.root_status,
        }
    }

    fn unplugged() -> Self {
        Self {
            control: ControlState::Off,
            main: MainStatus::Off,
            root: RootStatus::Unplug,
        }
    }
}

/// Outcome of the pure decision function for one device
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub reason: DecisionReason,
    /// Unplug flag / basis changes, written before anything else
    pub bookkeeping: DeviceUpdate,
    /// State after unplug bookkeeping, before policy
    pub baseline: DeviceState,
    pub target: DeviceState,
}

impl Decision {
    pub fn changes_control(&self, device: &Device) -> bool {
        self.target.control != device.control_state
    }

    /// Drop the policy part of the decision, keeping unplug bookkeeping
    pub fn hold(&mut self) {
        self.target = self.baseline;
    }

    /// Field writes in the order they must be applied: bookkeeping, then
    /// `controlState`, `mainStatus`, `rootStatus`. Only differing fields.
    pub fn writes(&self, device: &Device) -> Vec<DeviceUpdate> {
        let mut writes = Vec::new();
        if !self.bookkeeping.is_empty() {
            writes.push(self.bookkeeping.clone());
        }
        if self.target.control != device.control_state {
            writes.push(DeviceUpdate::control(self.target.control));
        }
        if self.target.main != device.main_status {
            writes.push(DeviceUpdate::main_status(self.target.main));
        }
        if self.target.root != device.root_status {
            writes.push(DeviceUpdate::root_status(self.target.root));
        }
        writes
    }
}

/// Decide what one device should look like after this tick
pub fn decide(
    device: &Device,
    liveness: Liveness,
    snapshot: &Snapshot,
    now: &DateTime<Local>,
) -> Decision {
    let mut bookkeeping = DeviceUpdate::default();
    let mut baseline = DeviceState::of(device);
    let overridden = is_overridden(device);

    let needs_basis = device.unplug.basis_timestamp.is_none() && liveness != Liveness::Untracked;

    match UnplugState::resolve(device.unplug.disabled_by_unplug, liveness) {
        UnplugState::Unplugged => {
            if !device.unplug.disabled_by_unplug {
                bookkeeping.disabled_by_unplug = Some(true);
            }
            if device.unplug.basis_timestamp.is_none() {
                bookkeeping.basis_timestamp = Some(now.timestamp_millis());
            }
            return Decision {
                reason: DecisionReason::Unplugged,
                bookkeeping,
                baseline,
                target: DeviceState::unplugged(),
            };
        }
        UnplugState::Replugged => {
            bookkeeping.disabled_by_unplug = Some(false);
            baseline.root = RootStatus::reflecting(device.control_state);
        }
        UnplugState::Connected => {}
    }

    if overridden {
        return Decision {
            reason: DecisionReason::Overridden,
            bookkeeping,
            baseline,
            target: baseline,
        };
    }

    if needs_basis {
        bookkeeping.basis_timestamp = Some(now.timestamp_millis());
    }

    let (reason, desired) = policy_verdict(device, snapshot, now);

    let target = if desired == device.control_state {
        // An earlier turn-off may have stopped before its status write
        if reason.holds_off() && baseline.root == RootStatus::On {
            DeviceState {
                root: RootStatus::Off,
                ..baseline
            }
        } else {
            baseline
        }
    } else {
        DeviceState {
            control: desired,
            main: MainStatus::Off,
            root: RootStatus::reflecting(desired),
        }
    };

    Decision {
        reason,
        bookkeeping,
        baseline,
        target,
    }
}

/// Result of running one device's write sequence
#[derive(Debug)]
struct Execution {
    key: DeviceKey,
    reason: DecisionReason,
    debounced: bool,
    planned: usize,
    applied: usize,
    wrote_control: bool,
    error: Option<String>,
}

/// Stateful reconciler: owns the unplug detector and the debouncer, both of
/// which live only in memory and are rebuilt on restart
pub struct Reconciler {
    detector: UnplugDetector,
    debouncer: ActionDebouncer,
    max_concurrent: usize,
}

impl Reconciler {
    pub fn new(config: &ReconcilerConfig) -> Self {
        info!(
            unplug_threshold = ?config.unplug_threshold,
            debounce = ?config.debounce,
            max_concurrent = config.max_concurrent_devices,
            "Reconciler initialized"
        );

        Self {
            detector: UnplugDetector::new(config.unplug_threshold),
            debouncer: ActionDebouncer::new(config.debounce),
            max_concurrent: config.max_concurrent_devices.max(1),
        }
    }

    /// Run one reconciliation pass against `store` as of `now`
    pub async fn tick<S>(&mut self, store: &Arc<S>, now: DateTime<Local>) -> TickReport
    where
        S: TelemetryStore + ?Sized + 'static,
    {
        let tick_id = TickId::new();
        let span = info_span!("tick", tick_id = %tick_id);
        self.run_tick(store, tick_id, now).instrument(span).await
    }

    async fn run_tick<S>(&mut self, store: &Arc<S>, tick_id: TickId, now: DateTime<Local>) -> TickReport
    where
        S: TelemetryStore + ?Sized + 'static,
    {
        let report = TickReport::new(tick_id, now);

        let devices = match store.read_all_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Cannot read devices, skipping tick");
                return report.skip(format!("device read failed: {}", e));
            }
        };

        // Without groups the individual path would be wrong for grouped
        // devices, so a failed read skips the tick too
        let groups = match store.read_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "Cannot read groups, skipping tick");
                return report.skip(format!("group read failed: {}", e));
            }
        };

        let snapshot = Snapshot::new(devices, groups, &now);
        let mut report = report;
        report.devices_examined = snapshot.devices.len();

        self.sync_gates(store.as_ref(), &snapshot, &mut report).await;

        let present: BTreeSet<DeviceKey> = snapshot.devices.keys().cloned().collect();
        self.detector.retain(&present);
        self.debouncer.cleanup(now);

        let mut plans = Vec::new();
        for device in snapshot.devices.values() {
            let liveness = self.detector.observe(device, now);
            let mut decision = decide(device, liveness, &snapshot, &now);

            let mut debounced = false;
            if decision.reason != DecisionReason::Unplugged
                && decision.changes_control(device)
                && !self.debouncer.is_settled(&device.key, now)
            {
                debug!(device = %device.key, "Control change held back by debounce");
                decision.hold();
                debounced = true;
            }

            debug!(
                device = %device.key,
                reason = ?decision.reason,
                ?liveness,
                current = %device.control_state,
                desired = %decision.target.control,
                "Device evaluated"
            );

            if decision.reason == DecisionReason::Unplugged && !device.unplug.disabled_by_unplug {
                info!(device = %device.key, "Device unplugged, forcing off");
            }
            if decision.bookkeeping.disabled_by_unplug == Some(false) {
                info!(device = %device.key, "Device plugged back in");
            }

            plans.push((device.key.clone(), decision.reason, debounced, decision.writes(device)));
        }

        let executions = self.execute(store, plans).await;

        for exec in executions {
            report.writes_issued += exec.applied;
            let status = match exec.error {
                Some(error) => {
                    report.writes_failed += 1;
                    OutcomeStatus::Failed {
                        applied: exec.applied,
                        error,
                    }
                }
                None if exec.planned > 0 => OutcomeStatus::Written {
                    writes: exec.applied,
                },
                None if exec.debounced => OutcomeStatus::Debounced,
                None => OutcomeStatus::Unchanged,
            };

            if exec.wrote_control && exec.reason != DecisionReason::Unplugged {
                self.debouncer.record(&exec.key, now);
            }

            report.outcomes.push(DeviceOutcome {
                key: exec.key,
                reason: exec.reason,
                status,
            });
        }
        report.outcomes.sort_by(|a, b| a.key.cmp(&b.key));

        if report.writes_issued > 0 || report.writes_failed > 0 {
            info!(
                devices = report.devices_examined,
                writes = report.writes_issued,
                failed = report.writes_failed,
                "Tick complete"
            );
        } else {
            debug!(
                devices = report.devices_examined,
                debouncing = self.debouncer.len(),
                "Tick complete, nothing to do"
            );
        }

        report
    }

    /// Recompute every enabled group's gate and write the ones that changed
    async fn sync_gates<S>(&self, store: &S, snapshot: &Snapshot, report: &mut TickReport)
    where
        S: TelemetryStore + ?Sized,
    {
        for (department, gate) in snapshot.stale_gates() {
            match store
                .write_group_fields(&department, &GroupUpdate::gate(gate))
                .await
            {
                Ok(()) => {
                    info!(department = %department, gate = %gate, "Group gate updated");
                    report.writes_issued += 1;
                    report.gate_writes += 1;
                }
                Err(e) => {
                    warn!(department = %department, error = %e, "Group gate write failed");
                    report.writes_failed += 1;
                }
            }
        }
    }

    /// Apply each device's write sequence, several devices at a time
    async fn execute<S>(
        &self,
        store: &Arc<S>,
        plans: Vec<(DeviceKey, DecisionReason, bool, Vec<DeviceUpdate>)>,
    ) -> Vec<Execution>
    where
        S: TelemetryStore + ?Sized + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut executions = Vec::new();

        for (key, reason, debounced, writes) in plans {
            if writes.is_empty() {
                executions.push(Execution {
                    key,
                    reason,
                    debounced,
                    planned: 0,
                    applied: 0,
                    wrote_control: false,
                    error: None,
                });
                continue;
            }

            let store = Arc::clone(store);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(
                async move {
                    let mut exec = Execution {
                        key,
                        reason,
                        debounced,
                        planned: writes.len(),
                        applied: 0,
                        wrote_control: false,
                        error: None,
                    };

                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            exec.error = Some(e.to_string());
                            return exec;
                        }
                    };

                    for update in &writes {
                        match store.write_device_fields(&exec.key, update).await {
                            Ok(()) => {
                                info!(
                                    device = %exec.key,
                                    fields = ?update.field_names(),
                                    reason = ?exec.reason,
                                    "Device fields written"
                                );
                                exec.applied += 1;
                                exec.wrote_control |= update.touches_control();
                            }
                            Err(e) => {
                                warn!(
                                    device = %exec.key,
                                    fields = ?update.field_names(),
                                    error = %e,
                                    "Write failed, skipping device until next tick"
                                );
                                exec.error = Some(e.to_string());
                                break;
                            }
                        }
                    }
                    exec
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(exec) => executions.push(exec),
                Err(e) => warn!(error = %e, "Device write task failed"),
            }
        }

        executions
    }

    pub fn tracked_devices(&self) -> usize {
        self.detector.tracked_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use plugwatch_api::{DailyLog, EnergyLimit, Schedule, SensorTimestamp};
    use plugwatch_store::{MemoryStore, RecordedWrite};
    use std::time::Duration;

    // 2025-06-04 is a Wednesday
    fn at(hour: u32, minute: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 4, hour, minute, 0).unwrap()
    }

    fn config() -> ReconcilerConfig {
        ReconcilerConfig::default()
    }

    fn scheduled(name: &str, start: &str, end: &str) -> Device {
        let mut device = Device::new(name, "Ops");
        device.schedule = Some(Schedule::new(start, end, "daily"));
        device
    }

    fn with_energy(mut device: Device, kw: f64) -> Device {
        device
            .daily_logs
            .insert("2025-06-01".into(), DailyLog::new(kw));
        device
    }

    fn snapshot(devices: Vec<Device>, groups: Vec<CombinedLimitGroup>) -> Snapshot {
        let devices = devices.into_iter().map(|d| (d.key.clone(), d)).collect();
        let groups = groups
            .into_iter()
            .map(|g| (g.department.clone(), g))
            .collect();
        Snapshot::new(devices, groups, &at(12, 0))
    }

    #[test]
    fn test_schedule_turns_device_on() {
        let device = scheduled("Kettle", "8:00 AM", "5:00 PM");
        let snap = snapshot(vec![device.clone()], vec![]);

        let decision = decide(&device, Liveness::Untracked, &snap, &at(9, 0));
        assert_eq!(decision.reason, DecisionReason::Schedule);
        assert_eq!(
            decision.writes(&device),
            vec![
                DeviceUpdate::control(ControlState::On),
                DeviceUpdate::root_status(RootStatus::On),
            ]
        );
    }

    #[test]
    fn test_override_blocks_everything_but_unplug() {
        let mut device = scheduled("Kettle", "8:00 AM", "9:00 AM");
        device.main_status = MainStatus::On;
        device.control_state = ControlState::On;
        device.power_limit = EnergyLimit::Bounded(0.0);
        let snap = snapshot(vec![device.clone()], vec![]);

        let decision = decide(&device, Liveness::Fresh { changed: false }, &snap, &at(22, 0));
        assert_eq!(decision.reason, DecisionReason::Overridden);
        // No basis initialization for overridden devices either
        assert!(decision.writes(&device).is_empty());

        let decision = decide(&device, Liveness::Stale, &snap, &at(22, 0));
        assert_eq!(decision.reason, DecisionReason::Unplugged);
        assert_eq!(decision.target.main, MainStatus::Off);
        assert_eq!(decision.target.control, ControlState::Off);
    }

    #[test]
    fn test_cutoff_beats_group_allowance() {
        let device = scheduled("Kettle", "8:00 AM", "5:00 PM");
        let mut on = device.clone();
        on.control_state = ControlState::On;
        let group = CombinedLimitGroup::new("Ops", EnergyLimit::Unbounded).with_member("Kettle");
        let snap = snapshot(vec![on.clone()], vec![group]);

        let decision = decide(&on, Liveness::Untracked, &snap, &at(17, 0));
        assert_eq!(decision.reason, DecisionReason::ScheduleEnded);
        assert_eq!(decision.target.control, ControlState::Off);
    }

    #[test]
    fn test_group_precedence_over_individual_limit() {
        let mut device = with_energy(scheduled("Kettle", "8:00 AM", "5:00 PM"), 3.0);
        device.power_limit = EnergyLimit::Bounded(1.0);
        let group =
            CombinedLimitGroup::new("Ops", EnergyLimit::Bounded(5000.0)).with_member("kettle");
        let snap = snapshot(vec![device.clone()], vec![group]);

        let decision = decide(&device, Liveness::Untracked, &snap, &at(10, 0));
        assert_eq!(decision.reason, DecisionReason::Schedule);
        assert_eq!(decision.target.control, ControlState::On);
    }

    #[test]
    fn test_disabled_group_falls_back_to_individual_limit() {
        let mut device = with_energy(scheduled("Kettle", "8:00 AM", "5:00 PM"), 3.0);
        device.power_limit = EnergyLimit::Bounded(1.0);
        let mut group =
            CombinedLimitGroup::new("Ops", EnergyLimit::Bounded(5000.0)).with_member("kettle");
        group.enabled = false;
        let snap = snapshot(vec![device.clone()], vec![group]);

        let decision = decide(&device, Liveness::Untracked, &snap, &at(10, 0));
        assert_eq!(decision.reason, DecisionReason::IndividualLimitReached);
        assert!(decision.writes(&device).is_empty());
    }

    #[test]
    fn test_replug_restores_root_then_evaluates() {
        let mut device = scheduled("Kettle", "8:00 AM", "5:00 PM");
        device.unplug.disabled_by_unplug = true;
        device.unplug.basis_timestamp = Some(1);
        device.root_status = RootStatus::Unplug;
        let snap = snapshot(vec![device.clone()], vec![]);

        // Outside the window: stays off, status shows OFF again
        let decision = decide(&device, Liveness::Fresh { changed: true }, &snap, &at(20, 0));
        assert_eq!(
            decision.writes(&device),
            vec![
                DeviceUpdate::unplug_flag(false),
                DeviceUpdate::root_status(RootStatus::Off),
            ]
        );

        // Inside the window: turned on in the same tick
        let decision = decide(&device, Liveness::Fresh { changed: true }, &snap, &at(10, 0));
        assert_eq!(
            decision.writes(&device),
            vec![
                DeviceUpdate::unplug_flag(false),
                DeviceUpdate::control(ControlState::On),
                DeviceUpdate::root_status(RootStatus::On),
            ]
        );
    }

    #[test]
    fn test_idle_status_survives_when_control_unchanged() {
        let mut device = scheduled("Kettle", "8:00 AM", "5:00 PM");
        device.control_state = ControlState::On;
        device.root_status = RootStatus::Idle;
        let snap = snapshot(vec![device.clone()], vec![]);

        let decision = decide(&device, Liveness::Untracked, &snap, &at(10, 0));
        assert!(decision.writes(&device).is_empty());
    }

    #[test]
    fn test_gate_self_heals() {
        let mut group =
            CombinedLimitGroup::new("Ops", EnergyLimit::Bounded(500.0)).with_member("Kettle");
        group.device_control_gate = ControlState::Off;
        let snap = snapshot(vec![Device::new("Kettle", "Ops")], vec![group]);

        assert_eq!(
            snap.stale_gates(),
            vec![(Department::new("Ops"), ControlState::On)]
        );
    }

    #[test]
    fn test_gate_heals_after_member_removed() {
        let heavy = with_energy(Device::new("Heater", "Ops"), 2.0);
        let light = with_energy(Device::new("Kettle", "Ops"), 0.1);
        let mut group = CombinedLimitGroup::new("Ops", EnergyLimit::Bounded(1000.0))
            .with_member("Heater")
            .with_member("Kettle");
        group.device_control_gate = ControlState::Off;

        // Cached gate is already right while the heater counts
        let snap = snapshot(vec![heavy.clone(), light.clone()], vec![group.clone()]);
        assert!(snap.stale_gates().is_empty());

        group.member_keys.remove("Heater");
        let snap = snapshot(vec![heavy, light], vec![group]);
        assert_eq!(
            snap.stale_gates(),
            vec![(Department::new("Ops"), ControlState::On)]
        );
    }

    #[test]
    fn test_limit_turn_off_restores_status_already_off() {
        let mut device = with_energy(Device::new("Heater", "Ops"), 2.5);
        device.power_limit = EnergyLimit::Bounded(2.0);
        device.root_status = RootStatus::On;
        let snap = snapshot(vec![device.clone()], vec![]);

        let decision = decide(&device, Liveness::Untracked, &snap, &at(10, 0));
        assert_eq!(decision.reason, DecisionReason::IndividualLimitReached);
        assert_eq!(
            decision.writes(&device),
            vec![DeviceUpdate::root_status(RootStatus::Off)]
        );

        // Idle is left alone
        device.root_status = RootStatus::Idle;
        let decision = decide(&device, Liveness::Untracked, &snap, &at(10, 0));
        assert!(decision.writes(&device).is_empty());
    }

    #[tokio::test]
    async fn test_tick_is_idempotent() {
        let mut limited = with_energy(scheduled("Heater", "8:00 AM", "5:00 PM"), 2.5);
        limited.control_state = ControlState::On;
        limited.power_limit = EnergyLimit::Bounded(2.0);

        let store = Arc::new(
            MemoryStore::new()
                .with_device(scheduled("Kettle", "8:00 AM", "5:00 PM"))
                .with_device(limited),
        );
        let mut reconciler = Reconciler::new(&config());

        let first = reconciler.tick(&store, at(10, 0)).await;
        assert!(first.writes_issued > 0);

        let heater = store.device("Heater").unwrap();
        assert_eq!(heater.control_state, ControlState::Off);
        assert_eq!(heater.main_status, MainStatus::Off);
        assert_eq!(heater.root_status, RootStatus::Off);

        store.clear_writes();
        let second = reconciler.tick(&store, at(10, 0)).await;
        assert_eq!(second.writes_issued, 0);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_boundary() {
        let store = Arc::new(MemoryStore::new().with_device(scheduled("Lamp", "1:17 PM", "1:23 PM")));
        let mut reconciler = Reconciler::new(&config());

        reconciler.tick(&store, at(13, 22)).await;
        assert_eq!(store.device("Lamp").unwrap().control_state, ControlState::On);

        reconciler.tick(&store, at(13, 23)).await;
        let lamp = store.device("Lamp").unwrap();
        assert_eq!(lamp.control_state, ControlState::Off);
        assert_eq!(lamp.root_status, RootStatus::Off);
    }

    #[tokio::test]
    async fn test_override_supremacy_across_ticks() {
        let mut device = with_energy(scheduled("Kettle", "8:00 AM", "9:00 AM"), 100.0);
        device.power_limit = EnergyLimit::Bounded(1.0);
        device.main_status = MainStatus::On;
        device.control_state = ControlState::On;
        let store = Arc::new(MemoryStore::new().with_device(device));
        let mut reconciler = Reconciler::new(&config());

        for hour in [8, 12, 20, 23] {
            let report = reconciler.tick(&store, at(hour, 0)).await;
            assert_eq!(
                report.outcome("Kettle").unwrap().reason,
                DecisionReason::Overridden
            );
        }
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_unplug_and_replug() {
        let mut device = scheduled("Kettle", "8:00 AM", "5:00 PM");
        device.control_state = ControlState::On;
        device.root_status = RootStatus::On;
        device.main_status = MainStatus::On;
        device.sensor_timestamp = Some(SensorTimestamp::new("1000"));
        let store = Arc::new(MemoryStore::new().with_device(device));
        let mut reconciler = Reconciler::new(&config());

        let t0 = at(10, 0);
        reconciler.tick(&store, t0).await;
        assert!(store.writes().is_empty());

        let report = reconciler
            .tick(&store, t0 + chrono::Duration::seconds(31))
            .await;
        assert_eq!(
            report.outcome("Kettle").unwrap().reason,
            DecisionReason::Unplugged
        );
        let kettle = store.device("Kettle").unwrap();
        assert!(kettle.unplug.disabled_by_unplug);
        assert!(kettle.unplug.basis_timestamp.is_some());
        assert_eq!(kettle.control_state, ControlState::Off);
        assert_eq!(kettle.main_status, MainStatus::Off);
        assert_eq!(kettle.root_status, RootStatus::Unplug);

        // Bookkeeping is written before the relay
        let writes = store.device_writes("Kettle");
        assert!(writes[0].disabled_by_unplug == Some(true));
        assert!(writes[1].touches_control());

        // Still stale: nothing left to write
        store.clear_writes();
        reconciler
            .tick(&store, t0 + chrono::Duration::seconds(41))
            .await;
        assert!(store.writes().is_empty());

        store.set_sensor_timestamp("Kettle", "2000");
        reconciler
            .tick(&store, t0 + chrono::Duration::seconds(51))
            .await;
        let kettle = store.device("Kettle").unwrap();
        assert!(!kettle.unplug.disabled_by_unplug);
        // Back inside the window, so the schedule turns it on again
        assert_eq!(kettle.control_state, ControlState::On);
        assert_eq!(kettle.root_status, RootStatus::On);
        assert_eq!(kettle.main_status, MainStatus::Off);
    }

    #[tokio::test]
    async fn test_unplug_reasserts_after_partial_write() {
        let mut device = Device::new("Kettle", "Ops");
        device.control_state = ControlState::On;
        device.sensor_timestamp = Some(SensorTimestamp::new("1000"));
        let store = Arc::new(MemoryStore::new().with_device(device));
        store.fail_field("Kettle", "rootStatus");
        let mut reconciler = Reconciler::new(&config());

        let t0 = at(10, 0);
        reconciler.tick(&store, t0).await;
        let report = reconciler
            .tick(&store, t0 + chrono::Duration::seconds(30))
            .await;
        assert!(matches!(
            report.outcome("Kettle").unwrap().status,
            OutcomeStatus::Failed { .. }
        ));
        assert_eq!(store.device("Kettle").unwrap().root_status, RootStatus::Off);

        store.clear_faults();
        reconciler
            .tick(&store, t0 + chrono::Duration::seconds(40))
            .await;
        assert_eq!(store.device("Kettle").unwrap().root_status, RootStatus::Unplug);
    }

    #[tokio::test]
    async fn test_limit_off_status_retried_after_failed_write() {
        let mut device = with_energy(Device::new("Heater", "Ops"), 2.5);
        device.power_limit = EnergyLimit::Bounded(2.0);
        device.control_state = ControlState::On;
        device.root_status = RootStatus::On;
        let store = Arc::new(MemoryStore::new().with_device(device));
        store.fail_field("Heater", "rootStatus");
        let mut reconciler = Reconciler::new(&config());

        let report = reconciler.tick(&store, at(10, 0)).await;
        assert!(matches!(
            report.outcome("Heater").unwrap().status,
            OutcomeStatus::Failed { .. }
        ));
        let heater = store.device("Heater").unwrap();
        assert_eq!(heater.control_state, ControlState::Off);
        assert_eq!(heater.root_status, RootStatus::On);

        store.clear_faults();
        for minute in 1..=3 {
            reconciler.tick(&store, at(10, minute)).await;
        }
        let heater = store.device("Heater").unwrap();
        assert_eq!(heater.control_state, ControlState::Off);
        assert_eq!(heater.main_status, MainStatus::Off);
        assert_eq!(heater.root_status, RootStatus::Off);
    }

    #[tokio::test]
    async fn test_cutoff_status_retried_after_failed_write() {
        let mut device = scheduled("Lamp", "8:00 AM", "5:00 PM");
        device.control_state = ControlState::On;
        device.root_status = RootStatus::On;
        let store = Arc::new(MemoryStore::new().with_device(device));
        store.fail_field("Lamp", "rootStatus");
        let mut reconciler = Reconciler::new(&config());

        reconciler.tick(&store, at(17, 30)).await;
        assert_eq!(store.device("Lamp").unwrap().root_status, RootStatus::On);

        store.clear_faults();
        let report = reconciler.tick(&store, at(17, 31)).await;
        assert_eq!(
            report.outcome("Lamp").unwrap().reason,
            DecisionReason::ScheduleEnded
        );
        assert_eq!(store.device("Lamp").unwrap().root_status, RootStatus::Off);
    }

    #[tokio::test]
    async fn test_write_failure_skips_only_that_device() {
        let store = Arc::new(
            MemoryStore::new()
                .with_device(scheduled("Kettle", "8:00 AM", "5:00 PM"))
                .with_device(scheduled("Lamp", "8:00 AM", "5:00 PM")),
        );
        store.fail_field("Kettle", "controlState");
        let mut reconciler = Reconciler::new(&config());

        let report = reconciler.tick(&store, at(10, 0)).await;
        assert_eq!(report.writes_failed, 1);
        assert!(matches!(
            report.outcome("Kettle").unwrap().status,
            OutcomeStatus::Failed { applied: 0, .. }
        ));
        // Sequence stopped at control; root was never attempted
        assert_eq!(store.device("Kettle").unwrap().root_status, RootStatus::Off);
        assert_eq!(store.device("Lamp").unwrap().control_state, ControlState::On);

        store.clear_faults();
        reconciler.tick(&store, at(10, 0)).await;
        assert_eq!(store.device("Kettle").unwrap().control_state, ControlState::On);
    }

    #[tokio::test]
    async fn test_group_read_failure_skips_tick() {
        let mut device = with_energy(scheduled("Kettle", "8:00 AM", "5:00 PM"), 3.0);
        device.power_limit = EnergyLimit::Bounded(1.0);
        let group =
            CombinedLimitGroup::new("Ops", EnergyLimit::Bounded(5000.0)).with_member("Kettle");
        let store = Arc::new(MemoryStore::new().with_device(device).with_group(group));
        store.set_fail_group_reads(true);
        let mut reconciler = Reconciler::new(&config());

        let report = reconciler.tick(&store, at(10, 0)).await;
        assert!(report.is_skipped());
        assert!(store.writes().is_empty());

        store.clear_faults();
        reconciler.tick(&store, at(10, 0)).await;
        assert_eq!(store.device("Kettle").unwrap().control_state, ControlState::On);
    }

    #[tokio::test]
    async fn test_group_limit_converges_and_gate_written() {
        let mut kettle = with_energy(scheduled("Kettle", "8:00 AM", "5:00 PM"), 0.3);
        kettle.control_state = ControlState::On;
        let mut lamp = with_energy(scheduled("Lamp", "8:00 AM", "5:00 PM"), 0.3);
        lamp.control_state = ControlState::On;
        let group = CombinedLimitGroup::new("Ops", EnergyLimit::Bounded(500.0))
            .with_member("Kettle")
            .with_member("Lamp");
        let store = Arc::new(
            MemoryStore::new()
                .with_device(kettle)
                .with_device(lamp)
                .with_group(group),
        );
        let mut reconciler = Reconciler::new(&config());

        let report = reconciler.tick(&store, at(10, 0)).await;
        assert_eq!(report.gate_writes, 1);
        assert_eq!(
            store.group("Ops").unwrap().device_control_gate,
            ControlState::Off
        );
        assert_eq!(store.device("Kettle").unwrap().control_state, ControlState::Off);
        assert_eq!(store.device("Lamp").unwrap().control_state, ControlState::Off);

        // Stays off on later ticks
        store.clear_writes();
        reconciler.tick(&store, at(11, 0)).await;
        assert!(store.writes().is_empty());

        // Raising the limit releases the devices and heals the gate
        let mut raised = store.group("Ops").unwrap();
        raised.limit = EnergyLimit::Bounded(1000.0);
        store.insert_group(raised);
        reconciler.tick(&store, at(11, 0)).await;
        assert_eq!(
            store.group("Ops").unwrap().device_control_gate,
            ControlState::On
        );
        assert_eq!(store.device("Kettle").unwrap().control_state, ControlState::On);
        assert!(store
            .writes()
            .iter()
            .any(|w| matches!(w, RecordedWrite::Group { .. })));
    }

    #[tokio::test]
    async fn test_month_rollover_releases_individual_limit() {
        let mut device = with_energy(Device::new("Kettle", "Ops"), 2.5);
        device.power_limit = EnergyLimit::Bounded(2.0);
        device.control_state = ControlState::On;
        let store = Arc::new(MemoryStore::new().with_device(device));
        let mut reconciler = Reconciler::new(&config());

        reconciler.tick(&store, at(10, 0)).await;
        assert_eq!(store.device("Kettle").unwrap().control_state, ControlState::Off);

        // No schedule: July starts clean but nothing turns the device back on
        store.clear_writes();
        let july = Local.with_ymd_and_hms(2025, 7, 1, 10, 0, 0).unwrap();
        let report = reconciler.tick(&store, july).await;
        assert_eq!(
            report.outcome("Kettle").unwrap().reason,
            DecisionReason::NoSchedule
        );
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_debounce_holds_back_rapid_flips() {
        let store = Arc::new(MemoryStore::new().with_device(scheduled("Lamp", "1:17 PM", "1:23 PM")));
        let cfg = ReconcilerConfig {
            debounce: Duration::from_secs(5),
            ..config()
        };
        let mut reconciler = Reconciler::new(&cfg);

        let on_at = Local.with_ymd_and_hms(2025, 6, 4, 13, 22, 58).unwrap();
        reconciler.tick(&store, on_at).await;
        assert_eq!(store.device("Lamp").unwrap().control_state, ControlState::On);

        let report = reconciler
            .tick(&store, on_at + chrono::Duration::seconds(2))
            .await;
        assert_eq!(
            report.outcome("Lamp").unwrap().status,
            OutcomeStatus::Debounced
        );
        assert_eq!(store.device("Lamp").unwrap().control_state, ControlState::On);

        reconciler
            .tick(&store, on_at + chrono::Duration::seconds(7))
            .await;
        assert_eq!(store.device("Lamp").unwrap().control_state, ControlState::Off);
    }

    #[tokio::test]
    async fn test_basis_initialized_once_for_tracked_devices() {
        let mut tracked = Device::new("Kettle", "Ops");
        tracked.sensor_timestamp = Some(SensorTimestamp::new("5"));
        let untracked = Device::new("Lamp", "Ops");
        let store = Arc::new(MemoryStore::new().with_device(tracked).with_device(untracked));
        let mut reconciler = Reconciler::new(&config());

        reconciler.tick(&store, at(10, 0)).await;
        let basis = store.device("Kettle").unwrap().unplug.basis_timestamp;
        assert_eq!(basis, Some(at(10, 0).timestamp_millis()));
        assert_eq!(store.device("Lamp").unwrap().unplug.basis_timestamp, None);

        store.clear_writes();
        reconciler
            .tick(&store, at(10, 0) + chrono::Duration::seconds(10))
            .await;
        assert!(store.writes().is_empty());
    }
}
