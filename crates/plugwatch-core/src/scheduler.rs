//! Fixed-interval driver for the reconciler

use plugwatch_config::ReconcilerConfig;
use plugwatch_store::TelemetryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::Reconciler;

/// Runs the reconciler every `tick_interval` after a startup delay.
///
/// Ticks are awaited in place, so they never overlap; ticks missed while one
/// was running are skipped rather than queued.
pub struct SchedulerLoop<S: TelemetryStore + ?Sized + 'static> {
    reconciler: Reconciler,
    store: Arc<S>,
    tick_interval: Duration,
    startup_delay: Duration,
}

impl<S: TelemetryStore + ?Sized + 'static> SchedulerLoop<S> {
    pub fn new(config: &ReconcilerConfig, store: Arc<S>) -> Self {
        Self {
            reconciler: Reconciler::new(config),
            store,
            tick_interval: config.tick_interval,
            startup_delay: config.startup_delay,
        }
    }

    /// Run until `shutdown` turns true or its sender is dropped. Returns the
    /// number of ticks performed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        info!(
            interval = ?self.tick_interval,
            startup_delay = ?self.startup_delay,
            "Scheduler loop starting"
        );

        tokio::select! {
            _ = tokio::time::sleep(self.startup_delay) => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                info!("Shutdown requested before first tick");
                return 0;
            }
        }

        let mut timer = tokio::time::interval(self.tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(ticks, "Scheduler loop stopping");
                    break;
                }

                _ = timer.tick() => {
                    let report = self
                        .reconciler
                        .tick(&self.store, plugwatch_util::now())
                        .await;
                    ticks += 1;

                    if let Some(reason) = &report.skipped {
                        warn!(tick_id = %report.tick_id, reason = %reason, "Tick skipped");
                    } else {
                        debug!(
                            tick_id = %report.tick_id,
                            tracked = self.reconciler.tracked_devices(),
                            "Tick finished"
                        );
                    }
                }
            }
        }

        ticks
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
