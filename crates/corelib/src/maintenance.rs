//! Background maintenance: periodic ring-wide `stabilize` + `fix_fingers`.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ring::Ring;

/// Handle to a running maintenance task.
pub struct MaintenanceHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stops the task and waits for the round in flight to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "maintenance task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a task on the current tokio runtime that runs one maintenance
/// round every `maintenance_interval`. Rounds run on the blocking pool since
/// they take node locks.
pub fn spawn_maintenance(ring: Arc<Ring>) -> MaintenanceHandle {
    let period = ring.config().maintenance_interval();
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?period, "maintenance started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ring = Arc::clone(&ring);
                    match tokio::task::spawn_blocking(move || ring.stabilize_round()).await {
                        Ok(report) if !report.is_quiet() => {
                            debug!(changed = report.changed, failures = report.failures, "maintenance round");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "maintenance round panicked"),
                    }
                }
                res = stopped.changed() => {
                    if res.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        info!("maintenance stopped");
    });

    MaintenanceHandle { stop, task }
}
