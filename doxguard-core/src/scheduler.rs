//! Periodic maintenance of the exception store on a tokio runtime.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::exceptions::ExceptionStore;
use crate::guardian::ConfigurationGuardian;

pub struct MaintenanceScheduler;

impl MaintenanceScheduler {
    /// Runs `run_maintenance` every `interval`, starting immediately.
    ///
    /// Must be called from within a tokio runtime. Abort the returned handle to stop.
    pub fn spawn(guardian: ConfigurationGuardian, store: Arc<ExceptionStore>, interval: Duration) -> JoinHandle<()> {
        info!("Scheduling exception maintenance every {:?}.", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let guardian = guardian.clone();
                let store = Arc::clone(&store);
                // Maintenance may block on file I/O and retry sleeps.
                match tokio::task::spawn_blocking(move || guardian.run_maintenance(&store)).await {
                    Ok(Ok(report)) if report.repaired => {
                        info!("Scheduled maintenance repaired {} issue(s).", report.issues_fixed)
                    }
                    Ok(Ok(_)) => debug!("Scheduled maintenance found nothing to fix."),
                    Ok(Err(e)) => warn!("Scheduled maintenance failed: {}", e),
                    Err(e) => error!("Scheduled maintenance task panicked or was cancelled: {}", e),
                }
            }
        })
    }
}
