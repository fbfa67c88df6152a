use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::executor::MonitoringExecutor;
use crate::database::MonitorStore;
use crate::models::Monitor;

/// Monitoring scheduler - drives each monitor on its own interval
///
/// Stands in for the external scheduling tier. Every tick re-reads the
/// monitor, so edits (including pushed heartbeats) apply to the next check.
/// Results flow out through the executor's result bus, not through this type.
pub struct MonitoringScheduler {
    executor: Arc<MonitoringExecutor>,
    monitors: Arc<dyn MonitorStore>,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(executor: Arc<MonitoringExecutor>, monitors: Arc<dyn MonitorStore>) -> Self {
        Self { executor, monitors }
    }

    /// Schedule a single monitor for periodic checking
    ///
    /// The loop ends once the monitor is deleted or disabled.
    pub fn schedule_monitor(&self, monitor: Monitor) -> JoinHandle<()> {
        let executor = self.executor.clone();
        let monitors = self.monitors.clone();

        tokio::spawn(async move {
            if !monitor.enabled {
                debug!(monitor = %monitor.id, "Skipping disabled monitor");
                return;
            }

            let mut period = monitor.interval();
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                timer.tick().await;

                let current = match monitors.get_monitor(monitor.id).await {
                    Ok(Some(current)) if current.enabled => current,
                    Ok(Some(_)) => {
                        info!(monitor = %monitor.id, "Monitor '{}' was disabled, stopping schedule", monitor.name);
                        break;
                    }
                    Ok(None) => {
                        info!(monitor = %monitor.id, "Monitor '{}' was deleted, stopping schedule", monitor.name);
                        break;
                    }
                    Err(e) => {
                        warn!(monitor = %monitor.id, "Failed to reload monitor, skipping this tick: {}", e);
                        continue;
                    }
                };

                if let Err(e) = executor.run_monitor(&current).await {
                    // No checker for this kind will appear at runtime
                    error!(monitor = %current.id, "Stopping schedule for '{}': {}", current.name, e);
                    break;
                }

                if current.interval() != period {
                    debug!(monitor = %current.id, "Interval changed to {:?}", current.interval());
                    period = current.interval();
                    timer = interval(period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    // The fresh interval fires immediately; the check above already ran
                    timer.tick().await;
                }
            }
        })
    }

    /// Schedule multiple monitors
    pub fn schedule_monitors(&self, monitors: Vec<Monitor>) -> Vec<JoinHandle<()>> {
        info!("Scheduling {} monitors", monitors.len());
        monitors.into_iter().map(|monitor| self.schedule_monitor(monitor)).collect()
    }
}
