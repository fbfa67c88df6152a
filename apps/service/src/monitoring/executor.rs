use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::checker::CheckerRegistry;
use crate::error::EngineError;
use crate::events::ResultBus;
use crate::models::{CheckResult, Monitor, result::LATENCY_KEY};

/// Extra time a checker gets past its own timeout before it is abandoned
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Monitoring executor - runs checks and publishes every result
pub struct MonitoringExecutor {
    registry: Arc<CheckerRegistry>,
    default_timeout: Duration,
    bus: ResultBus,
}

impl MonitoringExecutor {
    /// Create a new monitoring executor
    pub fn new(registry: Arc<CheckerRegistry>, default_timeout: Duration, event_capacity: usize) -> Self {
        Self { registry, default_timeout, bus: ResultBus::new(event_capacity) }
    }

    /// Subscribe to every result this executor produces
    pub fn subscribe(&self) -> broadcast::Receiver<CheckResult> {
        self.bus.subscribe()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute a monitoring check
    ///
    /// Only fails when no checker can run this monitor at all. Every other
    /// outcome, including checker errors, panics and hangs, resolves to a
    /// result that carries `latencyMs` and has been published on the bus.
    pub async fn run_monitor(&self, monitor: &Monitor) -> Result<CheckResult, EngineError> {
        let checker = self.registry.get(monitor.kind).ok_or(EngineError::NoAdapter(monitor.kind))?;
        if !checker.supports(&monitor.config) {
            return Err(EngineError::Unsupported(monitor.kind));
        }

        let timeout = monitor.timeout_or(self.default_timeout);
        let start = Instant::now();

        let task_monitor = monitor.clone();
        let mut handle = tokio::spawn(async move { checker.check(&task_monitor, timeout).await });

        let mut result = match tokio::time::timeout(timeout + GRACE_PERIOD, &mut handle).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                debug!(monitor = %monitor.id, "Check returned an error: {}", e);
                CheckResult::down(monitor.id, e.to_string())
            }
            Ok(Err(join_error)) => {
                warn!(monitor = %monitor.id, kind = %monitor.kind, "Checker crashed: {}", join_error);
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "Check was cancelled".to_string()
                };
                CheckResult::down(monitor.id, message)
            }
            Err(_) => {
                handle.abort();
                warn!(monitor = %monitor.id, kind = %monitor.kind, "Checker exceeded its deadline");
                CheckResult::down(monitor.id, format!("Check timed out after {}s", timeout.as_secs()))
            }
        };

        result.monitor_id = monitor.id;
        if result.latency_ms().is_none() {
            let elapsed = start.elapsed().as_millis() as u64;
            result.meta.insert(LATENCY_KEY.to_string(), elapsed.into());
        }

        self.bus.publish(result.clone());
        Ok(result)
    }

    /// Run every monitor concurrently. Outcomes line up with `monitors`, but
    /// nothing is implied about the order the checks finished in.
    pub async fn run_batch(&self, monitors: &[Monitor]) -> Vec<Result<CheckResult, EngineError>> {
        join_all(monitors.iter().map(|monitor| self.run_monitor(monitor))).await
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "Checker panicked".to_string(),
        },
    }
}
