use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, broadcast, mpsc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::database::ResultStore;
use crate::models::CheckResult;
use crate::notification::{DispatchReport, NotificationRouter};

/// Persists every result and drives the router
///
/// "persist, read the last two, decide" runs under a per-monitor lock so two
/// results for the same monitor can't interleave and both (or neither) look
/// like a transition. Channel fan-out happens after the lock is released.
pub struct AlertPipeline {
    results: Arc<dyn ResultStore>,
    router: Arc<NotificationRouter>,
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl AlertPipeline {
    pub fn new(results: Arc<dyn ResultStore>, router: Arc<NotificationRouter>) -> Self {
        Self { results, router, locks: Mutex::new(HashMap::new()) }
    }

    fn monitor_lock(&self, monitor_id: Uuid) -> Arc<AsyncMutex<()>> {
        match self.locks.lock() {
            Ok(mut locks) => locks.entry(monitor_id).or_default().clone(),
            // poisoned map, lock is unshared
            Err(_) => Arc::new(AsyncMutex::new(())),
        }
    }

    async fn acquire(&self, monitor_id: Uuid) -> OwnedMutexGuard<()> {
        self.monitor_lock(monitor_id).lock_owned().await
    }

    /// Persist `result` and alert if it is a status transition
    pub async fn handle(&self, result: &CheckResult) -> Result<Option<DispatchReport>> {
        if !self.record(result).await? {
            return Ok(None);
        }
        self.router.dispatch(result).await.map(Some)
    }

    /// Persist under the monitor's lock and report whether the status changed
    async fn record(&self, result: &CheckResult) -> Result<bool> {
        let _guard = self.acquire(result.monitor_id).await;
        self.results.save_result(result).await?;
        let transition = self.router.is_transition(result.monitor_id).await?;
        if !transition {
            debug!(monitor = %result.monitor_id, status = %result.status, "No status change");
        }
        Ok(transition)
    }

    /// Drain one monitor's results in arrival order
    async fn drain(self: Arc<Self>, mut queue: mpsc::UnboundedReceiver<CheckResult>) {
        while let Some(result) = queue.recv().await {
            match self.record(&result).await {
                Ok(true) => {
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        if let Err(e) = router.dispatch(&result).await {
                            error!(monitor = %result.monitor_id, "Alert dispatch failed: {}", e);
                        }
                    });
                }
                Ok(false) => {}
                Err(e) => error!(monitor = %result.monitor_id, "Alert pipeline failed: {}", e),
            }
        }
    }

    /// Consume the executor's result stream until it closes
    ///
    /// Each monitor gets its own FIFO worker, so a slow store write for one
    /// monitor never holds up receiving results for the others.
    pub async fn run(self: Arc<Self>, mut results: broadcast::Receiver<CheckResult>) {
        let mut queues: HashMap<Uuid, mpsc::UnboundedSender<CheckResult>> = HashMap::new();
        loop {
            match results.recv().await {
                Ok(result) => {
                    let monitor_id = result.monitor_id;
                    let queue = queues.entry(monitor_id).or_insert_with(|| self.clone().spawn_worker());
                    if let Err(mpsc::error::SendError(result)) = queue.send(result) {
                        // worker is gone, start a fresh one
                        let queue = self.clone().spawn_worker();
                        if queue.send(result).is_err() {
                            error!(monitor = %monitor_id, "Alert pipeline worker unavailable, result dropped");
                        }
                        queues.insert(monitor_id, queue);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Alert pipeline lagged behind, {} results were not persisted", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Result bus closed, alert pipeline stopping");
                    break;
                }
            }
        }
    }

    fn spawn_worker(self: Arc<Self>) -> mpsc::UnboundedSender<CheckResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.drain(rx));
        tx
    }
}
