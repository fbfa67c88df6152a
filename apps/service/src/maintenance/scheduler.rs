use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::jobs::{Boundary, Enqueued, Job, JobKind, JobQueue};
use crate::database::MaintenanceStore;
use crate::models::{CheckResult, MaintenanceWindow};
use crate::notification::{DispatchReport, NotificationRouter};

/// Boundaries found by one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub scheduled: usize,
    pub duplicates: usize,
}

/// Announces maintenance window starts and ends on the monitors' channels
///
/// A recurring tick scans for boundaries inside the lookahead and schedules
/// one delayed job per boundary. Job ids are derived from the boundary, so
/// rediscovering it on a later tick is absorbed by the queue.
pub struct MaintenanceScheduler {
    store: Arc<dyn MaintenanceStore>,
    router: Arc<NotificationRouter>,
    queue: Arc<dyn JobQueue>,
    tick_every: Duration,
    lookahead: Duration,
}

impl MaintenanceScheduler {
    pub fn new(
        store: Arc<dyn MaintenanceStore>,
        router: Arc<NotificationRouter>,
        queue: Arc<dyn JobQueue>,
        tick_every: Duration,
        lookahead: Duration,
    ) -> Self {
        Self { store, router, queue, tick_every, lookahead }
    }

    /// Reset the queue and install the recurring tick
    ///
    /// Jobs left over from a previous run are discarded, never replayed.
    pub async fn bootstrap(&self) -> Result<()> {
        let cleared = self.queue.clear().await?;
        if cleared > 0 {
            info!("Discarded {} previously scheduled maintenance jobs", cleared);
        }

        self.queue.schedule_recurring(Job::tick(), self.tick_every).await?;
        info!(
            tick_secs = self.tick_every.as_secs(),
            lookahead_secs = self.lookahead.as_secs(),
            "Maintenance scheduler started"
        );
        Ok(())
    }

    /// Schedule a job for every boundary falling in `[now, now + lookahead]`
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<ScanReport> {
        let horizon = now + chrono::Duration::from_std(self.lookahead)?;
        let windows = self.store.windows_with_boundary_between(now, horizon).await?;
        let mut report = ScanReport::default();

        for window in windows {
            for (boundary, at) in [(Boundary::Start, window.starts_at), (Boundary::End, window.ends_at)] {
                if at < now || at > horizon {
                    continue;
                }

                let delay = (at - now).to_std().unwrap_or(Duration::ZERO);
                match self.queue.schedule(Job::notify(boundary, window.id), delay).await? {
                    Enqueued::Scheduled => {
                        debug!(
                            window = %window.id,
                            %boundary,
                            delay_ms = delay.as_millis() as u64,
                            "Scheduled maintenance notification"
                        );
                        report.scheduled += 1;
                    }
                    Enqueued::Duplicate => report.duplicates += 1,
                }
            }
        }

        if report.scheduled > 0 {
            info!("Maintenance scan scheduled {} boundary notifications", report.scheduled);
        }
        Ok(report)
    }

    /// Execute a due job
    pub async fn fire(&self, job: &Job) -> Result<()> {
        match job.kind {
            JobKind::Tick => {
                self.scan(Utc::now()).await?;
            }
            JobKind::Notify { boundary, window_id } => {
                self.notify_boundary(boundary, window_id).await?;
            }
        }
        Ok(())
    }

    /// Send one synthetic result per monitor bound to the window
    pub async fn notify_boundary(&self, boundary: Boundary, window_id: Uuid) -> Result<DispatchReport> {
        let Some(window) = self.store.get_window(window_id).await? else {
            warn!(window = %window_id, %boundary, "Maintenance window no longer exists, skipping notification");
            return Ok(DispatchReport::default());
        };

        let mut total = DispatchReport::default();
        for monitor_id in &window.monitor_ids {
            let result = boundary_result(&window, *monitor_id, boundary);
            match self.router.dispatch(&result).await {
                Ok(report) => {
                    total.delivered += report.delivered;
                    total.skipped += report.skipped;
                    total.failed += report.failed;
                }
                Err(e) => {
                    error!(window = %window.id, monitor = %monitor_id, "Failed to dispatch maintenance notification: {}", e);
                }
            }
        }

        info!(
            window = %window.id,
            %boundary,
            monitors = window.monitor_ids.len(),
            delivered = total.delivered,
            "Maintenance window '{}' {} announced",
            window.name,
            boundary
        );
        Ok(total)
    }

    /// Consume due jobs until the queue's sender side goes away
    ///
    /// Each job runs in its own task, a failing job is logged and the loop
    /// keeps going.
    pub async fn run(self: Arc<Self>, mut jobs: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = jobs.recv().await {
            let scheduler = self.clone();
            tokio::spawn(async move {
                if let Err(e) = scheduler.fire(&job).await {
                    error!(job = %job.id, "Maintenance job failed: {}", e);
                }
            });
        }
        debug!("Maintenance job channel closed");
    }
}

/// Synthetic result announcing a window boundary for one monitor
pub fn boundary_result(window: &MaintenanceWindow, monitor_id: Uuid, boundary: Boundary) -> CheckResult {
    let message = match boundary {
        Boundary::Start => format!(
            "Maintenance '{}' started, alerts are suppressed until {}",
            window.name,
            window.ends_at.to_rfc3339()
        ),
        Boundary::End => format!("Maintenance '{}' ended, monitoring resumed", window.name),
    };

    CheckResult::pending(monitor_id, message)
        .with_meta("maintenanceWindowId", window.id.to_string())
        .with_meta("maintenanceWindowName", window.name.clone())
        .with_meta("boundary", boundary.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::LocalJobQueue;
    use crate::models::{CheckStatus, NotificationChannel};
    use crate::notification::NotifierRegistry;
    use crate::testing::{MemoryStore, RecordingNotifier};
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        queue: Arc<LocalJobQueue>,
        jobs: mpsc::UnboundedReceiver<Job>,
        recorder: Arc<RecordingNotifier>,
        scheduler: Arc<MaintenanceScheduler>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let recorder = Arc::new(RecordingNotifier::new("recording"));
        let mut registry = NotifierRegistry::new();
        registry.register(recorder.clone());
        let router = Arc::new(NotificationRouter::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(registry),
        ));

        let (queue, jobs) = LocalJobQueue::new();
        let queue = Arc::new(queue);
        let scheduler = Arc::new(MaintenanceScheduler::new(
            store.clone(),
            router,
            queue.clone(),
            Duration::from_secs(60),
            Duration::from_secs(300),
        ));
        Fixture { store, queue, jobs, recorder, scheduler }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_in_three_minutes_schedules_one_start_job() {
        let f = fixture();
        let now = Utc::now();
        let window = MaintenanceWindow::new(
            "db failover",
            now + chrono::Duration::minutes(3),
            now + chrono::Duration::hours(1),
        );
        f.store.add_window(window.clone());

        let report = f.scheduler.scan(now).await.unwrap();
        assert_eq!(report, ScanReport { scheduled: 1, duplicates: 0 });

        let pending = f.queue.pending();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].starts_with("notify-start-"));
        assert!(pending[0].contains(&window.id.to_string()));
        assert_eq!(f.queue.scheduled_delay(&pending[0]), Some(Duration::from_millis(180_000)));

        let again = f.scheduler.scan(now + chrono::Duration::seconds(30)).await.unwrap();
        assert_eq!(again, ScanReport { scheduled: 0, duplicates: 1 });
        assert_eq!(f.queue.pending().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_window_schedules_both_boundaries() {
        let f = fixture();
        let now = Utc::now();
        let window = MaintenanceWindow::new(
            "quick restart",
            now + chrono::Duration::minutes(1),
            now + chrono::Duration::minutes(2),
        );
        f.store.add_window(window.clone());

        let report = f.scheduler.scan(now).await.unwrap();
        assert_eq!(report.scheduled, 2);
        let mut expected = vec![format!("notify-end-{}", window.id), format!("notify-start-{}", window.id)];
        expected.sort();
        assert_eq!(f.queue.pending(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_discards_old_jobs_and_installs_tick() {
        let f = fixture();
        f.queue.schedule(Job::notify(Boundary::Start, Uuid::new_v4()), Duration::from_secs(600)).await.unwrap();

        f.scheduler.bootstrap().await.unwrap();
        assert_eq!(f.queue.pending(), vec!["maintenance-tick".to_string()]);
    }

    #[tokio::test]
    async fn test_boundary_notifies_every_monitor_channel() {
        let f = fixture();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        for monitor_id in [first, second] {
            f.store.bind_channel(monitor_id, NotificationChannel::new("pager", "recording", json!({})));
        }
        let now = Utc::now();
        let window = MaintenanceWindow::new("upgrade", now, now + chrono::Duration::hours(1))
            .with_monitor(first)
            .with_monitor(second);
        f.store.add_window(window.clone());

        let report = f.scheduler.notify_boundary(Boundary::Start, window.id).await.unwrap();
        assert_eq!(report.delivered, 2);

        let sent = f.recorder.sent();
        assert_eq!(sent.len(), 2);
        for notification in sent {
            let result = &notification.result;
            assert_eq!(result.status, CheckStatus::Pending);
            assert_eq!(result.meta["maintenanceWindowId"], window.id.to_string());
            assert_eq!(result.meta["boundary"], "start");
            assert!(notification.message.contains("upgrade"));
        }
        // synthetic results stay out of the result history
        assert!(f.store.results_for(first).is_empty());
    }

    #[tokio::test]
    async fn test_deleted_window_is_skipped() {
        let f = fixture();
        let window = MaintenanceWindow::new("gone", Utc::now(), Utc::now()).with_monitor(Uuid::new_v4());
        f.store.add_window(window.clone());
        f.store.remove_window(window.id);

        let report = f.scheduler.notify_boundary(Boundary::End, window.id).await.unwrap();
        assert_eq!(report, DispatchReport::default());
        assert!(f.recorder.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_due_jobs() {
        let f = fixture();
        let monitor_id = Uuid::new_v4();
        f.store.bind_channel(monitor_id, NotificationChannel::new("pager", "recording", json!({})));
        let now = Utc::now();
        let window = MaintenanceWindow::new("patch", now, now + chrono::Duration::minutes(30)).with_monitor(monitor_id);
        f.store.add_window(window.clone());

        let runner = tokio::spawn(f.scheduler.clone().run(f.jobs));
        f.queue.schedule(Job::notify(Boundary::End, window.id), Duration::from_secs(5)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let sent = f.recorder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].result.meta["boundary"], "end");
        runner.abort();
    }
}
