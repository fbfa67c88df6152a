use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Delivery, Notification, NotifierRegistry};
use crate::database::{ChannelStore, MonitorStore, ResultStore};
use crate::models::{CheckResult, CheckStatus};

/// Per-channel outcome counts for one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}

/// Edge-triggered alert decision over a newest-first status history
///
/// The first result a monitor ever produces always alerts. After that only a
/// change from the previous status does.
pub fn should_notify(history: &[CheckStatus]) -> bool {
    match history {
        [newest, previous, ..] => newest != previous,
        _ => true,
    }
}

/// Decides when a result alerts and fans it out to the monitor's channels
pub struct NotificationRouter {
    monitors: Arc<dyn MonitorStore>,
    results: Arc<dyn ResultStore>,
    channels: Arc<dyn ChannelStore>,
    notifiers: Arc<NotifierRegistry>,
}

impl NotificationRouter {
    pub fn new(
        monitors: Arc<dyn MonitorStore>,
        results: Arc<dyn ResultStore>,
        channels: Arc<dyn ChannelStore>,
        notifiers: Arc<NotifierRegistry>,
    ) -> Self {
        Self { monitors, results, channels, notifiers }
    }

    /// Whether the monitor's latest persisted result is a status transition
    pub async fn is_transition(&self, monitor_id: Uuid) -> Result<bool> {
        let history: Vec<CheckStatus> =
            self.results.recent_results(monitor_id, 2).await?.into_iter().map(|r| r.status).collect();
        Ok(should_notify(&history))
    }

    /// Alert on `result` if it is a transition. `result` must already be persisted.
    pub async fn on_result(&self, result: &CheckResult) -> Result<Option<DispatchReport>> {
        if !self.is_transition(result.monitor_id).await? {
            debug!(monitor = %result.monitor_id, status = %result.status, "Status unchanged, not notifying");
            return Ok(None);
        }
        self.dispatch(result).await.map(Some)
    }

    /// Deliver `result` to every channel bound to its monitor
    ///
    /// Channels are sent to concurrently. A failing channel is logged and
    /// counted, it never stops delivery to the others. Channels of a kind with
    /// no registered notifier are skipped.
    pub async fn dispatch(&self, result: &CheckResult) -> Result<DispatchReport> {
        let channels = self.channels.channels_for_monitor(result.monitor_id).await?;
        let mut report = DispatchReport::default();
        if channels.is_empty() {
            debug!(monitor = %result.monitor_id, "No channels bound, nothing to dispatch");
            return Ok(report);
        }

        let monitor_name = match self.monitors.get_monitor(result.monitor_id).await {
            Ok(Some(monitor)) => monitor.name,
            Ok(None) => result.monitor_id.to_string(),
            Err(e) => {
                warn!(monitor = %result.monitor_id, "Failed to load monitor name: {}", e);
                result.monitor_id.to_string()
            }
        };
        let notification = &Notification::new(monitor_name, result.clone());

        let mut sends = Vec::new();
        for channel in &channels {
            match self.notifiers.get(&channel.kind) {
                Some(notifier) => {
                    sends.push(async move { (channel, notifier.send(channel, notification).await) })
                }
                None => {
                    debug!(channel = %channel.name, kind = %channel.kind, "No notifier for channel kind, skipping");
                    report.skipped += 1;
                }
            }
        }

        for (channel, outcome) in join_all(sends).await {
            match outcome {
                Ok(Delivery::Sent) => {
                    debug!(channel = %channel.name, kind = %channel.kind, "Notification delivered");
                    report.delivered += 1;
                }
                Ok(Delivery::Skipped(reason)) => {
                    debug!(channel = %channel.name, "Notification skipped: {}", reason);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(channel = %channel.name, kind = %channel.kind, "Notification delivery failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            monitor = %result.monitor_id,
            status = %result.status,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Dispatched notification"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Monitor, MonitorKind, NotificationChannel};
    use crate::testing::{MemoryStore, RecordingNotifier};
    use chrono::{Duration, Utc};
    use serde_json::json;

    use crate::models::CheckStatus::{Down, Up};

    #[test]
    fn test_should_notify_is_edge_triggered() {
        assert!(should_notify(&[]));
        assert!(should_notify(&[Down]));
        assert!(!should_notify(&[Down, Down]));
        assert!(!should_notify(&[Up, Up, Down]));
        assert!(should_notify(&[Down, Up, Down]));
        assert!(should_notify(&[Up, CheckStatus::Pending]));
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        recorder: Arc<RecordingNotifier>,
        router: NotificationRouter,
        monitor: Monitor,
    }

    fn fixture(channel_kinds: &[&str]) -> Fixture {
        let store = Arc::new(MemoryStore::default());
        let monitor = Monitor::new("checkout", MonitorKind::Http, json!({"url": "https://example.com"}));
        store.add_monitor(monitor.clone());
        for (i, kind) in channel_kinds.iter().enumerate() {
            let channel = NotificationChannel::new(format!("channel {i}"), *kind, json!({}));
            store.bind_channel(monitor.id, channel);
        }

        let recorder = Arc::new(RecordingNotifier::new("recording"));
        let mut registry = NotifierRegistry::new();
        registry.register(recorder.clone());
        registry.register(Arc::new(RecordingNotifier::failing("broken")));

        let router =
            NotificationRouter::new(store.clone(), store.clone(), store.clone(), Arc::new(registry));
        Fixture { store, recorder, router, monitor }
    }

    async fn persist(store: &MemoryStore, monitor_id: Uuid, statuses: &[CheckStatus]) -> CheckResult {
        // oldest first
        let base = Utc::now();
        let mut last = None;
        for (i, status) in statuses.iter().enumerate() {
            let mut result = CheckResult::up(monitor_id, format!("observation {i}"));
            result.status = *status;
            result.checked_at = base + Duration::seconds(i as i64);
            store.save_result(&result).await.unwrap();
            last = Some(result);
        }
        last.unwrap()
    }

    #[tokio::test]
    async fn test_repeated_status_does_not_realert() {
        let f = fixture(&["recording", "recording"]);
        let latest = persist(&f.store, f.monitor.id, &[Down, Up, Up]).await;

        assert!(f.router.on_result(&latest).await.unwrap().is_none());
        assert!(f.recorder.sent().is_empty());
    }

    #[tokio::test]
    async fn test_transition_notifies_every_bound_channel_once() {
        let f = fixture(&["recording", "recording"]);
        let latest = persist(&f.store, f.monitor.id, &[Down, Up, Down]).await;

        let report = f.router.on_result(&latest).await.unwrap().unwrap();
        assert_eq!(report, DispatchReport { delivered: 2, skipped: 0, failed: 0 });

        let sent = f.recorder.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|n| n.monitor_name == "checkout"));
        assert!(sent.iter().all(|n| n.message.starts_with(Down.glyph())));
    }

    #[tokio::test]
    async fn test_first_result_always_notifies() {
        let f = fixture(&["recording"]);
        let latest = persist(&f.store, f.monitor.id, &[Up]).await;

        let report = f.router.on_result(&latest).await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let f = fixture(&["broken", "recording", "pager-duty"]);
        let result = CheckResult::down(f.monitor.id, "HTTP 502");

        let report = f.router.dispatch(&result).await.unwrap();
        assert_eq!(report, DispatchReport { delivered: 1, skipped: 1, failed: 1 });
        assert_eq!(report.attempted(), 3);
        assert_eq!(f.recorder.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_monitor_falls_back_to_id() {
        let f = fixture(&[]);
        let orphan = Uuid::new_v4();
        let channel = NotificationChannel::new("orphan hook", "recording", json!({}));
        f.store.bind_channel(orphan, channel);

        f.router.dispatch(&CheckResult::up(orphan, "ok")).await.unwrap();
        assert_eq!(f.recorder.sent()[0].monitor_name, orphan.to_string());
    }
}
