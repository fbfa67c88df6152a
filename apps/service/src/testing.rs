//! In-memory store and notifier fakes shared by unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::{ChannelStore, MaintenanceStore, MonitorStore, ResultStore};
use crate::error::NotifyError;
use crate::models::{CheckResult, MaintenanceWindow, Monitor, NotificationChannel};
use crate::notification::{Delivery, Notification, Notifier};

#[derive(Default)]
pub struct MemoryStore {
    monitors: Mutex<HashMap<Uuid, Monitor>>,
    results: Mutex<Vec<CheckResult>>,
    bindings: Mutex<Vec<(Uuid, NotificationChannel)>>,
    windows: Mutex<Vec<MaintenanceWindow>>,
}

impl MemoryStore {
    pub fn add_monitor(&self, monitor: Monitor) {
        self.monitors.lock().unwrap().insert(monitor.id, monitor);
    }

    pub fn bind_channel(&self, monitor_id: Uuid, channel: NotificationChannel) {
        self.bindings.lock().unwrap().push((monitor_id, channel));
    }

    pub fn add_window(&self, window: MaintenanceWindow) {
        self.windows.lock().unwrap().push(window);
    }

    pub fn remove_window(&self, id: Uuid) {
        self.windows.lock().unwrap().retain(|w| w.id != id);
    }

    pub fn results_for(&self, monitor_id: Uuid) -> Vec<CheckResult> {
        self.results.lock().unwrap().iter().filter(|r| r.monitor_id == monitor_id).cloned().collect()
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
        Ok(self.monitors.lock().unwrap().get(&id).cloned())
    }

    async fn enabled_monitors(&self) -> Result<Vec<Monitor>> {
        Ok(self.monitors.lock().unwrap().values().filter(|m| m.enabled).cloned().collect())
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_result(&self, result: &CheckResult) -> Result<()> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn recent_results(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<CheckResult>> {
        let mut results = self.results_for(monitor_id);
        // equal timestamps: the later insert counts as newer
        results.sort_by_key(|r| r.checked_at);
        results.reverse();
        results.truncate(limit);
        Ok(results)
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn channels_for_monitor(&self, monitor_id: Uuid) -> Result<Vec<NotificationChannel>> {
        Ok(self
            .bindings
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == monitor_id)
            .map(|(_, channel)| channel.clone())
            .collect())
    }
}

#[async_trait]
impl MaintenanceStore for MemoryStore {
    async fn active_window(&self, monitor_id: Uuid, at: DateTime<Utc>) -> Result<Option<MaintenanceWindow>> {
        Ok(self.windows.lock().unwrap().iter().find(|w| w.covers(monitor_id, at)).cloned())
    }

    async fn get_window(&self, id: Uuid) -> Result<Option<MaintenanceWindow>> {
        Ok(self.windows.lock().unwrap().iter().find(|w| w.id == id).cloned())
    }

    async fn windows_with_boundary_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceWindow>> {
        let in_range = |t: DateTime<Utc>| from <= t && t <= to;
        Ok(self
            .windows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| in_range(w.starts_at) || in_range(w.ends_at))
            .cloned()
            .collect())
    }
}

/// Notifier that records what it was asked to send
pub struct RecordingNotifier {
    kind: &'static str,
    fail: bool,
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, fail: false, sent: Mutex::new(Vec::new()) }
    }

    /// Every send is rejected by the "endpoint"
    pub fn failing(kind: &'static str) -> Self {
        Self { kind, fail: true, sent: Mutex::new(Vec::new()) }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn send(
        &self,
        _channel: &NotificationChannel,
        notification: &Notification,
    ) -> Result<Delivery, NotifyError> {
        if self.fail {
            return Err(NotifyError::Rejected { status: 500, body: "internal error".into() });
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(Delivery::Sent)
    }
}
