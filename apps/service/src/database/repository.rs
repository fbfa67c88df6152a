use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{CheckResult, MaintenanceWindow, Monitor, NotificationChannel};

/// Read access to monitor definitions
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Get a monitor by id
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>>;

    /// Get all enabled monitors
    async fn enabled_monitors(&self) -> Result<Vec<Monitor>>;
}

/// Result history
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append a result to the monitor's history
    async fn save_result(&self, result: &CheckResult) -> Result<()>;

    /// Most recent `limit` results for a monitor, newest first
    async fn recent_results(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<CheckResult>>;
}

/// Channel bindings
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Channels bound to a monitor
    async fn channels_for_monitor(&self, monitor_id: Uuid) -> Result<Vec<NotificationChannel>>;
}

/// Maintenance windows
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Window covering `monitor_id` at `at`, bounds inclusive
    async fn active_window(&self, monitor_id: Uuid, at: DateTime<Utc>) -> Result<Option<MaintenanceWindow>>;

    /// Get a window and its bound monitors by id
    async fn get_window(&self, id: Uuid) -> Result<Option<MaintenanceWindow>>;

    /// Windows whose start or end falls inside `[from, to]`
    async fn windows_with_boundary_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceWindow>>;
}
