use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared maintenance period for a set of monitors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindow {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub monitor_ids: Vec<Uuid>,
}

impl MaintenanceWindow {
    pub fn new(name: impl Into<String>, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), name: name.into(), starts_at, ends_at, monitor_ids: Vec::new() }
    }

    pub fn with_monitor(mut self, monitor_id: Uuid) -> Self {
        self.monitor_ids.push(monitor_id);
        self
    }

    /// Both bounds are inclusive
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at <= self.ends_at
    }

    /// Whether this window suppresses `monitor_id` at `at`
    pub fn covers(&self, monitor_id: Uuid, at: DateTime<Utc>) -> bool {
        self.contains(at) && self.monitor_ids.contains(&monitor_id)
    }
}
