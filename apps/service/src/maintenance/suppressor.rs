use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::MaintenanceStore;
use crate::models::MaintenanceWindow;

/// Answers "is this monitor under maintenance right now?"
///
/// Read-only. Alerting is not gated here, status surfaces consult it.
pub struct MaintenanceSuppressor {
    store: Arc<dyn MaintenanceStore>,
}

impl MaintenanceSuppressor {
    pub fn new(store: Arc<dyn MaintenanceStore>) -> Self {
        Self { store }
    }

    /// Window covering `monitor_id` at `at` (default now), bounds inclusive
    pub async fn active_window(
        &self,
        monitor_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<MaintenanceWindow>> {
        let at = at.unwrap_or_else(Utc::now);
        let window = self.store.active_window(monitor_id, at).await?;
        // bounds are inclusive on both ends
        Ok(window.filter(|w| w.covers(monitor_id, at)))
    }

    pub async fn is_suppressed(&self, monitor_id: Uuid, at: Option<DateTime<Utc>>) -> Result<bool> {
        Ok(self.active_window(monitor_id, at).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use chrono::Duration;

    #[tokio::test]
    async fn test_suppressed_only_inside_window_for_bound_monitors() {
        let store = Arc::new(MemoryStore::default());
        let monitor_id = Uuid::new_v4();
        let start = Utc::now() + Duration::minutes(10);
        let end = start + Duration::minutes(30);
        let window = MaintenanceWindow::new("kernel patching", start, end).with_monitor(monitor_id);
        store.add_window(window.clone());

        let suppressor = MaintenanceSuppressor::new(store);

        assert!(!suppressor.is_suppressed(monitor_id, None).await.unwrap());
        assert!(suppressor.is_suppressed(monitor_id, Some(start)).await.unwrap());
        assert!(suppressor.is_suppressed(monitor_id, Some(end)).await.unwrap());
        assert!(!suppressor.is_suppressed(monitor_id, Some(end + Duration::seconds(1))).await.unwrap());
        assert!(!suppressor.is_suppressed(Uuid::new_v4(), Some(start)).await.unwrap());

        let active = suppressor.active_window(monitor_id, Some(start)).await.unwrap().unwrap();
        assert_eq!(active.id, window.id);
    }
}
