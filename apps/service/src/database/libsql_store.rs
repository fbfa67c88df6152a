use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::initialize_database;
use super::repository::{ChannelStore, MaintenanceStore, MonitorStore, ResultStore};
use crate::models::{CheckResult, CheckStatus, MaintenanceWindow, Monitor, NotificationChannel};
use crate::pool::{LibsqlManager, LibsqlPool};

const MONITOR_COLUMNS: &str =
    "id, name, kind, config, interval_seconds, timeout_seconds, tags, enabled";
const WINDOW_COLUMNS: &str = "w.id, w.name, w.starts_at, w.ends_at";

/// libsql-backed implementation of every store trait
///
/// Timestamps are stored as unix milliseconds, JSON payloads as text.
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a store from an existing pool. Migrations are not run.
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Build a pool over `database` and bring its schema up to date
    pub async fn open(database: libsql::Database, max_connections: usize) -> Result<Self> {
        let manager = LibsqlManager::new(database);
        let pool = LibsqlPool::builder(manager)
            .max_size(max_connections.max(1))
            .build()
            .context("Failed to build libsql connection pool")?;

        let conn = pool.get().await.map_err(|e| anyhow!("Failed to get database connection: {e}"))?;
        initialize_database(&conn).await?;
        drop(conn);

        Ok(Self { pool })
    }

    /// Open (or create) a local database file
    pub async fn open_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
        let database = libsql::Builder::new_local(path).build().await?;
        Self::open(database, 8).await
    }

    /// Connect to a remote libsql server
    pub async fn open_remote(url: &str, auth_token: &str) -> Result<Self> {
        let database =
            libsql::Builder::new_remote(url.to_string(), auth_token.to_string()).build().await?;
        Self::open(database, 8).await
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow!("Failed to get database connection: {e}"))
    }

    /// Insert or update a monitor together with its channel and window bindings
    pub async fn save_monitor(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        let id = monitor.id.to_string();

        conn.execute(
            "INSERT INTO monitors (id, name, kind, config, interval_seconds, timeout_seconds, tags, enabled)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                config = excluded.config,
                interval_seconds = excluded.interval_seconds,
                timeout_seconds = excluded.timeout_seconds,
                tags = excluded.tags,
                enabled = excluded.enabled",
            params![
                id.clone(),
                monitor.name.clone(),
                monitor.kind.as_str(),
                serde_json::to_string(&monitor.config)?,
                monitor.interval_seconds as i64,
                monitor.timeout_seconds.map(|v| v as i64),
                serde_json::to_string(&monitor.tags)?,
                if monitor.enabled { 1 } else { 0 }
            ],
        )
        .await?;

        conn.execute("DELETE FROM monitor_channels WHERE monitor_id = ?", params![id.clone()]).await?;
        for channel_id in &monitor.channel_ids {
            conn.execute(
                "INSERT OR IGNORE INTO monitor_channels (monitor_id, channel_id) VALUES (?, ?)",
                params![id.clone(), channel_id.to_string()],
            )
            .await?;
        }

        for window_id in &monitor.maintenance_window_ids {
            conn.execute(
                "INSERT OR IGNORE INTO maintenance_window_monitors (window_id, monitor_id) VALUES (?, ?)",
                params![window_id.to_string(), id.clone()],
            )
            .await?;
        }

        Ok(())
    }

    /// Delete a monitor, its history and its bindings
    pub async fn delete_monitor(&self, id: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;
        let id = id.to_string();

        for sql in [
            "DELETE FROM check_results WHERE monitor_id = ?",
            "DELETE FROM monitor_channels WHERE monitor_id = ?",
            "DELETE FROM maintenance_window_monitors WHERE monitor_id = ?",
            "DELETE FROM monitors WHERE id = ?",
        ] {
            conn.execute(sql, params![id.clone()]).await?;
        }
        Ok(())
    }

    /// Insert or update a notification channel
    pub async fn save_channel(&self, channel: &NotificationChannel) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notification_channels (id, name, kind, config) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                config = excluded.config",
            params![
                channel.id.to_string(),
                channel.name.clone(),
                channel.kind.clone(),
                serde_json::to_string(&channel.config)?
            ],
        )
        .await?;
        Ok(())
    }

    /// Bind a channel to a monitor
    pub async fn bind_channel(&self, monitor_id: Uuid, channel_id: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT OR IGNORE INTO monitor_channels (monitor_id, channel_id) VALUES (?, ?)",
            params![monitor_id.to_string(), channel_id.to_string()],
        )
        .await?;
        Ok(())
    }

    /// Insert or update a maintenance window, replacing its monitor set
    pub async fn save_window(&self, window: &MaintenanceWindow) -> Result<()> {
        let conn = self.get_conn().await?;
        let id = window.id.to_string();

        conn.execute(
            "INSERT INTO maintenance_windows (id, name, starts_at, ends_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at",
            params![
                id.clone(),
                window.name.clone(),
                window.starts_at.timestamp_millis(),
                window.ends_at.timestamp_millis()
            ],
        )
        .await?;

        conn.execute("DELETE FROM maintenance_window_monitors WHERE window_id = ?", params![id.clone()])
            .await?;
        for monitor_id in &window.monitor_ids {
            conn.execute(
                "INSERT OR IGNORE INTO maintenance_window_monitors (window_id, monitor_id) VALUES (?, ?)",
                params![id.clone(), monitor_id.to_string()],
            )
            .await?;
        }
        Ok(())
    }

    /// Delete a maintenance window and its bindings
    pub async fn delete_window(&self, id: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;
        let id = id.to_string();
        conn.execute("DELETE FROM maintenance_window_monitors WHERE window_id = ?", params![id.clone()])
            .await?;
        conn.execute("DELETE FROM maintenance_windows WHERE id = ?", params![id]).await?;
        Ok(())
    }

    /// Windows that have not ended yet, soonest first
    pub async fn upcoming_windows(&self, now: DateTime<Utc>) -> Result<Vec<MaintenanceWindow>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WINDOW_COLUMNS} FROM maintenance_windows w WHERE w.ends_at >= ? ORDER BY w.starts_at"
            ))
            .await?;
        let mut rows = stmt.query(params![now.timestamp_millis()]).await?;

        let mut windows = Vec::new();
        while let Some(row) = rows.next().await? {
            windows.push(window_from_row(&row)?);
        }
        drop(rows);

        self.attach_window_monitors(&conn, windows).await
    }

    async fn attach_window_monitors(
        &self,
        conn: &libsql::Connection,
        mut windows: Vec<MaintenanceWindow>,
    ) -> Result<Vec<MaintenanceWindow>> {
        for window in &mut windows {
            window.monitor_ids = query_ids(
                conn,
                "SELECT monitor_id FROM maintenance_window_monitors WHERE window_id = ?",
                window.id,
            )
            .await?;
        }
        Ok(windows)
    }

    async fn attach_monitor_bindings(
        &self,
        conn: &libsql::Connection,
        mut monitor: Monitor,
    ) -> Result<Monitor> {
        monitor.channel_ids =
            query_ids(conn, "SELECT channel_id FROM monitor_channels WHERE monitor_id = ?", monitor.id)
                .await?;
        monitor.maintenance_window_ids = query_ids(
            conn,
            "SELECT window_id FROM maintenance_window_monitors WHERE monitor_id = ?",
            monitor.id,
        )
        .await?;
        Ok(monitor)
    }
}

#[async_trait]
impl MonitorStore for LibsqlStore {
    async fn get_monitor(&self, id: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut stmt =
            conn.prepare(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = ?")).await?;
        let mut rows = stmt.query(params![id.to_string()]).await?;

        let monitor = match rows.next().await? {
            Some(row) => monitor_from_row(&row)?,
            None => return Ok(None),
        };
        drop(rows);

        Ok(Some(self.attach_monitor_bindings(&conn, monitor).await?))
    }

    async fn enabled_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE enabled = 1 ORDER BY name"))
            .await?;
        let mut rows = stmt.query(()).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        drop(rows);

        let mut hydrated = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            hydrated.push(self.attach_monitor_bindings(&conn, monitor).await?);
        }
        Ok(hydrated)
    }
}

#[async_trait]
impl ResultStore for LibsqlStore {
    async fn save_result(&self, result: &CheckResult) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO check_results (monitor_id, status, message, checked_at, meta) VALUES (?, ?, ?, ?, ?)",
            params![
                result.monitor_id.to_string(),
                result.status.as_str(),
                result.message.clone(),
                result.checked_at.timestamp_millis(),
                serde_json::to_string(&result.meta)?
            ],
        )
        .await?;
        Ok(())
    }

    async fn recent_results(&self, monitor_id: Uuid, limit: usize) -> Result<Vec<CheckResult>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT monitor_id, status, message, checked_at, meta FROM check_results
                 WHERE monitor_id = ? ORDER BY checked_at DESC, seq DESC LIMIT ?",
            )
            .await?;
        let mut rows = stmt.query(params![monitor_id.to_string(), limit as i64]).await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let monitor_id: String = row.get(0)?;
            let status: String = row.get(1)?;
            let meta: String = row.get(4)?;

            results.push(CheckResult {
                monitor_id: Uuid::parse_str(&monitor_id)?,
                status: status.parse::<CheckStatus>().map_err(|e| anyhow!(e))?,
                message: row.get(2)?,
                checked_at: millis_to_datetime(row.get(3)?)?,
                meta: serde_json::from_str(&meta).unwrap_or_default(),
            });
        }
        Ok(results)
    }
}

#[async_trait]
impl ChannelStore for LibsqlStore {
    async fn channels_for_monitor(&self, monitor_id: Uuid) -> Result<Vec<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.name, c.kind, c.config FROM notification_channels c
                 JOIN monitor_channels mc ON mc.channel_id = c.id
                 WHERE mc.monitor_id = ? ORDER BY c.name",
            )
            .await?;
        let mut rows = stmt.query(params![monitor_id.to_string()]).await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            let config: String = row.get(3)?;
            channels.push(NotificationChannel {
                id: Uuid::parse_str(&id)?,
                name: row.get(1)?,
                kind: row.get(2)?,
                config: serde_json::from_str(&config).unwrap_or_default(),
            });
        }
        Ok(channels)
    }
}

#[async_trait]
impl MaintenanceStore for LibsqlStore {
    async fn active_window(&self, monitor_id: Uuid, at: DateTime<Utc>) -> Result<Option<MaintenanceWindow>> {
        let conn = self.get_conn().await?;
        let at = at.timestamp_millis();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WINDOW_COLUMNS} FROM maintenance_windows w
                 JOIN maintenance_window_monitors wm ON wm.window_id = w.id
                 WHERE wm.monitor_id = ? AND w.starts_at <= ? AND w.ends_at >= ?
                 ORDER BY w.starts_at LIMIT 1"
            ))
            .await?;
        let mut rows = stmt.query(params![monitor_id.to_string(), at, at]).await?;

        let window = match rows.next().await? {
            Some(row) => window_from_row(&row)?,
            None => return Ok(None),
        };
        drop(rows);

        Ok(self.attach_window_monitors(&conn, vec![window]).await?.pop())
    }

    async fn get_window(&self, id: Uuid) -> Result<Option<MaintenanceWindow>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {WINDOW_COLUMNS} FROM maintenance_windows w WHERE w.id = ?"))
            .await?;
        let mut rows = stmt.query(params![id.to_string()]).await?;

        let window = match rows.next().await? {
            Some(row) => window_from_row(&row)?,
            None => return Ok(None),
        };
        drop(rows);

        Ok(self.attach_window_monitors(&conn, vec![window]).await?.pop())
    }

    async fn windows_with_boundary_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceWindow>> {
        let conn = self.get_conn().await?;
        let (from, to) = (from.timestamp_millis(), to.timestamp_millis());
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WINDOW_COLUMNS} FROM maintenance_windows w
                 WHERE (w.starts_at BETWEEN ? AND ?) OR (w.ends_at BETWEEN ? AND ?)
                 ORDER BY w.starts_at"
            ))
            .await?;
        let mut rows = stmt.query(params![from, to, from, to]).await?;

        let mut windows = Vec::new();
        while let Some(row) = rows.next().await? {
            windows.push(window_from_row(&row)?);
        }
        drop(rows);

        self.attach_window_monitors(&conn, windows).await
    }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let config: String = row.get(3)?;
    let tags: String = row.get(6)?;

    Ok(Monitor {
        id: Uuid::parse_str(&id)?,
        name: row.get(1)?,
        kind: kind.parse().map_err(|e: String| anyhow!(e))?,
        config: serde_json::from_str(&config).context("Stored monitor config is not valid JSON")?,
        interval_seconds: row.get::<i64>(4)?.max(0) as u64,
        timeout_seconds: row.get::<Option<i64>>(5)?.map(|v| v.max(0) as u64),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        channel_ids: Vec::new(),
        maintenance_window_ids: Vec::new(),
        enabled: row.get::<i64>(7)? != 0,
    })
}

fn window_from_row(row: &Row) -> Result<MaintenanceWindow> {
    let id: String = row.get(0)?;
    Ok(MaintenanceWindow {
        id: Uuid::parse_str(&id)?,
        name: row.get(1)?,
        starts_at: millis_to_datetime(row.get(2)?)?,
        ends_at: millis_to_datetime(row.get(3)?)?,
        monitor_ids: Vec::new(),
    })
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("Timestamp out of range: {millis}"))
}

async fn query_ids(conn: &libsql::Connection, sql: &str, key: Uuid) -> Result<Vec<Uuid>> {
    let mut rows = conn.query(sql, params![key.to_string()]).await?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next().await? {
        let id: String = row.get(0)?;
        ids.push(Uuid::parse_str(&id)?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::models::MonitorKind;

    async fn setup_store() -> anyhow::Result<(LibsqlStore, TempDir)> {
        let temp_dir = tempfile::tempdir()?;
        let store = LibsqlStore::open_local(temp_dir.path().join("sentinel.db")).await?;
        Ok((store, temp_dir))
    }

    #[tokio::test]
    async fn test_monitor_round_trip_with_bindings() -> anyhow::Result<()> {
        let (store, _temp) = setup_store().await?;

        let channel = NotificationChannel::new("ops hook", "webhook", json!({"url": "http://localhost/hook"}));
        store.save_channel(&channel).await?;

        let mut monitor =
            Monitor::new("api", MonitorKind::Http, json!({"url": "https://example.com"})).with_timeout(5);
        monitor.tags = vec!["prod".into()];
        monitor.channel_ids = vec![channel.id];
        store.save_monitor(&monitor).await?;

        let loaded = store.get_monitor(monitor.id).await?.expect("monitor should exist");
        assert_eq!(loaded.name, "api");
        assert_eq!(loaded.kind, MonitorKind::Http);
        assert_eq!(loaded.config["url"], "https://example.com");
        assert_eq!(loaded.timeout_seconds, Some(5));
        assert_eq!(loaded.tags, vec!["prod".to_string()]);
        assert_eq!(loaded.channel_ids, vec![channel.id]);

        let channels = store.channels_for_monitor(monitor.id).await?;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].setting("url").as_deref(), Some("http://localhost/hook"));

        assert!(store.get_monitor(Uuid::new_v4()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_enabled_monitors_skips_disabled() -> anyhow::Result<()> {
        let (store, _temp) = setup_store().await?;

        let enabled = Monitor::new("on", MonitorKind::Tcp, json!({"host": "localhost", "port": 22}));
        let mut disabled = Monitor::new("off", MonitorKind::Tcp, json!({"host": "localhost", "port": 22}));
        disabled.enabled = false;
        store.save_monitor(&enabled).await?;
        store.save_monitor(&disabled).await?;

        let monitors = store.enabled_monitors().await?;
        assert_eq!(monitors.len(), 1);
        assert_eq!(monitors[0].id, enabled.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_recent_results_newest_first() -> anyhow::Result<()> {
        let (store, _temp) = setup_store().await?;
        let monitor_id = Uuid::new_v4();
        let base = Utc::now();

        for (offset, status) in [(0, CheckStatus::Up), (1, CheckStatus::Up), (2, CheckStatus::Down)] {
            let mut result = CheckResult::up(monitor_id, format!("result {offset}")).with_latency(12);
            result.status = status;
            result.checked_at = base + Duration::seconds(offset);
            store.save_result(&result).await?;
        }
        store.save_result(&CheckResult::up(Uuid::new_v4(), "other monitor")).await?;

        let recent = store.recent_results(monitor_id, 2).await?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, CheckStatus::Down);
        assert_eq!(recent[0].message, "result 2");
        assert_eq!(recent[1].message, "result 1");
        assert_eq!(recent[0].latency_ms(), Some(12));
        Ok(())
    }

    #[tokio::test]
    async fn test_active_window_bounds_are_inclusive() -> anyhow::Result<()> {
        let (store, _temp) = setup_store().await?;
        let monitor_id = Uuid::new_v4();
        let start = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        let end = start + Duration::hours(1);

        let window = MaintenanceWindow::new("upgrade", start, end).with_monitor(monitor_id);
        store.save_window(&window).await?;

        assert_eq!(store.active_window(monitor_id, start).await?.map(|w| w.id), Some(window.id));
        assert_eq!(store.active_window(monitor_id, end).await?.map(|w| w.id), Some(window.id));
        assert!(store.active_window(monitor_id, end + Duration::milliseconds(1)).await?.is_none());
        assert!(store.active_window(Uuid::new_v4(), start).await?.is_none());

        let loaded = store.get_window(window.id).await?.expect("window should exist");
        assert_eq!(loaded, window);
        Ok(())
    }

    #[tokio::test]
    async fn test_windows_with_boundary_between() -> anyhow::Result<()> {
        let (store, _temp) = setup_store().await?;
        let now = Utc::now();

        let starting = MaintenanceWindow::new("starting", now + Duration::minutes(3), now + Duration::hours(2));
        let ending = MaintenanceWindow::new("ending", now - Duration::hours(1), now + Duration::minutes(4));
        let far = MaintenanceWindow::new("far", now + Duration::hours(5), now + Duration::hours(6));
        for window in [&starting, &ending, &far] {
            store.save_window(window).await?;
        }

        let found = store.windows_with_boundary_between(now, now + Duration::minutes(5)).await?;
        let ids: Vec<Uuid> = found.iter().map(|w| w.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&starting.id));
        assert!(ids.contains(&ending.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> anyhow::Result<()> {
        let (store, _temp) = setup_store().await?;
        let conn = store.get_conn().await?;
        initialize_database(&conn).await?;

        let mut rows = conn.query("SELECT COUNT(*) FROM schema_migrations", ()).await?;
        let row = rows.next().await?.expect("count row");
        assert_eq!(row.get::<i64>(0)?, 3);
        Ok(())
    }
}
