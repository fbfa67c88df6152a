use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::CheckError;
use crate::models::{CheckResult, CheckStatus, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushConfig {
    heartbeat_seconds: u64,
    #[serde(default)]
    last_heartbeat_at: Option<DateTime<Utc>>,
}

/// Heartbeat checker - the monitored system pushes to us, we only compare clocks
pub struct PushChecker;

/// Up iff a heartbeat arrived no more than `heartbeat_seconds` before `now`
pub fn evaluate_heartbeat(
    now: DateTime<Utc>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    heartbeat_seconds: u64,
) -> (CheckStatus, String, Option<i64>) {
    let Some(last) = last_heartbeat_at else {
        return (CheckStatus::Down, "No heartbeat received yet".to_string(), None);
    };

    let since = (now - last).num_seconds();
    if since <= i64::try_from(heartbeat_seconds).unwrap_or(i64::MAX) {
        (CheckStatus::Up, format!("Heartbeat received {since}s ago"), Some(since))
    } else {
        (
            CheckStatus::Down,
            format!("No heartbeat for {since}s (expected every {heartbeat_seconds}s)"),
            Some(since),
        )
    }
}

#[async_trait::async_trait]
impl Checker for PushChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Push
    }

    async fn check(&self, monitor: &Monitor, _timeout: Duration) -> Result<CheckResult, CheckError> {
        let config: PushConfig = parse_config(monitor)?;
        if config.heartbeat_seconds == 0 {
            return Err(CheckError::config("Push monitor requires heartbeatSeconds greater than 0"));
        }

        let (status, message, since) =
            evaluate_heartbeat(Utc::now(), config.last_heartbeat_at, config.heartbeat_seconds);

        let result = match status {
            CheckStatus::Up => CheckResult::up(monitor.id, message),
            _ => CheckResult::down(monitor.id, message),
        };
        Ok(result.with_latency(0).with_meta("secondsSinceHeartbeat", since))
    }
}
