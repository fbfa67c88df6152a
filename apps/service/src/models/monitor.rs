use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Protocol a monitor is checked with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Http,
    Tcp,
    Ping,
    Dns,
    Container,
    Certificate,
    Database,
    Synthetic,
    Grpc,
    Push,
}

impl MonitorKind {
    pub const ALL: [MonitorKind; 10] = [
        MonitorKind::Http,
        MonitorKind::Tcp,
        MonitorKind::Ping,
        MonitorKind::Dns,
        MonitorKind::Container,
        MonitorKind::Certificate,
        MonitorKind::Database,
        MonitorKind::Synthetic,
        MonitorKind::Grpc,
        MonitorKind::Push,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Http => "http",
            MonitorKind::Tcp => "tcp",
            MonitorKind::Ping => "ping",
            MonitorKind::Dns => "dns",
            MonitorKind::Container => "container",
            MonitorKind::Certificate => "certificate",
            MonitorKind::Database => "database",
            MonitorKind::Synthetic => "synthetic",
            MonitorKind::Grpc => "grpc",
            MonitorKind::Push => "push",
        }
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MonitorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown monitor kind: {s}"))
    }
}

/// Monitor definition - a configured check
///
/// `config` holds the kind-specific parameters; each adapter deserializes and
/// validates its own shape before doing any I/O.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: Uuid,
    pub name: String,
    pub kind: MonitorKind,
    #[serde(default)]
    pub config: serde_json::Value,
    pub interval_seconds: u64,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub channel_ids: Vec<Uuid>,
    #[serde(default)]
    pub maintenance_window_ids: Vec<Uuid>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Monitor {
    /// Create a new monitor with a 60 second interval and no explicit timeout
    pub fn new(name: impl Into<String>, kind: MonitorKind, config: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            config,
            interval_seconds: 60,
            timeout_seconds: None,
            tags: Vec::new(),
            channel_ids: Vec::new(),
            maintenance_window_ids: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Effective timeout, falling back to `default` when the monitor has none
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_seconds.filter(|secs| *secs > 0).map(Duration::from_secs).unwrap_or(default)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in MonitorKind::ALL {
            assert_eq!(kind.as_str().parse::<MonitorKind>().unwrap(), kind);
        }
        assert!("smtp".parse::<MonitorKind>().is_err());
    }

    #[test]
    fn test_timeout_falls_back_to_default() {
        let monitor = Monitor::new("api", MonitorKind::Http, serde_json::json!({}));
        assert_eq!(monitor.timeout_or(Duration::from_secs(30)), Duration::from_secs(30));

        let monitor = monitor.with_timeout(5);
        assert_eq!(monitor.timeout_or(Duration::from_secs(30)), Duration::from_secs(5));
    }

    #[test]
    fn test_monitor_deserializes_from_camel_case() {
        let monitor: Monitor = serde_json::from_value(serde_json::json!({
            "id": "6f1c64a1-6d0c-4c5e-8a77-2d3c7b1f9e10",
            "name": "db",
            "kind": "database",
            "config": { "variant": "postgres" },
            "intervalSeconds": 30,
            "timeoutSeconds": 10
        }))
        .unwrap();

        assert_eq!(monitor.kind, MonitorKind::Database);
        assert_eq!(monitor.timeout_seconds, Some(10));
        assert!(monitor.enabled);
        assert!(monitor.channel_ids.is_empty());
    }
}
