use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Meta key every result carries once it leaves the engine
pub const LATENCY_KEY: &str = "latencyMs";

/// Status of a monitoring check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    Pending,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
            CheckStatus::Pending => "pending",
        }
    }

    /// Glyph prefixed to notification messages
    pub fn glyph(&self) -> &'static str {
        match self {
            CheckStatus::Up => "✅",
            CheckStatus::Down => "🔴",
            CheckStatus::Pending => "🟡",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(CheckStatus::Up),
            "down" => Ok(CheckStatus::Down),
            "pending" => Ok(CheckStatus::Pending),
            other => Err(format!("Unknown check status: {other}")),
        }
    }
}

/// Result of a monitoring check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// UUID of the monitor that was checked
    pub monitor_id: Uuid,

    /// Status of the check (up/down/pending)
    pub status: CheckStatus,

    /// Human-readable outcome
    pub message: String,

    /// Timestamp when the check was performed
    pub checked_at: DateTime<Utc>,

    /// Kind-specific payload (latency, resolved IP, answers, ...)
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl CheckResult {
    fn with_status(monitor_id: Uuid, status: CheckStatus, message: impl Into<String>) -> Self {
        Self { monitor_id, status, message: message.into(), checked_at: Utc::now(), meta: Map::new() }
    }

    /// Create a successful check result
    pub fn up(monitor_id: Uuid, message: impl Into<String>) -> Self {
        Self::with_status(monitor_id, CheckStatus::Up, message)
    }

    /// Create a failed check result
    pub fn down(monitor_id: Uuid, message: impl Into<String>) -> Self {
        Self::with_status(monitor_id, CheckStatus::Down, message)
    }

    /// Create an indeterminate result (maintenance boundaries, warming up)
    pub fn pending(monitor_id: Uuid, message: impl Into<String>) -> Self {
        Self::with_status(monitor_id, CheckStatus::Pending, message)
    }

    /// Attach a meta entry
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    /// Attach the measured latency
    pub fn with_latency(self, latency_ms: u64) -> Self {
        self.with_meta(LATENCY_KEY, latency_ms)
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.meta.get(LATENCY_KEY).and_then(Value::as_u64)
    }

    pub fn is_up(&self) -> bool {
        self.status == CheckStatus::Up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&CheckStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!("down".parse::<CheckStatus>().unwrap(), CheckStatus::Down);
        assert!("degraded".parse::<CheckStatus>().is_err());
    }

    #[test]
    fn test_builder_attaches_meta() {
        let result = CheckResult::up(Uuid::new_v4(), "200 OK").with_latency(42).with_meta("statusCode", 200);

        assert!(result.is_up());
        assert_eq!(result.latency_ms(), Some(42));
        assert_eq!(result.meta["statusCode"], 200);
    }
}
