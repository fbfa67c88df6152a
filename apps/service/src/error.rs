use thiserror::Error;

use crate::models::MonitorKind;

/// Failure inside a single check attempt
///
/// Display is the bare message: the engine turns this error into a down
/// result whose message is exactly this text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckError {
    /// Monitor config missing or malformed, raised before any I/O
    #[error("{0}")]
    Config(String),

    /// Protocol-level failure while probing
    #[error("{0}")]
    Probe(String),
}

impl CheckError {
    pub fn config(message: impl Into<String>) -> Self {
        CheckError::Config(message.into())
    }

    pub fn probe(message: impl Into<String>) -> Self {
        CheckError::Probe(message.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, CheckError::Config(_))
    }
}

/// Errors `CheckEngine::run_monitor` can surface to its caller
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("No adapter registered for monitor kind '{0}'")]
    NoAdapter(MonitorKind),

    #[error("Adapter for '{0}' does not support this monitor's configuration")]
    Unsupported(MonitorKind),
}

/// Notification delivery failure
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{channel} channel is missing required setting '{field}'")]
    MissingConfig { channel: &'static str, field: &'static str },

    #[error("Invalid {channel} channel setting: {reason}")]
    InvalidConfig { channel: &'static str, reason: String },

    #[error("Endpoint rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Email delivery failed: {0}")]
    Email(String),
}

/// Delayed-job facility failure
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue is shut down")]
    Closed,

    #[error("Job queue backend error: {0}")]
    Backend(String),
}
