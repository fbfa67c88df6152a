//! Outbound alert delivery
//!
//! Each channel kind has one `Notifier`. The `NotificationRouter` decides when
//! a result is worth alerting on and fans it out to every channel bound to the
//! monitor, isolating failures per channel.

pub mod email;
pub mod ntfy;
pub mod router;
pub mod webhook;

pub use email::{EmailNotifier, EmailSettings};
pub use ntfy::NtfyNotifier;
pub use router::{DispatchReport, NotificationRouter, should_notify};
pub use webhook::WebhookNotifier;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::models::{CheckResult, NotificationChannel};

/// Outcome of a successful `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Nothing was sent and nothing went wrong, e.g. no mail transport configured
    Skipped(String),
}

/// What gets delivered: the rendered message plus the result it describes
#[derive(Debug, Clone)]
pub struct Notification {
    pub monitor_name: String,
    /// Result message prefixed with the status glyph
    pub message: String,
    pub result: CheckResult,
}

impl Notification {
    pub fn new(monitor_name: impl Into<String>, result: CheckResult) -> Self {
        let message = format!("{} {}", result.status.glyph(), result.message);
        Self { monitor_name: monitor_name.into(), message, result }
    }

    /// "<monitor> is <STATUS>"
    pub fn title(&self) -> String {
        format!("{} is {}", self.monitor_name, self.result.status.as_str().to_uppercase())
    }
}

/// Delivery adapter for one channel kind
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel kind this notifier handles, as stored on `NotificationChannel::kind`
    fn kind(&self) -> &'static str;

    async fn send(
        &self,
        channel: &NotificationChannel,
        notification: &Notification,
    ) -> Result<Delivery, NotifyError>;
}

/// Notifiers by channel kind
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: HashMap<&'static str, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a notifier, replacing any previous one for the same kind
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.kind(), notifier);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers.get(kind.trim().to_ascii_lowercase().as_str()).cloned()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.notifiers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckStatus;
    use uuid::Uuid;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        fn kind(&self) -> &'static str {
            "null"
        }

        async fn send(&self, _: &NotificationChannel, _: &Notification) -> Result<Delivery, NotifyError> {
            Ok(Delivery::Sent)
        }
    }

    #[test]
    fn test_notification_prefixes_glyph() {
        let result = CheckResult::down(Uuid::new_v4(), "connection refused");
        let notification = Notification::new("api", result);

        assert_eq!(notification.message, "🔴 connection refused");
        assert_eq!(notification.title(), "api is DOWN");
        assert_eq!(notification.result.status, CheckStatus::Down);
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let mut registry = NotifierRegistry::new();
        registry.register(Arc::new(NullNotifier));

        assert!(registry.get("null").is_some());
        assert!(registry.get(" NULL ").is_some());
        assert!(registry.get("slack").is_none());
        assert_eq!(registry.kinds(), vec!["null"]);
    }
}
