use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{Delivery, Notification, Notifier};
use crate::error::NotifyError;
use crate::models::{CheckStatus, NotificationChannel};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 512;

/// JSON body POSTed to webhook channels
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEnvelope<'a> {
    monitor_name: &'a str,
    status: CheckStatus,
    message: &'a str,
    checked_at: DateTime<Utc>,
    meta: &'a Map<String, Value>,
}

/// POSTs a JSON envelope to the channel's `url`
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("uppe-sentinel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        notification: &Notification,
    ) -> Result<Delivery, NotifyError> {
        let url = channel
            .setting("url")
            .ok_or(NotifyError::MissingConfig { channel: "webhook", field: "url" })?;
        let url = reqwest::Url::parse(&url).map_err(|e| NotifyError::InvalidConfig {
            channel: "webhook",
            reason: format!("url '{url}': {e}"),
        })?;

        let envelope = WebhookEnvelope {
            monitor_name: &notification.monitor_name,
            status: notification.result.status,
            message: &notification.message,
            checked_at: notification.result.checked_at,
            meta: &notification.result.meta,
        };

        let mut request = self.client.post(url.clone()).json(&envelope);
        if let Some(Value::Object(headers)) = channel.config.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }

        debug!(channel = %channel.name, %url, "Sending webhook notification");
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(Delivery::Sent)
        } else {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
                body.truncate(cut);
            }
            Err(NotifyError::Rejected { status: status.as_u16(), body })
        }
    }
}
