use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Delivery, Notification, Notifier};
use crate::error::NotifyError;
use crate::models::{CheckStatus, NotificationChannel};

pub const DEFAULT_SERVER: &str = "https://ntfy.sh";

/// Line prefix carrying the click-through URL inside a message
const LINK_MARKER: &str = "Link: ";

/// Push-topic notifier speaking the ntfy publish API
///
/// The message is the plain-text body; title, tags, priority and the optional
/// click URL travel as headers.
pub struct NtfyNotifier {
    client: Client,
    default_server: String,
}

impl NtfyNotifier {
    pub fn new(default_server: impl Into<String>) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, default_server: default_server.into() })
    }
}

/// Split the click-through link out of a message
///
/// The first line starting with `Link: ` is removed from the body and its URL
/// returned.
pub fn extract_click(message: &str) -> (String, Option<String>) {
    let mut click = None;
    let mut lines = Vec::new();

    for line in message.lines() {
        if click.is_none() {
            let url = line.trim_start().strip_prefix(LINK_MARKER).map(str::trim).unwrap_or_default();
            if !url.is_empty() {
                click = Some(url.to_string());
                continue;
            }
        }
        lines.push(line);
    }

    (lines.join("\n").trim_end().to_string(), click)
}

fn default_tag(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Up => "white_check_mark",
        CheckStatus::Down => "rotating_light",
        CheckStatus::Pending => "warning",
    }
}

#[async_trait]
impl Notifier for NtfyNotifier {
    fn kind(&self) -> &'static str {
        "ntfy"
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        notification: &Notification,
    ) -> Result<Delivery, NotifyError> {
        let topic =
            channel.setting("topic").ok_or(NotifyError::MissingConfig { channel: "ntfy", field: "topic" })?;
        let server = channel.setting("server").unwrap_or_else(|| self.default_server.clone());
        let url = format!("{}/{}", server.trim_end_matches('/'), topic.trim_matches('/'));
        let url = reqwest::Url::parse(&url)
            .map_err(|e| NotifyError::InvalidConfig { channel: "ntfy", reason: format!("url '{url}': {e}") })?;

        let (body, click) = extract_click(&notification.message);
        let status = notification.result.status;

        let mut tags = channel.list_setting("tags");
        if tags.is_empty() {
            tags.push(default_tag(status).to_string());
        }
        let priority = channel
            .setting("priority")
            .unwrap_or_else(|| if status == CheckStatus::Down { "high" } else { "default" }.to_string());

        let mut request = self
            .client
            .post(url.clone())
            .header("Title", notification.title())
            .header("Tags", tags.join(","))
            .header("Priority", priority)
            .body(body);
        if let Some(click) = click {
            request = request.header("Click", click);
        }
        if let Some(token) = channel.setting("token") {
            request = request.bearer_auth(token);
        }

        debug!(channel = %channel.name, %url, "Publishing ntfy notification");
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(Delivery::Sent)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected { status: status.as_u16(), body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckResult;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_string, header, headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_click_strips_marker_line() {
        let (body, click) = extract_click("Service down\nLink: https://status.example.com/api\nretrying");
        assert_eq!(body, "Service down\nretrying");
        assert_eq!(click.as_deref(), Some("https://status.example.com/api"));
    }

    #[test]
    fn test_extract_click_without_marker() {
        let (body, click) = extract_click("all good");
        assert_eq!(body, "all good");
        assert!(click.is_none());
    }

    #[tokio::test]
    async fn test_missing_topic_rejects() {
        let notifier = NtfyNotifier::new(DEFAULT_SERVER).unwrap();
        let channel = NotificationChannel::new("phone", "ntfy", json!({}));
        let notification = Notification::new("api", CheckResult::down(Uuid::new_v4(), "down"));

        let err = notifier.send(&channel, &notification).await.unwrap_err();
        assert!(matches!(err, NotifyError::MissingConfig { field: "topic", .. }));
    }

    #[tokio::test]
    async fn test_publishes_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/alerts"))
            .and(header("Title", "api is DOWN"))
            .and(header("Tags", "rotating_light"))
            .and(header("Priority", "high"))
            .and(header("Click", "https://status.example.com"))
            .and(header("Authorization", "Bearer tk_secret"))
            .and(body_string("🔴 HTTP 500"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = NtfyNotifier::new(server.uri()).unwrap();
        let channel = NotificationChannel::new("phone", "ntfy", json!({"topic": "alerts", "token": "tk_secret"}));
        let result = CheckResult::down(Uuid::new_v4(), "HTTP 500\nLink: https://status.example.com");
        let notification = Notification::new("api", result);

        assert_eq!(notifier.send(&channel, &notification).await.unwrap(), Delivery::Sent);
    }

    #[tokio::test]
    async fn test_channel_server_and_tags_override_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ops"))
            .and(headers("Tags", vec!["prod", "db"]))
            .and(header("Priority", "5"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = NtfyNotifier::new("http://127.0.0.1:9").unwrap();
        let channel = NotificationChannel::new(
            "phone",
            "ntfy",
            json!({"topic": "ops", "server": server.uri(), "tags": ["prod", "db"], "priority": 5}),
        );
        let notification = Notification::new("db", CheckResult::up(Uuid::new_v4(), "recovered"));

        assert_eq!(notifier.send(&channel, &notification).await.unwrap(), Delivery::Sent);
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(403)).mount(&server).await;

        let notifier = NtfyNotifier::new(server.uri()).unwrap();
        let channel = NotificationChannel::new("phone", "ntfy", json!({"topic": "alerts"}));
        let notification = Notification::new("api", CheckResult::up(Uuid::new_v4(), "ok"));

        let err = notifier.send(&channel, &notification).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 403, .. }));
    }
}
