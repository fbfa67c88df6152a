use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Delivery, Notification, Notifier};
use crate::error::NotifyError;
use crate::models::NotificationChannel;

type SmtpTransport = AsyncSmtpTransport<Tokio1Executor>;

const FALLBACK_SENDER: &str = "uppe-sentinel@localhost";
const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

/// SMTP connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Implicit TLS. Defaults to true on port 465, otherwise STARTTLS is
    /// attempted opportunistically.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
}

impl EmailSettings {
    /// Settings from `SMTP_*` environment variables, if `SMTP_HOST` is set
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Some(Self {
            host: get("SMTP_HOST")?,
            port: get("SMTP_PORT").and_then(|p| p.parse().ok()),
            username: get("SMTP_USERNAME"),
            password: get("SMTP_PASSWORD"),
            from: get("SMTP_FROM"),
            secure: get("SMTP_SECURE").map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
        })
    }

    /// Per-channel settings, present when the channel names its own `smtpHost`
    pub fn from_channel(channel: &NotificationChannel) -> Result<Option<Self>, NotifyError> {
        let Some(host) = channel.setting("smtpHost") else {
            return Ok(None);
        };

        let port = channel
            .setting("smtpPort")
            .map(|p| {
                p.parse::<u16>().map_err(|_| NotifyError::InvalidConfig {
                    channel: "email",
                    reason: format!("smtpPort '{p}' is not a valid port"),
                })
            })
            .transpose()?;

        Ok(Some(Self {
            host,
            port,
            username: channel.setting("smtpUsername"),
            password: channel.setting("smtpPassword"),
            from: channel.setting("from"),
            secure: channel.setting("smtpSecure").map(|v| v.eq_ignore_ascii_case("true")),
        }))
    }

    fn is_secure(&self) -> bool {
        self.secure.unwrap_or(self.port == Some(465))
    }

    fn build_transport(&self) -> Result<SmtpTransport, NotifyError> {
        let smtp_err = |e: lettre::transport::smtp::Error| NotifyError::Email(e.to_string());

        let builder = if self.is_secure() {
            SmtpTransport::relay(&self.host).map_err(smtp_err)?.port(self.port.unwrap_or(465))
        } else {
            let tls = TlsParameters::new(self.host.clone()).map_err(smtp_err)?;
            SmtpTransport::builder_dangerous(&self.host)
                .port(self.port.unwrap_or(587))
                .tls(Tls::Opportunistic(tls))
        };

        let builder = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        Ok(builder.timeout(Some(SMTP_TIMEOUT)).build())
    }
}

/// Email notifier
///
/// A channel with its own `smtpHost` gets a transport built for that send.
/// Everything else shares one global transport, built on first use from the
/// service settings and kept until `shutdown`.
pub struct EmailNotifier {
    global: Option<EmailSettings>,
    transport: Mutex<Option<Arc<SmtpTransport>>>,
}

impl EmailNotifier {
    pub fn new(global: Option<EmailSettings>) -> Self {
        Self { global, transport: Mutex::new(None) }
    }

    /// Drop the shared transport and its pooled connections
    pub async fn shutdown(&self) {
        if self.transport.lock().await.take().is_some() {
            info!("Email transport closed");
        }
    }

    async fn global_transport(&self) -> Result<Option<Arc<SmtpTransport>>, NotifyError> {
        let Some(settings) = &self.global else {
            return Ok(None);
        };

        let mut cached = self.transport.lock().await;
        if let Some(transport) = cached.as_ref() {
            return Ok(Some(transport.clone()));
        }

        debug!(host = %settings.host, "Building shared SMTP transport");
        let transport = Arc::new(settings.build_transport()?);
        *cached = Some(transport.clone());
        Ok(Some(transport))
    }

    fn sender(&self, channel: &NotificationChannel, settings: Option<&EmailSettings>) -> String {
        channel
            .setting("from")
            .or_else(|| settings.and_then(|s| s.from.clone()))
            .or_else(|| settings.and_then(|s| s.username.clone()).filter(|u| u.contains('@')))
            .unwrap_or_else(|| FALLBACK_SENDER.to_string())
    }
}

fn parse_mailbox(address: &str, field: &str) -> Result<Mailbox, NotifyError> {
    address.parse::<Mailbox>().map_err(|e| NotifyError::InvalidConfig {
        channel: "email",
        reason: format!("{field} address '{address}': {e}"),
    })
}

fn build_message(
    from: &str,
    recipients: &[String],
    notification: &Notification,
) -> Result<Message, NotifyError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(from, "from")?)
        .subject(format!("[Uppe] {}", notification.title()));
    for recipient in recipients {
        builder = builder.to(parse_mailbox(recipient, "to")?);
    }

    let body = format!(
        "{}\n\nMonitor: {}\nStatus: {}\nChecked at: {}\n",
        notification.message,
        notification.monitor_name,
        notification.result.status,
        notification.result.checked_at.to_rfc3339(),
    );

    builder
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|e| NotifyError::Email(e.to_string()))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn kind(&self) -> &'static str {
        "email"
    }

    async fn send(
        &self,
        channel: &NotificationChannel,
        notification: &Notification,
    ) -> Result<Delivery, NotifyError> {
        let recipients = channel.list_setting("to");
        if recipients.is_empty() {
            return Err(NotifyError::MissingConfig { channel: "email", field: "to" });
        }

        let channel_settings = EmailSettings::from_channel(channel)?;
        let (transport, from) = match &channel_settings {
            Some(settings) => (Arc::new(settings.build_transport()?), self.sender(channel, Some(settings))),
            None => match self.global_transport().await? {
                Some(transport) => (transport, self.sender(channel, self.global.as_ref())),
                None => {
                    warn!(channel = %channel.name, "No SMTP transport configured, skipping email notification");
                    return Ok(Delivery::Skipped("no SMTP transport configured".to_string()));
                }
            },
        };

        let message = build_message(&from, &recipients, notification)?;
        transport.send(message).await.map_err(|e| NotifyError::Email(e.to_string()))?;

        debug!(channel = %channel.name, recipients = recipients.len(), "Email notification sent");
        Ok(Delivery::Sent)
    }
}
