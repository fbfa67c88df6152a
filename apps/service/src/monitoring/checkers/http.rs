use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::{Client, Method};
use serde::Deserialize;
use url::Url;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpConfig {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    expected_status: Option<u16>,
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    ignore_tls: bool,
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: Client,
    insecure_client: Client,
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let client = Client::builder().user_agent("uppe-sentinel").build()?;
        let insecure_client = Client::builder()
            .user_agent("uppe-sentinel")
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { client, insecure_client })
    }
}

/// Validated request parameters
struct HttpRequest {
    url: Url,
    method: Method,
    config: HttpConfig,
}

fn validate(monitor: &Monitor) -> Result<HttpRequest, CheckError> {
    let config: HttpConfig = parse_config(monitor)?;

    let url = Url::parse(&config.url)
        .map_err(|e| CheckError::config(format!("Invalid URL '{}': {e}", config.url)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(CheckError::config(format!("Invalid scheme for HTTP monitor: {other}"))),
    }

    let method = match config.method.as_deref() {
        None | Some("") => Method::GET,
        Some(raw) => Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
            .map_err(|_| CheckError::config(format!("Invalid HTTP method: {raw}")))?,
    };

    Ok(HttpRequest { url, method, config })
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Http
    }

    async fn check(&self, monitor: &Monitor, timeout: Duration) -> Result<CheckResult, CheckError> {
        let HttpRequest { url, method, config } = validate(monitor)?;

        let client = if config.ignore_tls { &self.insecure_client } else { &self.client };
        let mut request = client.request(method, url).timeout(timeout);
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &config.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(CheckResult::down(
                    monitor.id,
                    format!("Request timed out after {}s", timeout.as_secs()),
                )
                .with_latency(elapsed_ms(start)));
            }
            Err(e) => {
                return Ok(CheckResult::down(monitor.id, format!("HTTP request failed: {e}"))
                    .with_latency(elapsed_ms(start)));
            }
        };

        let status = response.status();
        let status_code = status.as_u16();

        let status_ok = match config.expected_status {
            Some(expected) => status_code == expected,
            // Consider 2xx and 3xx as success
            None => status.is_success() || status.is_redirection(),
        };

        if !status_ok {
            let message = match config.expected_status {
                Some(expected) => format!("Expected status {expected}, got {status_code}"),
                None => format!("HTTP check failed with status code: {status_code}"),
            };
            return Ok(CheckResult::down(monitor.id, message)
                .with_latency(elapsed_ms(start))
                .with_meta("statusCode", status_code));
        }

        if let Some(keyword) = config.keyword.as_deref().filter(|k| !k.is_empty()) {
            let body = match tokio::time::timeout(timeout.saturating_sub(start.elapsed()), response.text()).await {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    return Ok(CheckResult::down(monitor.id, format!("Failed to read response body: {e}"))
                        .with_latency(elapsed_ms(start))
                        .with_meta("statusCode", status_code));
                }
                Err(_) => {
                    return Ok(CheckResult::down(
                        monitor.id,
                        format!("Request timed out after {}s", timeout.as_secs()),
                    )
                    .with_latency(elapsed_ms(start))
                    .with_meta("statusCode", status_code));
                }
            };

            if !body.contains(keyword) {
                return Ok(CheckResult::down(monitor.id, format!("Keyword '{keyword}' not found in response"))
                    .with_latency(elapsed_ms(start))
                    .with_meta("statusCode", status_code));
            }
        }

        Ok(CheckResult::up(monitor.id, format!("{status}"))
            .with_latency(elapsed_ms(start))
            .with_meta("statusCode", status_code))
    }
}
