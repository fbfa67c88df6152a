use std::time::{Duration, Instant};

use serde::Deserialize;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use url::Url;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

#[derive(Debug, Deserialize)]
struct GrpcConfig {
    url: String,
    #[serde(default)]
    service: Option<String>,
}

/// gRPC health-checking protocol checker (`grpc.health.v1.Health/Check`)
pub struct GrpcChecker;

fn endpoint(raw: &str, timeout: Duration) -> Result<Endpoint, CheckError> {
    let url = Url::parse(raw).map_err(|e| CheckError::config(format!("Invalid gRPC URL '{raw}': {e}")))?;
    let secure = match url.scheme() {
        "http" => false,
        "https" => true,
        other => return Err(CheckError::config(format!("Invalid scheme for gRPC monitor: {other}"))),
    };

    let mut endpoint = Endpoint::from_shared(raw.to_string())
        .map_err(|e| CheckError::config(format!("Invalid gRPC URL '{raw}': {e}")))?
        .connect_timeout(timeout)
        .timeout(timeout);
    if secure {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| CheckError::config(format!("Invalid TLS settings for '{raw}': {e}")))?;
    }
    Ok(endpoint)
}

fn status_label(code: i32) -> &'static str {
    ServingStatus::try_from(code).map(|status| status.as_str_name()).unwrap_or("UNRECOGNIZED")
}

#[async_trait::async_trait]
impl Checker for GrpcChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Grpc
    }

    async fn check(&self, monitor: &Monitor, timeout: Duration) -> Result<CheckResult, CheckError> {
        let config: GrpcConfig = parse_config(monitor)?;
        let endpoint = endpoint(config.url.trim(), timeout)?;
        let service = config.service.unwrap_or_default();

        let start = Instant::now();
        let call = async {
            let channel = endpoint.connect().await.map_err(|e| format!("Connection failed: {e}"))?;
            HealthClient::new(channel)
                .check(HealthCheckRequest { service: service.clone() })
                .await
                .map(|response| response.into_inner().status)
                .map_err(|status| format!("Health check failed: {} ({:?})", status.message(), status.code()))
        };

        let result = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(code)) if code == ServingStatus::Serving as i32 => {
                CheckResult::up(monitor.id, "SERVING").with_meta("servingStatus", status_label(code))
            }
            Ok(Ok(code)) => {
                let label = status_label(code);
                CheckResult::down(monitor.id, format!("Service reported {label}")).with_meta("servingStatus", label)
            }
            Ok(Err(message)) => CheckResult::down(monitor.id, message),
            Err(_) => CheckResult::down(monitor.id, format!("Health check timed out after {}s", timeout.as_secs())),
        };

        Ok(result.with_latency(elapsed_ms(start)).with_meta("service", service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckStatus;
    use serde_json::json;

    #[test]
    fn test_status_labels() {
        assert_eq!(status_label(ServingStatus::Serving as i32), "SERVING");
        assert_eq!(status_label(ServingStatus::NotServing as i32), "NOT_SERVING");
        assert_eq!(status_label(42), "UNRECOGNIZED");
    }

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        let monitor = Monitor::new("rpc", MonitorKind::Grpc, json!({ "url": "grpc://svc:50051" }));
        let err = GrpcChecker.check(&monitor, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid scheme for gRPC monitor: grpc");
    }

    /// Local health server; the whole server is SERVING and `sentinel.Store` starts NOT_SERVING
    async fn health_server() -> (tonic_health::server::HealthReporter, String) {
        let (mut reporter, service) = tonic_health::server::health_reporter();
        reporter.set_service_status("sentinel.Store", tonic_health::ServingStatus::NotServing).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener)),
        );
        (reporter, url)
    }

    fn monitor(url: &str, service: Option<&str>) -> Monitor {
        Monitor::new("rpc", MonitorKind::Grpc, json!({ "url": url, "service": service }))
    }

    #[tokio::test]
    async fn test_only_serving_is_up() {
        let (mut reporter, url) = health_server().await;
        let timeout = Duration::from_secs(5);

        let whole = GrpcChecker.check(&monitor(&url, None), timeout).await.unwrap();
        assert_eq!(whole.status, CheckStatus::Up);
        assert_eq!(whole.meta["servingStatus"], "SERVING");

        let store = GrpcChecker.check(&monitor(&url, Some("sentinel.Store")), timeout).await.unwrap();
        assert_eq!(store.status, CheckStatus::Down);
        assert_eq!(store.meta["servingStatus"], "NOT_SERVING");

        reporter.set_service_status("sentinel.Store", tonic_health::ServingStatus::Serving).await;
        let store = GrpcChecker.check(&monitor(&url, Some("sentinel.Store")), timeout).await.unwrap();
        assert_eq!(store.status, CheckStatus::Up);
    }

    #[tokio::test]
    async fn test_unknown_service_is_down() {
        let (_reporter, url) = health_server().await;

        let result = GrpcChecker.check(&monitor(&url, Some("sentinel.Missing")), Duration::from_secs(5)).await.unwrap();

        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.message.starts_with("Health check failed"), "{}", result.message);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_down() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let monitor = Monitor::new("rpc", MonitorKind::Grpc, json!({ "url": format!("http://127.0.0.1:{port}") }));

        let result = GrpcChecker.check(&monitor, Duration::from_secs(2)).await.unwrap();

        assert_eq!(result.status, CheckStatus::Down);
        assert!(result.latency_ms().is_some());
    }
}
