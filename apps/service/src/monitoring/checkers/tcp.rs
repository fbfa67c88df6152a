use std::io::ErrorKind;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::time::timeout;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

#[derive(Debug, Deserialize)]
struct TcpConfig {
    host: String,
    port: u16,
}

/// TCP port checker - pure connect probe
pub struct TcpChecker;

#[async_trait::async_trait]
impl Checker for TcpChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Tcp
    }

    async fn check(&self, monitor: &Monitor, limit: Duration) -> Result<CheckResult, CheckError> {
        let config: TcpConfig = parse_config(monitor)?;
        let host = config.host.trim();
        if host.is_empty() {
            return Err(CheckError::config("TCP monitor requires a non-empty host"));
        }
        if config.port == 0 {
            return Err(CheckError::config("TCP monitor requires a port between 1 and 65535"));
        }
        let address = format!("{host}:{}", config.port);

        let start = Instant::now();
        let result = match timeout(limit, tokio::net::TcpStream::connect(address.as_str())).await {
            Ok(Ok(_stream)) => CheckResult::up(monitor.id, format!("Connected to {address}")),
            Err(_) => CheckResult::down(
                monitor.id,
                format!("TCP connection timeout after {}s", limit.as_secs()),
            ),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                CheckResult::down(monitor.id, format!("Connection refused by {address}"))
            }
            Ok(Err(e)) => CheckResult::down(monitor.id, format!("TCP connection failed: {e}")),
        };

        Ok(result.with_latency(elapsed_ms(start)).with_meta("address", address))
    }
}
