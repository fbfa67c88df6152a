use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

/// `PING example.com (93.184.216.34)` on unix, `Pinging example.com [93.184.216.34]` on Windows
static RESOLVED_IP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\(|\[)([0-9a-fA-F:.]+)(?:\)|\])").expect("valid regex"));

/// `time=12.3 ms`, `time<1ms`
static ROUND_TRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time[=<]\s*([0-9.]+)\s*ms").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct PingConfig {
    host: String,
    #[serde(default = "default_count")]
    count: u32,
}

fn default_count() -> u32 {
    1
}

/// ICMP checker backed by the system `ping` utility, which already carries
/// the privileges raw sockets would need
pub struct PingChecker;

/// Reply wait per packet, so that all `count` packets fit inside `limit`
fn packet_wait(limit: Duration, count: u32) -> Duration {
    limit / count.max(1)
}

/// Platform-specific ping arguments
fn ping_args(host: &str, count: u32, timeout: Duration) -> Vec<String> {
    let secs = timeout.as_secs().max(1);
    if cfg!(target_os = "windows") {
        vec!["-n".into(), count.to_string(), "-w".into(), timeout.as_millis().max(1).to_string(), host.into()]
    } else if cfg!(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd")) {
        vec!["-c".into(), count.to_string(), "-t".into(), secs.to_string(), host.into()]
    } else {
        vec!["-c".into(), count.to_string(), "-W".into(), secs.to_string(), host.into()]
    }
}

/// First address reported in the ping banner
pub fn parse_resolved_ip(output: &str) -> Option<String> {
    let first_line = output.lines().find(|line| !line.trim().is_empty())?;
    RESOLVED_IP.captures(first_line).map(|caps| caps[1].to_string())
}

/// First round-trip time in milliseconds
pub fn parse_round_trip(output: &str) -> Option<f64> {
    ROUND_TRIP.captures(output).and_then(|caps| caps[1].parse().ok())
}

#[async_trait::async_trait]
impl Checker for PingChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Ping
    }

    async fn check(&self, monitor: &Monitor, limit: Duration) -> Result<CheckResult, CheckError> {
        let config: PingConfig = parse_config(monitor)?;
        let host = config.host.trim();
        if host.is_empty() || host.starts_with('-') || host.contains(char::is_whitespace) {
            return Err(CheckError::config(format!("Invalid ping host: '{}'", config.host)));
        }
        let count = config.count.clamp(1, 10);

        let mut command = Command::new("ping");
        command.args(ping_args(host, count, packet_wait(limit, count))).kill_on_drop(true);

        let start = Instant::now();
        let output = match tokio::time::timeout(limit, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CheckError::probe(format!("Failed to run ping: {e}"))),
            Err(_) => {
                return Ok(CheckResult::down(monitor.id, format!("Ping timed out after {}s", limit.as_secs()))
                    .with_latency(elapsed_ms(start)));
            }
        };
        let elapsed = elapsed_ms(start);

        let stdout = String::from_utf8_lossy(&output.stdout);
        let resolved_ip = parse_resolved_ip(&stdout);
        let round_trip = parse_round_trip(&stdout);

        let result = if output.status.success() {
            CheckResult::up(monitor.id, format!("{host} is reachable"))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr
                .lines()
                .chain(stdout.lines())
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("no reply");
            CheckResult::down(monitor.id, format!("Ping to {host} failed: {detail}"))
        };

        // Prefer the utility's own round trip over process start-up time
        let latency = round_trip.map(|ms| ms.round() as u64).unwrap_or(elapsed);
        Ok(result
            .with_latency(latency)
            .with_meta("resolvedIp", resolved_ip)
            .with_meta("rttMs", round_trip))
    }
}
