use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, Instant};

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::RecordType;
use serde::Deserialize;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

const SUPPORTED_RECORDS: [RecordType; 10] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::CNAME,
    RecordType::MX,
    RecordType::NS,
    RecordType::TXT,
    RecordType::SOA,
    RecordType::SRV,
    RecordType::PTR,
    RecordType::CAA,
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DnsConfig {
    hostname: String,
    #[serde(default)]
    record_type: Option<String>,
    #[serde(default)]
    resolver: Option<String>,
}

/// DNS record checker
pub struct DnsChecker;

/// Parse `1.1.1.1`, `1.1.1.1:5353` or `[2606:4700::1111]:53`
fn parse_resolver(raw: &str) -> Result<SocketAddr, CheckError> {
    let raw = raw.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| CheckError::config(format!("Invalid DNS resolver address: '{raw}'")))
}

fn parse_record_type(raw: Option<&str>) -> Result<RecordType, CheckError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("A");
    RecordType::from_str(&raw.to_ascii_uppercase())
        .ok()
        .filter(|record| SUPPORTED_RECORDS.contains(record))
        .ok_or_else(|| CheckError::config(format!("Unsupported DNS record type: {raw}")))
}

fn build_resolver(custom: Option<SocketAddr>, timeout: Duration) -> TokioAsyncResolver {
    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.cache_size = 0;

    match custom {
        Some(addr) => {
            let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
            TokioAsyncResolver::tokio(ResolverConfig::from_parts(None, vec![], group), opts)
        }
        None => match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, _)) => TokioAsyncResolver::tokio(config, opts),
            Err(e) => {
                tracing::debug!("Falling back to default resolvers: {}", e);
                TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
            }
        },
    }
}

#[async_trait::async_trait]
impl Checker for DnsChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Dns
    }

    async fn check(&self, monitor: &Monitor, timeout: Duration) -> Result<CheckResult, CheckError> {
        let config: DnsConfig = parse_config(monitor)?;
        let hostname = config.hostname.trim().to_string();
        if hostname.is_empty() {
            return Err(CheckError::config("DNS monitor requires a hostname"));
        }
        let record_type = parse_record_type(config.record_type.as_deref())?;
        let custom = config.resolver.as_deref().filter(|r| !r.trim().is_empty()).map(parse_resolver).transpose()?;

        let resolver = build_resolver(custom, timeout);
        let resolver_label = custom.map(|addr| addr.to_string()).unwrap_or_else(|| "system".to_string());

        let start = Instant::now();
        let lookup = tokio::time::timeout(timeout, resolver.lookup(hostname.as_str(), record_type)).await;
        let latency = elapsed_ms(start);

        let result = match lookup {
            Err(_) => CheckResult::down(monitor.id, format!("DNS lookup timed out after {}s", timeout.as_secs())),
            Ok(Err(e)) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    CheckResult::down(monitor.id, format!("No {record_type} records found for {hostname}"))
                }
                _ => CheckResult::down(monitor.id, format!("DNS lookup failed: {e}")),
            },
            Ok(Ok(lookup)) => {
                let answers: Vec<String> = lookup.iter().map(|rdata| rdata.to_string()).collect();
                if answers.is_empty() {
                    CheckResult::down(monitor.id, format!("No {record_type} records found for {hostname}"))
                } else {
                    CheckResult::up(monitor.id, format!("{} {record_type} record(s): {}", answers.len(), answers.join(", ")))
                        .with_meta("answers", answers)
                }
            }
        };

        Ok(result
            .with_latency(latency)
            .with_meta("recordType", record_type.to_string())
            .with_meta("resolver", resolver_label))
    }
}
