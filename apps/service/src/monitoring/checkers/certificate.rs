use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, CheckStatus, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateConfig {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    server_name: Option<String>,
    #[serde(default = "default_warning_days")]
    warning_days: i64,
}

fn default_port() -> u16 {
    443
}

fn default_warning_days() -> i64 {
    14
}

/// Accepts any chain. We only want to read the leaf certificate, trust is not
/// what this monitor reports on. Handshake signatures are still verified.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Expiry assessment of a leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryAssessment {
    pub status: CheckStatus,
    pub days_left: i64,
    pub message: String,
}

/// Down iff `valid_to <= now`. The warning threshold only changes the wording.
pub fn assess_expiry(valid_to: DateTime<Utc>, now: DateTime<Utc>, warning_days: i64) -> ExpiryAssessment {
    let remaining = (valid_to - now).num_seconds();
    let days_left = remaining.div_euclid(SECONDS_PER_DAY);

    if valid_to <= now {
        let ago = (-remaining).div_euclid(SECONDS_PER_DAY);
        return ExpiryAssessment {
            status: CheckStatus::Down,
            days_left,
            message: format!("Certificate expired {ago} day(s) ago on {}", valid_to.to_rfc3339()),
        };
    }

    let message = if days_left <= warning_days {
        format!("Certificate expires in {days_left} day(s) (warning threshold {warning_days})")
    } else {
        format!("Certificate valid for {days_left} more day(s)")
    };
    ExpiryAssessment { status: CheckStatus::Up, days_left, message }
}

/// Leaf certificate fields we report
struct LeafCertificate {
    valid_to: DateTime<Utc>,
    subject: String,
    issuer: String,
}

fn parse_leaf(der: &CertificateDer<'_>) -> Result<LeafCertificate, CheckError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
        .map_err(|e| CheckError::probe(format!("Failed to parse peer certificate: {e}")))?;
    let timestamp = cert.validity().not_after.timestamp();
    let valid_to = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| CheckError::probe("Peer certificate has an out of range expiry date"))?;

    Ok(LeafCertificate { valid_to, subject: cert.subject().to_string(), issuer: cert.issuer().to_string() })
}

/// TLS certificate expiry checker
pub struct CertificateChecker {
    connector: TlsConnector,
}

impl CertificateChecker {
    pub fn new() -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map(|builder| {
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider.clone())))
                    .with_no_client_auth()
            })
            .unwrap_or_else(|_| {
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
                    .with_no_client_auth()
            });

        Self { connector: TlsConnector::from(Arc::new(config)) }
    }
}

impl Default for CertificateChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Checker for CertificateChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Certificate
    }

    async fn check(&self, monitor: &Monitor, timeout: Duration) -> Result<CheckResult, CheckError> {
        let config: CertificateConfig = parse_config(monitor)?;
        let host = config.host.trim().to_string();
        if host.is_empty() {
            return Err(CheckError::config("Certificate monitor requires a host"));
        }
        let sni = config.server_name.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| host.clone());
        let server_name = ServerName::try_from(sni.clone())
            .map_err(|e| CheckError::config(format!("Invalid server name '{sni}': {e}")))?;

        let start = Instant::now();
        let handshake = async {
            let tcp = TcpStream::connect((host.as_str(), config.port))
                .await
                .map_err(|e| CheckError::probe(format!("Connection to {host}:{} failed: {e}", config.port)))?;
            self.connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| CheckError::probe(format!("TLS handshake with {host} failed: {e}")))
        };

        let stream = match tokio::time::timeout(timeout, handshake).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Ok(CheckResult::down(monitor.id, e.to_string()).with_latency(elapsed_ms(start))),
            Err(_) => {
                return Ok(CheckResult::down(monitor.id, format!("TLS handshake timed out after {}s", timeout.as_secs()))
                    .with_latency(elapsed_ms(start)));
            }
        };
        let latency = elapsed_ms(start);

        let leaf = {
            let (_, session) = stream.get_ref();
            let certs = session
                .peer_certificates()
                .filter(|certs| !certs.is_empty())
                .ok_or_else(|| CheckError::probe(format!("{host} presented no certificate")))?;
            parse_leaf(&certs[0])?
        };

        let assessment = assess_expiry(leaf.valid_to, Utc::now(), config.warning_days);
        let result = match assessment.status {
            CheckStatus::Up => CheckResult::up(monitor.id, assessment.message),
            _ => CheckResult::down(monitor.id, assessment.message),
        };

        Ok(result
            .with_latency(latency)
            .with_meta("daysLeft", assessment.days_left)
            .with_meta("validTo", leaf.valid_to.to_rfc3339())
            .with_meta("subject", leaf.subject)
            .with_meta("issuer", leaf.issuer))
    }
}
