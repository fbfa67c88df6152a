//! Built-in protocol checkers, one per monitor kind.

mod certificate;
mod container;
mod database;
mod dns;
mod grpc;
mod http;
mod ping;
mod push;
mod tcp;

pub use certificate::CertificateChecker;
pub use container::ContainerChecker;
pub use database::DatabaseChecker;
pub use dns::DnsChecker;
pub use grpc::GrpcChecker;
pub use http::HttpChecker;
pub use ping::PingChecker;
pub use push::PushChecker;
pub use tcp::TcpChecker;

/// Milliseconds elapsed since `start`
pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
