use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde::Deserialize;
use sqlx::Connection;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

/// Backend a database monitor connects to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseVariant {
    Postgres,
    MySql,
    Libsql,
    Redis,
}

impl FromStr for DatabaseVariant {
    type Err = CheckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseVariant::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseVariant::MySql),
            "sqlite" | "libsql" => Ok(DatabaseVariant::Libsql),
            "redis" => Ok(DatabaseVariant::Redis),
            other => Err(CheckError::config(format!("Unsupported database variant: {other}"))),
        }
    }
}

impl DatabaseVariant {
    fn as_str(&self) -> &'static str {
        match self {
            DatabaseVariant::Postgres => "postgres",
            DatabaseVariant::MySql => "mysql",
            DatabaseVariant::Libsql => "libsql",
            DatabaseVariant::Redis => "redis",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseConfig {
    variant: String,
    connection_string: String,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    auth_token: Option<String>,
}

/// Database connectivity checker. Every check opens a fresh connection and
/// closes it again, nothing is pooled between checks.
pub struct DatabaseChecker;

async fn probe_postgres(url: &str, query: Option<&str>) -> Result<()> {
    let mut conn = PgConnection::connect(url).await?;
    match query {
        Some(query) => {
            sqlx::query(query).execute(&mut conn).await?;
        }
        None => conn.ping().await?,
    }
    conn.close().await?;
    Ok(())
}

async fn probe_mysql(url: &str, query: Option<&str>) -> Result<()> {
    let mut conn = MySqlConnection::connect(url).await?;
    match query {
        Some(query) => {
            sqlx::query(query).execute(&mut conn).await?;
        }
        None => conn.ping().await?,
    }
    conn.close().await?;
    Ok(())
}

async fn probe_libsql(url: &str, auth_token: Option<&str>, query: Option<&str>) -> Result<()> {
    let database = if url.starts_with("libsql://") || url.starts_with("https://") || url.starts_with("http://") {
        libsql::Builder::new_remote(url.to_string(), auth_token.unwrap_or_default().to_string())
            .build()
            .await?
    } else {
        let path = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("file:")).unwrap_or(url);
        if !std::path::Path::new(path).exists() {
            return Err(anyhow!("Database file {path} does not exist"));
        }
        libsql::Builder::new_local(path).build().await?
    };
    let conn = database.connect()?;
    conn.query(query.unwrap_or("SELECT 1"), ()).await?;
    Ok(())
}

async fn probe_redis(url: &str) -> Result<()> {
    let client = redis::Client::open(url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
    if reply.eq_ignore_ascii_case("PONG") {
        Ok(())
    } else {
        Err(anyhow!("Unexpected PING reply: {reply}"))
    }
}

#[async_trait::async_trait]
impl Checker for DatabaseChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Database
    }

    async fn check(&self, monitor: &Monitor, timeout: Duration) -> Result<CheckResult, CheckError> {
        let config: DatabaseConfig = parse_config(monitor)?;
        let variant: DatabaseVariant = config.variant.parse()?;
        let url = config.connection_string.trim();
        if url.is_empty() {
            return Err(CheckError::config("Database monitor requires a connectionString"));
        }
        let query = config.query.as_deref().map(str::trim).filter(|q| !q.is_empty());

        let start = Instant::now();
        let probe = async {
            match variant {
                DatabaseVariant::Postgres => probe_postgres(url, query).await,
                DatabaseVariant::MySql => probe_mysql(url, query).await,
                DatabaseVariant::Libsql => probe_libsql(url, config.auth_token.as_deref(), query).await,
                DatabaseVariant::Redis => probe_redis(url).await,
            }
        };

        let result = match tokio::time::timeout(timeout, probe).await {
            Ok(Ok(())) => CheckResult::up(monitor.id, format!("{} database is reachable", variant.as_str())),
            Ok(Err(e)) => CheckResult::down(monitor.id, format!("{} probe failed: {e:#}", variant.as_str())),
            Err(_) => CheckResult::down(
                monitor.id,
                format!("{} probe timed out after {}s", variant.as_str(), timeout.as_secs()),
            ),
        };

        Ok(result.with_latency(elapsed_ms(start)).with_meta("variant", variant.as_str()))
    }
}
