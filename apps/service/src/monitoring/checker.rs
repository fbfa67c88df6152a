use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::checkers::{
    CertificateChecker, ContainerChecker, DatabaseChecker, DnsChecker, GrpcChecker, HttpChecker,
    PingChecker, PushChecker, TcpChecker,
};
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};

/// Protocol adapter for one kind of monitoring check
///
/// Implementations validate their config before any I/O and report probe
/// failures as down results where they can. Anything they return as `Err`
/// (or panic with) is turned into a down result by the executor.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Kind of monitor this checker handles
    fn kind(&self) -> MonitorKind;

    /// Capability predicate over a monitor config. Every built-in checker
    /// accepts everything and leaves validation to `check`.
    fn supports(&self, _config: &Value) -> bool {
        true
    }

    /// Perform a single probe attempt bounded by `timeout`
    async fn check(&self, monitor: &Monitor, timeout: Duration) -> Result<CheckResult, CheckError>;
}

/// Deserialize a monitor's kind-specific config, failing with a config error
/// that names the offending field
pub fn parse_config<T: DeserializeOwned>(monitor: &Monitor) -> Result<T, CheckError> {
    T::deserialize(&monitor.config)
        .map_err(|e| CheckError::config(format!("Invalid {} monitor config: {e}", monitor.kind)))
}

/// Maps a monitor kind to its checker
#[derive(Default)]
pub struct CheckerRegistry {
    checkers: HashMap<MonitorKind, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in checker. Synthetic journeys run elsewhere
    /// and are registered by the caller when available.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(HttpChecker::new()?));
        registry.register(Arc::new(TcpChecker));
        registry.register(Arc::new(PingChecker));
        registry.register(Arc::new(DnsChecker));
        registry.register(Arc::new(ContainerChecker::new()?));
        registry.register(Arc::new(CertificateChecker::new()));
        registry.register(Arc::new(DatabaseChecker));
        registry.register(Arc::new(GrpcChecker));
        registry.register(Arc::new(PushChecker));
        Ok(registry)
    }

    /// Register a checker, replacing any previous one for the same kind
    pub fn register(&mut self, checker: Arc<dyn Checker>) -> Option<Arc<dyn Checker>> {
        self.checkers.insert(checker.kind(), checker)
    }

    pub fn get(&self, kind: MonitorKind) -> Option<Arc<dyn Checker>> {
        self.checkers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<MonitorKind> {
        let mut kinds: Vec<_> = self.checkers.keys().copied().collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Sample {
        url: String,
    }

    #[test]
    fn test_parse_config_names_missing_field() {
        let monitor = Monitor::new("api", MonitorKind::Http, json!({ "method": "GET" }));
        let err = parse_config::<Sample>(&monitor).unwrap_err();

        assert!(err.is_config());
        assert!(err.to_string().contains("missing field `url`"), "{err}");
    }

    #[test]
    fn test_defaults_cover_every_kind_but_synthetic() {
        let registry = CheckerRegistry::with_defaults().unwrap();

        for kind in MonitorKind::ALL {
            assert_eq!(registry.get(kind).is_some(), kind != MonitorKind::Synthetic, "{kind}");
        }
        assert_eq!(registry.kinds().len(), MonitorKind::ALL.len() - 1);
    }
}
