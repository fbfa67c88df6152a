use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use bollard::Docker;
use bollard::container::InspectContainerOptions;
use bollard::models::{ContainerStateStatusEnum, HealthStatusEnum};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::elapsed_ms;
use crate::error::CheckError;
use crate::models::{CheckResult, Monitor, MonitorKind};
use crate::monitoring::checker::{Checker, parse_config};

const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.list.v2+json, \
    application/vnd.oci.image.index.v1+json, \
    application/vnd.docker.distribution.manifest.v2+json, \
    application/vnd.oci.image.manifest.v1+json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerConfig {
    container: String,
    #[serde(default)]
    docker_host: Option<String>,
    #[serde(default = "default_check_updates")]
    check_for_updates: bool,
}

fn default_check_updates() -> bool {
    true
}

/// Parsed `[registry/]repository[:tag][@digest]` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.split('@').next()?.trim();
        if reference.is_empty() || reference.starts_with("sha256:") {
            return None;
        }

        let (registry, remainder) = match reference.split_once('/') {
            Some((first, rest)) if first.contains('.') || first.contains(':') || first == "localhost" => {
                (first.to_string(), rest.to_string())
            }
            _ => (DOCKER_HUB_REGISTRY.to_string(), reference.to_string()),
        };

        let (repository, tag) = match remainder.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
            _ => (remainder, "latest".to_string()),
        };

        let repository = if registry == DOCKER_HUB_REGISTRY && !repository.contains('/') {
            format!("library/{repository}")
        } else {
            repository
        };

        Some(Self { registry, repository, tag })
    }

    fn is_docker_hub(&self) -> bool {
        self.registry == DOCKER_HUB_REGISTRY
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Container runtime checker
pub struct ContainerChecker {
    registry: Client,
}

impl ContainerChecker {
    pub fn new() -> Result<Self> {
        let registry = Client::builder()
            .user_agent("uppe-sentinel")
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { registry })
    }

    fn connect(docker_host: Option<&str>, timeout: Duration) -> Result<Docker, CheckError> {
        let secs = timeout.as_secs().max(1);
        let docker = match docker_host.map(str::trim).filter(|h| !h.is_empty()) {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_socket(host, secs, bollard::API_DEFAULT_VERSION)
            }
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, secs, bollard::API_DEFAULT_VERSION)
            }
            Some(host) => {
                return Err(CheckError::config(format!(
                    "Unsupported dockerHost '{host}', expected unix://, tcp:// or http://"
                )));
            }
        };
        docker.map_err(|e| CheckError::probe(format!("Failed to connect to container daemon: {e}")))
    }

    /// Digest the registry currently serves for `image`
    async fn remote_digest(&self, image: &ImageReference) -> Result<String> {
        let url = format!("https://{}/v2/{}/manifests/{}", image.registry, image.repository, image.tag);
        let mut request = self.registry.head(&url).header("Accept", MANIFEST_ACCEPT);

        if image.is_docker_hub() {
            let token: TokenResponse = self
                .registry
                .get("https://auth.docker.io/token")
                .query(&[
                    ("service", "registry.docker.io"),
                    ("scope", &format!("repository:{}:pull", image.repository)),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
                .context("Malformed registry token response")?;
            request = request.bearer_auth(token.token);
        }

        let response = request.send().await?.error_for_status()?;
        response
            .headers()
            .get("docker-content-digest")
            .and_then(|value| value.to_str().ok())
            .map(String::from)
            .ok_or_else(|| anyhow!("Registry response carried no content digest"))
    }

    /// Digest of the locally pulled image
    async fn local_digest(docker: &Docker, image: &str) -> Result<String> {
        let inspect = docker.inspect_image(image).await?;
        inspect
            .repo_digests
            .unwrap_or_default()
            .into_iter()
            .find_map(|entry| entry.split_once('@').map(|(_, digest)| digest.to_string()))
            .ok_or_else(|| anyhow!("Image {image} has no repository digest"))
    }
}

fn state_label(status: Option<ContainerStateStatusEnum>) -> String {
    status.map(|s| s.to_string()).filter(|s| !s.is_empty()).unwrap_or_else(|| "unknown".to_string())
}

#[async_trait::async_trait]
impl Checker for ContainerChecker {
    fn kind(&self) -> MonitorKind {
        MonitorKind::Container
    }

    async fn check(&self, monitor: &Monitor, timeout: Duration) -> Result<CheckResult, CheckError> {
        let config: ContainerConfig = parse_config(monitor)?;
        let name = config.container.trim().to_string();
        if name.is_empty() {
            return Err(CheckError::config("Container monitor requires a container name or id"));
        }
        let docker = Self::connect(config.docker_host.as_deref(), timeout)?;

        let start = Instant::now();
        let inspect = match tokio::time::timeout(
            timeout,
            docker.inspect_container(&name, None::<InspectContainerOptions>),
        )
        .await
        {
            Ok(Ok(inspect)) => inspect,
            Ok(Err(e)) => {
                return Ok(CheckResult::down(monitor.id, format!("Failed to inspect container {name}: {e}"))
                    .with_latency(elapsed_ms(start)));
            }
            Err(_) => {
                return Ok(CheckResult::down(monitor.id, format!("Container daemon timed out after {}s", timeout.as_secs()))
                    .with_latency(elapsed_ms(start)));
            }
        };
        let latency = elapsed_ms(start);

        let state = inspect.state.unwrap_or_default();
        let running = state.running.unwrap_or(false);
        let health = state.health.and_then(|h| h.status);
        let unhealthy = health == Some(HealthStatusEnum::UNHEALTHY);
        let label = state_label(state.status);
        let image = inspect.config.and_then(|c| c.image);

        let mut result = if running && !unhealthy {
            CheckResult::up(monitor.id, format!("Container {name} is {label}"))
        } else if running {
            CheckResult::down(monitor.id, format!("Container {name} is running but unhealthy"))
        } else {
            CheckResult::down(monitor.id, format!("Container {name} is {label}"))
        };
        result = result
            .with_latency(latency)
            .with_meta("state", label)
            .with_meta("health", health.map(|h| h.to_string()))
            .with_meta("image", image.clone());

        if !config.check_for_updates {
            return Ok(result);
        }

        // Update info is best effort, a failing registry never fails the check
        let reference = image.as_deref().and_then(ImageReference::parse);
        let update = match (image.as_deref(), reference) {
            (Some(image), Some(reference)) => {
                let local = Self::local_digest(&docker, image).await;
                let remote = tokio::time::timeout(timeout, self.remote_digest(&reference))
                    .await
                    .map_err(|_| anyhow!("registry probe timed out"))
                    .and_then(|digest| digest);
                match (local, remote) {
                    (Ok(local), Ok(remote)) => Some((local, remote)),
                    (Err(e), _) | (_, Err(e)) => {
                        debug!("No update info for container {}: {:#}", name, e);
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(match update {
            Some((local, remote)) => {
                let available = local != remote;
                result
                    .with_meta("localDigest", local)
                    .with_meta("remoteDigest", remote)
                    .with_meta("updateAvailable", available)
            }
            None => result.with_meta("updateAvailable", serde_json::Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_docker_hub_shorthand() {
        let image = ImageReference::parse("nginx").unwrap();
        assert_eq!(image.registry, DOCKER_HUB_REGISTRY);
        assert_eq!(image.repository, "library/nginx");
        assert_eq!(image.tag, "latest");

        let image = ImageReference::parse("grafana/grafana:10.4.1").unwrap();
        assert_eq!(image.repository, "grafana/grafana");
        assert_eq!(image.tag, "10.4.1");
    }

    #[test]
    fn test_parses_private_registry_with_port() {
        let image = ImageReference::parse("registry.local:5000/team/api:v2@sha256:abc").unwrap();
        assert_eq!(image.registry, "registry.local:5000");
        assert_eq!(image.repository, "team/api");
        assert_eq!(image.tag, "v2");

        let image = ImageReference::parse("ghcr.io/obiente/uppe").unwrap();
        assert_eq!(image.registry, "ghcr.io");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn test_bare_image_ids_have_no_reference() {
        assert_eq!(ImageReference::parse("sha256:0123456789abcdef"), None);
        assert_eq!(ImageReference::parse(""), None);
    }

    #[tokio::test]
    async fn test_unsupported_docker_host_is_config_error() {
        let monitor = Monitor::new(
            "api",
            MonitorKind::Container,
            json!({ "container": "api", "dockerHost": "ssh://build-box" }),
        );
        let err = ContainerChecker::new().unwrap().check(&monitor, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("ssh://build-box"));
    }

    #[tokio::test]
    async fn test_missing_container_name_is_config_error() {
        let monitor = Monitor::new("api", MonitorKind::Container, json!({ "dockerHost": "unix:///var/run/docker.sock" }));
        let err = ContainerChecker::new().unwrap().check(&monitor, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.to_string().contains("container"));
    }
}
