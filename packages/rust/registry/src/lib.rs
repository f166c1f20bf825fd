//! Service registry resolution.
//!
//! A registry answers one question: which external data services exist. Two
//! backings are supported — a local directory of service definition JSON
//! files, and a remote health-check endpoint returning a `{ "services": [...] }`
//! document. Both are read-only from the pipeline's perspective; registry
//! errors are fatal to the run and never retried here.

use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use stacharvest_shared::{ExternalService, HarvestError, Result, Service};

/// Maximum number of redirects to follow when querying a remote registry.
const MAX_REDIRECTS: usize = 3;

/// Default timeout in seconds for remote registry requests.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// User-Agent string for registry requests.
const USER_AGENT: &str = concat!("stacharvest/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Registry variants
// ---------------------------------------------------------------------------

/// Options for remote registry queries.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// A source of external service descriptors.
///
/// Closed set of backings; the pipeline composes several registries and
/// queries them in order.
#[derive(Debug, Clone)]
pub enum ServiceRegistry {
    /// A directory of `*.json` service definition files.
    Local { dir: PathBuf },
    /// A health-check endpoint listing registered services.
    Healthcheck { url: String, opts: RegistryOptions },
}

impl ServiceRegistry {
    /// Registry over a local directory of service definition files.
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self::Local { dir: dir.into() }
    }

    /// Registry over a remote health-check endpoint.
    pub fn healthcheck(url: impl Into<String>) -> Self {
        Self::Healthcheck {
            url: url.into(),
            opts: RegistryOptions::default(),
        }
    }

    /// Resolve the registry into typed service records.
    ///
    /// Entries whose declared type is not a supported external protocol are
    /// skipped with a warning; an unreachable or malformed backing source is
    /// a [`HarvestError::Registry`].
    #[instrument(skip(self), fields(registry = %self.describe()))]
    pub async fn get_services(&self) -> Result<Vec<ExternalService>> {
        match self {
            Self::Local { dir } => local_services(dir),
            Self::Healthcheck { url, opts } => healthcheck_services(url, opts).await,
        }
    }

    /// Short human-readable description for tracing.
    pub fn describe(&self) -> String {
        match self {
            Self::Local { dir } => format!("local:{}", dir.display()),
            Self::Healthcheck { url, .. } => format!("healthcheck:{url}"),
        }
    }
}

/// Resolve several registries in order into one service list.
pub async fn registered_services(registries: &[ServiceRegistry]) -> Result<Vec<ExternalService>> {
    let mut services = Vec::new();
    for registry in registries {
        let found = registry.get_services().await?;
        info!(
            registry = %registry.describe(),
            count = found.len(),
            "registry resolved"
        );
        services.extend(found);
    }
    Ok(services)
}

// ---------------------------------------------------------------------------
// Local directory backing
// ---------------------------------------------------------------------------

fn local_services(dir: &Path) -> Result<Vec<ExternalService>> {
    if !dir.is_dir() {
        return Err(HarvestError::Registry(format!(
            "local registry `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| HarvestError::Registry(format!("cannot read `{}`: {e}", dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    // Stable order regardless of directory iteration order.
    paths.sort();

    let mut services = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| HarvestError::Registry(format!("cannot read `{}`: {e}", path.display())))?;
        let service: ExternalService = serde_json::from_str(&content).map_err(|e| {
            HarvestError::Registry(format!(
                "malformed service definition `{}`: {e}",
                path.display()
            ))
        })?;
        debug!(path = %path.display(), title = %service.title, "service definition loaded");
        services.push(service);
    }

    Ok(services)
}

// ---------------------------------------------------------------------------
// Health-check backing
// ---------------------------------------------------------------------------

async fn healthcheck_services(url: &str, opts: &RegistryOptions) -> Result<Vec<ExternalService>> {
    let client = build_client(opts)?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| HarvestError::Registry(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::Registry(format!("{url}: HTTP {status}")));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| HarvestError::Registry(format!("{url}: invalid JSON: {e}")))?;

    let entries = body
        .get("services")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            HarvestError::Registry(format!(
                "{url}: response not conform to expected model (missing `services` list)"
            ))
        })?;

    let mut services = Vec::new();
    for entry in entries {
        match serde_json::from_value::<ExternalService>(entry.clone()) {
            Ok(service) => services.push(service),
            // Registries also list catalog-facing services (STAC, WMTS, ...)
            // that no extractor speaks; those are skipped, not failed.
            Err(e) => match serde_json::from_value::<Service>(entry.clone()) {
                Ok(service) => {
                    warn!(
                        title = %service.title,
                        service_type = ?service.service_type,
                        "not a data catalog service, skipping"
                    );
                }
                Err(_) => {
                    let title = entry
                        .get("title")
                        .and_then(|t| t.as_str())
                        .unwrap_or("<untitled>");
                    warn!(title, error = %e, "malformed registry entry, skipping");
                }
            },
        }
    }

    Ok(services)
}

fn build_client(opts: &RegistryOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| HarvestError::Registry(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacharvest_shared::ExternalServiceType;

    fn fixture_dir() -> PathBuf {
        PathBuf::from("../../../fixtures/services")
    }

    #[tokio::test]
    async fn local_registry_loads_sorted_definitions() {
        let registry = ServiceRegistry::local(fixture_dir());
        let services = registry.get_services().await.expect("load services");

        assert_eq!(services.len(), 3);
        // Sorted by file name: epntap, pdsode, wfs.
        assert_eq!(services[0].service_type, ExternalServiceType::Epntap);
        assert_eq!(services[1].service_type, ExternalServiceType::PdsOde);
        assert_eq!(services[2].service_type, ExternalServiceType::Wfs);
        assert_eq!(services[1].url.as_str(), "https://example.org/ode");
        assert_eq!(
            services[0].extra_param("table"),
            Some("omega_cubes.epn_core")
        );
    }

    #[tokio::test]
    async fn local_registry_missing_dir_fails() {
        let registry = ServiceRegistry::local("/nonexistent/registry/dir");
        let err = registry.get_services().await.unwrap_err();
        assert!(matches!(err, HarvestError::Registry(_)));
    }

    #[tokio::test]
    async fn local_registry_malformed_file_fails() {
        let dir = std::env::temp_dir().join(format!("sh-registry-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("broken.json"), "{not json").unwrap();

        let registry = ServiceRegistry::local(&dir);
        let err = registry.get_services().await.unwrap_err();
        assert!(err.to_string().contains("malformed service definition"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn healthcheck_registry_parses_and_filters() {
        let server = wiremock::MockServer::start().await;
        let body = std::fs::read_to_string("../../../fixtures/registry/services-response.json")
            .expect("read registry fixture");

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/registry/services"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(&body))
            .mount(&server)
            .await;

        let registry = ServiceRegistry::healthcheck(format!("{}/registry/services", server.uri()));
        let services = registry.get_services().await.expect("resolve registry");

        // The WMTS entry is not an external data service and is skipped.
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].service_type, ExternalServiceType::PdsOde);
        assert_eq!(services[1].service_type, ExternalServiceType::Epntap);
    }

    #[tokio::test]
    async fn healthcheck_registry_malformed_response_fails() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/registry/services"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_string(r#"{"items": []}"#),
            )
            .mount(&server)
            .await;

        let registry = ServiceRegistry::healthcheck(format!("{}/registry/services", server.uri()));
        let err = registry.get_services().await.unwrap_err();
        assert!(err.to_string().contains("expected model"));
    }

    #[tokio::test]
    async fn healthcheck_registry_http_error_fails() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let registry = ServiceRegistry::healthcheck(server.uri());
        let err = registry.get_services().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn registries_compose_in_order() {
        let registries = vec![ServiceRegistry::local(fixture_dir())];
        let services = registered_services(&registries).await.expect("resolve");
        assert_eq!(services.len(), 3);
    }
}
