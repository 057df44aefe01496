use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{event, Level};

use super::{RouteTable, Upstream};
use crate::Error;

/// Upstream that single segment image names implicitly belong to,
///
pub const DOCKER_HUB: &str = "https://registry-1.docker.io";

/// Namespace the default registry implies for single segment image names, ex. busybox -> library/busybox
///
pub const DEFAULT_NAMESPACE: &str = "library";

/// Well-known registries served from `<prefix>.<base_domain>`,
///
const BUILTIN_ROUTES: [(&str, &str); 8] = [
    ("docker", DOCKER_HUB),
    ("quay", "https://quay.io"),
    ("gcr", "https://gcr.io"),
    ("k8s-gcr", "https://k8s.gcr.io"),
    ("k8s", "https://registry.k8s.io"),
    ("ghcr", "https://ghcr.io"),
    ("cloudsmith", "https://docker.cloudsmith.io"),
    ("ecr", "https://public.ecr.aws"),
];

/// Configuration for the registry proxy, loaded once at startup and never mutated,
///
/// Example config,
/// ```toml
/// scheme = "https"
/// default_registry = "https://registry-1.docker.io"
///
/// [routes]
/// "docker.example.com" = "https://registry-1.docker.io"
/// "quay.example.com" = "https://quay.io"
/// ```
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Scheme clients use to reach the frontend, used when building auth realms and redirects,
    ///
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Upstream that gets the implicit `library/` namespace treatment,
    ///
    #[serde(default = "default_registry")]
    pub default_registry: Upstream,
    /// Frontend host name to upstream mapping,
    ///
    #[serde(default)]
    pub routes: RouteTable,
}

impl ProxyConfig {
    /// Returns a config w/ the given routes and default settings,
    ///
    pub fn new(routes: RouteTable) -> Self {
        Self {
            scheme: default_scheme(),
            default_registry: default_registry(),
            routes,
        }
    }

    /// Returns a config that routes `docker.<base_domain>`, `quay.<base_domain>`, etc. to
    /// the well-known public registries,
    ///
    pub fn with_base_domain(base_domain: impl AsRef<str>) -> Result<Self, Error> {
        let base_domain = base_domain.as_ref().trim_matches('.');
        if base_domain.is_empty() {
            return Err(Error::invalid_operation("base domain cannot be empty"));
        }

        let routes = BUILTIN_ROUTES.iter().try_fold(
            RouteTable::new(),
            |routes, (prefix, upstream)| -> Result<RouteTable, Error> {
                Ok(routes.route(format!("{prefix}.{base_domain}"), Upstream::parse(upstream)?))
            },
        )?;

        Ok(Self::new(routes))
    }

    /// Tries to load a config file from the filesystem,
    ///
    /// Returns an error if the file cannot be read, or the content is invalid
    ///
    pub async fn try_load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        event!(Level::DEBUG, "Loading proxy config from {:?}", path);

        let content = tokio::fs::read_to_string(path).await?;
        Self::try_load_content(content)
    }

    /// Tries to load content as a toml config,
    ///
    pub fn try_load_content(content: impl AsRef<str>) -> Result<Self, Error> {
        let config = toml::from_str::<ProxyConfig>(content.as_ref())?;
        config.validate()
    }

    /// Returns true if the upstream is the default registry,
    ///
    pub fn is_default_registry(&self, upstream: &Upstream) -> bool {
        upstream == &self.default_registry
    }

    /// Checks settings that serde cannot,
    ///
    fn validate(self) -> Result<Self, Error> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(Error::invalid_operation("scheme must be either http or https"));
        }

        if self.routes.is_empty() {
            event!(Level::WARN, "Proxy config has no routes, every request will return 404");
        }

        Ok(self)
    }
}

fn default_scheme() -> String {
    String::from("https")
}

fn default_registry() -> Upstream {
    Upstream(DOCKER_HUB.to_string())
}
