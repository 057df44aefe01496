use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use hyper::{http::uri::PathAndQuery, Uri};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{event, Level};

use crate::Error;

/// Base url of an upstream registry, ex. https://registry-1.docker.io
///
/// Always an absolute http(s) url w/o a path component,
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Upstream(pub(super) String);

impl Upstream {
    /// Parses and validates an upstream base url, a trailing `/` is trimmed,
    ///
    pub fn parse(url: impl AsRef<str>) -> Result<Self, Error> {
        let trimmed = url.as_ref().trim().trim_end_matches('/');
        let uri = Uri::from_str(trimmed)?;

        match (uri.scheme_str(), uri.authority()) {
            (Some("http") | Some("https"), Some(_)) => {}
            _ => return Err(Error::invalid_operation("upstream must be an absolute http(s) url")),
        }

        if uri.query().is_some() || !matches!(uri.path(), "" | "/") {
            return Err(Error::invalid_operation("upstream must not have a path or query"));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Returns the base url,
    ///
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns an absolute uri to this upstream for a path and query, ex. `/v2/` -> https://host/v2/
    ///
    pub fn uri_for(&self, path_and_query: &str) -> Result<Uri, Error> {
        let path_and_query = PathAndQuery::from_str(path_and_query)?;
        Ok(Uri::from_str(&format!("{}{}", self.0, path_and_query))?)
    }
}

impl TryFrom<String> for Upstream {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static mapping of frontend host names to upstream registries,
///
/// Host names are stored lower-case, lookups are case-insensitive.
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, Upstream>")]
pub struct RouteTable {
    routes: BTreeMap<String, Upstream>,
}

impl RouteTable {
    /// Returns an empty route table,
    ///
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route, chainable
    ///
    pub fn route(mut self, host: impl AsRef<str>, upstream: Upstream) -> Self {
        self.routes
            .insert(host.as_ref().to_ascii_lowercase(), upstream);
        self
    }

    /// Returns the upstream configured for a frontend host name,
    ///
    pub fn lookup(&self, host: impl AsRef<str>) -> Option<&Upstream> {
        let host = host.as_ref();
        let upstream = self.routes.get(&host.to_ascii_lowercase());
        event!(Level::TRACE, "lookup {host} -> {:?}", upstream);
        upstream
    }

    /// Returns an iterator over (host, upstream) pairs,
    ///
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Upstream)> {
        self.routes.iter()
    }

    /// Returns the number of routes,
    ///
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if there are no routes,
    ///
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl From<BTreeMap<String, Upstream>> for RouteTable {
    fn from(routes: BTreeMap<String, Upstream>) -> Self {
        routes
            .into_iter()
            .fold(RouteTable::new(), |table, (host, upstream)| {
                table.route(host, upstream)
            })
    }
}

impl Serialize for RouteTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.routes.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::{RouteTable, Upstream};

    fn upstream(url: &str) -> Upstream {
        Upstream::parse(url).expect("should be a valid upstream")
    }

    #[test]
    fn test_lookup() {
        let table = RouteTable::new()
            .route("docker.example.com", upstream("https://registry-1.docker.io"))
            .route("quay.example.com", upstream("https://quay.io"));

        assert_eq!(
            Some(&upstream("https://registry-1.docker.io")),
            table.lookup("docker.example.com")
        );
        assert_eq!(Some(&upstream("https://quay.io")), table.lookup("QUAY.example.com"));
        assert_eq!(None, table.lookup("ghcr.example.com"));
        assert_eq!(None, table.lookup("example.com"));
    }

    #[test]
    fn test_upstream_validation() {
        assert_eq!("https://quay.io", upstream("https://quay.io/").as_str());
        assert_eq!("http://localhost:5000", upstream("http://localhost:5000").as_str());

        assert!(Upstream::parse("quay.io").is_err());
        assert!(Upstream::parse("/v2/").is_err());
        assert!(Upstream::parse("ftp://quay.io").is_err());
        assert!(Upstream::parse("https://quay.io/v2").is_err());
        assert!(Upstream::parse("https://quay.io?ns=test").is_err());
    }

    #[test]
    fn test_uri_for() {
        let uri = upstream("https://registry-1.docker.io")
            .uri_for("/v2/library/busybox/tags/list?n=10")
            .expect("should build a uri");

        assert_eq!(
            "https://registry-1.docker.io/v2/library/busybox/tags/list?n=10",
            uri.to_string()
        );
    }

    #[test]
    fn test_serialize_route_listing() {
        let table = RouteTable::new()
            .route("gcr.example.com", upstream("https://gcr.io"))
            .route("Docker.example.com", upstream("https://registry-1.docker.io/"));

        assert_eq!(
            serde_json::json!({
                "docker.example.com": "https://registry-1.docker.io",
                "gcr.example.com": "https://gcr.io",
            }),
            serde_json::to_value(&table).expect("should serialize")
        );
    }
}
