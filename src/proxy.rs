use std::sync::Arc;

use hyper::{
    header::{AUTHORIZATION, HOST},
    http::{uri::Authority, HeaderValue},
    HeaderMap, StatusCode, Uri,
};
use poem::{handler, web::Data, Body, Endpoint, EndpointExt, Request, Response};
use serde::Serialize;
use tracing::{event, Level};
use url::form_urlencoded;

use crate::{
    auth::Scope,
    config::{ProxyConfig, RouteTable},
    Error, UpstreamClient,
};

mod auth_relay;
pub use auth_relay::relay;

mod forward;
pub use forward::forward;

mod redirect;
pub use redirect::moved_permanently;
pub use redirect::ImplicitNamespace;
pub use redirect::PathRedirect;

mod root_probe;
pub use root_probe::probe;
pub use root_probe::unauthorized;
pub use root_probe::PROXY_SERVICE;

/// Struct for a registry proxy that routes requests to upstream registries by host name,
///
/// Every request goes through `dispatch` which,
/// 1. resolves the upstream from the host the client used
/// 2. classifies the request, see `RequestKind`
/// 3. hands it off to the probe, auth relay, redirect, or forwarder
///
#[derive(Clone)]
pub struct RegistryProxy {
    config: Arc<ProxyConfig>,
    client: Arc<dyn UpstreamClient>,
    redirect: Arc<dyn PathRedirect>,
}

impl RegistryProxy {
    /// Returns a new proxy, redirecting single segment names on the default registry into its default namespace,
    ///
    pub fn new(config: ProxyConfig, client: impl UpstreamClient) -> Self {
        Self {
            config: Arc::new(config),
            client: Arc::new(client),
            redirect: Arc::new(ImplicitNamespace),
        }
    }

    /// Replaces the redirect rule applied to the default registry, chainable
    ///
    pub fn with_redirect(mut self, redirect: impl PathRedirect) -> Self {
        self.redirect = Arc::new(redirect);
        self
    }

    /// Returns an endpoint that serves every path through this proxy,
    ///
    pub fn routes(&self) -> impl Endpoint {
        dispatch.data(self.clone())
    }

    /// Handles a single client request,
    ///
    pub async fn dispatch(&self, request: &Request, body: Body) -> Result<Response, Error> {
        let host = frontend_host(request).unwrap_or_default();
        let hostname = hostname(&host);

        let upstream = match self.config.routes.lookup(&hostname) {
            Some(upstream) => upstream,
            None => {
                event!(Level::WARN, "No route for host {:?}", host);
                return route_listing(&self.config.routes);
            }
        };
        event!(
            Level::DEBUG,
            "{} {} -> {upstream}",
            request.method(),
            request.uri()
        );

        let client = self.client.as_ref();
        match RequestKind::classify(request.uri(), request.headers()) {
            RequestKind::RootProbe { authorization } => {
                let realm = format!("{}://{host}/v2/auth", self.config.scheme);
                probe(client, upstream, &realm, authorization).await
            }
            RequestKind::AuthRequest {
                scope,
                authorization,
            } => {
                let is_default_registry = self.config.is_default_registry(upstream);
                relay(client, upstream, is_default_registry, scope, authorization).await
            }
            RequestKind::Forward => {
                if self.config.is_default_registry(upstream) {
                    if let Some(path) = self.redirect.redirect(request.uri().path()) {
                        let query = request
                            .uri()
                            .query()
                            .map(|q| format!("?{q}"))
                            .unwrap_or_default();

                        let location = format!("{}://{host}{path}{query}", self.config.scheme);
                        return Ok(moved_permanently(location));
                    }
                }

                forward(client, upstream, request, body).await
            }
        }
    }
}

/// Enumeration of the ways a request is handled once the upstream is known,
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// `/v2/`, checks whether the client needs a token from the frontend,
    ///
    RootProbe {
        authorization: Option<HeaderValue>,
    },
    /// `/v2/auth`, exchanges the client's credentials for a token from the upstream's token service,
    ///
    AuthRequest {
        scope: Option<Scope>,
        authorization: Option<HeaderValue>,
    },
    /// Everything else is passed through to the upstream,
    ///
    Forward,
}

impl RequestKind {
    /// Classifies a request by path,
    ///
    pub fn classify(uri: &Uri, headers: &HeaderMap) -> Self {
        let authorization = headers.get(AUTHORIZATION).cloned();

        match uri.path() {
            "/v2/" => RequestKind::RootProbe { authorization },
            "/v2/auth" => RequestKind::AuthRequest {
                scope: uri.query().and_then(first_scope),
                authorization,
            },
            _ => RequestKind::Forward,
        }
    }
}

/// Body of the 404 returned for hosts w/o a route,
///
#[derive(Serialize)]
struct RouteListing<'a> {
    routes: &'a RouteTable,
}

#[handler]
async fn dispatch(
    request: &Request,
    body: Body,
    proxy: Data<&RegistryProxy>,
) -> poem::Result<Response> {
    event!(Level::TRACE, "{:#?}", request);

    Ok(proxy.dispatch(request, body).await?)
}

/// Returns the host the client addressed, including the port,
///
fn frontend_host(request: &Request) -> Option<String> {
    request
        .header(HOST)
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
}

/// Strips the port from host,
///
fn hostname(host: &str) -> String {
    match host.parse::<Authority>() {
        Ok(authority) => authority.host().to_string(),
        Err(_) => host.to_string(),
    }
}

/// Returns the first non-empty scope parameter of query,
///
/// Decoding is lossy, a malformed pair elsewhere in the query does not hide the scope.
///
fn first_scope(query: &str) -> Option<Scope> {
    let scope = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "scope")
        .map(|(_, scope)| scope.into_owned())
        .filter(|scope| !scope.is_empty());

    event!(Level::DEBUG, "Scope from query {query:?}, {:?}", scope);
    scope.map(Scope::from)
}

fn route_listing(routes: &RouteTable) -> Result<Response, Error> {
    let body = serde_json::to_vec(&RouteListing { routes })?;

    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .content_type("application/json")
        .body(body))
}
