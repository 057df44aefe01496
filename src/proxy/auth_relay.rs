use hyper::{header::WWW_AUTHENTICATE, http::HeaderValue, Body, Method, Request, StatusCode};
use poem::Response;
use tracing::{event, Level};

use crate::{
    auth::{AuthChallenge, Scope, TokenRequest},
    config::Upstream,
    Error, UpstreamClient,
};

/// Relays a token request to the upstream's token service,
///
/// The upstream's `/v2/` is probed w/o credentials to discover the realm and service of its token service, then the
/// client's scope and credentials are passed along. The token service's response is returned as-is.
///
pub async fn relay(
    client: &dyn UpstreamClient,
    upstream: &Upstream,
    is_default_registry: bool,
    scope: Option<Scope>,
    authorization: Option<HeaderValue>,
) -> Result<Response, Error> {
    let probe = Request::builder()
        .method(Method::GET)
        .uri(upstream.uri_for("/v2/")?)
        .body(Body::empty())?;

    event!(Level::DEBUG, "Probing {upstream}/v2/ for a challenge");
    let response = client.send(probe).await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        event!(Level::DEBUG, "Upstream returned {}, no token required", response.status());
        return Ok(response.into());
    }

    let challenge = match response.headers().get(WWW_AUTHENTICATE) {
        Some(challenge) => AuthChallenge::try_from(challenge)?,
        None => {
            event!(Level::DEBUG, "Upstream returned 401 w/o a challenge, passing through");
            return Ok(response.into());
        }
    };

    let scope = scope.map(|s| s.rewrite(is_default_registry));

    event!(
        Level::DEBUG,
        "Requesting token from {}, service: {:?}, scope: {:?}",
        challenge.realm(),
        challenge.service(),
        scope.as_ref().map(Scope::as_str)
    );

    let request = TokenRequest::new(challenge)
        .scope(scope)
        .authorization(authorization)
        .build_request()?;

    let token = client.send(request).await?;
    event!(Level::DEBUG, "Token service returned {}", token.status());
    Ok(token.into())
}
