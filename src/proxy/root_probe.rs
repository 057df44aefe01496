use hyper::{
    header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
    http::HeaderValue,
    Body, Method, Request, StatusCode,
};
use poem::Response;
use serde::Serialize;
use tracing::{event, Level};

use crate::{config::Upstream, Error, UpstreamClient};

/// Service name advertised in the frontend's own challenge,
///
pub const PROXY_SERVICE: &str = "cloudflare-docker-proxy";

/// Body returned w/ the frontend's own challenge,
///
#[derive(Serialize)]
struct Unauthorized {
    message: &'static str,
}

/// Probes `/v2/` on the upstream w/ the client's credentials,
///
/// If the upstream challenges the client, the challenge is replaced w/ one that points at the frontend's `/v2/auth`
/// endpoint (`realm`), otherwise the upstream's response is returned as-is.
///
pub async fn probe(
    client: &dyn UpstreamClient,
    upstream: &Upstream,
    realm: &str,
    authorization: Option<HeaderValue>,
) -> Result<Response, Error> {
    let mut request = Request::builder()
        .method(Method::GET)
        .uri(upstream.uri_for("/v2/")?);

    if let Some(authorization) = authorization {
        request = request.header(AUTHORIZATION, authorization);
    }

    event!(Level::DEBUG, "Probing {upstream}/v2/");
    let response = client.send(request.body(Body::empty())?).await?;

    if response.status() != StatusCode::UNAUTHORIZED {
        event!(Level::DEBUG, "Upstream returned {}, passing through", response.status());
        return Ok(response.into());
    }

    event!(Level::DEBUG, "Upstream requires auth, challenging w/ realm {realm}");
    unauthorized(realm)
}

/// Returns a 401 response that challenges the client to get a token from realm,
///
pub fn unauthorized(realm: &str) -> Result<Response, Error> {
    let body = serde_json::to_vec(&Unauthorized {
        message: "UNAUTHORIZED",
    })?;

    Ok(Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(
            WWW_AUTHENTICATE,
            format!(r#"Bearer realm="{realm}",service="{PROXY_SERVICE}""#),
        )
        .header(CONTENT_TYPE, "application/json")
        .body(body))
}

#[cfg(test)]
mod tests {
    use hyper::{header::WWW_AUTHENTICATE, StatusCode};

    use super::unauthorized;

    #[tokio::test]
    async fn test_unauthorized() {
        let response = unauthorized("https://docker.example.com/v2/auth").expect("should build response");

        assert_eq!(StatusCode::UNAUTHORIZED, response.status());
        assert_eq!(
            Some(r#"Bearer realm="https://docker.example.com/v2/auth",service="cloudflare-docker-proxy""#),
            response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|h| h.to_str().ok())
        );

        let body = response
            .into_body()
            .into_string()
            .await
            .expect("should read body");
        assert_eq!(r#"{"message":"UNAUTHORIZED"}"#, body);
    }
}
