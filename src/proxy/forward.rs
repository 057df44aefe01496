use hyper::header::HOST;
use poem::{Body, Request, Response};
use tracing::{event, Level};

use crate::{config::Upstream, Error, UpstreamClient};

/// Forwards a registry api request to the upstream,
///
/// The method, path, query, headers, and body are passed through, except `Host` which is set by the client for the
/// upstream. The upstream's response is returned untouched.
///
pub async fn forward(
    client: &dyn UpstreamClient,
    upstream: &Upstream,
    request: &Request,
    body: Body,
) -> Result<Response, Error> {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");

    let uri = upstream.uri_for(path_and_query)?;
    event!(Level::DEBUG, "Forwarding {} {uri}", request.method());

    let mut forwarded = hyper::Request::builder()
        .method(request.method().clone())
        .uri(uri)
        .body(hyper::Body::from(body))?;

    *forwarded.headers_mut() = request.headers().clone();
    forwarded.headers_mut().remove(HOST);

    let response = client.send(forwarded).await?;
    event!(Level::DEBUG, "Upstream returned {}", response.status());
    Ok(response.into())
}
