use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use hyper::{
    body::HttpBody,
    client::{connect::Connect, HttpConnector},
    header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION},
    Body, Client, HeaderMap, Method, Request, Response, StatusCode, Uri,
};
use hyper_tls::HttpsConnector;
use tracing::{event, Level};
use url::Url;

use crate::Error;

/// Maximum number of redirects followed for a single upstream call,
///
pub const MAX_REDIRECTS: usize = 20;

/// Trait for sending a request to an upstream registry,
///
#[async_trait]
pub trait UpstreamClient: Send + Sync + 'static {
    /// Sends a request and returns the upstream's response,
    ///
    /// Only transport failures are errors, every http status is returned as a response.
    ///
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, Error>;
}

#[async_trait]
impl<C> UpstreamClient for Client<C, Body>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, Error> {
        event!(Level::TRACE, "Sending request, {:#?}", &request);
        let response = self.request(request).await?;
        event!(Level::TRACE, "Received response, {:#?}", &response);
        Ok(response)
    }
}

#[async_trait]
impl<T> UpstreamClient for Arc<T>
where
    T: UpstreamClient + ?Sized,
{
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, Error> {
        self.as_ref().send(request).await
    }
}

/// Returns an https client that follows redirects,
///
pub fn https_client() -> FollowRedirects<Client<HttpsConnector<HttpConnector>, Body>> {
    let https = HttpsConnector::new();
    let client = Client::builder().build::<_, Body>(https);
    FollowRedirects::new(client)
}

/// Wraps a client and follows upstream redirects, ex. blob downloads redirecting to a CDN
///
/// - relative `Location` headers are resolved against the current url
/// - 303, and 301/302 for POST, continue as a GET w/o a body
/// - other redirects are only followed when the request body is empty, otherwise the redirect is returned
/// - `Authorization` is dropped once the redirect leaves the first request's origin
///
pub struct FollowRedirects<C> {
    inner: C,
    max_redirects: usize,
}

impl<C> FollowRedirects<C>
where
    C: UpstreamClient,
{
    /// Returns a new client w/ the default redirect limit,
    ///
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            max_redirects: MAX_REDIRECTS,
        }
    }

    /// Sets the redirect limit, chainable
    ///
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}

#[async_trait]
impl<C> UpstreamClient for FollowRedirects<C>
where
    C: UpstreamClient,
{
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, Error> {
        let (parts, body) = request.into_parts();
        let origin = (parts.uri.scheme().cloned(), parts.uri.authority().cloned());
        let mut method = parts.method.clone();
        let mut uri = parts.uri.clone();
        let mut headers = parts.headers.clone();
        let mut replayable = body.is_end_stream();

        let mut response = self.inner.send(Request::from_parts(parts, body)).await?;

        for _ in 0..self.max_redirects {
            if !is_followed_redirect(response.status()) {
                return Ok(response);
            }

            let next = match response
                .headers()
                .get(LOCATION)
                .and_then(|l| l.to_str().ok())
                .and_then(|l| resolve_location(&uri, l))
            {
                Some(next) => next,
                None => {
                    event!(Level::DEBUG, "Redirect w/o a usable location, returning it as-is");
                    return Ok(response);
                }
            };

            match response.status() {
                StatusCode::SEE_OTHER => switch_to_get(&mut method, &mut headers),
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND if method == Method::POST => {
                    switch_to_get(&mut method, &mut headers)
                }
                _ if !replayable => {
                    event!(
                        Level::DEBUG,
                        "Cannot replay request body for {}, returning redirect",
                        response.status()
                    );
                    return Ok(response);
                }
                _ => {}
            }

            if (next.scheme().cloned(), next.authority().cloned()) != origin {
                headers.remove(AUTHORIZATION);
            }
            headers.remove(HOST);

            event!(Level::DEBUG, "Following {} redirect, {method} {next}", response.status());
            uri = next;
            replayable = true;

            let mut request = Request::builder()
                .method(method.clone())
                .uri(uri.clone())
                .body(Body::empty())?;
            *request.headers_mut() = headers.clone();

            response = self.inner.send(request).await?;
        }

        if is_followed_redirect(response.status()) {
            event!(Level::ERROR, "Exceeded {} redirects", self.max_redirects);
            Err(Error::external_dependency())
        } else {
            Ok(response)
        }
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn switch_to_get(method: &mut Method, headers: &mut HeaderMap) {
    if *method != Method::HEAD {
        *method = Method::GET;
    }
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_TYPE);
}

/// Resolves a location header against the url that returned it,
///
/// Handles absolute, scheme-relative (`//host/path`), absolute-path, and path-relative references. Returns None if
/// the result is not an http(s) url.
///
fn resolve_location(current: &Uri, location: &str) -> Option<Uri> {
    let base = Url::parse(&current.to_string()).ok()?;
    let mut next = base.join(location).ok()?;
    next.set_fragment(None);

    if !matches!(next.scheme(), "http" | "https") {
        event!(Level::DEBUG, "Ignoring redirect to {next}");
        return None;
    }

    Uri::from_str(next.as_str()).ok()
}

/// Scripted upstream for tests, records every request it receives
///
#[cfg(test)]
pub(crate) mod mock {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;
    use hyper::{Body, HeaderMap, Method, Request, Response, StatusCode, Uri};

    use super::UpstreamClient;
    use crate::Error;

    /// Request as seen by the upstream,
    ///
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: Method,
        pub uri: Uri,
        pub headers: HeaderMap,
        pub body: Vec<u8>,
    }

    #[derive(Default)]
    pub struct MockUpstream {
        responses: Mutex<VecDeque<Response<Body>>>,
        requests: Mutex<Vec<RecordedRequest>>,
    }

    impl MockUpstream {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a response, chainable
        ///
        pub fn respond(self, status: StatusCode, headers: &[(&str, &str)], body: &str) -> Self {
            let mut response = Response::builder().status(status);
            for (name, value) in headers {
                response = response.header(*name, *value);
            }
            let response = response
                .body(Body::from(body.to_string()))
                .expect("should build response");

            self.responses
                .lock()
                .expect("should lock")
                .push_back(response);
            self
        }

        /// Returns the requests received so far,
        ///
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().expect("should lock").clone()
        }
    }

    #[async_trait]
    impl UpstreamClient for MockUpstream {
        async fn send(&self, request: Request<Body>) -> Result<Response<Body>, Error> {
            let (parts, body) = request.into_parts();
            let body = hyper::body::to_bytes(body).await?;

            self.requests
                .lock()
                .expect("should lock")
                .push(RecordedRequest {
                    method: parts.method,
                    uri: parts.uri,
                    headers: parts.headers,
                    body: body.to_vec(),
                });

            let next = self.responses.lock().expect("should lock").pop_front();
            next.ok_or_else(Error::external_dependency)
        }
    }
}
