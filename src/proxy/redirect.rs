use poem::{http::StatusCode, Response};
use tracing::{event, Level};

use crate::config::DEFAULT_NAMESPACE;

/// Trait for rewriting request paths that the frontend should redirect instead of forwarding,
///
pub trait PathRedirect: Send + Sync + 'static {
    /// Returns the path the client should be redirected to, or None if the request should be forwarded
    ///
    fn redirect(&self, path: &str) -> Option<String>;
}

/// Redirects single segment repository names into the default namespace,
///
/// `/v2/busybox/manifests/latest` -> `/v2/library/busybox/manifests/latest`
///
/// Detection only looks at the number of path segments, so it assumes every api path of the default registry
/// w/ a one segment name has exactly two segments after the name. New api shapes will need a different rule.
///
#[derive(Default, Clone, Copy)]
pub struct ImplicitNamespace;

impl ImplicitNamespace {
    /// Returns true if the path is `/v2/<name>/<resource>/<reference>`,
    ///
    pub fn should_redirect(path: &str) -> bool {
        let segments = path.split('/').collect::<Vec<_>>();
        segments.len() == 5 && segments[0].is_empty() && segments[1] == "v2"
    }
}

impl PathRedirect for ImplicitNamespace {
    fn redirect(&self, path: &str) -> Option<String> {
        if !Self::should_redirect(path) {
            return None;
        }

        let mut segments = path.split('/').collect::<Vec<_>>();
        segments.insert(2, DEFAULT_NAMESPACE);
        let redirected = segments.join("/");

        event!(Level::DEBUG, "Redirecting {path} -> {redirected}");
        Some(redirected)
    }
}

/// Returns a 301 response to location,
///
pub fn moved_permanently(location: impl AsRef<str>) -> Response {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header("location", location.as_ref())
        .finish()
}

#[cfg(test)]
mod tests {
    use poem::http::StatusCode;

    use super::{moved_permanently, ImplicitNamespace, PathRedirect};

    #[test]
    fn test_should_redirect() {
        assert!(ImplicitNamespace::should_redirect("/v2/busybox/manifests/latest"));
        assert!(ImplicitNamespace::should_redirect("/v2/busybox/blobs/sha256:abc"));
        assert!(ImplicitNamespace::should_redirect("/v2/busybox/tags/list"));

        assert!(!ImplicitNamespace::should_redirect("/v2/library/busybox/manifests/latest"));
        assert!(!ImplicitNamespace::should_redirect("/v2/busybox/blobs/uploads/"));
        assert!(!ImplicitNamespace::should_redirect("/v2/"));
        assert!(!ImplicitNamespace::should_redirect("/v2/auth"));
        assert!(!ImplicitNamespace::should_redirect("/v3/busybox/manifests/latest"));
    }

    #[test]
    fn test_redirect_path() {
        let redirect = ImplicitNamespace::default();

        assert_eq!(
            Some("/v2/library/busybox/manifests/latest".to_string()),
            redirect.redirect("/v2/busybox/manifests/latest")
        );
        assert_eq!(None, redirect.redirect("/v2/library/busybox/manifests/latest"));
    }

    #[test]
    fn test_moved_permanently() {
        let response = moved_permanently("https://docker.example.com/v2/library/busybox/manifests/latest");

        assert_eq!(StatusCode::MOVED_PERMANENTLY, response.status());
        let location = response
            .headers()
            .get("location")
            .and_then(|l| l.to_str().ok())
            .expect("should have a location");
        assert!(location.ends_with("/v2/library/busybox/manifests/latest"));
    }
}
