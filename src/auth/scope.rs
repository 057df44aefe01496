use std::fmt::Display;

use tracing::{event, Level};

use crate::config::DEFAULT_NAMESPACE;

/// Access requested from a token service, formatted as `type:name:actions`
///
/// Ex. `repository:library/busybox:pull`
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope(String);

impl Scope {
    /// Returns the scope as received from the client,
    ///
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// Returns the scope that should be sent to the upstream's token service,
    ///
    /// Only scopes for the default registry are rewritten, see [`Scope::with_implicit_namespace`].
    ///
    pub fn rewrite(self, is_default_registry: bool) -> Self {
        if is_default_registry {
            self.with_implicit_namespace()
        } else {
            self
        }
    }

    /// Inserts the default namespace into a single segment repository name,
    ///
    /// `repository:busybox:pull` becomes `repository:library/busybox:pull`, anything that does not have exactly
    /// three parts, or that already has a namespace, is returned unchanged.
    ///
    pub fn with_implicit_namespace(self) -> Self {
        let rewritten = match self.0.split(':').collect::<Vec<_>>().as_slice() {
            [resource_type, name, actions] if !name.contains('/') => {
                Some(format!("{resource_type}:{DEFAULT_NAMESPACE}/{name}:{actions}"))
            }
            _ => None,
        };

        match rewritten {
            Some(rewritten) => {
                event!(Level::DEBUG, "Rewrote scope {} -> {rewritten}", self.0);
                Self(rewritten)
            }
            None => self,
        }
    }

    /// Returns the scope as a str,
    ///
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        Self(value)
    }
}
