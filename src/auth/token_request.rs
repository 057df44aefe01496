use std::str::FromStr;

use hyper::{
    header::AUTHORIZATION,
    http::{uri::PathAndQuery, HeaderValue},
    Body, Method, Request, Uri,
};

use super::{AuthChallenge, Scope};
use crate::Error;

/// Struct for building the token request that is relayed to an upstream's token service,
///
/// The client's credentials are passed through as-is, the proxy never inspects or stores them.
///
pub struct TokenRequest {
    /// Token service that issued the challenge,
    ///
    challenge: AuthChallenge,
    /// Requested access, already rewritten for the upstream,
    ///
    scope: Option<Scope>,
    /// Client credentials, usually `Basic ...` or absent for anonymous pulls,
    ///
    authorization: Option<HeaderValue>,
}

impl TokenRequest {
    /// Returns a new token request for a challenge,
    ///
    pub fn new(challenge: AuthChallenge) -> Self {
        Self {
            challenge,
            scope: None,
            authorization: None,
        }
    }

    /// Sets the scope, chainable
    ///
    pub fn scope(mut self, scope: Option<Scope>) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the authorization header, chainable
    ///
    pub fn authorization(mut self, authorization: Option<HeaderValue>) -> Self {
        self.authorization = authorization;
        self
    }

    /// Returns the token url,
    ///
    /// `service` and `scope` replace any parameter of the same name in the realm, other realm parameters are kept.
    ///
    pub fn uri(&self) -> Result<Uri, Error> {
        let realm = Uri::from_str(self.challenge.realm())?;

        let mut params = realm
            .query()
            .map(|query| serde_urlencoded::from_str::<Vec<(String, String)>>(query))
            .transpose()
            .map_err(|_| Error::protocol("realm has an invalid query string"))?
            .unwrap_or_default();

        params.retain(|(k, _)| k != "service" && k != "scope");

        if let Some(service) = self.challenge.service() {
            params.push(("service".to_string(), service.to_string()));
        }

        if let Some(scope) = self.scope.as_ref() {
            params.push(("scope".to_string(), scope.to_string()));
        }

        let path_and_query = if params.is_empty() {
            PathAndQuery::from_str(realm.path())?
        } else {
            let query = serde_urlencoded::to_string(&params)?;
            PathAndQuery::from_str(&format!("{}?{query}", realm.path()))?
        };

        let mut parts = realm.into_parts();
        parts.path_and_query = Some(path_and_query);
        Ok(Uri::from_parts(parts)?)
    }

    /// Consumes the token request and builds a GET request,
    ///
    pub fn build_request(self) -> Result<Request<Body>, Error> {
        let mut request = Request::builder().method(Method::GET).uri(self.uri()?);

        if let Some(authorization) = self.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }

        Ok(request.body(Body::empty())?)
    }
}
