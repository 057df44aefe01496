use std::str::FromStr;

use hyper::{http::HeaderValue, Uri};
use logos::Logos;
use tracing::{event, Level};

use crate::Error;

/// Realm and service from a registry's `Www-Authenticate: Bearer ...` challenge,
///
/// Example header value,
/// ```text
/// Bearer realm="https://auth.docker.io/token",service="registry.docker.io"
/// ```
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Absolute url of the token service,
    realm: String,
    /// Service the issued token will be scoped to,
    service: Option<String>,
}

impl AuthChallenge {
    /// Parses a bearer challenge,
    ///
    /// Parameters are matched by key so their order in the header does not matter. If the header lists several
    /// challenges, the first `Bearer` challenge is used. It must have at least two quoted parameter values, one of
    /// them an absolute `realm`.
    ///
    pub fn parse(header: impl AsRef<str>) -> Result<Self, Error> {
        let header = header.as_ref();
        event!(Level::TRACE, "parsing challenge, {header}");

        let params = ChallengeParams::parse_all(header)?
            .into_iter()
            .find(|c| c.scheme.eq_ignore_ascii_case("bearer"))
            .ok_or_else(|| {
                event!(Level::DEBUG, "no bearer challenge in {header}");
                malformed()
            })?;

        if params.quoted < 2 {
            event!(Level::DEBUG, "challenge has {} quoted values", params.quoted);
            return Err(malformed());
        }

        let realm = params.get("realm").ok_or_else(malformed)?;

        match Uri::from_str(realm) {
            Ok(uri) if uri.scheme().is_some() && uri.authority().is_some() => {}
            _ => {
                event!(Level::DEBUG, "realm is not an absolute url, {realm}");
                return Err(malformed());
            }
        }

        Ok(Self {
            realm: realm.to_string(),
            service: params.get("service").map(str::to_string),
        })
    }

    /// Returns the realm,
    ///
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Returns the service if the challenge included one,
    ///
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }
}

impl TryFrom<&HeaderValue> for AuthChallenge {
    type Error = Error;

    fn try_from(value: &HeaderValue) -> Result<Self, Self::Error> {
        let value = value.to_str().map_err(|_| malformed())?;
        Self::parse(value)
    }
}

fn malformed() -> Error {
    Error::protocol("cannot parse authenticate header")
}

/// Auth-scheme and auth-params of a single challenge,
///
struct ChallengeParams {
    scheme: String,
    params: Vec<(String, String)>,
    /// Number of values that were quoted-strings,
    quoted: usize,
}

impl ChallengeParams {
    /// Parses `challenge *( "," challenge )` where a challenge is `scheme [ key=value *( "," key=value ) ]`,
    ///
    /// A token that is not followed by `=` starts the next challenge. Empty list elements are allowed.
    ///
    fn parse_all(header: &str) -> Result<Vec<Self>, Error> {
        let tokens = ChallengeToken::lexer(header).collect::<Vec<_>>();
        let mut challenges: Vec<Self> = vec![];

        let mut pos = 0;
        while pos < tokens.len() {
            match (&tokens[pos], tokens.get(pos + 1)) {
                (ChallengeToken::Comma, _) => pos += 1,
                (ChallengeToken::Token(key), Some(ChallengeToken::Equals)) => {
                    let challenge = challenges.last_mut().ok_or_else(malformed)?;

                    let value = match tokens.get(pos + 2) {
                        Some(ChallengeToken::Quoted(value)) => {
                            challenge.quoted += 1;
                            value.clone()
                        }
                        Some(ChallengeToken::Token(value)) => value.clone(),
                        _ => return Err(malformed()),
                    };
                    challenge.params.push((key.clone(), value));
                    pos += 3;

                    if !matches!(tokens.get(pos), None | Some(ChallengeToken::Comma)) {
                        return Err(malformed());
                    }
                }
                (ChallengeToken::Token(scheme), _) => {
                    challenges.push(Self {
                        scheme: scheme.clone(),
                        params: vec![],
                        quoted: 0,
                    });
                    pos += 1;
                }
                _ => return Err(malformed()),
            }
        }

        if challenges.is_empty() {
            Err(malformed())
        } else {
            Ok(challenges)
        }
    }

    /// Returns the first value for key, keys are case-insensitive
    ///
    fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Tokens of the challenge grammar,
///
#[derive(Logos, Debug, PartialEq)]
enum ChallengeToken {
    #[token("=")]
    Equals,
    #[token(",")]
    Comma,
    /// Quoted-string, w/ quotes removed and escapes resolved
    ///
    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    Quoted(String),
    /// Scheme, param name, or unquoted param value
    ///
    #[regex(r#"[^ \t\r\n\f,="\\]+"#, |lex| lex.slice().to_string())]
    Token(String),
    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Error,
}

fn unquote(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut unescaped = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                unescaped.push(escaped);
            }
        } else {
            unescaped.push(c);
        }
    }
    unescaped
}

#[cfg(test)]
mod tests {
    use hyper::http::HeaderValue;

    use super::AuthChallenge;

    #[test]
    fn test_parse_challenge() {
        let challenge = AuthChallenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#,
        )
        .expect("should parse");

        assert_eq!("https://auth.example.com/token", challenge.realm());
        assert_eq!(Some("registry.example.com"), challenge.service());
    }

    #[test]
    fn test_parse_docker_hub_challenge() {
        let challenge = AuthChallenge::try_from(&HeaderValue::from_static(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/busybox:pull,push""#,
        ))
        .expect("should parse");

        assert_eq!("https://auth.docker.io/token", challenge.realm());
        assert_eq!(Some("registry.docker.io"), challenge.service());
    }

    #[test]
    fn test_parse_is_order_independent() {
        let challenge = AuthChallenge::parse(
            r#"Bearer service="ghcr.io", realm="https://ghcr.io/token""#,
        )
        .expect("should parse");

        assert_eq!("https://ghcr.io/token", challenge.realm());
        assert_eq!(Some("ghcr.io"), challenge.service());
    }

    #[test]
    fn test_parse_without_service() {
        let challenge = AuthChallenge::parse(
            r#"bearer REALM="https://quay.io/v2/auth", scope="repository:coreos/etcd:pull""#,
        )
        .expect("should parse");

        assert_eq!("https://quay.io/v2/auth", challenge.realm());
        assert_eq!(None, challenge.service());
    }

    #[test]
    fn test_parse_escaped_and_token_values() {
        let challenge = AuthChallenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="svc \"one\"",error=insufficient_scope"#,
        )
        .expect("should parse");

        assert_eq!("https://auth.example.com/token", challenge.realm());
        assert_eq!(Some(r#"svc "one""#), challenge.service());
    }

    #[test]
    fn test_parse_multiple_challenges() {
        let challenge = AuthChallenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com", Basic realm="x""#,
        )
        .expect("should parse");
        assert_eq!("https://auth.example.com/token", challenge.realm());
        assert_eq!(Some("registry.example.com"), challenge.service());

        let challenge = AuthChallenge::parse(
            r#"Basic realm="x", Bearer service="registry.example.com",realm="https://auth.example.com/token""#,
        )
        .expect("should parse");
        assert_eq!("https://auth.example.com/token", challenge.realm());
        assert_eq!(Some("registry.example.com"), challenge.service());
    }

    #[test]
    fn test_parse_fewer_than_two_quoted_values() {
        for header in [
            "",
            "Bearer",
            r#"Bearer realm="https://auth.example.com/token""#,
            r#"Bearer realm=https://auth.example.com/token,service=registry.example.com"#,
            r#"Bearer realm="https://auth.example.com/token",service=registry.example.com"#,
        ] {
            let err = AuthChallenge::parse(header).expect_err("should not parse");
            assert!(err.is_protocol(), "{header}");
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for header in [
            r#"Basic realm="registry",service="registry.example.com""#,
            r#"Bearer service="registry.example.com",scope="repository:busybox:pull""#,
            r#"Bearer realm="/token",service="registry.example.com""#,
            r#"Bearer realm="https://auth.example.com/token" service="registry.example.com""#,
            r#"Bearer realm="https://auth.example.com/token",service"#,
            r#"realm="https://auth.example.com/token",service="registry.example.com""#,
            r#"Basic realm="x", Negotiate"#,
            r#"Bearer realm="https://auth.example.com/token,service="registry.example.com""#,
        ] {
            let err = AuthChallenge::parse(header).expect_err("should not parse");
            assert!(err.is_protocol(), "{header}");
        }
    }
}
