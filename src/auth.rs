//! Pieces of the registry token handshake that the proxy relays,
//!
//! Reference: https://docs.docker.com/registry/spec/auth/token/
//!

mod challenge;
pub use challenge::AuthChallenge;

mod scope;
pub use scope::Scope;

mod token_request;
pub use token_request::TokenRequest;
