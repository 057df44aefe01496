mod error;
pub use error::Error;

pub mod auth;
pub use auth::AuthChallenge;
pub use auth::Scope;
pub use auth::TokenRequest;

pub mod client;
pub use client::https_client;
pub use client::FollowRedirects;
pub use client::UpstreamClient;

pub mod config;
pub use config::ProxyConfig;
pub use config::RouteTable;
pub use config::Upstream;

pub mod proxy;
pub use proxy::RegistryProxy;
pub use proxy::RequestKind;
