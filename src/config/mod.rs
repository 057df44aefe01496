mod route_table;
pub use route_table::RouteTable;
pub use route_table::Upstream;

mod proxy_config;
pub use proxy_config::ProxyConfig;
pub use proxy_config::DOCKER_HUB;
pub use proxy_config::DEFAULT_NAMESPACE;
