use std::path::PathBuf;

use clap::Parser;
use poem::{listener::TcpListener, EndpointExt, Server};
use registry_proxy::{https_client, Error, ProxyConfig, RegistryProxy};
use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

/// Registry proxy CLI
///
#[derive(Parser)]
#[clap(name = "registry-proxy")]
#[clap(about = "Serves container registries behind per-registry host names, relaying the bearer token handshake")]
struct Cli {
    /// Address to listen on,
    ///
    /// TLS is expected to be terminated in front of this address.
    ///
    #[clap(long, default_value_t = String::from("0.0.0.0:8080"))]
    address: String,
    /// Path to a toml proxy config,
    ///
    #[clap(long)]
    config: Option<PathBuf>,
    /// Serves the built-in registries from `<prefix>.<base_domain>`, ex. docker.example.com,
    ///
    /// Ignored if --config is passed.
    ///
    #[clap(long)]
    base_domain: Option<String>,
    /// Enable debug logging
    #[clap(long, short, action)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(if !cli.debug {
            EnvFilter::builder()
                .with_default_directive("registry_proxy=info".parse().expect("should parse"))
                .from_env()
                .expect("should work")
        } else {
            EnvFilter::builder()
                .with_default_directive("registry_proxy=debug".parse().expect("should parse"))
                .from_env()
                .expect("should work")
        })
        .compact()
        .init();

    let config = match (cli.config.as_ref(), cli.base_domain.as_ref()) {
        (Some(path), _) => ProxyConfig::try_load(path).await?,
        (None, Some(base_domain)) => ProxyConfig::with_base_domain(base_domain)?,
        (None, None) => {
            return Err(Error::invalid_operation(
                "either --config or --base-domain is required",
            ))
        }
    };

    for (host, upstream) in config.routes.iter() {
        event!(Level::INFO, "Routing {host} -> {upstream}");
    }

    let proxy = RegistryProxy::new(config, https_client());

    event!(Level::INFO, "Starting registry proxy on {}", cli.address);
    Server::new(TcpListener::bind(cli.address))
        .run(proxy.routes().with(poem::middleware::Tracing))
        .await?;

    Ok(())
}
