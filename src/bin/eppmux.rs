//! eppmux proxy binary.
//!
//! Establishes the upstream EPP session, then serves downstream clients
//! until the session breaks or the process is stopped. A broken session
//! exits nonzero; restart is the supervisor's job.
//!
//! Environment variables:
//! - EPPMUX_REMOTE_HOST: upstream EPP server hostname (required)
//! - EPPMUX_REMOTE_PORT: upstream port (default 700)
//! - EPPMUX_TLS: "1"/"true"/"yes" to wrap the upstream connection in TLS
//! - EPPMUX_CLIENT_ID: login client identifier (required)
//! - EPPMUX_PASSWORD: login password (required)
//! - EPPMUX_TIMEOUT_SECS: exchange timeout in seconds (default 5)
//! - EPPMUX_SERVICE_URIS: comma-separated objURI list (default: derive from greeting)
//! - EPPMUX_LISTEN_ADDR: downstream listen address (default 127.0.0.1:7700)
//! - RUST_LOG: log filter (default "info")

use std::process;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eppmux::core::constants::{DEFAULT_EPP_PORT, DEFAULT_LISTEN_ADDR};
use eppmux::core::{ProxyConfig, ProxyConfigBuilder, ProxyError};
use eppmux::proxy::ProxyServer;
use eppmux::upstream::UpstreamSession;

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn require(name: &str) -> Result<String, ProxyError> {
    env(name).ok_or_else(|| ProxyError::Config(format!("{name} must be set")))
}

fn config_from_env() -> Result<(ProxyConfig, String), ProxyError> {
    let remote_port = match env("EPPMUX_REMOTE_PORT") {
        Some(v) => v
            .parse()
            .map_err(|_| ProxyError::Config(format!("invalid EPPMUX_REMOTE_PORT: {v}")))?,
        None => DEFAULT_EPP_PORT,
    };
    let timeout_secs: i64 = match env("EPPMUX_TIMEOUT_SECS") {
        Some(v) => v
            .parse()
            .map_err(|_| ProxyError::Config(format!("invalid EPPMUX_TIMEOUT_SECS: {v}")))?,
        // The builder substitutes the 5-second default for non-positive values.
        None => 0,
    };
    let service_uris: Vec<String> = env("EPPMUX_SERVICE_URIS")
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let use_tls = matches!(env("EPPMUX_TLS").as_deref(), Some("1" | "true" | "yes"));

    let config = ProxyConfigBuilder::new()
        .remote_host(require("EPPMUX_REMOTE_HOST")?)
        .remote_port(remote_port)
        .use_tls(use_tls)
        .credentials(require("EPPMUX_CLIENT_ID")?, require("EPPMUX_PASSWORD")?)
        .timeout_secs(timeout_secs)
        .service_uris(service_uris)
        .build();

    let listen_addr = env("EPPMUX_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
    Ok((config, listen_addr))
}

async fn serve() -> Result<(), ProxyError> {
    let (config, listen_addr) = config_from_env()?;

    let session = Arc::new(UpstreamSession::establish(config).await?);
    info!("upstream session established");

    let server = ProxyServer::bind(&listen_addr, session).await?;
    server.run().await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = serve().await {
        error!(error = %e, "proxy terminated");
        process::exit(1);
    }
}
