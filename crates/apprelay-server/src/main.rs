//! Apprelay - Application resources served over Flux HelmReleases

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use apprelay_api::{
    start_server, AppState, KubeReleaseClient, ResourceRegistry, ServerConfig, TlsConfig,
};
use apprelay_common::ResourceConfig;

/// Apprelay - serves apps.cozystack.io Applications backed by HelmReleases
#[derive(Parser, Debug)]
#[command(name = "apprelay", version, about, long_about = None)]
struct Cli {
    /// Resource configuration file
    #[arg(long, env = "APPRELAY_CONFIG", default_value = "/etc/apprelay/config.yaml")]
    config: PathBuf,

    /// Address to serve the API on
    #[arg(long, env = "APPRELAY_BIND_ADDRESS", default_value = "0.0.0.0:6443")]
    bind_address: SocketAddr,

    /// TLS certificate file; plain HTTP when unset
    #[arg(long, env = "APPRELAY_TLS_CERT_FILE", requires = "tls_private_key_file")]
    tls_cert_file: Option<PathBuf>,

    /// TLS private key file
    #[arg(long, env = "APPRELAY_TLS_PRIVATE_KEY_FILE", requires = "tls_cert_file")]
    tls_private_key_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = ResourceConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let tls = match (&cli.tls_cert_file, &cli.tls_private_key_file) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_pem: read_pem(cert).await?,
            key_pem: read_pem(key).await?,
        }),
        _ => None,
    };

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let registry = ResourceRegistry::new(&config, Arc::new(KubeReleaseClient::new(client)));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
        }
        signal.cancel();
    });

    let server_config = ServerConfig {
        addr: cli.bind_address,
        tls,
    };
    start_server(server_config, AppState::new(registry, shutdown))
        .await
        .context("API server failed")?;

    Ok(())
}

async fn read_pem(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}
