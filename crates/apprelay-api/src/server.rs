//! Application API server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::handlers::{
    cluster_collection_handler, create_handler, delete_handler, get_handler,
    group_handler, group_list_handler, health_handler, list_handler, patch_handler,
    replace_handler, resource_list_handler,
};
use crate::registry::ResourceRegistry;
use crate::store::RequestContext;

/// How long in-flight requests get after shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// TLS material for the listener
#[derive(Clone)]
pub struct TlsConfig {
    /// TLS certificate PEM
    pub cert_pem: String,
    /// TLS private key PEM
    pub key_pem: String,
}

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Serve HTTPS when set, plain HTTP otherwise
    pub tls: Option<TlsConfig>,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Served resource types
    pub registry: Arc<ResourceRegistry>,
    /// Cancelled on server shutdown; every request context derives from it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create handler state around a registry
    pub fn new(registry: ResourceRegistry, shutdown: CancellationToken) -> Self {
        Self {
            registry: Arc::new(registry),
            shutdown,
        }
    }

    /// Context for a request in `namespace`, cancelled on shutdown
    pub fn request_context(&self, namespace: &str) -> RequestContext {
        RequestContext {
            namespace: Some(namespace.to_string()),
            cancel: self.shutdown.child_token(),
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(health_handler))
        .route("/readyz", get(health_handler))
        // Discovery
        .route("/apis", get(group_list_handler))
        .route("/apis/{group}", get(group_handler))
        .route("/apis/{group}/{version}", get(resource_list_handler))
        // All Applications are namespaced; cluster-wide collections are rejected
        .route(
            "/apis/{group}/{version}/{plural}",
            get(cluster_collection_handler),
        )
        .route(
            "/apis/{group}/{version}/namespaces/{namespace}/{plural}",
            get(list_handler).post(create_handler),
        )
        .route(
            "/apis/{group}/{version}/namespaces/{namespace}/{plural}/{name}",
            get(get_handler)
                .put(replace_handler)
                .patch(patch_handler)
                .delete(delete_handler),
        )
        .with_state(state)
}

/// Serve the API until the state's shutdown token is cancelled
///
/// Open watches end as soon as shutdown starts; other in-flight requests get
/// the grace period.
pub async fn start_server(config: ServerConfig, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let handle = Handle::new();
    let signal = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        info!("Shutting down API server");
        signal.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    match config.tls {
        Some(tls) => {
            let tls_config =
                RustlsConfig::from_pem(tls.cert_pem.into_bytes(), tls.key_pem.into_bytes())
                    .await?;

            info!(addr = %config.addr, "Starting API server (TLS)");
            axum_server::bind_rustls(config.addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!(addr = %config.addr, "Starting API server");
            axum_server::bind(config.addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
