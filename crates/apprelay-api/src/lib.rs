//! Apprelay API
//!
//! Serves synthetic Application resources (`apps.cozystack.io/v1alpha1`)
//! that are stored as Flux HelmReleases. Nothing is persisted here: every
//! request is rewritten into a call against the backing Release and every
//! result is projected back.
//!
//! # Architecture
//!
//! ```text
//! kubectl ──► router ──► ApplicationStore ──► ReleaseClient ──► K8s API Server
//!                          (mapper, scope)       (HelmRelease)
//! ```
//!
//! # Endpoints
//!
//! - `GET /apis`, `/apis/{group}`, `/apis/{group}/{version}` - Discovery
//! - `GET|POST /apis/{group}/{version}/namespaces/{ns}/{plural}` - List, watch, create
//! - `GET|PUT|PATCH|DELETE /apis/{group}/{version}/namespaces/{ns}/{plural}/{name}`
//! - `GET /healthz`, `GET /readyz` - Health checks

#![deny(missing_docs)]

pub mod backend;
pub mod discovery;
pub mod error;
pub mod handlers;
pub mod mapper;
pub mod registry;
pub mod scope;
pub mod server;
pub mod store;
pub mod table;
pub mod watch;

pub use backend::{KubeReleaseClient, ReleaseClient};
pub use error::{Error, Operation, Result};
pub use mapper::ReleaseMapper;
pub use registry::ResourceRegistry;
pub use server::{router, start_server, AppState, ServerConfig, TlsConfig};
pub use store::{ApplicationStore, ListOptions, RequestContext};
pub use watch::{ApplicationEvent, ApplicationWatch, StopHandle, WatchState};
