//! HTTP handlers for the Application API
//!
//! Paths follow the Kubernetes REST layout:
//!
//! - `/apis/{group}/{version}/namespaces/{namespace}/{plural}` (list, watch, create)
//! - `/apis/{group}/{version}/namespaces/{namespace}/{plural}/{name}` (get, put, patch, delete)
//!
//! Requests with `as=Table` in the Accept header get a `meta.k8s.io/v1` Table.

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use kube::api::Patch;
use serde::Deserialize;
use tracing::debug;

use apprelay_common::types::{Application, API_GROUP, API_VERSION};

use crate::discovery::{api_group, api_group_list, api_resource_list};
use crate::error::{Error, Operation, Result};
use crate::server::AppState;
use crate::store::{ApplicationStore, ListOptions};
use crate::table::{TableOptions, TableSource};

const JSON_PATCH: &str = "application/json-patch+json";
const MERGE_PATCH: &str = "application/merge-patch+json";
const STRATEGIC_MERGE_PATCH: &str = "application/strategic-merge-patch+json";
const APPLY_PATCH: &str = "application/apply-patch+yaml";

// ============================================================================
// Request shapes
// ============================================================================

/// `/apis/{group}/{version}`
#[derive(Debug, Deserialize)]
pub struct GroupVersionPath {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
}

/// `/apis/{group}/{version}/{plural}`
#[derive(Debug, Deserialize)]
pub struct ClusterCollectionPath {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Resource plural
    pub plural: String,
}

/// `/apis/{group}/{version}/namespaces/{namespace}/{plural}`
#[derive(Debug, Deserialize)]
pub struct CollectionPath {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Request namespace
    pub namespace: String,
    /// Resource plural
    pub plural: String,
}

/// `/apis/{group}/{version}/namespaces/{namespace}/{plural}/{name}`
#[derive(Debug, Deserialize)]
pub struct ItemPath {
    /// API group
    pub group: String,
    /// API version
    pub version: String,
    /// Request namespace
    pub namespace: String,
    /// Resource plural
    pub plural: String,
    /// Application name
    pub name: String,
}

/// Query parameters accepted on collections
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionParams {
    /// Label selector, passed to the backing store verbatim
    pub label_selector: Option<String>,
    /// Field selector, passed to the backing store verbatim
    pub field_selector: Option<String>,
    /// resourceVersion to start a watch from
    pub resource_version: Option<String>,
    /// `true` or `1` turns a list into a watch
    pub watch: Option<String>,
}

impl CollectionParams {
    fn is_watch(&self) -> bool {
        matches!(self.watch.as_deref(), Some("true") | Some("1"))
    }

    fn list_options(&self) -> ListOptions {
        ListOptions {
            label_selector: self.label_selector.clone(),
            field_selector: self.field_selector.clone(),
            resource_version: self.resource_version.clone(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve<'a>(
    state: &'a AppState,
    group: &str,
    version: &str,
    plural: &str,
) -> Result<&'a ApplicationStore> {
    if group != API_GROUP || version != API_VERSION {
        return Err(Error::ResourceNotFound(format!("{}/{}", group, version)));
    }
    state.registry.lookup(plural)
}

/// Whether the client asked for a Table (`Accept: application/json;as=Table;...`)
fn wants_table(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|media| media.split(';').any(|param| param.trim() == "as=Table"))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::BadRequest(format!("failed to decode request body: {}", e)))
}

/// Pick the patch type from the request Content-Type
fn parse_patch(headers: &HeaderMap, body: &[u8]) -> Result<Patch<serde_json::Value>> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let media = content_type.split(';').next().unwrap_or_default().trim();

    match media {
        JSON_PATCH => Ok(Patch::Json(parse_body::<json_patch::Patch>(body)?)),
        MERGE_PATCH => Ok(Patch::Merge(parse_body(body)?)),
        STRATEGIC_MERGE_PATCH => Ok(Patch::Strategic(parse_body(body)?)),
        APPLY_PATCH => serde_yaml::from_slice(body)
            .map(Patch::Apply)
            .map_err(|e| Error::BadRequest(format!("failed to decode apply patch: {}", e))),
        other => Err(Error::BadRequest(format!(
            "unsupported patch content type {:?}",
            other
        ))),
    }
}

fn respond<T: serde::Serialize>(
    store: &ApplicationStore,
    headers: &HeaderMap,
    status: StatusCode,
    object: &T,
    source: TableSource<'_>,
) -> Result<Response> {
    if wants_table(headers) {
        let table = store.convert_to_table(source, TableOptions::default())?;
        return Ok((status, Json(table)).into_response());
    }
    Ok((status, Json(object)).into_response())
}

// ============================================================================
// Health and discovery
// ============================================================================

/// `GET /healthz`, `GET /readyz`
pub async fn health_handler() -> &'static str {
    "ok"
}

/// `GET /apis`
pub async fn group_list_handler() -> impl IntoResponse {
    Json(api_group_list())
}

/// `GET /apis/{group}`
pub async fn group_handler(Path(group): Path<String>) -> Result<Response> {
    if group != API_GROUP {
        return Err(Error::ResourceNotFound(group));
    }
    Ok(Json(api_group()).into_response())
}

/// `GET /apis/{group}/{version}`
pub async fn resource_list_handler(
    State(state): State<AppState>,
    Path(path): Path<GroupVersionPath>,
) -> Result<Response> {
    if path.group != API_GROUP || path.version != API_VERSION {
        return Err(Error::ResourceNotFound(format!(
            "{}/{}",
            path.group, path.version
        )));
    }
    Ok(Json(api_resource_list(&state.registry)).into_response())
}

// ============================================================================
// Collections
// ============================================================================

/// `GET /apis/{group}/{version}/{plural}`
///
/// Every Application is namespaced, so this always fails once the type
/// resolves.
pub async fn cluster_collection_handler(
    State(state): State<AppState>,
    Path(path): Path<ClusterCollectionPath>,
    Query(params): Query<CollectionParams>,
) -> Result<Response> {
    resolve(&state, &path.group, &path.version, &path.plural)?;
    let operation = if params.is_watch() {
        Operation::Watch
    } else {
        Operation::List
    };
    Err(Error::NamespaceRequired { operation })
}

/// `GET` on a namespaced collection: list, or watch with `?watch=true`
///
/// A watch responds with one JSON event per line until the backing watch
/// ends or the client goes away.
pub async fn list_handler(
    State(state): State<AppState>,
    Path(path): Path<CollectionPath>,
    Query(params): Query<CollectionParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let store = resolve(&state, &path.group, &path.version, &path.plural)?;
    let ctx = state.request_context(&path.namespace);
    let options = params.list_options();

    if params.is_watch() {
        let watch = store.watch(&ctx, &options).await?;
        let events = watch.map(|event| {
            serde_json::to_vec(&event).map(|mut line| {
                line.push(b'\n');
                Bytes::from(line)
            })
        });

        let mut response = Body::from_stream(events).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        return Ok(response);
    }

    let list = store.list(&ctx, &options).await?;
    respond(store, &headers, StatusCode::OK, &list, TableSource::List(&list))
}

/// `POST` on a namespaced collection
pub async fn create_handler(
    State(state): State<AppState>,
    Path(path): Path<CollectionPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let store = resolve(&state, &path.group, &path.version, &path.plural)?;
    let ctx = state.request_context(&path.namespace);

    let created = store.create(&ctx, parse_body(&body)?).await?;
    respond(
        store,
        &headers,
        StatusCode::CREATED,
        &created,
        TableSource::Application(&created),
    )
}

// ============================================================================
// Items
// ============================================================================

/// `GET` on a single Application
pub async fn get_handler(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    headers: HeaderMap,
) -> Result<Response> {
    let store = resolve(&state, &path.group, &path.version, &path.plural)?;
    let ctx = state.request_context(&path.namespace);

    let app = store.get(&ctx, &path.name).await?;
    respond(store, &headers, StatusCode::OK, &app, TableSource::Application(&app))
}

/// `PUT` on a single Application; creates it when missing
pub async fn replace_handler(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let store = resolve(&state, &path.group, &path.version, &path.plural)?;
    let ctx = state.request_context(&path.namespace);
    let desired: Application = parse_body(&body)?;

    let (app, created) = store
        .update(&ctx, &path.name, move |_| Ok(desired), true)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    respond(store, &headers, status, &app, TableSource::Application(&app))
}

/// `PATCH` on a single Application
pub async fn patch_handler(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let store = resolve(&state, &path.group, &path.version, &path.plural)?;
    let ctx = state.request_context(&path.namespace);
    let patch = parse_patch(&headers, &body)?;
    debug!(name = %path.name, namespace = %path.namespace, "Patch request");

    let app = store.patch(&ctx, &path.name, &patch).await?;
    respond(store, &headers, StatusCode::OK, &app, TableSource::Application(&app))
}

/// `DELETE` on a single Application
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
) -> Result<Response> {
    let store = resolve(&state, &path.group, &path.version, &path.plural)?;
    let ctx = state.request_context(&path.namespace);

    store.delete(&ctx, &path.name).await?;
    let status = serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Success",
        "details": {
            "name": path.name,
            "group": API_GROUP,
            "kind": path.plural
        }
    });
    Ok(Json(status).into_response())
}
