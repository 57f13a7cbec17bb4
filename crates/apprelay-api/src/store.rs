//! REST storage for one configured Application type
//!
//! Every operation is rewritten into a call against the backing Release
//! client and every result is projected back. Nothing is cached; each read
//! recomputes the projection.

use std::sync::Arc;

use kube::api::{DynamicObject, ListParams, Patch, WatchParams};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use apprelay_common::identity::{join_selectors, label_selector};
use apprelay_common::types::{Application, ApplicationList, Release, API_GROUP};
use apprelay_common::ResourceDefinition;

use crate::backend::ReleaseClient;
use crate::error::{Error, Operation, Result};
use crate::mapper::ReleaseMapper;
use crate::scope::in_scope;
use crate::table::{render_table, Table, TableOptions, TableSource};
use crate::watch::ApplicationWatch;

/// Per-request context
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Namespace from the request path; `None` for cluster-wide requests
    pub namespace: Option<String>,
    /// Cancelled when the caller goes away
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// Context for a namespaced request
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            cancel: CancellationToken::new(),
        }
    }

    fn require_namespace(&self, operation: Operation) -> Result<&str> {
        self.namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .ok_or(Error::NamespaceRequired { operation })
    }
}

/// Selectors for list and watch, passed to the backing store verbatim
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Label selector
    pub label_selector: Option<String>,
    /// Field selector
    pub field_selector: Option<String>,
    /// Watch only: resourceVersion to resume from
    pub resource_version: Option<String>,
}

/// Storage for one Application type
#[derive(Clone)]
pub struct ApplicationStore {
    client: Arc<dyn ReleaseClient>,
    definition: ResourceDefinition,
    mapper: ReleaseMapper,
    group_resource: String,
}

impl ApplicationStore {
    /// Create storage for a configured resource type
    pub fn new(definition: ResourceDefinition, client: Arc<dyn ReleaseClient>) -> Self {
        let mapper = ReleaseMapper::new(&definition);
        let group_resource = format!("{}.{}", definition.application.plural, API_GROUP);
        Self {
            client,
            definition,
            mapper,
            group_resource,
        }
    }

    /// The resource type this store serves
    pub fn definition(&self) -> &ResourceDefinition {
        &self.definition
    }

    /// `plural.group`, as used in Kubernetes error messages
    pub fn group_resource(&self) -> &str {
        &self.group_resource
    }

    fn backing_name(&self, name: &str) -> String {
        self.mapper.names().to_backing_name(name)
    }

    /// Decode a backing record, treating an out-of-scope record as absent
    fn decode_in_scope(
        &self,
        operation: Operation,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<Release> {
        let release = Release::try_from_dynamic(obj)
            .map_err(|e| Error::conversion(operation, name, e.to_string()))?;
        if !in_scope(&release, self.mapper.release_config()) {
            debug!(
                name = %name,
                chart = ?release.chart_spec().and_then(|c| c.chart.as_deref()),
                "Release exists but belongs to another chart"
            );
            return Err(Error::not_found(&self.group_resource, name));
        }
        Ok(release)
    }

    fn project(
        &self,
        operation: Operation,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<Application> {
        let release = Release::try_from_dynamic(obj)
            .map_err(|e| Error::conversion(operation, name, e.to_string()))?;
        Ok(self.mapper.release_to_application(&release))
    }

    /// Prepare a client-supplied Application for writing into `namespace`
    fn admit(
        &self,
        mut app: Application,
        name: Option<&str>,
        namespace: &str,
    ) -> Result<Application> {
        if let Some(name) = name {
            match app.metadata.name.as_deref() {
                None | Some("") => app.metadata.name = Some(name.to_string()),
                Some(n) if n == name => {}
                Some(n) => {
                    return Err(Error::BadRequest(format!(
                        "the name of the object ({}) does not match the name on the URL ({})",
                        n, name
                    )))
                }
            }
        }
        if app.name().is_empty() {
            return Err(Error::BadRequest("name is required".to_string()));
        }
        match app.metadata.namespace.as_deref() {
            None | Some("") => app.metadata.namespace = Some(namespace.to_string()),
            Some(ns) if ns == namespace => {}
            Some(ns) => {
                return Err(Error::BadRequest(format!(
                    "the namespace of the provided object ({}) does not match the namespace sent on the request ({})",
                    ns, namespace
                )))
            }
        }
        Ok(app)
    }

    /// Create an Application by creating its backing Release
    pub async fn create(&self, ctx: &RequestContext, app: Application) -> Result<Application> {
        let namespace = ctx.require_namespace(Operation::Create)?;
        let app = self.admit(app, None, namespace)?;
        let name = app.name().to_string();

        let release = self.mapper.application_to_release(&app, None);
        let obj = release
            .to_dynamic()
            .map_err(|e| Error::conversion(Operation::Create, &name, e.to_string()))?;

        let created = self.client.create(namespace, &obj).await.map_err(|e| {
            warn!(name = %name, namespace = %namespace, error = %e, "Failed to create Release");
            Error::from_backing(Operation::Create, &name, e)
        })?;

        info!(
            name = %name,
            namespace = %namespace,
            kind = %self.mapper.kind(),
            "Created Application"
        );
        self.project(Operation::Create, &name, &created)
    }

    /// Get an Application by name
    pub async fn get(&self, ctx: &RequestContext, name: &str) -> Result<Application> {
        let namespace = ctx.require_namespace(Operation::Get)?;

        let obj = self
            .client
            .get(namespace, &self.backing_name(name))
            .await
            .map_err(|e| {
                debug!(name = %name, namespace = %namespace, error = %e, "Failed to get Release");
                Error::from_backing(Operation::Get, name, e)
            })?;

        let release = self.decode_in_scope(Operation::Get, name, &obj)?;
        Ok(self.mapper.release_to_application(&release))
    }

    /// List the Applications in the request namespace
    ///
    /// Records that are out of scope or fail to decode are skipped.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ApplicationList> {
        let namespace = ctx.require_namespace(Operation::List)?;

        let mut params = ListParams::default();
        if let Some(labels) = options.label_selector.as_deref() {
            params = params.labels(labels);
        }
        if let Some(fields) = options.field_selector.as_deref() {
            params = params.fields(fields);
        }

        let list = self.client.list(namespace, &params).await.map_err(|e| {
            warn!(namespace = %namespace, error = %e, "Failed to list Releases");
            Error::from_backing(Operation::List, namespace, e)
        })?;

        let total = list.items.len();
        let items: Vec<Application> = list
            .items
            .iter()
            .filter_map(|obj| match Release::try_from_dynamic(obj) {
                Ok(release) => Some(release),
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Skipping malformed Release");
                    None
                }
            })
            .filter(|release| in_scope(release, self.mapper.release_config()))
            .map(|release| self.mapper.release_to_application(&release))
            .collect();

        debug!(
            namespace = %namespace,
            kind = %self.mapper.kind(),
            total,
            matched = items.len(),
            "Listed Applications"
        );
        Ok(ApplicationList::new(self.mapper.kind(), list.resource_version, items))
    }

    /// Read-modify-write an Application
    ///
    /// The updater receives the current Application, or `None` when it does
    /// not exist and `force_allow_create` is set, in which case the result is
    /// created. Returns the stored Application and whether it was created.
    pub async fn update<F>(
        &self,
        ctx: &RequestContext,
        name: &str,
        updater: F,
        force_allow_create: bool,
    ) -> Result<(Application, bool)>
    where
        F: FnOnce(Option<Application>) -> Result<Application> + Send,
    {
        let namespace = ctx.require_namespace(Operation::Update)?;
        let backing_name = self.backing_name(name);

        let old = match self.client.get(namespace, &backing_name).await {
            Ok(obj) => self.decode_in_scope(Operation::Update, name, &obj),
            Err(e) => Err(Error::from_backing(Operation::Update, name, e)),
        };
        let existing = match old {
            Ok(release) => Some(release),
            Err(Error::BackingNotFound { .. }) if force_allow_create => None,
            Err(e) => return Err(e),
        };

        let current = existing
            .as_ref()
            .map(|release| self.mapper.release_to_application(release));
        let updated = self.admit(updater(current)?, Some(name), namespace)?;

        let release = self.mapper.application_to_release(&updated, existing.as_ref());
        let obj = release
            .to_dynamic()
            .map_err(|e| Error::conversion(Operation::Update, name, e.to_string()))?;

        let (stored, created) = if existing.is_some() {
            let stored = self
                .client
                .replace(namespace, &backing_name, &obj)
                .await
                .map_err(|e| {
                    warn!(
                        name = %name,
                        namespace = %namespace,
                        error = %e,
                        "Failed to replace Release"
                    );
                    Error::from_backing(Operation::Update, name, e)
                })?;
            (stored, false)
        } else {
            let stored = self.client.create(namespace, &obj).await.map_err(|e| {
                warn!(name = %name, namespace = %namespace, error = %e, "Failed to create Release");
                Error::from_backing(Operation::Update, name, e)
            })?;
            (stored, true)
        };

        info!(name = %name, namespace = %namespace, created, "Updated Application");
        Ok((self.project(Operation::Update, name, &stored)?, created))
    }

    /// Forward a patch to the backing Release
    ///
    /// Patch paths address the Release, not the Application.
    pub async fn patch(
        &self,
        ctx: &RequestContext,
        name: &str,
        patch: &Patch<serde_json::Value>,
    ) -> Result<Application> {
        let namespace = ctx.require_namespace(Operation::Patch)?;
        let backing_name = self.backing_name(name);

        let current = self
            .client
            .get(namespace, &backing_name)
            .await
            .map_err(|e| Error::from_backing(Operation::Patch, name, e))?;
        self.decode_in_scope(Operation::Patch, name, &current)?;

        let patched = self
            .client
            .patch(namespace, &backing_name, patch)
            .await
            .map_err(|e| {
                warn!(name = %name, namespace = %namespace, error = %e, "Failed to patch Release");
                Error::from_backing(Operation::Patch, name, e)
            })?;

        info!(name = %name, namespace = %namespace, "Patched Application");
        self.project(Operation::Patch, name, &patched)
    }

    /// Delete an Application; returns once the backing delete returns
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<()> {
        let namespace = ctx.require_namespace(Operation::Delete)?;
        let backing_name = self.backing_name(name);

        let current = self
            .client
            .get(namespace, &backing_name)
            .await
            .map_err(|e| Error::from_backing(Operation::Delete, name, e))?;
        self.decode_in_scope(Operation::Delete, name, &current)?;

        self.client
            .delete(namespace, &backing_name)
            .await
            .map_err(|e| {
                warn!(name = %name, namespace = %namespace, error = %e, "Failed to delete Release");
                Error::from_backing(Operation::Delete, name, e)
            })?;

        info!(name = %name, namespace = %namespace, "Deleted Application");
        Ok(())
    }

    /// Watch the Applications in the request namespace
    ///
    /// The backing watch is additionally restricted to the configured labels.
    pub async fn watch(
        &self,
        ctx: &RequestContext,
        options: &ListOptions,
    ) -> Result<ApplicationWatch> {
        let namespace = ctx.require_namespace(Operation::Watch)?;

        let labels = join_selectors(
            &label_selector(&self.mapper.release_config().labels),
            options.label_selector.as_deref().unwrap_or_default(),
        );
        let mut params = WatchParams::default();
        if !labels.is_empty() {
            params = params.labels(&labels);
        }
        if let Some(fields) = options.field_selector.as_deref() {
            params = params.fields(fields);
        }

        let version = options
            .resource_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or("0");
        let upstream = self
            .client
            .watch(namespace, &params, version)
            .await
            .map_err(|e| {
                warn!(namespace = %namespace, error = %e, "Failed to open Release watch");
                Error::from_backing(Operation::Watch, namespace, e)
            })?;

        info!(
            namespace = %namespace,
            kind = %self.mapper.kind(),
            label_selector = %labels,
            "Watching Applications"
        );
        Ok(ApplicationWatch::spawn(upstream, self.mapper.clone(), &ctx.cancel))
    }

    /// Render an Application, a list, or untyped JSON as a Table
    pub fn convert_to_table(
        &self,
        source: TableSource<'_>,
        options: TableOptions,
    ) -> Result<Table> {
        render_table(source, options, &self.group_resource, chrono::Utc::now())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
