//! Backing Release client
//!
//! The translation layer only talks to the backing store through
//! [`ReleaseClient`], so tests inject a mock and the server injects
//! [`KubeReleaseClient`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{
    DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams, WatchEvent,
    WatchParams,
};
use kube::discovery::ApiResource;
use kube::{Api, Client};

use apprelay_common::types::release_api_resource;

/// Field manager recorded on server-side apply patches
pub const FIELD_MANAGER: &str = "apprelay";

/// Stream of raw backing watch events
pub type ReleaseEventStream = BoxStream<'static, Result<WatchEvent<DynamicObject>, kube::Error>>;

/// One page of backing records
#[derive(Clone, Debug, Default)]
pub struct ReleaseList {
    /// resourceVersion of the backing list
    pub resource_version: Option<String>,
    /// Records in backing order
    pub items: Vec<DynamicObject>,
}

/// Generic CRUD and watch access to Releases in a namespace
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// List Releases
    async fn list(&self, namespace: &str, params: &ListParams) -> Result<ReleaseList, kube::Error>;

    /// Get a Release by name
    async fn get(&self, namespace: &str, name: &str) -> Result<DynamicObject, kube::Error>;

    /// Create a Release
    async fn create(
        &self,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;

    /// Replace a Release
    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;

    /// Patch a Release
    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Patch<serde_json::Value>,
    ) -> Result<DynamicObject, kube::Error>;

    /// Delete a Release
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;

    /// Open a watch on Releases starting after `version` ("0" for any)
    async fn watch(
        &self,
        namespace: &str,
        params: &WatchParams,
        version: &str,
    ) -> Result<ReleaseEventStream, kube::Error>;
}

/// [`ReleaseClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeReleaseClient {
    client: Client,
    resource: ApiResource,
}

impl KubeReleaseClient {
    /// Create a client for `helm.toolkit.fluxcd.io/v2` HelmReleases
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: release_api_resource(),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait]
impl ReleaseClient for KubeReleaseClient {
    async fn list(&self, namespace: &str, params: &ListParams) -> Result<ReleaseList, kube::Error> {
        let list = self.api(namespace).list(params).await?;
        Ok(ReleaseList {
            resource_version: list.metadata.resource_version,
            items: list.items,
        })
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<DynamicObject, kube::Error> {
        self.api(namespace).get(name).await
    }

    async fn create(
        &self,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(namespace).create(&PostParams::default(), obj).await
    }

    async fn replace(
        &self,
        namespace: &str,
        name: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(namespace)
            .replace(name, &PostParams::default(), obj)
            .await
    }

    async fn patch(
        &self,
        namespace: &str,
        name: &str,
        patch: &Patch<serde_json::Value>,
    ) -> Result<DynamicObject, kube::Error> {
        let params = match patch {
            Patch::Apply(_) => PatchParams::apply(FIELD_MANAGER),
            _ => PatchParams::default(),
        };
        self.api(namespace).patch(name, &params, patch).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn watch(
        &self,
        namespace: &str,
        params: &WatchParams,
        version: &str,
    ) -> Result<ReleaseEventStream, kube::Error> {
        let stream = self.api(namespace).watch(params, version).await?;
        Ok(stream.boxed())
    }
}
