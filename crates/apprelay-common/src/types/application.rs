//! The synthetic Application resource
//!
//! Applications are never stored. Every instance is a projection of a
//! Release computed at request time.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use serde::{Deserialize, Serialize};

use super::condition::{Condition, ConditionStatus, CONDITION_READY};

/// API group served by the gateway
pub const API_GROUP: &str = "apps.cozystack.io";

/// API version served by the gateway
pub const API_VERSION: &str = "v1alpha1";

/// `apiVersion` value of every served object
pub const GROUP_VERSION: &str = "apps.cozystack.io/v1alpha1";

/// A synthetic Application as returned to API clients
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Always [`GROUP_VERSION`] for objects produced by the gateway
    #[serde(default)]
    pub api_version: String,
    /// Configured kind of the resource type
    #[serde(default)]
    pub kind: String,
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Opaque application values, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
    /// Version of the chart backing this application
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    /// Status derived from the backing Release
    #[serde(default)]
    pub status: ApplicationStatus,
}

/// Observed state of an Application
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ApplicationStatus {
    /// Last attempted chart revision
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Ready and Released conditions of the backing Release
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Application {
    /// Object name, empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Readiness derived from the first `Ready` condition
    pub fn ready_status(&self) -> ConditionStatus {
        self.status
            .conditions
            .iter()
            .find(|c| c.type_ == CONDITION_READY)
            .map(|c| c.status.clone())
            .unwrap_or_default()
    }
}

/// A list of Applications of one kind
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationList {
    /// Always [`GROUP_VERSION`]
    #[serde(default)]
    pub api_version: String,
    /// `<Kind>List`
    #[serde(default)]
    pub kind: String,
    /// List metadata, carrying the backing list's resourceVersion
    #[serde(default)]
    pub metadata: ListMeta,
    /// The items, in backing order
    #[serde(default)]
    pub items: Vec<Application>,
}

impl ApplicationList {
    /// Create a list for the given item kind
    pub fn new(kind: &str, resource_version: Option<String>, items: Vec<Application>) -> Self {
        Self {
            api_version: GROUP_VERSION.to_string(),
            kind: format!("{}List", kind),
            metadata: ListMeta {
                resource_version,
                ..Default::default()
            },
            items,
        }
    }
}
