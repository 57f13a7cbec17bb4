//! The backing Release resource (Flux `HelmRelease`)
//!
//! Only the fields the gateway reads or writes are typed. Everything else in
//! `spec` is kept in `extra` maps so a read-modify-write cycle does not drop
//! fields owned by the release controller's users.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::condition::Condition;
use crate::{Error, Result};

/// API group of the backing resource
pub const RELEASE_GROUP: &str = "helm.toolkit.fluxcd.io";
/// API version of the backing resource
pub const RELEASE_VERSION: &str = "v2";
/// `apiVersion` of the backing resource
pub const RELEASE_API_VERSION: &str = "helm.toolkit.fluxcd.io/v2";
/// Kind of the backing resource
pub const RELEASE_KIND: &str = "HelmRelease";
/// Plural of the backing resource
pub const RELEASE_PLURAL: &str = "helmreleases";

/// Reconcile strategy written to every Release the gateway creates
pub const RECONCILE_STRATEGY_REVISION: &str = "Revision";

/// ApiResource for dynamic access to Releases
pub fn release_api_resource() -> ApiResource {
    ApiResource {
        group: RELEASE_GROUP.to_string(),
        version: RELEASE_VERSION.to_string(),
        api_version: RELEASE_API_VERSION.to_string(),
        kind: RELEASE_KIND.to_string(),
        plural: RELEASE_PLURAL.to_string(),
    }
}

/// A backing Release
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Always [`RELEASE_API_VERSION`] for records written by the gateway
    #[serde(default)]
    pub api_version: String,
    /// Always [`RELEASE_KIND`] for records written by the gateway
    #[serde(default)]
    pub kind: String,
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state
    #[serde(default)]
    pub spec: ReleaseSpec,
    /// Observed state, owned by the release controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReleaseStatus>,
}

/// Desired state of a Release
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseSpec {
    /// Chart template the release is rendered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartTemplate>,
    /// Values handed to the chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,
    /// Fields the gateway does not interpret (interval, install, upgrade...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Chart template wrapper (`spec.chart`)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ChartTemplate {
    /// Template spec (`spec.chart.spec`)
    #[serde(default)]
    pub spec: ChartTemplateSpec,
    /// Fields the gateway does not interpret (`spec.chart.metadata`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Chart template spec (`spec.chart.spec`)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartTemplateSpec {
    /// Chart (template) name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<String>,
    /// Requested chart version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// When the chart is re-fetched ("ChartVersion" or "Revision")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_strategy: Option<String>,
    /// Where the chart comes from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<ChartSourceRef>,
    /// Fields the gateway does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cross-namespace chart source reference
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChartSourceRef {
    /// Source kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Source name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Source namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Observed state of a Release
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatus {
    /// Chart revision of the last install or upgrade attempt
    #[serde(default)]
    pub last_attempted_revision: String,
    /// Conditions reported by the release controller; entries that are not
    /// conditions at all are dropped
    #[serde(default, deserialize_with = "lenient_conditions")]
    pub conditions: Vec<Condition>,
}

fn lenient_conditions<'de, D>(deserializer: D) -> std::result::Result<Vec<Condition>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

impl Release {
    /// Object name, empty when unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Chart template spec, if present
    pub fn chart_spec(&self) -> Option<&ChartTemplateSpec> {
        self.spec.chart.as_ref().map(|c| &c.spec)
    }

    /// Parse a generic backing record into a typed Release
    pub fn try_from_dynamic(obj: &DynamicObject) -> Result<Self> {
        let value = serde_json::to_value(obj)
            .map_err(|e| Error::serialization_for_kind(RELEASE_KIND, e.to_string()))?;
        serde_json::from_value(value).map_err(|e| {
            Error::serialization_for_kind(
                RELEASE_KIND,
                format!(
                    "{} is not a valid {}: {}",
                    obj.metadata.name.as_deref().unwrap_or_default(),
                    RELEASE_KIND,
                    e
                ),
            )
        })
    }

    /// Render the Release as a generic backing record
    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        let value = serde_json::to_value(self)
            .map_err(|e| Error::serialization_for_kind(RELEASE_KIND, e.to_string()))?;
        serde_json::from_value(value)
            .map_err(|e| Error::serialization_for_kind(RELEASE_KIND, e.to_string()))
    }
}
