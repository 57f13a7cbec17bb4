//! Resource configuration
//!
//! The config file declares every synthetic resource type the gateway serves
//! and the Release template each one is backed by:
//!
//! ```yaml
//! resources:
//!   - application:
//!       kind: Postgres
//!       singular: postgres
//!       plural: postgreses
//!       shortNames: [pg]
//!     release:
//!       prefix: postgres-
//!       labels:
//!         apps.cozystack.io/application.kind: Postgres
//!       chart:
//!         name: postgres
//!         sourceRef:
//!           kind: HelmRepository
//!           name: cozystack-apps
//!           namespace: cozy-public
//! ```
//!
//! The file is loaded once at startup. Any missing required field is fatal.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// One entry per synthetic resource type
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
}

/// A synthetic resource type and the Release template backing it
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceDefinition {
    /// How the synthetic type is presented to API clients
    pub application: ApplicationConfig,
    /// How instances are persisted as Releases
    pub release: ReleaseConfig,
}

/// Naming of the synthetic resource type
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfig {
    /// Kind reported on every translated object (e.g. "Postgres")
    pub kind: String,
    /// Singular resource name
    #[serde(default)]
    pub singular: String,
    /// Plural resource name used in request paths
    pub plural: String,
    /// Short names advertised through discovery
    #[serde(default)]
    pub short_names: Vec<String>,
}

/// Backing Release template for one synthetic type
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseConfig {
    /// Prepended to every synthetic name to form the Release name
    pub prefix: String,
    /// Merged into the labels of every Release written by the gateway
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Chart (template) identity that scopes Releases to this type
    pub chart: ChartConfig,
}

/// Chart template identity
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    /// Chart name written to `spec.chart.spec.chart`
    pub name: String,
    /// Source the chart is fetched from
    pub source_ref: SourceRef,
}

/// Cross-namespace reference to a chart source
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    /// Source kind (e.g. "HelmRepository")
    pub kind: String,
    /// Source name
    pub name: String,
    /// Source namespace
    pub namespace: String,
}

impl ResourceConfig {
    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&data)?;
        tracing::info!(
            path = %path.display(),
            resources = config.resources.len(),
            "Loaded resource configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(data: &str) -> Result<Self> {
        let config: ResourceConfig = serde_yaml::from_str(data)
            .map_err(|e| Error::serialization(format!("invalid resource config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every entry has the fields the gateway cannot run without
    pub fn validate(&self) -> Result<()> {
        let mut plurals = HashSet::new();
        for (index, resource) in self.resources.iter().enumerate() {
            resource.validate(index)?;
            if !plurals.insert(resource.application.plural.as_str()) {
                return Err(Error::validation_for_field(
                    index,
                    "application.plural",
                    format!("duplicate plural {}", resource.application.plural),
                ));
            }
        }
        Ok(())
    }
}

impl ResourceDefinition {
    fn validate(&self, index: usize) -> Result<()> {
        let required = [
            ("application.kind", &self.application.kind, "empty kind"),
            ("application.plural", &self.application.plural, "empty plural"),
            ("release.prefix", &self.release.prefix, "empty release prefix"),
            ("release.chart.name", &self.release.chart.name, "empty chart name"),
        ];
        for (field, value, message) in required {
            if value.is_empty() {
                return Err(Error::validation_for_field(index, field, message));
            }
        }

        let source = &self.release.chart.source_ref;
        if source.kind.is_empty() || source.name.is_empty() || source.namespace.is_empty() {
            return Err(Error::validation_for_field(
                index,
                "release.chart.sourceRef",
                "incomplete chart sourceRef",
            ));
        }
        Ok(())
    }
}
