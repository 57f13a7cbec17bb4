//! Field mapping between Applications and Releases
//!
//! Pure functions, no I/O. The mapper for one resource type is built from its
//! [`ResourceDefinition`] and shared for the lifetime of the server.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use apprelay_common::identity::merge_labels;
use apprelay_common::types::{
    Application, ApplicationStatus, ChartSourceRef, ChartTemplate, ChartTemplateSpec, Release,
    ReleaseSpec, CONDITION_READY, CONDITION_RELEASED, GROUP_VERSION, RECONCILE_STRATEGY_REVISION,
    RELEASE_API_VERSION, RELEASE_KIND,
};
use apprelay_common::{NameScheme, ReleaseConfig, ResourceDefinition};

/// Translates records of one configured resource type
#[derive(Clone, Debug)]
pub struct ReleaseMapper {
    kind: String,
    names: NameScheme,
    release: ReleaseConfig,
}

impl ReleaseMapper {
    /// Build the mapper for a configured resource type
    pub fn new(definition: &ResourceDefinition) -> Self {
        Self {
            kind: definition.application.kind.clone(),
            names: NameScheme::new(definition.release.prefix.clone()),
            release: definition.release.clone(),
        }
    }

    /// Kind written on every Application
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Name scheme of this resource type
    pub fn names(&self) -> &NameScheme {
        &self.names
    }

    /// Release template of this resource type
    pub fn release_config(&self) -> &ReleaseConfig {
        &self.release
    }

    /// Project a Release into an Application
    pub fn release_to_application(&self, release: &Release) -> Application {
        let meta = &release.metadata;
        let status = release.status.as_ref();

        let conditions = status
            .map(|s| {
                s.conditions
                    .iter()
                    .filter(|c| c.type_ == CONDITION_READY || c.type_ == CONDITION_RELEASED)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Application {
            api_version: GROUP_VERSION.to_string(),
            kind: self.kind.clone(),
            metadata: ObjectMeta {
                name: Some(self.names.to_synthetic_name(release.name()).to_string()),
                namespace: meta.namespace.clone(),
                creation_timestamp: meta.creation_timestamp.clone(),
                deletion_timestamp: meta.deletion_timestamp.clone(),
                resource_version: meta.resource_version.clone(),
                ..Default::default()
            },
            spec: release.spec.values.clone(),
            app_version: release
                .chart_spec()
                .and_then(|c| c.version.clone())
                .unwrap_or_default(),
            status: ApplicationStatus {
                version: status
                    .map(|s| s.last_attempted_revision.clone())
                    .unwrap_or_default(),
                conditions,
            },
        }
    }

    /// Render an Application as the Release that backs it
    ///
    /// With `existing`, labels are merged over the stored ones; annotations,
    /// finalizers, owner references and uninterpreted spec fields are carried
    /// over, and the stored resourceVersion is used when the Application has
    /// none.
    pub fn application_to_release(&self, app: &Application, existing: Option<&Release>) -> Release {
        let existing_meta = existing.map(|r| &r.metadata);
        let stored_labels = existing_meta
            .and_then(|m| m.labels.clone())
            .unwrap_or_default();
        let labels = merge_labels(&stored_labels, &self.release.labels);

        let resource_version = app
            .metadata
            .resource_version
            .clone()
            .or_else(|| existing_meta.and_then(|m| m.resource_version.clone()));

        let stored_chart = existing.and_then(|r| r.spec.chart.as_ref());
        let spec_extra = existing.map(|r| r.spec.extra.clone()).unwrap_or_default();
        let template_extra = stored_chart.map(|c| c.extra.clone()).unwrap_or_default();
        let chart_extra = stored_chart
            .map(|c| c.spec.extra.clone())
            .unwrap_or_default();

        let source = &self.release.chart.source_ref;
        Release {
            api_version: RELEASE_API_VERSION.to_string(),
            kind: RELEASE_KIND.to_string(),
            metadata: ObjectMeta {
                name: Some(self.names.to_backing_name(app.name())),
                namespace: app.metadata.namespace.clone(),
                labels: (!labels.is_empty()).then_some(labels),
                annotations: existing_meta.and_then(|m| m.annotations.clone()),
                finalizers: existing_meta.and_then(|m| m.finalizers.clone()),
                owner_references: existing_meta.and_then(|m| m.owner_references.clone()),
                resource_version,
                ..Default::default()
            },
            spec: ReleaseSpec {
                chart: Some(ChartTemplate {
                    spec: ChartTemplateSpec {
                        chart: Some(self.release.chart.name.clone()),
                        version: (!app.app_version.is_empty()).then(|| app.app_version.clone()),
                        reconcile_strategy: Some(RECONCILE_STRATEGY_REVISION.to_string()),
                        source_ref: Some(ChartSourceRef {
                            kind: Some(source.kind.clone()),
                            name: Some(source.name.clone()),
                            namespace: Some(source.namespace.clone()),
                        }),
                        extra: chart_extra,
                    },
                    extra: template_extra,
                }),
                values: app.spec.clone(),
                extra: spec_extra,
            },
            status: None,
        }
    }
}
