//! API discovery documents
//!
//! Lets `kubectl` find the served group, version and resource types.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIGroup, APIGroupList, APIResource, APIResourceList, GroupVersionForDiscovery,
};

use apprelay_common::types::{API_GROUP, API_VERSION, GROUP_VERSION};

use crate::registry::ResourceRegistry;

/// Verbs supported on every served resource
const VERBS: &[&str] = &["create", "delete", "get", "list", "patch", "update", "watch"];

fn group_version() -> GroupVersionForDiscovery {
    GroupVersionForDiscovery {
        group_version: GROUP_VERSION.to_string(),
        version: API_VERSION.to_string(),
    }
}

/// `GET /apis/{group}`
pub fn api_group() -> APIGroup {
    APIGroup {
        name: API_GROUP.to_string(),
        versions: vec![group_version()],
        preferred_version: Some(group_version()),
        ..Default::default()
    }
}

/// `GET /apis`
pub fn api_group_list() -> APIGroupList {
    APIGroupList {
        groups: vec![api_group()],
    }
}

/// `GET /apis/{group}/{version}`
pub fn api_resource_list(registry: &ResourceRegistry) -> APIResourceList {
    let resources = registry
        .stores()
        .map(|store| {
            let app = &store.definition().application;
            let singular = if app.singular.is_empty() {
                app.kind.to_lowercase()
            } else {
                app.singular.clone()
            };
            APIResource {
                name: app.plural.clone(),
                singular_name: singular,
                namespaced: true,
                kind: app.kind.clone(),
                verbs: VERBS.iter().map(|v| v.to_string()).collect(),
                short_names: (!app.short_names.is_empty()).then(|| app.short_names.clone()),
                ..Default::default()
            }
        })
        .collect();

    APIResourceList {
        group_version: GROUP_VERSION.to_string(),
        resources,
    }
}
