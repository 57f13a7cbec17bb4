//! Registry of served Application types
//!
//! Built once at startup from the resource configuration and shared behind
//! an `Arc`; never mutated afterwards.

use std::sync::Arc;

use apprelay_common::ResourceConfig;

use crate::backend::ReleaseClient;
use crate::error::{Error, Result};
use crate::store::ApplicationStore;

/// Immutable table of [`ApplicationStore`]s, in configuration order
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    stores: Vec<ApplicationStore>,
}

impl ResourceRegistry {
    /// Build one store per configured resource type, all sharing `client`
    pub fn new(config: &ResourceConfig, client: Arc<dyn ReleaseClient>) -> Self {
        let stores = config
            .resources
            .iter()
            .map(|definition| ApplicationStore::new(definition.clone(), client.clone()))
            .collect();
        Self { stores }
    }

    /// Store serving `plural`, if configured
    pub fn get(&self, plural: &str) -> Option<&ApplicationStore> {
        self.stores
            .iter()
            .find(|store| store.definition().application.plural == plural)
    }

    /// Store serving `plural`, or ResourceNotFound
    pub fn lookup(&self, plural: &str) -> Result<&ApplicationStore> {
        self.get(plural)
            .ok_or_else(|| Error::ResourceNotFound(plural.to_string()))
    }

    /// All stores, in configuration order
    pub fn stores(&self) -> impl Iterator<Item = &ApplicationStore> {
        self.stores.iter()
    }

    /// Number of served resource types
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether no resource type is served
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
