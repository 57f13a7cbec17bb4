//! Naming and labelling rules between Applications and Releases
//!
//! A Release is named `prefix + application name` and lives in the same
//! namespace as the Application it backs. The mapping is derived, never
//! stored.

use std::collections::BTreeMap;

/// Bidirectional name mapping for one resource type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameScheme {
    prefix: String,
}

impl NameScheme {
    /// Create a scheme for the given Release name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Release name for an Application name
    pub fn to_backing_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Application name for a Release name
    ///
    /// Names without the prefix are returned unchanged.
    pub fn to_synthetic_name<'a>(&self, backing_name: &'a str) -> &'a str {
        backing_name
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(backing_name)
    }
}

/// Union of two label sets; keys in `overrides` win
pub fn merge_labels(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Render labels as an equality-based label selector (`k1=v1,k2=v2`)
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// AND two selector strings, skipping empty ones
pub fn join_selectors(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{},{}", a, b),
    }
}
