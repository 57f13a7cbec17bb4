//! Scope filter: which Releases belong to a configured resource type

use apprelay_common::types::Release;
use apprelay_common::ReleaseConfig;

/// Whether a Release was rendered from the configured chart and source
///
/// Chart name and all three sourceRef fields must be present and equal.
/// A Release missing any of them is out of scope.
pub fn in_scope(release: &Release, config: &ReleaseConfig) -> bool {
    let Some(chart) = release.chart_spec() else {
        return false;
    };
    let Some(source) = chart.source_ref.as_ref() else {
        return false;
    };
    let expected = &config.chart.source_ref;

    chart.chart.as_deref() == Some(config.chart.name.as_str())
        && source.kind.as_deref() == Some(expected.kind.as_str())
        && source.name.as_deref() == Some(expected.name.as_str())
        && source.namespace.as_deref() == Some(expected.namespace.as_str())
}
