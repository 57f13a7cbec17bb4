//! Resource shapes on both sides of the translation

mod application;
mod condition;
mod release;

pub use application::{
    Application, ApplicationList, ApplicationStatus, API_GROUP, API_VERSION, GROUP_VERSION,
};
pub use condition::{Condition, ConditionStatus, CONDITION_READY, CONDITION_RELEASED};
pub use release::{
    release_api_resource, ChartSourceRef, ChartTemplate, ChartTemplateSpec, Release, ReleaseSpec,
    ReleaseStatus, RECONCILE_STRATEGY_REVISION, RELEASE_API_VERSION, RELEASE_GROUP, RELEASE_KIND,
    RELEASE_PLURAL, RELEASE_VERSION,
};
