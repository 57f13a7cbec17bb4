//! Common types for apprelay: resource configuration, identity rules and the
//! Application/Release resource shapes

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::{
    ApplicationConfig, ChartConfig, ReleaseConfig, ResourceConfig, ResourceDefinition, SourceRef,
};
pub use error::Error;
pub use identity::NameScheme;

/// Result type alias using our custom Error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
