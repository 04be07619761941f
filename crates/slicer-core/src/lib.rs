//! Slicer Core - Shared types for fractional accelerator scheduling
//!
//! This crate provides:
//! - Annotation, label and resource names shared with the device plugin
//! - Typed, fallible accessors for node and pod metadata
//! - Accelerator memory quantity parsing
//! - Error types with miette diagnostics
//! - YAML/JSON document loading

pub mod annotations;
pub mod error;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use annotations::{AnnotationValue, DeviceSliceId};
pub use error::{Result, SlicerError};
pub use resources::ResourceQuantities;
pub use types::{object_name, WorkloadKey, WorkloadPhase};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Deserialize a resource from YAML
///
/// YAML is a superset of JSON, so this also accepts JSON documents.
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        SlicerError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}
