// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Slicer operations
#[derive(Error, Debug, Diagnostic)]
pub enum SlicerError {
    /// Annotation or label present but not parseable
    #[error("Invalid value '{value}' for '{key}': {reason}")]
    #[diagnostic(
        code(slicer::invalid_annotation),
        help("Check the device plugin that writes '{key}'. The value must be a decimal integer or a '<device>_<slice>' identifier")
    )]
    InvalidAnnotation {
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Resource quantity could not be parsed
    #[error("Invalid quantity '{value}': {reason}")]
    #[diagnostic(
        code(slicer::invalid_quantity),
        help("Accelerator memory is requested as a non-negative Kubernetes quantity such as '4', '1.5Gi', '2k' or '1e3'")
    )]
    InvalidQuantity {
        #[allow(unused)]
        value: String,
        #[allow(unused)]
        reason: String,
    },

    /// Required field missing from a resource
    #[error("Missing required field: {field}")]
    #[diagnostic(
        code(slicer::missing_field),
        help("Ensure the resource carries metadata.name and metadata.namespace")
    )]
    MissingField {
        #[allow(unused)]
        field: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(slicer::serialization_error),
        help("Ensure the document is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Slicer operations
pub type Result<T> = std::result::Result<T, SlicerError>;

impl SlicerError {
    /// Create an InvalidAnnotation error
    pub fn invalid_annotation(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidAnnotation {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidQuantity error
    pub fn invalid_quantity(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingField error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}
