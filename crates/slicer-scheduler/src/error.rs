// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// No suitable nodes found
    #[error("No suitable nodes found for pod {pod_name}: {reason}")]
    #[diagnostic(
        code(scheduler::no_suitable_nodes),
        help("Check the physical-gpu-count and virtual-gpu-count node annotations and the pod's alnair/vgpu-memory request")
    )]
    NoSuitableNodes { pod_name: String, reason: String },

    /// Node missing from the cluster snapshot
    #[error("Node {node_name} not found in snapshot")]
    #[diagnostic(
        code(scheduler::node_not_found),
        help("The node may have been removed between filtering and scoring")
    )]
    NodeNotFound { node_name: String },

    /// Writing the scheduler-timestamp annotation failed
    #[error("Cannot stamp scheduler-timestamp on pod {pod_name}: {message}")]
    #[diagnostic(
        code(scheduler::stamp_failed),
        help("Scoring is aborted when the stamp cannot be written. Check API server connectivity and RBAC for pods/patch")
    )]
    StampFailed {
        pod_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Scheduling attempt cancelled by the caller
    #[error("Scheduling of pod {pod_name} was cancelled")]
    #[diagnostic(code(scheduler::cancelled))]
    Cancelled { pod_name: String },

    /// Snapshot could not be loaded
    #[error("Failed to load snapshot from {path}: {message}")]
    #[diagnostic(
        code(scheduler::snapshot_load_failed),
        help("A snapshot is a YAML or JSON document with 'nodes' and 'pods' lists")
    )]
    SnapshotLoadFailed { path: String, message: String },

    /// Core error
    #[error("Core error: {0}")]
    #[diagnostic(code(scheduler::core_error), help("This is an internal error"))]
    CoreError(#[from] slicer_core::SlicerError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError { message: String },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a NoSuitableNodes error
    pub fn no_suitable_nodes(pod_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoSuitableNodes {
            pod_name: pod_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a NodeNotFound error
    pub fn node_not_found(node_name: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_name: node_name.into(),
        }
    }

    /// Create a StampFailed error
    pub fn stamp_failed(
        pod_name: impl Into<String>,
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::StampFailed {
            pod_name: pod_name.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a Cancelled error
    pub fn cancelled(pod_name: impl Into<String>) -> Self {
        Self::Cancelled {
            pod_name: pod_name.into(),
        }
    }

    /// Create a SnapshotLoadFailed error
    pub fn snapshot_load_failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SnapshotLoadFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
