//! Slicer Client - Minimal Kubernetes API access for the scheduler
//!
//! Only what the scheduler needs: resolving connection settings (in-cluster
//! service account or kubeconfig) and patching pod annotations.

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod api_client;
pub mod config;
pub mod error;

pub use api_client::{annotation_patch, ApiClient, STRATEGIC_MERGE_PATCH};
pub use config::{ClusterConfig, DEFAULT_KUBECONFIG};
pub use error::{ClientError, Result};
