//! Slicer Scheduler - Fractional accelerator memory admission and ranking
//!
//! This crate provides:
//! - Per-device accelerator memory accounting rebuilt from pod metadata
//! - A first-fit admission filter
//! - A pack-together raw score and min-max score normalization
//! - The scheduler-timestamp stamp written before scoring
//! - A scheduling attempt that joins all per-node scores before ranking

pub mod device;
pub mod error;
pub mod filter;
pub mod mock;
pub mod node_view;
pub mod normalize;
pub mod scheduler;
pub mod score;
pub mod snapshot;
pub mod stamp;
pub mod types;

// Re-export commonly used types
pub use device::{DedupStrategy, DeviceAccountant};
pub use error::{Result, SchedulerError};
pub use node_view::NodeResourceView;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use snapshot::{ClusterSnapshot, SnapshotLister};
pub use stamp::{DryRunAnnotator, PodAnnotator};
pub use types::{
    Code, FilterResult, NodeInfo, NodeScore, ScheduleDecision, SchedulingContext, ScoreResult,
    MAX_NODE_SCORE,
};
