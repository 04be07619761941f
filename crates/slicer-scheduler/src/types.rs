use k8s_openapi::api::core::v1::{Node, Pod};
use slicer_core::{object_name, ResourceQuantities};
use std::fmt;

/// Upper bound of a normalized node score
pub const MAX_NODE_SCORE: i64 = 100;

/// Scheduling context for one attempt: the pod and what it requests
#[derive(Debug, Clone)]
pub struct SchedulingContext {
    /// Pod to be scheduled
    pub pod: Pod,
    /// Accelerator memory requested by the pod
    pub request: ResourceQuantities,
}

impl SchedulingContext {
    /// Create a new scheduling context
    pub fn new(pod: Pod) -> Self {
        let request = ResourceQuantities::from_pod(&pod);
        Self { pod, request }
    }

    /// Name of the pod being scheduled
    pub fn pod_name(&self) -> String {
        object_name(&self.pod.metadata)
    }
}

/// A node together with the pods currently placed on it
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub node: Node,
    pub pods: Vec<Pod>,
}

impl NodeInfo {
    pub fn new(node: Node, pods: Vec<Pod>) -> Self {
        Self { node, pods }
    }

    pub fn name(&self) -> String {
        object_name(&self.node.metadata)
    }
}

/// Outcome code of a filter evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Success,
    Unschedulable,
    Error,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Success => "Success",
            Code::Unschedulable => "Unschedulable",
            Code::Error => "Error",
        };
        f.pad(s)
    }
}

/// Result of filtering a node
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Node name
    pub node_name: String,
    /// Outcome
    pub code: Code,
    /// Reason for failure (if any)
    pub reason: Option<String>,
}

impl FilterResult {
    /// Create a passing filter result
    pub fn pass(node_name: String) -> Self {
        Self {
            node_name,
            code: Code::Success,
            reason: None,
        }
    }

    /// Create a failing filter result
    pub fn fail(node_name: String, reason: String) -> Self {
        Self {
            node_name,
            code: Code::Unschedulable,
            reason: Some(reason),
        }
    }

    /// Create a result for a node that could not be evaluated
    pub fn error(node_name: String, reason: String) -> Self {
        Self {
            node_name,
            code: Code::Error,
            reason: Some(reason),
        }
    }

    pub fn passed(&self) -> bool {
        self.code == Code::Success
    }
}

/// Result of scoring a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreResult {
    /// Node name
    pub node_name: String,
    /// Raw score (unbounded, higher is better)
    pub score: i64,
}

impl ScoreResult {
    /// Create a new score result
    pub fn new(node_name: String, score: i64) -> Self {
        Self { node_name, score }
    }
}

/// A node score inside the list handed to normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

impl NodeScore {
    pub fn new(name: impl Into<String>, score: i64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

impl From<ScoreResult> for NodeScore {
    fn from(result: ScoreResult) -> Self {
        Self::new(result.node_name, result.score)
    }
}

/// Outcome of a full scheduling attempt
#[derive(Debug, Clone)]
pub struct ScheduleDecision {
    /// Node with the highest normalized score
    pub selected: String,
    /// Normalized scores of all feasible nodes, best first
    pub scores: Vec<NodeScore>,
    /// Nodes rejected by the filter
    pub rejected: Vec<FilterResult>,
}
