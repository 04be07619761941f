use crate::device::DedupStrategy;
use crate::filter::{default_filters, FilterPredicate};
use crate::normalize::normalize_scores;
use crate::score::{calculate_total_score, default_scores, ScoreFunction};
use crate::snapshot::SnapshotLister;
use crate::stamp::{stamp_scheduled_at, PodAnnotator};
use crate::types::{
    FilterResult, NodeInfo, NodeScore, ScheduleDecision, SchedulingContext, ScoreResult,
};
use crate::{Result, SchedulerError};
use futures_util::future::join_all;
use k8s_openapi::api::core::v1::Pod;
use slicer_core::WorkloadKey;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How repeated slice identifiers are collapsed when accounting usage
    pub dedup_strategy: DedupStrategy,
    /// Upper bound on the scheduler-timestamp patch
    pub patch_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dedup_strategy: DedupStrategy::default(),
            patch_timeout: Duration::from_secs(5),
        }
    }
}

enum NodeEvaluation {
    Rejected(FilterResult),
    Scored(ScoreResult),
    Failed(SchedulerError),
}

/// Accelerator memory scheduler.
///
/// Holds no per-attempt state; every call rebuilds the accounting it needs
/// from the snapshot it is given, so one instance can serve concurrent
/// attempts.
pub struct Scheduler {
    annotator: Arc<dyn PodAnnotator>,
    config: SchedulerConfig,
    filters: Vec<Box<dyn FilterPredicate>>,
    scorers: Vec<Box<dyn ScoreFunction>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(annotator: Arc<dyn PodAnnotator>, config: SchedulerConfig) -> Self {
        Self {
            annotator,
            filters: default_filters(config.dedup_strategy),
            scorers: default_scores(),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every filter against a node; the first rejection wins
    pub fn filter(&self, context: &SchedulingContext, node_info: &NodeInfo) -> FilterResult {
        for filter in &self.filters {
            let result = filter.filter(context, node_info);
            if !result.passed() {
                debug!(
                    "Node {} filtered out by {}: {}",
                    result.node_name,
                    filter.name(),
                    result.reason.clone().unwrap_or_default()
                );
                return result;
            }
        }

        FilterResult::pass(node_info.name())
    }

    /// Filter a node looked up by name; a node missing from the snapshot
    /// yields an `Error` result rather than a rejection
    pub fn filter_node(
        &self,
        context: &SchedulingContext,
        snapshot: &dyn SnapshotLister,
        node_name: &str,
    ) -> FilterResult {
        match snapshot.get(node_name) {
            Ok(info) => self.filter(context, &info),
            Err(e) => FilterResult::error(node_name.to_string(), e.to_string()),
        }
    }

    /// Raw score of a node for the pod.
    ///
    /// The pod is stamped with the scheduler timestamp first; if the stamp
    /// cannot be written the node is not scored.
    pub async fn score(
        &self,
        context: &SchedulingContext,
        snapshot: &dyn SnapshotLister,
        node_name: &str,
        token: &CancellationToken,
    ) -> Result<ScoreResult> {
        let key = WorkloadKey::from_pod(&context.pod)?;

        stamp_scheduled_at(
            self.annotator.as_ref(),
            &key,
            self.config.patch_timeout,
            token,
        )
        .await?;

        let node_info = snapshot.get(node_name)?;

        let raw: Vec<u64> = self
            .scorers
            .iter()
            .map(|scorer| scorer.score(context, &node_info))
            .collect();
        let score = calculate_total_score(&raw);

        debug!(node = %node_name, pod = %key, score, "Scored node");
        Ok(ScoreResult::new(node_name.to_string(), score))
    }

    /// Normalize the raw scores of one attempt in place
    pub fn normalize(&self, context: &SchedulingContext, scores: &mut [NodeScore]) {
        normalize_scores(scores);

        for node_score in scores.iter() {
            debug!(
                "Node: {}, Score: {} when scheduling Pod: {}",
                node_score.name,
                node_score.score,
                context.pod_name()
            );
        }
    }

    /// Run one scheduling attempt for `pod` over every node in the snapshot.
    ///
    /// Nodes are filtered and scored concurrently. Normalization only starts
    /// once every node has finished.
    pub async fn schedule(
        &self,
        pod: Pod,
        snapshot: &dyn SnapshotLister,
        token: &CancellationToken,
    ) -> Result<ScheduleDecision> {
        let context = SchedulingContext::new(pod);
        let pod_name = context.pod_name();

        let nodes = snapshot.list();
        if nodes.is_empty() {
            return Err(SchedulerError::no_suitable_nodes(
                pod_name,
                "No nodes in snapshot",
            ));
        }

        info!(
            "Scheduling pod {} (request: {} units) across {} nodes",
            pod_name,
            context.request.device_memory,
            nodes.len()
        );

        let context = &context;
        let evaluations = nodes.iter().map(|info| async move {
            let result = self.filter(context, info);
            if !result.passed() {
                return NodeEvaluation::Rejected(result);
            }
            match self.score(context, snapshot, &result.node_name, token).await {
                Ok(score) => NodeEvaluation::Scored(score),
                Err(e) => NodeEvaluation::Failed(e),
            }
        });

        // Join point: every node is filtered and scored before any rescaling
        let outcomes = join_all(evaluations).await;

        let mut scores = Vec::new();
        let mut rejected = Vec::new();
        for outcome in outcomes {
            match outcome {
                NodeEvaluation::Scored(score) => scores.push(NodeScore::from(score)),
                NodeEvaluation::Rejected(result) => rejected.push(result),
                NodeEvaluation::Failed(e) => {
                    warn!("Scoring failed for pod {}: {}", pod_name, e);
                    return Err(e);
                }
            }
        }

        if scores.is_empty() {
            let reasons: Vec<String> = rejected
                .iter()
                .filter_map(|r| r.reason.clone())
                .collect();
            return Err(SchedulerError::no_suitable_nodes(
                pod_name,
                reasons.join(", "),
            ));
        }

        info!("Pod {} has {} feasible nodes", pod_name, scores.len());

        self.normalize(context, &mut scores);

        // Stable sort keeps snapshot order among equal scores
        scores.sort_by(|a, b| b.score.cmp(&a.score));

        let selected = scores
            .first()
            .ok_or_else(|| SchedulerError::internal_error("No nodes scored"))?
            .name
            .clone();

        info!(
            "Selected node {} for pod {} with score {}",
            selected, pod_name, scores[0].score
        );

        Ok(ScheduleDecision {
            selected,
            scores,
            rejected,
        })
    }
}
