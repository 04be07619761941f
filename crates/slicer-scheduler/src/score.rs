use crate::types::{NodeInfo, SchedulingContext};
use slicer_core::annotations::{memory_demand_label, VGPU_MEMORY_LABEL};
use slicer_core::object_name;
use tracing::debug;

/// Scoring function trait
pub trait ScoreFunction: Send + Sync {
    /// Raw, unbounded score of a node for the given pod (higher is better)
    fn score(&self, context: &SchedulingContext, node_info: &NodeInfo) -> u64;

    /// Name of the scoring function
    fn name(&self) -> &str;
}

/// Sum of the memory-demand labels of every pod placed on the node.
///
/// Reads the label, not the resource request. Missing or unparseable
/// labels add zero. Only unparseable labels are logged as warnings.
pub fn raw_score(node_info: &NodeInfo) -> u64 {
    let node_name = node_info.name();

    node_info
        .pods
        .iter()
        .map(|pod| {
            memory_demand_label(pod)
                .present_or_warn_invalid(
                    VGPU_MEMORY_LABEL,
                    &format!("{}/{}", node_name, object_name(&pod.metadata)),
                )
                .unwrap_or(0)
        })
        .fold(0u64, u64::saturating_add)
}

/// Prefer nodes already carrying more committed accelerator memory
pub struct VgpuMemoryPacking;

impl ScoreFunction for VgpuMemoryPacking {
    fn score(&self, _context: &SchedulingContext, node_info: &NodeInfo) -> u64 {
        let score = raw_score(node_info);
        debug!(node = %node_info.name(), score, "Accelerator memory packing score");
        score
    }

    fn name(&self) -> &str {
        "VgpuMemoryPacking"
    }
}

/// Get default scoring functions
pub fn default_scores() -> Vec<Box<dyn ScoreFunction>> {
    vec![Box::new(VgpuMemoryPacking)]
}

/// Combine raw scores from several scoring functions into one
pub fn calculate_total_score(scores: &[u64]) -> i64 {
    let total = scores.iter().copied().fold(0u64, u64::saturating_add);
    i64::try_from(total).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{gpu_node, pod_in_phase, requesting_pod, with_demand_label};
    use std::sync::{Arc, Mutex};

    fn node_info(pods: Vec<k8s_openapi::api::core::v1::Pod>) -> NodeInfo {
        NodeInfo::new(gpu_node("gpu-1", Some("2"), Some("8")), pods)
    }

    #[test]
    fn test_raw_score_sums_labels() {
        let info = node_info(vec![
            with_demand_label(pod_in_phase("a", "Running"), "2048"),
            with_demand_label(pod_in_phase("b", "Running"), "4096"),
        ]);
        assert_eq!(raw_score(&info), 6144);
    }

    #[test]
    fn test_unparsable_label_adds_zero() {
        let info = node_info(vec![
            with_demand_label(pod_in_phase("a", "Running"), "2048"),
            with_demand_label(pod_in_phase("b", "Running"), "4096"),
            with_demand_label(pod_in_phase("c", "Running"), "abc"),
            pod_in_phase("unlabeled", "Running"),
        ]);
        assert_eq!(raw_score(&info), 6144);
    }

    #[test]
    fn test_resource_request_is_not_the_score_source() {
        let info = node_info(vec![requesting_pod("big", "64")]);
        assert_eq!(raw_score(&info), 0);
    }

    #[test]
    fn test_empty_node_scores_zero() {
        assert_eq!(raw_score(&node_info(vec![])), 0);
    }

    /// Collects formatted log output at WARN and above
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn warnings_while(f: impl FnOnce()) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = logs.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_unlabeled_pods_do_not_warn() {
        let info = node_info(vec![
            pod_in_phase("web", "Running"),
            pod_in_phase("db", "Running"),
        ]);
        let output = warnings_while(|| assert_eq!(raw_score(&info), 0));
        assert!(output.is_empty(), "unexpected warnings: {}", output);
    }

    #[test]
    fn test_unparsable_label_warns() {
        let info = node_info(vec![with_demand_label(pod_in_phase("a", "Running"), "abc")]);
        let output = warnings_while(|| assert_eq!(raw_score(&info), 0));
        assert!(output.contains("Metadata value is invalid"));
        assert!(output.contains("gpu-1/a"));
    }

    #[test]
    fn test_calculate_total_score() {
        assert_eq!(calculate_total_score(&[]), 0);
        assert_eq!(calculate_total_score(&[6144, 10]), 6154);
        assert_eq!(calculate_total_score(&[u64::MAX, 1]), i64::MAX);
    }

    #[test]
    fn test_scorer_uses_node_pods() {
        let info = node_info(vec![with_demand_label(pod_in_phase("a", "Running"), "7")]);
        let context = SchedulingContext::new(requesting_pod("new", "1"));
        assert_eq!(VgpuMemoryPacking.score(&context, &info), 7);
    }
}
