use crate::error::{Result, SchedulerError};
use crate::types::NodeInfo;
use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Read access to the cluster state of one scheduling attempt
pub trait SnapshotLister: Send + Sync {
    /// A node and the pods placed on it
    fn get(&self, node_name: &str) -> Result<NodeInfo>;

    /// Every node with its pods, in snapshot order
    fn list(&self) -> Vec<NodeInfo>;
}

/// Point-in-time copy of nodes and pods.
///
/// Pods are placed on a node through `spec.nodeName`; pods without one are
/// pending placement and belong to no node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl ClusterSnapshot {
    pub fn new(nodes: Vec<Node>, pods: Vec<Pod>) -> Self {
        Self { nodes, pods }
    }

    /// Parse a snapshot from a YAML or JSON document
    pub fn parse(data: &str) -> Result<Self> {
        Ok(slicer_core::from_yaml(data)?)
    }

    /// Load a snapshot file
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            SchedulerError::snapshot_load_failed(path.display().to_string(), e.to_string())
        })?;
        let snapshot = Self::parse(&data).map_err(|e| {
            SchedulerError::snapshot_load_failed(path.display().to_string(), e.to_string())
        })?;

        debug!(
            path = %path.display(),
            nodes = snapshot.nodes.len(),
            pods = snapshot.pods.len(),
            "Loaded cluster snapshot"
        );
        Ok(snapshot)
    }

    fn pods_on(&self, node_name: &str) -> Vec<Pod> {
        self.pods
            .iter()
            .filter(|pod| {
                pod.spec
                    .as_ref()
                    .and_then(|s| s.node_name.as_deref())
                    == Some(node_name)
            })
            .cloned()
            .collect()
    }

    fn node_info(&self, node: &Node) -> NodeInfo {
        let name = node.metadata.name.as_deref().unwrap_or_default();
        NodeInfo::new(node.clone(), self.pods_on(name))
    }
}

impl SnapshotLister for ClusterSnapshot {
    fn get(&self, node_name: &str) -> Result<NodeInfo> {
        self.nodes
            .iter()
            .find(|n| n.metadata.name.as_deref() == Some(node_name))
            .map(|n| self.node_info(n))
            .ok_or_else(|| SchedulerError::node_not_found(node_name))
    }

    fn list(&self) -> Vec<NodeInfo> {
        self.nodes.iter().map(|n| self.node_info(n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{gpu_node, placed_on, pod_in_phase};
    use std::io::Write;

    const SNAPSHOT: &str = r#"
nodes:
  - apiVersion: v1
    kind: Node
    metadata:
      name: gpu-1
      annotations:
        physical-gpu-count: "2"
        virtual-gpu-count: "8"
  - apiVersion: v1
    kind: Node
    metadata:
      name: gpu-2
pods:
  - apiVersion: v1
    kind: Pod
    metadata:
      name: trainer
      namespace: ml
      annotations:
        alnair-gpu-id: "0_0,0_1"
    spec:
      nodeName: gpu-1
      containers:
        - name: main
    status:
      phase: Running
  - apiVersion: v1
    kind: Pod
    metadata:
      name: queued
      namespace: ml
    spec:
      containers:
        - name: main
"#;

    #[test]
    fn test_parse_and_place_pods() {
        let snapshot = ClusterSnapshot::parse(SNAPSHOT).unwrap();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.pods.len(), 2);

        let gpu1 = snapshot.get("gpu-1").unwrap();
        assert_eq!(gpu1.pods.len(), 1);
        assert_eq!(gpu1.pods[0].metadata.name.as_deref(), Some("trainer"));

        let gpu2 = snapshot.get("gpu-2").unwrap();
        assert!(gpu2.pods.is_empty());
    }

    #[test]
    fn test_get_missing_node() {
        let snapshot = ClusterSnapshot::default();
        assert!(matches!(
            snapshot.get("gpu-9"),
            Err(SchedulerError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_list_preserves_order() {
        let snapshot = ClusterSnapshot::new(
            vec![
                gpu_node("b", Some("1"), Some("4")),
                gpu_node("a", Some("1"), Some("4")),
            ],
            vec![placed_on(pod_in_phase("p", "Running"), "a")],
        );
        let names: Vec<String> = snapshot.list().iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(snapshot.list()[1].pods.len(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        let snapshot = ClusterSnapshot::load(file.path()).unwrap();
        assert_eq!(snapshot.nodes.len(), 2);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            ClusterSnapshot::load(&missing),
            Err(SchedulerError::SnapshotLoadFailed { .. })
        ));

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "nodes: [").unwrap();
        assert!(matches!(
            ClusterSnapshot::load(&bad),
            Err(SchedulerError::SnapshotLoadFailed { .. })
        ));
    }
}
