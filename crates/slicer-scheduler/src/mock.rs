//! In-memory annotators and object builders for tests
//!
//! The builders produce nodes and pods carrying exactly the metadata the
//! device plugin would write, so accounting can be exercised without a
//! cluster.

use crate::stamp::PodAnnotator;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Container, Node, Pod, PodSpec, PodStatus, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use slicer_client::ClientError;
use slicer_core::annotations::{
    GPU_ASSIGNMENT_ANNOTATION, PHYSICAL_GPU_COUNT_ANNOTATION, VGPU_MEMORY_LABEL,
    VGPU_MEMORY_RESOURCE, VIRTUAL_GPU_COUNT_ANNOTATION,
};
use slicer_core::WorkloadKey;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Annotator that records every patch it receives
#[derive(Default)]
pub struct RecordingAnnotator {
    patches: Mutex<Vec<(WorkloadKey, BTreeMap<String, String>)>>,
}

impl RecordingAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patches received so far, in call order
    pub fn patches(&self) -> Vec<(WorkloadKey, BTreeMap<String, String>)> {
        self.patches
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PodAnnotator for RecordingAnnotator {
    async fn annotate(
        &self,
        pod: &WorkloadKey,
        annotations: &BTreeMap<String, String>,
    ) -> slicer_client::Result<()> {
        if let Ok(mut patches) = self.patches.lock() {
            patches.push((pod.clone(), annotations.clone()));
        }
        Ok(())
    }
}

/// Annotator whose patches are always rejected by the "API server"
pub struct FailingAnnotator {
    status: u16,
}

impl FailingAnnotator {
    pub fn new(status: u16) -> Self {
        Self { status }
    }
}

#[async_trait]
impl PodAnnotator for FailingAnnotator {
    async fn annotate(
        &self,
        pod: &WorkloadKey,
        _annotations: &BTreeMap<String, String>,
    ) -> slicer_client::Result<()> {
        Err(ClientError::unexpected_status(
            "PATCH",
            format!("/api/v1/namespaces/{}/pods/{}", pod.namespace, pod.name),
            self.status,
            "patch rejected",
        ))
    }
}

fn string_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Node with optional device-count annotations
pub fn gpu_node(name: &str, physical: Option<&str>, virtual_per_device: Option<&str>) -> Node {
    let mut annotations = Vec::new();
    if let Some(p) = physical {
        annotations.push((PHYSICAL_GPU_COUNT_ANNOTATION, p));
    }
    if let Some(v) = virtual_per_device {
        annotations.push((VIRTUAL_GPU_COUNT_ANNOTATION, v));
    }

    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node.metadata.annotations = Some(string_map(&annotations));
    node
}

/// Pod in the given phase with no accelerator metadata
pub fn pod_in_phase(name: &str, phase: &str) -> Pod {
    let mut pod = Pod::default();
    pod.metadata.name = Some(name.to_string());
    pod.metadata.namespace = Some("default".to_string());
    pod.spec = Some(PodSpec::default());
    pod.status = Some(PodStatus {
        phase: Some(phase.to_string()),
        ..Default::default()
    });
    pod
}

/// Pod bound to device slices through the assignment annotation
pub fn assigned_pod(name: &str, phase: &str, assignment: &str) -> Pod {
    let mut pod = pod_in_phase(name, phase);
    pod.metadata.annotations = Some(string_map(&[(GPU_ASSIGNMENT_ANNOTATION, assignment)]));
    pod
}

/// Pending pod whose single container limits accelerator memory to `units`
pub fn requesting_pod(name: &str, units: &str) -> Pod {
    let mut pod = pod_in_phase(name, "Pending");
    pod.spec = Some(PodSpec {
        containers: vec![Container {
            name: "main".to_string(),
            resources: Some(ResourceRequirements {
                limits: Some(BTreeMap::from([(
                    VGPU_MEMORY_RESOURCE.to_string(),
                    Quantity(units.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    });
    pod
}

/// Set the memory-demand label used for scoring
pub fn with_demand_label(mut pod: Pod, value: &str) -> Pod {
    pod.metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert(VGPU_MEMORY_LABEL.to_string(), value.to_string());
    pod
}

/// Place a pod on a node (spec.nodeName)
pub fn placed_on(mut pod: Pod, node_name: &str) -> Pod {
    pod.spec.get_or_insert_with(PodSpec::default).node_name = Some(node_name.to_string());
    pod
}
