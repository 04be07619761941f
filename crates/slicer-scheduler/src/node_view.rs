use crate::device::{DedupStrategy, DeviceAccountant};
use crate::types::NodeInfo;
use slicer_core::annotations::{
    device_assignments, physical_gpu_count, virtual_gpu_count, PHYSICAL_GPU_COUNT_ANNOTATION,
    VIRTUAL_GPU_COUNT_ANNOTATION,
};
use slicer_core::{object_name, WorkloadPhase};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Device counts above this are treated as a corrupt annotation
pub const MAX_DEVICES_PER_NODE: u32 = 1024;

/// Accelerator capacity and usage of one node, rebuilt from a snapshot.
///
/// Devices live in an arena indexed by device index. A slot is `None` when
/// the node declares the device but its capacity is unknown; such a device
/// has no known availability and never admits a pod.
#[derive(Debug, Clone)]
pub struct NodeResourceView {
    node_name: String,
    devices: Vec<Option<DeviceAccountant>>,
    used: Vec<Option<u64>>,
}

impl NodeResourceView {
    /// Build the view for a node and the pods placed on it
    pub fn from_node_info(info: &NodeInfo, dedup: DedupStrategy) -> Self {
        let node_name = info.name();

        let device_count = match physical_gpu_count(&info.node)
            .present_or_warn(PHYSICAL_GPU_COUNT_ANNOTATION, &node_name)
        {
            Some(n) if n > MAX_DEVICES_PER_NODE => {
                warn!(
                    node = %node_name,
                    count = n,
                    max = MAX_DEVICES_PER_NODE,
                    "Physical device count out of range, treating node as having no devices"
                );
                0
            }
            Some(n) => n,
            None => 0,
        };

        let capacity = if device_count > 0 {
            virtual_gpu_count(&info.node).present_or_warn(VIRTUAL_GPU_COUNT_ANNOTATION, &node_name)
        } else {
            None
        };

        let devices: Vec<Option<DeviceAccountant>> = (0..device_count)
            .map(|index| capacity.map(|c| DeviceAccountant::new(index, c)))
            .collect();

        let used = devices
            .iter()
            .map(|slot| {
                slot.as_ref()
                    .map(|device| device.used_memory(&info.pods, dedup))
            })
            .collect();

        if devices.is_empty() {
            warn!(node = %node_name, "Node has no accelerator devices");
        }

        Self::warn_unknown_devices(info, device_count);

        let view = Self {
            node_name,
            devices,
            used,
        };
        debug!(
            node = %view.node_name,
            all = ?view.all_capacities(),
            used = ?view.used_capacities(),
            "Built node resource view"
        );
        view
    }

    fn warn_unknown_devices(info: &NodeInfo, device_count: u32) {
        for pod in info
            .pods
            .iter()
            .filter(|p| WorkloadPhase::of(p).holds_devices())
        {
            if let Some(id) = device_assignments(pod)
                .into_iter()
                .find(|id| id.device >= device_count)
            {
                warn!(
                    node = %info.name(),
                    pod = %object_name(&pod.metadata),
                    slice = %id,
                    "Pod holds a slice on a device the node does not declare"
                );
            }
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Number of declared devices, including ones with unknown capacity
    pub fn device_count(&self) -> u32 {
        self.devices.len() as u32
    }

    /// Device index to total capacity, one entry per known device
    pub fn all_capacities(&self) -> BTreeMap<u32, u64> {
        self.devices
            .iter()
            .flatten()
            .map(|d| (d.index(), d.capacity()))
            .collect()
    }

    /// Device index to used memory, one entry per known device
    pub fn used_capacities(&self) -> BTreeMap<u32, u64> {
        self.used
            .iter()
            .enumerate()
            .filter_map(|(index, used)| used.map(|u| (index as u32, u)))
            .collect()
    }

    /// Device index to free memory, for devices present in both maps.
    ///
    /// Usage above capacity reads as zero free memory.
    pub fn available_capacities(&self) -> BTreeMap<u32, u64> {
        let used = self.used_capacities();
        self.all_capacities()
            .into_iter()
            .filter_map(|(index, capacity)| {
                used.get(&index)
                    .map(|u| (index, capacity.saturating_sub(*u)))
            })
            .collect()
    }

    /// Free memory of one device, `None` when unknown or out of range
    pub fn available(&self, index: u32) -> Option<u64> {
        let device = self.devices.get(index as usize)?.as_ref()?;
        let used = (*self.used.get(index as usize)?)?;
        Some(device.capacity().saturating_sub(used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{assigned_pod, gpu_node};
    use k8s_openapi::api::core::v1::Pod;

    fn view(physical: Option<&str>, virtual_: Option<&str>, pods: Vec<Pod>) -> NodeResourceView {
        let info = NodeInfo::new(gpu_node("gpu-1", physical, virtual_), pods);
        NodeResourceView::from_node_info(&info, DedupStrategy::Distinct)
    }

    #[test]
    fn test_capacities_for_two_devices() {
        let view = view(
            Some("2"),
            Some("8"),
            vec![
                assigned_pod("w1", "Running", "0_0,0_1,0_2"),
                assigned_pod("w2", "Running", "1_0,1_1,1_2,1_3,1_4,1_5,1_6,1_7"),
            ],
        );

        assert_eq!(view.all_capacities(), BTreeMap::from([(0, 8), (1, 8)]));
        assert_eq!(view.used_capacities(), BTreeMap::from([(0, 3), (1, 8)]));
        assert_eq!(view.available_capacities(), BTreeMap::from([(0, 5), (1, 0)]));
    }

    #[test]
    fn test_overcommitted_device_reads_zero() {
        let view = view(
            Some("1"),
            Some("2"),
            vec![assigned_pod("w1", "Running", "0_0,0_1,0_2,0_3")],
        );

        assert_eq!(view.used_capacities()[&0], 4);
        assert_eq!(view.available_capacities()[&0], 0);
        assert_eq!(view.available(0), Some(0));
    }

    #[test]
    fn test_missing_physical_count_yields_empty_view() {
        let view = view(None, Some("8"), vec![]);
        assert_eq!(view.device_count(), 0);
        assert!(view.available_capacities().is_empty());
    }

    #[test]
    fn test_invalid_physical_count_yields_empty_view() {
        let unparsable = view(Some("two"), Some("8"), vec![]);
        assert_eq!(unparsable.device_count(), 0);

        let out_of_range = view(Some("100000"), Some("8"), vec![]);
        assert_eq!(out_of_range.device_count(), 0);
    }

    #[test]
    fn test_unknown_capacity_leaves_holes() {
        let view = view(Some("2"), None, vec![]);
        assert_eq!(view.device_count(), 2);
        assert!(view.all_capacities().is_empty());
        assert!(view.used_capacities().is_empty());
        assert!(view.available_capacities().is_empty());
        assert_eq!(view.available(0), None);
    }

    #[test]
    fn test_zero_capacity_devices_are_known() {
        let view = view(Some("1"), Some("0"), vec![]);
        assert_eq!(view.available(0), Some(0));
        assert_eq!(view.available_capacities(), BTreeMap::from([(0, 0)]));
    }

    #[test]
    fn test_slices_on_undeclared_devices_are_ignored() {
        let view = view(
            Some("1"),
            Some("4"),
            vec![assigned_pod("w1", "Running", "0_0,3_0")],
        );
        assert_eq!(view.used_capacities(), BTreeMap::from([(0, 1)]));
        assert_eq!(view.available(3), None);
    }
}
