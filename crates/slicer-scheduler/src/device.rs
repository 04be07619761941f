use k8s_openapi::api::core::v1::Pod;
use slicer_core::annotations::device_assignments;
use slicer_core::{DeviceSliceId, WorkloadPhase};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How repeated slice identifiers in a pod's assignment are collapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupStrategy {
    /// Every distinct identifier counts once
    #[default]
    Distinct,
    /// Only consecutive repeats collapse; "0_1,0_2,0_1" counts three slices
    Adjacent,
}

impl FromStr for DedupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "distinct" => Ok(Self::Distinct),
            "adjacent" => Ok(Self::Adjacent),
            other => Err(format!(
                "unknown dedup strategy '{}', expected 'distinct' or 'adjacent'",
                other
            )),
        }
    }
}

impl fmt::Display for DedupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Distinct => f.write_str("distinct"),
            Self::Adjacent => f.write_str("adjacent"),
        }
    }
}

impl DedupStrategy {
    /// Collapse `ids` according to the strategy, keeping first occurrences
    pub fn collapse(&self, ids: Vec<DeviceSliceId>) -> Vec<DeviceSliceId> {
        match self {
            Self::Distinct => {
                let mut seen = BTreeSet::new();
                ids.into_iter()
                    .filter(|id| seen.insert(id.clone()))
                    .collect()
            }
            Self::Adjacent => {
                let mut ids = ids;
                ids.dedup();
                ids
            }
        }
    }
}

/// Capacity and usage bookkeeping for one accelerator device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAccountant {
    index: u32,
    capacity: u64,
}

impl DeviceAccountant {
    pub fn new(index: u32, capacity: u64) -> Self {
        Self { index, capacity }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Total memory units of the device
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Slices of this device held by one pod.
    ///
    /// Pods that are neither Pending nor Running hold nothing.
    pub fn slices_held_by(&self, pod: &Pod, dedup: DedupStrategy) -> u64 {
        if !WorkloadPhase::of(pod).holds_devices() {
            return 0;
        }

        dedup
            .collapse(device_assignments(pod))
            .iter()
            .filter(|id| id.device == self.index)
            .count() as u64
    }

    /// Memory units used on this device by `pods`
    pub fn used_memory(&self, pods: &[Pod], dedup: DedupStrategy) -> u64 {
        pods.iter()
            .map(|pod| self.slices_held_by(pod, dedup))
            .fold(0u64, u64::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{assigned_pod, pod_in_phase};

    #[test]
    fn test_used_memory_counts_matching_device() {
        let device = DeviceAccountant::new(0, 8);
        let pods = vec![
            assigned_pod("a", "Running", "0_0,0_1,0_2"),
            assigned_pod("b", "Pending", "0_3,1_0"),
        ];

        assert_eq!(device.used_memory(&pods, DedupStrategy::Distinct), 4);
        assert_eq!(DeviceAccountant::new(1, 8).used_memory(&pods, DedupStrategy::Distinct), 1);
    }

    #[test]
    fn test_terminal_pods_hold_nothing() {
        let device = DeviceAccountant::new(0, 8);
        let pods = vec![
            assigned_pod("done", "Succeeded", "0_0,0_1"),
            assigned_pod("crashed", "Failed", "0_2"),
        ];
        assert_eq!(device.used_memory(&pods, DedupStrategy::Distinct), 0);
    }

    #[test]
    fn test_missing_or_malformed_assignment_counts_zero() {
        let device = DeviceAccountant::new(0, 8);
        let pods = vec![
            pod_in_phase("no-annotations", "Running"),
            assigned_pod("garbage", "Running", "not-an-id,,x_1"),
        ];
        assert_eq!(device.used_memory(&pods, DedupStrategy::Distinct), 0);
    }

    #[test]
    fn test_dedup_strategies_differ_on_scattered_repeats() {
        let device = DeviceAccountant::new(0, 8);
        let pods = vec![assigned_pod("a", "Running", "0_1,0_1,0_2,0_1")];

        assert_eq!(device.used_memory(&pods, DedupStrategy::Distinct), 2);
        assert_eq!(device.used_memory(&pods, DedupStrategy::Adjacent), 3);
    }

    #[test]
    fn test_dedup_strategy_parse() {
        assert_eq!("distinct".parse::<DedupStrategy>(), Ok(DedupStrategy::Distinct));
        assert_eq!("adjacent".parse::<DedupStrategy>(), Ok(DedupStrategy::Adjacent));
        assert!("set".parse::<DedupStrategy>().is_err());
        assert_eq!(DedupStrategy::default().to_string(), "distinct");
    }
}
