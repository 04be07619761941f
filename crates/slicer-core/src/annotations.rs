//! Metadata keys shared with the device plugin, and typed accessors over them.
//!
//! Every accessor returns an [`AnnotationValue`] so that "absent" and
//! "present but unparseable" stay distinguishable from a real zero. Call
//! sites decide the default.

use crate::error::SlicerError;
use crate::types::object_name;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Extended resource name under which pods request accelerator memory
pub const VGPU_MEMORY_RESOURCE: &str = "alnair/vgpu-memory";

/// Pod label carrying the memory demand used for scoring
pub const VGPU_MEMORY_LABEL: &str = "alnair/vgpu-memory";

/// Pod annotation listing the device slices bound to the pod
pub const GPU_ASSIGNMENT_ANNOTATION: &str = "alnair-gpu-id";

/// Node annotation with the number of physical devices
pub const PHYSICAL_GPU_COUNT_ANNOTATION: &str = "physical-gpu-count";

/// Node annotation with the memory units (virtual slices) per physical device
pub const VIRTUAL_GPU_COUNT_ANNOTATION: &str = "virtual-gpu-count";

/// Pod annotation stamped with the time the pod was last scored
pub const SCHEDULER_TIMESTAMP_ANNOTATION: &str = "scheduler-timestamp";

/// Outcome of reading a typed value out of annotations or labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue<T> {
    /// Key present and parsed
    Present(T),
    /// Key not set
    Absent,
    /// Key set but the value did not parse
    Invalid { raw: String, reason: String },
}

impl<T> AnnotationValue<T> {
    /// Parsed value, logging a warning naming `key` and `owner` when the
    /// value is absent or invalid.
    ///
    /// For keys every well-formed object is expected to carry.
    pub fn present_or_warn(self, key: &str, owner: &str) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => {
                warn!(key, owner, "Metadata key not set");
                None
            }
            Self::Invalid { raw, reason } => {
                warn!(key, owner, value = %raw, %reason, "Metadata value is invalid");
                None
            }
        }
    }

    /// Parsed value for an optional key. Absence is logged at debug level,
    /// an unparseable value as a warning.
    pub fn present_or_warn_invalid(self, key: &str, owner: &str) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => {
                debug!(key, owner, "Optional metadata key not set");
                None
            }
            Self::Invalid { raw, reason } => {
                warn!(key, owner, value = %raw, %reason, "Metadata value is invalid");
                None
            }
        }
    }
}

/// Parse `key` out of a string map (annotations or labels)
pub fn parse_entry<T>(entries: Option<&BTreeMap<String, String>>, key: &str) -> AnnotationValue<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match entries.and_then(|m| m.get(key)) {
        None => AnnotationValue::Absent,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => AnnotationValue::Present(v),
            Err(e) => AnnotationValue::Invalid {
                raw: raw.clone(),
                reason: e.to_string(),
            },
        },
    }
}

/// Number of physical accelerator devices declared on the node
pub fn physical_gpu_count(node: &Node) -> AnnotationValue<u32> {
    parse_entry(
        node.metadata.annotations.as_ref(),
        PHYSICAL_GPU_COUNT_ANNOTATION,
    )
}

/// Memory units exposed by each physical device on the node
pub fn virtual_gpu_count(node: &Node) -> AnnotationValue<u64> {
    parse_entry(
        node.metadata.annotations.as_ref(),
        VIRTUAL_GPU_COUNT_ANNOTATION,
    )
}

/// Memory demand carried by the pod label used for scoring
pub fn memory_demand_label(pod: &Pod) -> AnnotationValue<u64> {
    parse_entry(pod.metadata.labels.as_ref(), VGPU_MEMORY_LABEL)
}

/// Unix nanoseconds of the last scheduler stamp on the pod
pub fn last_scheduled_at(pod: &Pod) -> AnnotationValue<u64> {
    parse_entry(
        pod.metadata.annotations.as_ref(),
        SCHEDULER_TIMESTAMP_ANNOTATION,
    )
}

/// A device-qualified slice identifier: `<device-index>_<slice>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceSliceId {
    /// Physical device index on the node
    pub device: u32,
    /// Slice identifier within the device
    pub slice: String,
}

impl FromStr for DeviceSliceId {
    type Err = SlicerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (device, slice) = s.split_once('_').ok_or_else(|| {
            SlicerError::invalid_annotation(
                GPU_ASSIGNMENT_ANNOTATION,
                s,
                "expected '<device>_<slice>'",
            )
        })?;

        let device = device.parse::<u32>().map_err(|e| {
            SlicerError::invalid_annotation(
                GPU_ASSIGNMENT_ANNOTATION,
                s,
                format!("invalid device index: {}", e),
            )
        })?;

        if slice.is_empty() {
            return Err(SlicerError::invalid_annotation(
                GPU_ASSIGNMENT_ANNOTATION,
                s,
                "empty slice identifier",
            ));
        }

        Ok(Self {
            device,
            slice: slice.to_string(),
        })
    }
}

impl fmt::Display for DeviceSliceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.device, self.slice)
    }
}

/// Slice identifiers from the pod's assignment annotation, in source order.
///
/// Malformed entries are skipped with a warning. Duplicates are kept; the
/// accountant decides how to collapse them.
pub fn device_assignments(pod: &Pod) -> Vec<DeviceSliceId> {
    let raw = match pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(GPU_ASSIGNMENT_ANNOTATION))
    {
        Some(raw) => raw,
        None => return Vec::new(),
    };

    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.parse::<DeviceSliceId>() {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(pod = %object_name(&pod.metadata), error = %e, "Skipping malformed slice identifier");
                None
            }
        })
        .collect()
}
