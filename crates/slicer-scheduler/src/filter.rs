use crate::device::DedupStrategy;
use crate::node_view::NodeResourceView;
use crate::types::{FilterResult, NodeInfo, SchedulingContext};
use tracing::debug;

/// Filter predicate trait
pub trait FilterPredicate: Send + Sync {
    /// Filter a node for the given pod
    fn filter(&self, context: &SchedulingContext, node_info: &NodeInfo) -> FilterResult;

    /// Name of the filter
    fn name(&self) -> &str;
}

/// First device, in ascending index order, with at least `request` units free.
///
/// Devices with unknown availability are skipped. The scan stops at the
/// first sufficient device.
pub fn first_fit(view: &NodeResourceView, request: u64) -> Option<u32> {
    (0..view.device_count()).find(|&index| match view.available(index) {
        Some(free) => free >= request,
        None => false,
    })
}

/// Whether some device on the node can hold `request` units
pub fn is_allocatable(view: &NodeResourceView, request: u64) -> bool {
    first_fit(view, request).is_some()
}

/// Filter for accelerator memory: some single device must fit the request
pub struct VgpuMemoryFit {
    dedup: DedupStrategy,
}

impl VgpuMemoryFit {
    pub fn new(dedup: DedupStrategy) -> Self {
        Self { dedup }
    }
}

impl FilterPredicate for VgpuMemoryFit {
    fn filter(&self, context: &SchedulingContext, node_info: &NodeInfo) -> FilterResult {
        let node_name = node_info.name();
        let view = NodeResourceView::from_node_info(node_info, self.dedup);
        let request = context.request.device_memory;

        debug!(
            node = %node_name,
            pod = %context.pod_name(),
            request,
            available = ?view.available_capacities(),
            "Evaluating accelerator memory fit"
        );

        match first_fit(&view, request) {
            Some(device) => {
                debug!(node = %node_name, device, "Device fits request");
                FilterResult::pass(node_name)
            }
            None => {
                let reason = format!("Node:{}", node_name);
                FilterResult::fail(node_name, reason)
            }
        }
    }

    fn name(&self) -> &str {
        "VgpuMemoryFit"
    }
}

/// Get default filter predicates
pub fn default_filters(dedup: DedupStrategy) -> Vec<Box<dyn FilterPredicate>> {
    vec![Box::new(VgpuMemoryFit::new(dedup))]
}
