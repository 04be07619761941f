//! Scheduler-timestamp stamping.
//!
//! Before a pod is scored it is patched with the time of scoring. The write
//! happens exactly once per call, is never retried, and its failure aborts
//! the score.

use crate::error::{Result, SchedulerError};
use async_trait::async_trait;
use slicer_client::ApiClient;
use slicer_core::annotations::SCHEDULER_TIMESTAMP_ANNOTATION;
use slicer_core::WorkloadKey;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Writes annotations onto a pod in the cluster store
#[async_trait]
pub trait PodAnnotator: Send + Sync {
    /// Merge `annotations` into the pod's annotations in one atomic patch
    async fn annotate(
        &self,
        pod: &WorkloadKey,
        annotations: &BTreeMap<String, String>,
    ) -> slicer_client::Result<()>;
}

#[async_trait]
impl PodAnnotator for ApiClient {
    async fn annotate(
        &self,
        pod: &WorkloadKey,
        annotations: &BTreeMap<String, String>,
    ) -> slicer_client::Result<()> {
        self.patch_pod_annotations(&pod.namespace, &pod.name, annotations)
            .await
            .map(|_| ())
    }
}

/// Annotator that only logs the patch it would send
pub struct DryRunAnnotator;

#[async_trait]
impl PodAnnotator for DryRunAnnotator {
    async fn annotate(
        &self,
        pod: &WorkloadKey,
        annotations: &BTreeMap<String, String>,
    ) -> slicer_client::Result<()> {
        info!(pod = %pod, ?annotations, "Dry run: skipping pod annotation patch");
        Ok(())
    }
}

/// Current time in nanoseconds since the Unix epoch
pub fn now_nanos() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
}

/// Annotations recording that a pod was scored at `nanos`
pub fn timestamp_annotations(nanos: i64) -> BTreeMap<String, String> {
    BTreeMap::from([(
        SCHEDULER_TIMESTAMP_ANNOTATION.to_string(),
        nanos.to_string(),
    )])
}

/// Stamp `pod` with the current time.
///
/// Fails with `StampFailed` when the patch errors or outlives `timeout`, and
/// with `Cancelled` when `token` fires first. Returns the stamped value.
pub async fn stamp_scheduled_at(
    annotator: &dyn PodAnnotator,
    pod: &WorkloadKey,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<i64> {
    let nanos = now_nanos();
    let annotations = timestamp_annotations(nanos);

    let patch = tokio::time::timeout(timeout, annotator.annotate(pod, &annotations));

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(SchedulerError::cancelled(pod.to_string())),
        outcome = patch => outcome,
    };

    match outcome {
        Ok(Ok(())) => {
            debug!(pod = %pod, nanos, "Stamped scheduler timestamp");
            Ok(nanos)
        }
        Ok(Err(e)) => Err(SchedulerError::stamp_failed(
            pod.to_string(),
            e.to_string(),
            Some(Box::new(e)),
        )),
        Err(_) => Err(SchedulerError::stamp_failed(
            pod.to_string(),
            format!("patch did not complete within {:?}", timeout),
            None,
        )),
    }
}
