//! # Change Router
//!
//! Entry point for Pod change notifications. A Pod is enqueued only when the
//! classifier recognises its crash loop as an architecture mismatch.

use crate::controller::classifier::FailureClassifier;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::WorkKey;
use crate::observability;
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct ChangeRouter {
    classifier: Arc<FailureClassifier>,
    queue: WorkQueue<WorkKey>,
}

impl ChangeRouter {
    #[must_use]
    pub fn new(classifier: Arc<FailureClassifier>, queue: WorkQueue<WorkKey>) -> Self {
        Self { classifier, queue }
    }

    /// A Pod appeared. Returns whether it was enqueued.
    pub async fn on_added(&self, pod: &Pod) -> bool {
        self.route(pod).await
    }

    /// A Pod changed. Notifications that carry the same resource version (periodic
    /// resyncs) are dropped without classification. Returns whether `new` was enqueued.
    pub async fn on_updated(&self, old: &Pod, new: &Pod) -> bool {
        if old.metadata.resource_version == new.metadata.resource_version {
            return false;
        }
        self.route(new).await
    }

    async fn route(&self, pod: &Pod) -> bool {
        if !self.classifier.classify(pod).await {
            return false;
        }

        let Some(key) = WorkKey::for_pod(pod) else {
            warn!("Matching pod has no name, cannot enqueue");
            return false;
        };

        if self.queue.is_shutting_down() {
            debug!(pod.key = %key, "Work queue is shutting down, dropping pod");
            return false;
        }

        info!(pod.key = %key, "Pod is crash-looping with exec format error, enqueueing");
        self.queue.add(key);
        observability::metrics::increment_pods_enqueued();
        observability::metrics::set_work_queue_depth(self.queue.len());
        true
    }
}
