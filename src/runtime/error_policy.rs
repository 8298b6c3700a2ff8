//! # Error Policy
//!
//! Routes the result of one reconciliation into the work queue's forget/requeue
//! protocol, and classifies watch stream errors.

use crate::controller::owner::ControllerObject;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{ReconcileError, WorkKey};
use crate::observability;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ceiling on how often one key is requeued before it is abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// `None` retries forever
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Build from a configured count where `0` means unlimited
    #[must_use]
    pub fn from_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries: (max_retries > 0).then_some(max_retries),
        }
    }

    /// Whether a key that has already been requeued `requeues` times may be requeued again
    #[must_use]
    pub fn should_retry(&self, requeues: u32) -> bool {
        self.max_retries.map_or(true, |max| requeues < max)
    }
}

/// What happened to a key after its reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Done with the key; its failure history was cleared
    Forgotten,
    /// The key will be retried after `delay`
    Requeued { delay: Duration },
    /// Retry budget exhausted; the key was dropped
    Abandoned,
}

/// Forget the key on success or permanent failure, requeue it with backoff on a
/// transient failure.
///
/// The caller still owns the key and must call `done` afterwards.
pub fn handle_reconcile_result(
    queue: &WorkQueue<WorkKey>,
    key: &WorkKey,
    result: &Result<ControllerObject, ReconcileError>,
    policy: RetryPolicy,
) -> Outcome {
    let error = match result {
        Ok(target) => {
            debug!(pod.key = %key, target = %target, "Reconciliation succeeded, forgetting key");
            queue.forget(key);
            return Outcome::Forgotten;
        }
        Err(error) => error,
    };

    observability::metrics::increment_reconciliation_errors();

    if !error.is_retryable() {
        warn!(
            pod.key = %key,
            reason = error.reason(),
            error = %error,
            "Reconciliation failed permanently, dropping key"
        );
        queue.forget(key);
        return Outcome::Forgotten;
    }

    let requeues = queue.num_requeues(key);
    if !policy.should_retry(requeues) {
        error!(
            pod.key = %key,
            requeues,
            error = %error,
            "Giving up on key after exhausting retries"
        );
        queue.forget(key);
        observability::metrics::increment_abandoned();
        return Outcome::Abandoned;
    }

    let delay = queue.add_rate_limited(key.clone());
    let next_retry = chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| chrono::Utc::now().checked_add_signed(delay))
        .map(|at| at.to_rfc3339())
        .unwrap_or_default();
    info!(
        pod.key = %key,
        reason = error.reason(),
        error = %error,
        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        next_retry = next_retry.as_str(),
        "Reconciliation failed, requeueing with backoff"
    );
    observability::metrics::increment_requeues_total(error.reason());

    Outcome::Requeued { delay }
}

/// Log a watch stream error and return a short classification
///
/// The watcher restarts itself with backoff; nothing here stops the stream.
pub fn handle_watch_stream_error(error: &kube_runtime::watcher::Error) -> &'static str {
    let message = error.to_string();
    let is_not_found = message.contains("404") || message.contains("NotFound");
    let is_unauthorized = !is_not_found
        && (message.contains("401")
            || message.contains("403")
            || message.contains("Unauthorized")
            || message.contains("Forbidden"));
    let is_expired = message.contains("410") || message.contains("Expired");
    let is_throttled = message.contains("429") || message.contains("TooManyRequests");

    let kind = if is_unauthorized {
        error!(
            error = %message,
            "Pod watch was denied; check the controller's RBAC for pods (list, watch), pods/log (get), nodes (get) and workload patch"
        );
        "unauthorized"
    } else if is_expired {
        warn!(error = %message, "Pod watch resource version expired, relisting");
        "expired"
    } else if is_throttled {
        warn!(error = %message, "API server throttled the pod watch, backing off");
        "throttled"
    } else if is_not_found {
        warn!(error = %message, "Pod watch target not found");
        "not-found"
    } else {
        error!(error = %message, "Pod watch stream error");
        "other"
    };

    observability::metrics::increment_watch_errors(kind);
    kind
}
