//! # Controller
//!
//! Core controller modules.
//!
//! - `backoff`: per-key exponential backoff
//! - `classifier`: exec format error detection from container logs
//! - `kinds`: kind to API resource registry
//! - `owner`: owner reference chain resolution
//! - `patch`: node affinity exclusion patch
//! - `queue`: deduplicating, rate-limited work queue
//! - `reconciler`: per-key reconciliation
//! - `router`: Pod change notifications into the work queue
//!
//! [`ArchSchedulingController`] owns the queue, reconciler and router and runs
//! the worker pool.

pub mod backoff;
pub mod classifier;
pub mod kinds;
pub mod owner;
pub mod patch;
pub mod queue;
pub mod reconciler;
pub mod router;

use crate::cluster::{ClusterClient, PodCache};
use crate::config::ControllerConfig;
use crate::observability;
use crate::runtime::error_policy::{handle_reconcile_result, RetryPolicy};
use classifier::FailureClassifier;
use futures::FutureExt;
use queue::WorkQueue;
use reconciler::{ReconcileError, Reconciler, WorkKey};
use router::ChangeRouter;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("shutdown requested before the pod cache synced")]
    SyncCancelled,

    #[error("pod cache failed to sync")]
    SyncFailed,

    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Debug)]
pub struct ArchSchedulingController {
    queue: WorkQueue<WorkKey>,
    reconciler: Reconciler,
    router: Arc<ChangeRouter>,
    retry_policy: RetryPolicy,
    workers: usize,
}

impl ArchSchedulingController {
    #[must_use]
    pub fn new(
        client: Arc<dyn ClusterClient>,
        cache: Arc<dyn PodCache>,
        config: &ControllerConfig,
    ) -> Self {
        let queue = WorkQueue::new(config.queue_config());
        let classifier = Arc::new(FailureClassifier::new(
            Arc::clone(&client),
            config.failure_signature.clone(),
        ));
        let router = Arc::new(ChangeRouter::new(classifier, queue.clone()));
        let reconciler = Reconciler::new(
            client,
            cache,
            Arc::new(config.kind_registry()),
            config.max_owner_hops,
            config.arch_label_keys(),
        );

        Self {
            queue,
            reconciler,
            router,
            retry_policy: config.retry_policy(),
            workers: config.workers.max(1),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &WorkQueue<WorkKey> {
        &self.queue
    }

    /// Router feeding this controller's queue, for the watch task
    #[must_use]
    pub fn router(&self) -> Arc<ChangeRouter> {
        Arc::clone(&self.router)
    }

    /// Take one key off the queue and reconcile it
    ///
    /// Returns `false` once the queue has shut down and drained.
    pub async fn process_next_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        observability::metrics::set_work_queue_depth(self.queue.len());
        observability::metrics::increment_reconciliations();

        let start = Instant::now();
        let result = match AssertUnwindSafe(self.reconciler.reconcile(&key))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(pod.key = %key, panic = message.as_str(), "Reconciliation panicked");
                Err(ReconcileError::Panicked(message))
            }
        };
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        handle_reconcile_result(&self.queue, &key, &result, self.retry_policy);
        self.queue.done(&key);
        true
    }

    /// Wait for `caches_synced`, then run the workers until `token` is cancelled
    ///
    /// On cancellation the queue shuts down, workers finish the items that are
    /// already ready and this returns once all of them have exited.
    ///
    /// # Errors
    ///
    /// Fails if the cache does not sync, the token is cancelled first, or a
    /// worker task dies.
    pub async fn run(
        self: Arc<Self>,
        caches_synced: impl Future<Output = bool>,
        token: CancellationToken,
    ) -> Result<(), ControllerError> {
        info!("Waiting for pod cache to sync");
        let synced = tokio::select! {
            synced = caches_synced => synced,
            () = token.cancelled() => {
                self.queue.shutdown();
                return Err(ControllerError::SyncCancelled);
            }
        };
        if !synced {
            self.queue.shutdown();
            return Err(ControllerError::SyncFailed);
        }

        info!(workers = self.workers, "Pod cache synced, starting workers");
        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            let controller = Arc::clone(&self);
            workers.spawn(async move {
                while controller.process_next_item().await {}
                debug!(worker, "Worker stopped");
            });
        }

        token.cancelled().await;
        info!("Shutdown requested, draining work queue");
        self.queue.shutdown();

        while let Some(joined) = workers.join_next().await {
            joined?;
        }
        info!("All workers stopped");
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
