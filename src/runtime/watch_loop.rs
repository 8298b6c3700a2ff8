//! # Watch Loop
//!
//! Watches Pods, keeps the reflector store current and feeds every added or
//! updated Pod through the [`ChangeRouter`].
//!
//! Added vs updated is derived from the store: an object the store has not seen
//! yet is added, otherwise the stored copy is the old version. The previous copy
//! is looked up before the event is applied, and the Pod is routed only after the
//! store holds it, so a worker never pops a key the cache cannot resolve.
//!
//! During a relist the reflector buffers `InitApply` objects and swaps them in at
//! `InitDone`. Relisted Pods are therefore routed at `InitDone`. Deletes only
//! update the store.

use crate::controller::router::ChangeRouter;
use crate::runtime::error_policy::handle_watch_stream_error;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube_runtime::reflector::{store::Writer, ObjectRef, Store};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Applies watcher events to the Pod store and routes the Pods they make visible
pub struct PodEventHandler {
    router: Arc<ChangeRouter>,
    writer: Writer<Pod>,
    store: Store<Pod>,
    /// Pods received since the last `Init`, with their pre-relist copies
    relisted: Vec<(Option<Arc<Pod>>, Pod)>,
}

impl std::fmt::Debug for PodEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodEventHandler")
            .field("relisted", &self.relisted.len())
            .finish_non_exhaustive()
    }
}

impl PodEventHandler {
    #[must_use]
    pub fn new(router: Arc<ChangeRouter>, writer: Writer<Pod>) -> Self {
        let store = writer.as_reader();
        Self {
            router,
            writer,
            store,
            relisted: Vec::new(),
        }
    }

    /// Reader for the store this handler writes
    #[must_use]
    pub fn store(&self) -> Store<Pod> {
        self.store.clone()
    }

    /// Apply one event to the store, then route the Pods it made visible
    ///
    /// Returns the number of Pods enqueued.
    pub async fn handle(&mut self, event: &Event<Pod>) -> usize {
        match event {
            Event::Apply(pod) => {
                let old = self.previous(pod);
                self.writer.apply_watcher_event(event);
                usize::from(self.route(old.as_deref(), pod).await)
            }
            Event::Delete(pod) => {
                debug!(
                    pod.namespace = pod.metadata.namespace.as_deref().unwrap_or_default(),
                    pod.name = pod.metadata.name.as_deref().unwrap_or_default(),
                    "Pod deleted"
                );
                self.writer.apply_watcher_event(event);
                0
            }
            Event::Init => {
                self.relisted.clear();
                self.writer.apply_watcher_event(event);
                0
            }
            Event::InitApply(pod) => {
                let old = self.previous(pod);
                self.writer.apply_watcher_event(event);
                self.relisted.push((old, pod.clone()));
                0
            }
            Event::InitDone => {
                self.writer.apply_watcher_event(event);
                let relisted = std::mem::take(&mut self.relisted);
                debug!(pods = relisted.len(), "Pod relist complete");
                let mut enqueued = 0;
                for (old, pod) in &relisted {
                    if self.route(old.as_deref(), pod).await {
                        enqueued += 1;
                    }
                }
                enqueued
            }
        }
    }

    fn previous(&self, pod: &Pod) -> Option<Arc<Pod>> {
        self.store.get(&ObjectRef::from_obj(pod))
    }

    async fn route(&self, old: Option<&Pod>, pod: &Pod) -> bool {
        match old {
            Some(old) => self.router.on_updated(old, pod).await,
            None => self.router.on_added(pod).await,
        }
    }
}

/// Run the Pod watch until `token` is cancelled
pub async fn run_pod_watch(
    api: Api<Pod>,
    writer: Writer<Pod>,
    router: Arc<ChangeRouter>,
    token: CancellationToken,
) {
    let mut handler = PodEventHandler::new(router, writer);
    let mut stream = watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    info!("Starting pod watch");
    loop {
        let next = tokio::select! {
            () = token.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(event)) => {
                handler.handle(&event).await;
            }
            Some(Err(e)) => {
                handle_watch_stream_error(&e);
            }
            None => {
                info!("Pod watch stream ended");
                break;
            }
        }
    }
    info!("Pod watch stopped");
}
