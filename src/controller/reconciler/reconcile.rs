//! # Reconciliation Logic
//!
//! One attempt at excluding a crash-looping Pod's node architecture from its
//! controller object:
//!
//! 1. Split the work key
//! 2. Look the Pod up in the cache
//! 3. Resolve the owner chain to the controller object
//! 4. Read the node the Pod was scheduled on
//! 5. Build the affinity patch for the node's architecture
//! 6. Merge-patch the controller object
//!
//! The outcome is returned to the caller, which decides between forgetting
//! and requeueing the key.

use crate::cluster::{ClusterClient, PodCache};
use crate::controller::kinds::KindRegistry;
use crate::controller::owner::{ControllerObject, OwnerChainResolver};
use crate::controller::patch::{node_arch, AffinityPatch};
use crate::controller::reconciler::types::{ReconcileError, WorkKey};
use crate::observability;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

pub struct Reconciler {
    client: Arc<dyn ClusterClient>,
    cache: Arc<dyn PodCache>,
    resolver: OwnerChainResolver,
    kinds: Arc<KindRegistry>,
    arch_label_keys: Vec<String>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("resolver", &self.resolver)
            .field("arch_label_keys", &self.arch_label_keys)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// `arch_label_keys` are tried in order when reading a node's architecture.
    #[must_use]
    pub fn new(
        client: Arc<dyn ClusterClient>,
        cache: Arc<dyn PodCache>,
        kinds: Arc<KindRegistry>,
        max_owner_hops: usize,
        arch_label_keys: Vec<String>,
    ) -> Self {
        Self {
            resolver: OwnerChainResolver::new(
                Arc::clone(&client),
                Arc::clone(&kinds),
                max_owner_hops,
            ),
            client,
            cache,
            kinds,
            arch_label_keys,
        }
    }

    /// Reconcile the Pod behind `key`, returning the patched controller object
    ///
    /// # Errors
    ///
    /// Any failure along the way; [`ReconcileError::is_retryable`] tells the
    /// caller whether to requeue.
    pub async fn reconcile(&self, key: &WorkKey) -> Result<ControllerObject, ReconcileError> {
        let span = tracing::info_span!("reconcile", pod.key = %key);
        self.reconcile_internal(key).instrument(span).await
    }

    async fn reconcile_internal(&self, key: &WorkKey) -> Result<ControllerObject, ReconcileError> {
        let (namespace, name) = key.split()?;

        let pod = self
            .cache
            .get_pod(namespace, name)
            .ok_or_else(|| ReconcileError::PodGone(key.to_string()))?;

        let target = self
            .resolver
            .resolve(&pod.metadata, "Pod")
            .await
            .map_err(|source| ReconcileError::OwnerChain {
                pod: key.to_string(),
                source,
            })?;
        debug!(
            target.kind = target.kind.as_str(),
            target.name = target.name.as_str(),
            "Resolved controller object"
        );

        let node_name = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.node_name.as_deref())
            .filter(|node| !node.is_empty())
            .ok_or_else(|| ReconcileError::PodNotScheduled(key.to_string()))?;

        let node = self
            .client
            .get_node(node_name)
            .await
            .map_err(|source| ReconcileError::NodeLookup {
                node: node_name.to_string(),
                source,
            })?;

        let arch = node_arch(&node, &self.arch_label_keys).ok_or_else(|| {
            ReconcileError::MissingArchLabel {
                node: node_name.to_string(),
                labels: self.arch_label_keys.clone(),
            }
        })?;

        let mapping = self
            .kinds
            .lookup(&target.kind)
            .ok_or_else(|| ReconcileError::UnpatchableKind(target.clone()))?;

        let patch = AffinityPatch::build(&arch, &mapping.template_path);
        self.client
            .merge_patch(
                &mapping.resource,
                &target.namespace,
                &target.name,
                patch.document(),
            )
            .await
            .map_err(|source| ReconcileError::Patch {
                target: target.clone(),
                source,
            })?;

        info!(
            node = node_name,
            arch = patch.excluded().value.as_str(),
            target.kind = target.kind.as_str(),
            target.name = target.name.as_str(),
            "Excluded node architecture from controller object"
        );
        observability::metrics::increment_patches_applied();

        Ok(target)
    }
}
