//! # Owner Chain Resolution
//!
//! Walks controller owner references upward from a Pod until it reaches the
//! object that nothing controls, e.g. `Pod -> ReplicaSet -> Deployment`.
//!
//! The walk is an explicit loop bounded by a maximum hop count and guarded by a
//! visited set, so a malformed ownership graph ends in an error instead of
//! spinning forever.

use crate::cluster::{ApiError, ClusterClient};
use crate::controller::kinds::KindRegistry;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// The top-level object that owns a Pod, directly or transitively
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerObject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for ControllerObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no API resource registered for kind {kind} (controller of {child})")]
    UnknownKind { kind: String, child: String },

    #[error("failed to fetch {kind} {namespace}/{name}: {source}")]
    Fetch {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: ApiError,
    },

    #[error("owner chain starting at {start} is longer than {max_hops} hops")]
    TooDeep { start: String, max_hops: usize },

    #[error("owner chain starting at {start} loops back to {kind} {name}")]
    Cycle {
        start: String,
        kind: String,
        name: String,
    },
}

impl ResolveError {
    /// Fetch failures may clear up; a broken graph or unknown kind will not
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::Fetch { source, .. } => source.is_retryable(),
            ResolveError::UnknownKind { .. }
            | ResolveError::TooDeep { .. }
            | ResolveError::Cycle { .. } => false,
        }
    }
}

/// The owner reference marked `controller: true`, if any
#[must_use]
pub fn controller_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_deref()?
        .iter()
        .find(|owner| owner.controller == Some(true))
}

pub struct OwnerChainResolver {
    client: Arc<dyn ClusterClient>,
    kinds: Arc<KindRegistry>,
    max_hops: usize,
}

impl fmt::Debug for OwnerChainResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerChainResolver")
            .field("kinds", &self.kinds.len())
            .field("max_hops", &self.max_hops)
            .finish_non_exhaustive()
    }
}

impl OwnerChainResolver {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, kinds: Arc<KindRegistry>, max_hops: usize) -> Self {
        Self {
            client,
            kinds,
            max_hops,
        }
    }

    /// Resolve the controller object for `meta`, an object of kind `kind`
    ///
    /// Performs exactly one fetch per owner hop. Owners are looked up in the
    /// namespace of the object they control.
    ///
    /// # Errors
    ///
    /// Fails on the first owner fetch error, on an owner kind missing from the
    /// registry, on a cycle, or when the chain exceeds the hop limit.
    pub async fn resolve(
        &self,
        meta: &ObjectMeta,
        kind: &str,
    ) -> Result<ControllerObject, ResolveError> {
        let namespace = meta.namespace.clone().unwrap_or_default();
        let start_name = meta.name.clone().unwrap_or_default();
        let start = format!("{kind} {namespace}/{start_name}");

        let mut visited = HashSet::from([(kind.to_string(), start_name)]);
        let mut current_meta = meta.clone();
        let mut current_kind = kind.to_string();
        let mut hops = 0;

        while let Some(owner) = controller_owner(&current_meta) {
            if hops == self.max_hops {
                return Err(ResolveError::TooDeep {
                    start,
                    max_hops: self.max_hops,
                });
            }
            if !visited.insert((owner.kind.clone(), owner.name.clone())) {
                return Err(ResolveError::Cycle {
                    start,
                    kind: owner.kind.clone(),
                    name: owner.name.clone(),
                });
            }

            let mapping = self
                .kinds
                .lookup(&owner.kind)
                .ok_or_else(|| ResolveError::UnknownKind {
                    kind: owner.kind.clone(),
                    child: format!(
                        "{current_kind} {namespace}/{}",
                        current_meta.name.as_deref().unwrap_or_default()
                    ),
                })?;

            debug!(
                child.kind = current_kind.as_str(),
                owner.kind = owner.kind.as_str(),
                owner.name = owner.name.as_str(),
                "Following controller owner reference"
            );

            let owner_kind = owner.kind.clone();
            let owner_name = owner.name.clone();
            current_meta = self
                .client
                .get_object_meta(&mapping.resource, &namespace, &owner_name)
                .await
                .map_err(|source| ResolveError::Fetch {
                    kind: owner_kind.clone(),
                    namespace: namespace.clone(),
                    name: owner_name.clone(),
                    source,
                })?;
            current_kind = owner_kind;
            hops += 1;
        }

        Ok(ControllerObject {
            kind: current_kind,
            name: current_meta.name.unwrap_or_default(),
            namespace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(kind: &str, name: &str, controller: Option<bool>) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: format!("uid-{name}"),
            controller,
            block_owner_deletion: None,
        }
    }

    #[test]
    fn test_controller_owner_skips_non_controller_refs() {
        let meta = ObjectMeta {
            owner_references: Some(vec![
                owner("ConfigMap", "cm", None),
                owner("Service", "svc", Some(false)),
                owner("ReplicaSet", "rs-a", Some(true)),
            ]),
            ..ObjectMeta::default()
        };

        let found = controller_owner(&meta).unwrap();
        assert_eq!(found.kind, "ReplicaSet");
        assert_eq!(found.name, "rs-a");
    }

    #[test]
    fn test_controller_owner_none() {
        assert!(controller_owner(&ObjectMeta::default()).is_none());

        let meta = ObjectMeta {
            owner_references: Some(vec![owner("ReplicaSet", "rs-a", None)]),
            ..ObjectMeta::default()
        };
        assert!(controller_owner(&meta).is_none());
    }

    #[test]
    fn test_controller_object_display() {
        let target = ControllerObject {
            kind: "Deployment".to_string(),
            name: "deploy-a".to_string(),
            namespace: "ns".to_string(),
        };
        assert_eq!(target.to_string(), "Deployment ns/deploy-a");
    }
}
