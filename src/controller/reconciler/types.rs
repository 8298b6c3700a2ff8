//! # Types
//!
//! Core types for the reconciler.

use crate::cluster::ApiError;
use crate::controller::owner::{ControllerObject, ResolveError};
use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use thiserror::Error;

/// Deduplication and retry identity of one Pod: `namespace/name`
///
/// Objects without a namespace are keyed by bare name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkKey(String);

impl WorkKey {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        if namespace.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{namespace}/{name}"))
        }
    }

    /// Key of `pod`, or `None` when the Pod carries no name
    #[must_use]
    pub fn for_pod(pod: &Pod) -> Option<Self> {
        let name = pod.metadata.name.as_deref().filter(|name| !name.is_empty())?;
        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        Some(Self::new(namespace, name))
    }

    /// Split into `(namespace, name)`
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidKey`] when the key has more than one `/`
    /// or an empty name.
    pub fn split(&self) -> Result<(&str, &str), ReconcileError> {
        let mut parts = self.0.split('/');
        let (namespace, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), None, None) => ("", name),
            (Some(namespace), Some(name), None) => (namespace, name),
            _ => return Err(ReconcileError::InvalidKey(self.0.clone())),
        };
        if name.is_empty() {
            return Err(ReconcileError::InvalidKey(self.0.clone()));
        }
        Ok((namespace, name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WorkKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for WorkKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    #[error("pod {0} no longer exists")]
    PodGone(String),

    #[error("pod {0} is not bound to a node")]
    PodNotScheduled(String),

    #[error("failed to resolve controller of pod {pod}: {source}")]
    OwnerChain {
        pod: String,
        #[source]
        source: ResolveError,
    },

    #[error("failed to read node {node}: {source}")]
    NodeLookup {
        node: String,
        #[source]
        source: ApiError,
    },

    #[error("node {node} has none of the architecture labels {labels:?}")]
    MissingArchLabel { node: String, labels: Vec<String> },

    #[error("no API resource registered for {0}; cannot patch it")]
    UnpatchableKind(ControllerObject),

    #[error("failed to patch {target}: {source}")]
    Patch {
        target: ControllerObject,
        #[source]
        source: ApiError,
    },

    #[error("reconciliation panicked: {0}")]
    Panicked(String),
}

impl ReconcileError {
    /// Whether a later attempt for the same key could succeed
    ///
    /// Malformed input and vanished objects are not retried; API and transport
    /// failures are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::InvalidKey(_)
            | ReconcileError::PodGone(_)
            | ReconcileError::PodNotScheduled(_)
            | ReconcileError::MissingArchLabel { .. }
            | ReconcileError::UnpatchableKind(_) => false,
            ReconcileError::OwnerChain { source, .. } => source.is_retryable(),
            ReconcileError::NodeLookup { source, .. } => source.is_retryable(),
            ReconcileError::Patch { source, .. } => {
                !source.is_not_found() && source.is_retryable()
            }
            ReconcileError::Panicked(_) => true,
        }
    }

    /// Short label used for metrics and log fields
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::InvalidKey(_) => "invalid-key",
            ReconcileError::PodGone(_) => "pod-gone",
            ReconcileError::PodNotScheduled(_) => "pod-not-scheduled",
            ReconcileError::OwnerChain { .. } => "owner-chain",
            ReconcileError::NodeLookup { .. } => "node-lookup",
            ReconcileError::MissingArchLabel { .. } => "missing-arch-label",
            ReconcileError::UnpatchableKind(_) => "unpatchable-kind",
            ReconcileError::Patch { .. } => "patch",
            ReconcileError::Panicked(_) => "panic",
        }
    }
}
