//! # Cluster Access
//!
//! Traits the reconciliation core uses to talk to the cluster, so the core can
//! be exercised against an in-memory cluster in tests.
//!
//! - [`ClusterClient`] - live API reads, log streams and merge patches
//! - [`PodCache`] - consistent read-through cache of Pods fed by the watch
//!
//! [`KubeClusterClient`] is the production implementation backed by a
//! `kube::Client`; `reflector::Store<Pod>` implements [`PodCache`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ApiResource;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod kube_client;

pub use kube_client::KubeClusterClient;

/// Errors returned by cluster API calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed object does not exist (HTTP 404)
    #[error("{0} not found")]
    NotFound(String),

    /// The API server rejected the request as semantically invalid (HTTP 422)
    #[error("{what} rejected as invalid: {message}")]
    Invalid { what: String, message: String },

    /// The call did not complete within the configured timeout
    #[error("request for {what} timed out after {timeout:?}")]
    Timeout { what: String, timeout: Duration },

    /// Reading a log stream failed part way through
    #[error("failed to read log stream for {what}: {source}")]
    Stream {
        what: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other Kubernetes client or transport error
    #[error("Kubernetes API request for {what} failed: {source}")]
    Kube {
        what: String,
        #[source]
        source: kube::Error,
    },
}

impl ApiError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Whether repeating the same request later could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Invalid { .. })
    }
}

/// Live cluster operations needed by the classifier, resolver and reconciler
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Read the full log output of one container, up to the configured byte limit
    async fn container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Vec<u8>, ApiError>;

    /// Fetch a Node by name
    async fn get_node(&self, name: &str) -> Result<Node, ApiError>;

    /// Fetch the metadata of a namespaced object of the given API resource
    async fn get_object_meta(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<ObjectMeta, ApiError>;

    /// Apply a JSON merge patch to a namespaced object of the given API resource
    async fn merge_patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ApiError>;
}

/// Read access to the locally cached Pods
pub trait PodCache: Send + Sync {
    /// Latest cached snapshot of `namespace/name`, if the watch has seen it
    fn get_pod(&self, namespace: &str, name: &str) -> Option<Arc<Pod>>;
}

impl PodCache for kube_runtime::reflector::Store<Pod> {
    fn get_pod(&self, namespace: &str, name: &str) -> Option<Arc<Pod>> {
        let reference = kube_runtime::reflector::ObjectRef::new(name).within(namespace);
        self.get(&reference)
    }
}
