//! # Failure Classifier
//!
//! Decides whether a Pod is crash-looping because its image was built for a
//! different CPU architecture than the node it landed on.
//!
//! Only containers waiting in `CrashLoopBackOff` are inspected. Their log output
//! is compared byte-for-byte with the exec format error signature; there is no
//! substring or pattern matching, so a log with any extra output does not match.

use crate::cluster::ClusterClient;
use crate::constants::CRASH_LOOP_BACK_OFF;
use crate::observability;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FailureClassifier {
    client: Arc<dyn ClusterClient>,
    signature: Vec<u8>,
}

impl std::fmt::Debug for FailureClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureClassifier")
            .field("signature", &String::from_utf8_lossy(&self.signature))
            .finish_non_exhaustive()
    }
}

/// Names of the containers (init containers first) currently waiting in `CrashLoopBackOff`
#[must_use]
pub fn crash_looping_containers(pod: &Pod) -> Vec<&str> {
    let Some(status) = pod.status.as_ref() else {
        return Vec::new();
    };

    let init = status.init_container_statuses.as_deref().unwrap_or_default();
    let regular = status.container_statuses.as_deref().unwrap_or_default();
    init.iter()
        .chain(regular)
        .filter(|container| is_crash_looping(container))
        .map(|container| container.name.as_str())
        .collect()
}

fn is_crash_looping(container: &ContainerStatus) -> bool {
    container
        .state
        .as_ref()
        .and_then(|state| state.waiting.as_ref())
        .and_then(|waiting| waiting.reason.as_deref())
        == Some(CRASH_LOOP_BACK_OFF)
}

impl FailureClassifier {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, signature: impl Into<Vec<u8>>) -> Self {
        Self {
            client,
            signature: signature.into(),
        }
    }

    /// Exact comparison of a captured log against the signature
    #[must_use]
    pub fn matches_signature(&self, log: &[u8]) -> bool {
        log == self.signature.as_slice()
    }

    /// Whether any crash-looping container of `pod` logged exactly the signature
    ///
    /// Containers whose logs cannot be fetched are skipped. Stops at the first match.
    pub async fn classify(&self, pod: &Pod) -> bool {
        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        let name = pod.metadata.name.as_deref().unwrap_or_default();

        for container in crash_looping_containers(pod) {
            let log = match self.client.container_logs(namespace, name, container).await {
                Ok(log) => log,
                Err(e) => {
                    warn!(
                        pod.namespace = namespace,
                        pod.name = name,
                        container,
                        error = %e,
                        "Failed to read container logs, skipping container"
                    );
                    observability::metrics::increment_log_read_errors();
                    continue;
                }
            };

            if self.matches_signature(&log) {
                debug!(
                    pod.namespace = namespace,
                    pod.name = name,
                    container,
                    "Container log matches exec format error signature"
                );
                return true;
            }
        }

        false
    }
}
