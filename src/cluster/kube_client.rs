//! # Kubernetes Client Adapter
//!
//! [`ClusterClient`] implementation on top of `kube::Client`.
//!
//! Every request is bounded by the configured API timeout, and HTTP status codes
//! the reconciler cares about (404, 422) are mapped onto dedicated [`ApiError`]
//! variants.

use super::{ApiError, ClusterClient};
use async_trait::async_trait;
use futures::AsyncReadExt;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DynamicObject, LogParams, Patch, PatchParams};
use kube::core::ApiResource;
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Field manager recorded on objects this controller patches
const FIELD_MANAGER: &str = "arch-scheduling-controller";

#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    timeout: Duration,
    log_limit_bytes: i64,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("timeout", &self.timeout)
            .field("log_limit_bytes", &self.log_limit_bytes)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client, timeout: Duration, log_limit_bytes: i64) -> Self {
        Self {
            client,
            timeout,
            log_limit_bytes,
        }
    }

    /// Run `request` under the API timeout, mapping kube errors with `what` as context
    async fn bounded<T, F>(&self, what: String, request: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        let outcome = tokio::time::timeout(self.timeout, request).await;
        match outcome {
            Ok(result) => result.map_err(|source| map_kube_error(what, source)),
            Err(_elapsed) => Err(ApiError::Timeout {
                what,
                timeout: self.timeout,
            }),
        }
    }
}

/// Map status codes the reconciler distinguishes onto dedicated variants
fn map_kube_error(what: String, source: kube::Error) -> ApiError {
    if let kube::Error::Api(response) = &source {
        match response.code {
            404 => return ApiError::NotFound(what),
            422 => {
                return ApiError::Invalid {
                    what,
                    message: response.message.clone(),
                }
            }
            _ => {}
        }
    }
    ApiError::Kube { what, source }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let what = format!("logs of container {container} in pod {namespace}/{pod}");
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            limit_bytes: Some(self.log_limit_bytes),
            ..LogParams::default()
        };

        let read = async {
            let stream = pods
                .log_stream(pod, &params)
                .await
                .map_err(|source| map_kube_error(what.clone(), source))?;
            futures::pin_mut!(stream);
            let mut buf = Vec::new();
            stream
                .read_to_end(&mut buf)
                .await
                .map_err(|source| ApiError::Stream {
                    what: what.clone(),
                    source,
                })?;
            Ok::<_, ApiError>(buf)
        };

        let outcome = tokio::time::timeout(self.timeout, read).await;
        let buf = match outcome {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(ApiError::Timeout {
                    what,
                    timeout: self.timeout,
                })
            }
        };
        if buf.is_empty() {
            debug!(pod = %format!("{namespace}/{pod}"), container, "Empty log");
        }
        Ok(buf)
    }

    async fn get_node(&self, name: &str) -> Result<Node, ApiError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        self.bounded(format!("node {name}"), nodes.get(name)).await
    }

    async fn get_object_meta(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<ObjectMeta, ApiError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        let object = self
            .bounded(
                format!("{} {namespace}/{name}", resource.kind),
                api.get(name),
            )
            .await?;
        Ok(object.metadata)
    }

    async fn merge_patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ApiError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        };
        self.bounded(
            format!("{} {namespace}/{name}", resource.kind),
            api.patch(name, &params, &Patch::Merge(patch)),
        )
        .await?;
        Ok(())
    }
}
