//! Common utilities for integration tests
//!
//! Provides an in-memory cluster implementing both [`ClusterClient`] and
//! [`PodCache`]:
//! - objects stored as JSON keyed by `(plural, namespace, name)`
//! - JSON merge patch (RFC 7386) applied on `merge_patch`
//! - call counters and failure injection

#![allow(dead_code, reason = "each test binary uses a different subset")]

use arch_scheduling_controller::cluster::{ApiError, ClusterClient, PodCache};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ApiResource;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use arch_scheduling_controller::constants::EXEC_FORMAT_ERROR_SIGNATURE;

type ObjectKey = (String, String, String);

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPatch {
    pub plural: String,
    pub namespace: String,
    pub name: String,
    pub patch: Value,
}

#[derive(Default)]
struct State {
    pods: HashMap<(String, String), Arc<Pod>>,
    nodes: HashMap<String, Node>,
    logs: HashMap<(String, String, String), Vec<u8>>,
    broken_logs: HashSet<(String, String, String)>,
    objects: HashMap<ObjectKey, Value>,
    delete_before_patch: HashSet<ObjectKey>,
    reject_patches: bool,
    node_failures_left: u32,
    log_reads: usize,
    meta_fetches: usize,
    node_lookups: usize,
    patches: Vec<RecordedPatch>,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl std::fmt::Debug for FakeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeCluster").finish_non_exhaustive()
    }
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert_pod(&self, pod: Pod) {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        self.state().pods.insert(key, Arc::new(pod));
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.state()
            .pods
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn insert_node(&self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.state().nodes.insert(name, node);
    }

    pub fn set_log(&self, namespace: &str, pod: &str, container: &str, log: &str) {
        self.state().logs.insert(
            (namespace.to_string(), pod.to_string(), container.to_string()),
            log.as_bytes().to_vec(),
        );
    }

    pub fn break_log(&self, namespace: &str, pod: &str, container: &str) {
        self.state()
            .broken_logs
            .insert((namespace.to_string(), pod.to_string(), container.to_string()));
    }

    /// Store an object addressed by its resource plural
    pub fn insert_object(&self, plural: &str, object: Value) {
        let namespace = object["metadata"]["namespace"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let name = object["metadata"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        self.state()
            .objects
            .insert((plural.to_string(), namespace, name), object);
    }

    pub fn object(&self, plural: &str, namespace: &str, name: &str) -> Option<Value> {
        self.state()
            .objects
            .get(&(plural.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Make the object disappear right before it is patched
    pub fn delete_before_patch(&self, plural: &str, namespace: &str, name: &str) {
        self.state().delete_before_patch.insert((
            plural.to_string(),
            namespace.to_string(),
            name.to_string(),
        ));
    }

    /// Answer every patch with 422 Invalid
    pub fn reject_patches(&self) {
        self.state().reject_patches = true;
    }

    /// Time out the next `count` node lookups
    pub fn fail_node_lookups(&self, count: u32) {
        self.state().node_failures_left = count;
    }

    pub fn log_reads(&self) -> usize {
        self.state().log_reads
    }

    pub fn meta_fetches(&self) -> usize {
        self.state().meta_fetches
    }

    pub fn node_lookups(&self) -> usize {
        self.state().node_lookups
    }

    pub fn patches(&self) -> Vec<RecordedPatch> {
        self.state().patches.clone()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn container_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
    ) -> Result<Vec<u8>, ApiError> {
        let mut state = self.state();
        state.log_reads += 1;
        let key = (namespace.to_string(), pod.to_string(), container.to_string());
        if state.broken_logs.contains(&key) {
            return Err(ApiError::Stream {
                what: format!("{namespace}/{pod}/{container}"),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
            });
        }
        state
            .logs
            .get(&key)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("logs of {namespace}/{pod}/{container}")))
    }

    async fn get_node(&self, name: &str) -> Result<Node, ApiError> {
        let mut state = self.state();
        state.node_lookups += 1;
        if state.node_failures_left > 0 {
            state.node_failures_left -= 1;
            return Err(ApiError::Timeout {
                what: format!("node {name}"),
                timeout: Duration::from_secs(30),
            });
        }
        state
            .nodes
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("node {name}")))
    }

    async fn get_object_meta(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<ObjectMeta, ApiError> {
        let mut state = self.state();
        state.meta_fetches += 1;
        let key = (
            resource.plural.clone(),
            namespace.to_string(),
            name.to_string(),
        );
        let object = state.objects.get(&key).ok_or_else(|| {
            ApiError::NotFound(format!("{} {namespace}/{name}", resource.kind))
        })?;
        Ok(serde_json::from_value(object["metadata"].clone()).unwrap())
    }

    async fn merge_patch(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        let key = (
            resource.plural.clone(),
            namespace.to_string(),
            name.to_string(),
        );
        let what = format!("{} {namespace}/{name}", resource.kind);
        if state.reject_patches {
            return Err(ApiError::Invalid {
                what,
                message: "spec.template: field is immutable".to_string(),
            });
        }
        if state.delete_before_patch.remove(&key) {
            state.objects.remove(&key);
        }
        let object = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| ApiError::NotFound(what))?;
        apply_merge_patch(object, patch);
        state.patches.push(RecordedPatch {
            plural: resource.plural.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            patch: patch.clone(),
        });
        Ok(())
    }
}

impl PodCache for FakeCluster {
    fn get_pod(&self, namespace: &str, name: &str) -> Option<Arc<Pod>> {
        self.state()
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

/// RFC 7386 JSON merge patch
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target) = target else {
        unreachable!()
    };
    for (key, value) in patch {
        if value.is_null() {
            target.remove(key);
        } else {
            apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
        }
    }
}

fn owner_refs(owner: Option<(&str, &str)>) -> Value {
    match owner {
        Some((kind, name)) => json!([{
            "apiVersion": "apps/v1",
            "kind": kind,
            "name": name,
            "uid": format!("uid-{name}"),
            "controller": true,
        }]),
        None => json!([]),
    }
}

/// A workload object as stored by the fake, with an optional controller owner
pub fn workload(kind: &str, namespace: &str, name: &str, owner: Option<(&str, &str)>) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": kind,
        "metadata": {
            "name": name,
            "namespace": namespace,
            "ownerReferences": owner_refs(owner),
        },
        "spec": {
            "replicas": 1,
            "template": {
                "metadata": {"labels": {"app": name}},
                "spec": {"containers": [{"name": "app", "image": "example/app:latest"}]}
            }
        }
    })
}

/// A scheduled Pod whose single container `app` is waiting with `reason`
pub fn pod(
    namespace: &str,
    name: &str,
    node: &str,
    owner: Option<(&str, &str)>,
    reason: &str,
) -> Pod {
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "namespace": namespace,
            "resourceVersion": "1",
            "ownerReferences": owner_refs(owner),
        },
        "spec": {
            "nodeName": node,
            "containers": [{"name": "app", "image": "example/app:latest"}]
        },
        "status": {
            "containerStatuses": [{
                "name": "app",
                "image": "example/app:latest",
                "imageID": "",
                "ready": false,
                "restartCount": 5,
                "state": {"waiting": {"reason": reason}}
            }]
        }
    }))
    .unwrap()
}

pub fn node(name: &str, arch: &str) -> Node {
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "labels": {"kubernetes.io/arch": arch, "kubernetes.io/os": "linux"}
        }
    }))
    .unwrap()
}

/// `ns/pod-a` <- `ReplicaSet rs-a` <- `Deployment deploy-a`, crash-looping on an arm64 node
pub fn deployment_scenario(log: &str) -> Arc<FakeCluster> {
    let cluster = FakeCluster::new();
    cluster.insert_object("deployments", workload("Deployment", "ns", "deploy-a", None));
    cluster.insert_object(
        "replicasets",
        workload("ReplicaSet", "ns", "rs-a", Some(("Deployment", "deploy-a"))),
    );
    cluster.insert_node(node("node-arm", "arm64"));
    cluster.insert_pod(pod(
        "ns",
        "pod-a",
        "node-arm",
        Some(("ReplicaSet", "rs-a")),
        "CrashLoopBackOff",
    ));
    cluster.set_log("ns", "pod-a", "app", log);
    cluster
}

/// The `NotIn` values the object's pod template currently excludes
pub fn excluded_arches(object: &Value) -> Value {
    object["spec"]["template"]["spec"]["affinity"]["nodeAffinity"]
        ["requiredDuringSchedulingIgnoredDuringExecution"]["nodeSelectorTerms"][0]
        ["matchExpressions"][0]["values"]
        .clone()
}
