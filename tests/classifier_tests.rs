//! # Failure Classifier Tests
//!
//! These tests verify:
//! - Only an exact log match classifies a Pod as an architecture mismatch
//! - Only crash-looping containers have their logs read
//! - A failing log read skips that container without failing the Pod

mod common;

use arch_scheduling_controller::controller::classifier::FailureClassifier;
use common::{pod, FakeCluster, EXEC_FORMAT_ERROR_SIGNATURE};
use k8s_openapi::api::core::v1::Pod;
use serde_json::json;
use std::sync::Arc;

fn classifier(cluster: &Arc<FakeCluster>) -> FailureClassifier {
    FailureClassifier::new(cluster.clone(), EXEC_FORMAT_ERROR_SIGNATURE)
}

fn crash_looping(cluster: &Arc<FakeCluster>, log: &str) -> Pod {
    cluster.set_log("ns", "pod-a", "app", log);
    pod("ns", "pod-a", "node-1", None, "CrashLoopBackOff")
}

#[tokio::test]
async fn test_exact_signature_matches() {
    let cluster = FakeCluster::new();
    let pod = crash_looping(&cluster, EXEC_FORMAT_ERROR_SIGNATURE);

    assert!(classifier(&cluster).classify(&pod).await);
    assert_eq!(cluster.log_reads(), 1);
}

#[tokio::test]
async fn test_near_misses_do_not_match() {
    let without_newline = EXEC_FORMAT_ERROR_SIGNATURE.trim_end();
    let truncated = &EXEC_FORMAT_ERROR_SIGNATURE[..20];
    let prefixed = format!("starting app\n{EXEC_FORMAT_ERROR_SIGNATURE}");
    let repeated = EXEC_FORMAT_ERROR_SIGNATURE.repeat(2);

    for log in [
        "",
        "some other crash\n",
        without_newline,
        truncated,
        prefixed.as_str(),
        repeated.as_str(),
    ] {
        let cluster = FakeCluster::new();
        let pod = crash_looping(&cluster, log);
        assert!(
            !classifier(&cluster).classify(&pod).await,
            "log {log:?} should not match"
        );
    }
}

#[tokio::test]
async fn test_containers_not_crash_looping_are_not_read() {
    let cluster = FakeCluster::new();
    cluster.set_log("ns", "pod-a", "app", EXEC_FORMAT_ERROR_SIGNATURE);

    for reason in ["ImagePullBackOff", "ContainerCreating", "CreateContainerError"] {
        let pod = pod("ns", "pod-a", "node-1", None, reason);
        assert!(!classifier(&cluster).classify(&pod).await);
    }
    assert_eq!(cluster.log_reads(), 0);
}

#[tokio::test]
async fn test_log_read_failure_skips_container() {
    let cluster = FakeCluster::new();
    let pod: Pod = serde_json::from_value(json!({
        "metadata": {"name": "pod-a", "namespace": "ns"},
        "spec": {"containers": [{"name": "broken"}, {"name": "app"}]},
        "status": {"containerStatuses": [
            {"name": "broken", "image": "", "imageID": "", "ready": false, "restartCount": 2,
             "state": {"waiting": {"reason": "CrashLoopBackOff"}}},
            {"name": "app", "image": "", "imageID": "", "ready": false, "restartCount": 2,
             "state": {"waiting": {"reason": "CrashLoopBackOff"}}}
        ]}
    }))
    .unwrap();
    cluster.break_log("ns", "pod-a", "broken");
    cluster.set_log("ns", "pod-a", "app", EXEC_FORMAT_ERROR_SIGNATURE);

    assert!(classifier(&cluster).classify(&pod).await);
    assert_eq!(cluster.log_reads(), 2);
}

#[tokio::test]
async fn test_crash_looping_init_container_matches() {
    let cluster = FakeCluster::new();
    let pod: Pod = serde_json::from_value(json!({
        "metadata": {"name": "pod-a", "namespace": "ns"},
        "spec": {"initContainers": [{"name": "migrate"}], "containers": [{"name": "app"}]},
        "status": {"initContainerStatuses": [
            {"name": "migrate", "image": "", "imageID": "", "ready": false, "restartCount": 4,
             "state": {"waiting": {"reason": "CrashLoopBackOff"}}}
        ]}
    }))
    .unwrap();
    cluster.set_log("ns", "pod-a", "migrate", EXEC_FORMAT_ERROR_SIGNATURE);

    assert!(classifier(&cluster).classify(&pod).await);
}

#[tokio::test]
async fn test_custom_signature_is_still_exact() {
    let cluster = FakeCluster::new();
    let pod = crash_looping(&cluster, "exec /app: exec format error\n");
    let classifier = FailureClassifier::new(cluster.clone(), "exec /app: exec format error\n");

    assert!(classifier.classify(&pod).await);
    assert!(!classifier.matches_signature(b"exec /app: exec format error"));
}
