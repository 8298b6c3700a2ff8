//! # Kind Registry
//!
//! Explicit mapping from an owner kind to the API resource used to read and
//! patch it, plus where the pod template lives inside that kind.
//!
//! Built-in workload kinds are registered by [`KindRegistry::builtin`]. Custom
//! workload controllers (Argo Rollouts, OpenKruise, ...) can be added from JSON:
//!
//! ```json
//! [{"kind": "Rollout", "group": "argoproj.io", "version": "v1alpha1", "plural": "rollouts"}]
//! ```

use kube::core::{ApiResource, GroupVersionKind};
use serde::Deserialize;
use std::collections::HashMap;

/// Resource addressing for one kind
#[derive(Debug, Clone)]
pub struct KindMapping {
    pub resource: ApiResource,
    /// Path from the object root to its `PodTemplateSpec`
    pub template_path: Vec<String>,
}

/// JSON form of a kind mapping, as accepted by `EXTRA_KIND_MAPPINGS`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindMappingSpec {
    pub kind: String,
    /// API group; empty for the core group
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub plural: String,
    #[serde(default = "default_template_path")]
    pub template_path: Vec<String>,
}

fn default_template_path() -> Vec<String> {
    vec!["spec".to_string(), "template".to_string()]
}

impl KindMappingSpec {
    fn new(kind: &str, group: &str, version: &str, plural: &str) -> Self {
        Self {
            kind: kind.to_string(),
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            template_path: default_template_path(),
        }
    }

    fn with_template_path(mut self, path: &[&str]) -> Self {
        self.template_path = path.iter().map(|segment| (*segment).to_string()).collect();
        self
    }

    /// Parse a JSON array of mappings
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when `json` is not an array of mappings.
    pub fn parse_list(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Lookup table from kind name to [`KindMapping`]
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<String, KindMapping>,
}

impl KindRegistry {
    /// Registry with the built-in workload kinds that own Pods
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for spec in [
            KindMappingSpec::new("ReplicaSet", "apps", "v1", "replicasets"),
            KindMappingSpec::new("Deployment", "apps", "v1", "deployments"),
            KindMappingSpec::new("StatefulSet", "apps", "v1", "statefulsets"),
            KindMappingSpec::new("DaemonSet", "apps", "v1", "daemonsets"),
            KindMappingSpec::new("ReplicationController", "", "v1", "replicationcontrollers"),
            KindMappingSpec::new("Job", "batch", "v1", "jobs"),
            KindMappingSpec::new("CronJob", "batch", "v1", "cronjobs")
                .with_template_path(&["spec", "jobTemplate", "spec", "template"]),
        ] {
            registry.register(spec);
        }
        registry
    }

    /// Add or replace the mapping for `spec.kind`
    pub fn register(&mut self, spec: KindMappingSpec) {
        let gvk = GroupVersionKind::gvk(&spec.group, &spec.version, &spec.kind);
        let mapping = KindMapping {
            resource: ApiResource::from_gvk_with_plural(&gvk, &spec.plural),
            template_path: spec.template_path,
        };
        self.kinds.insert(spec.kind, mapping);
    }

    #[must_use]
    pub fn lookup(&self, kind: &str) -> Option<&KindMapping> {
        self.kinds.get(kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
