//! # Affinity Patch
//!
//! Builds the merge patch that forbids scheduling a workload's Pods onto nodes of
//! one CPU architecture:
//!
//! ```yaml
//! spec:
//!   template:
//!     spec:
//!       affinity:
//!         nodeAffinity:
//!           requiredDuringSchedulingIgnoredDuringExecution:
//!             nodeSelectorTerms:
//!               - matchExpressions:
//!                   - key: kubernetes.io/arch
//!                     operator: NotIn
//!                     values: [arm64]
//! ```
//!
//! Under JSON merge patch semantics lists are replaced wholesale. Applying the
//! same patch twice leaves the object unchanged rather than accumulating
//! duplicate selector terms, but the patch also overwrites whatever
//! `nodeSelectorTerms` the workload already had: a zone pin or any other
//! required term is dropped. Only the most recent exclusion survives, so a
//! workload that fails on a second architecture loses the first exclusion.

use k8s_openapi::api::core::v1::{
    Affinity, Node, NodeAffinity, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
};
use serde_json::{json, Map, Value};

/// Architecture of a node and the label key it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeArch {
    pub label_key: String,
    pub value: String,
}

/// Read the architecture of `node`, trying each of `label_keys` in order
#[must_use]
pub fn node_arch(node: &Node, label_keys: &[String]) -> Option<NodeArch> {
    let labels = node.metadata.labels.as_ref()?;
    label_keys.iter().find_map(|key| {
        labels
            .get(key)
            .filter(|value| !value.is_empty())
            .map(|value| NodeArch {
                label_key: key.clone(),
                value: value.clone(),
            })
    })
}

/// An immutable merge patch document
#[derive(Debug, Clone, PartialEq)]
pub struct AffinityPatch {
    excluded: NodeArch,
    document: Value,
}

impl AffinityPatch {
    /// Build the exclusion of `excluded` under the pod template at `template_path`
    #[must_use]
    pub fn build(excluded: &NodeArch, template_path: &[String]) -> Self {
        let affinity = Affinity {
            node_affinity: Some(NodeAffinity {
                required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                    node_selector_terms: vec![NodeSelectorTerm {
                        match_expressions: Some(vec![NodeSelectorRequirement {
                            key: excluded.label_key.clone(),
                            operator: "NotIn".to_string(),
                            values: Some(vec![excluded.value.clone()]),
                        }]),
                        match_fields: None,
                    }],
                }),
                preferred_during_scheduling_ignored_during_execution: None,
            }),
            ..Affinity::default()
        };

        let affinity = serde_json::to_value(affinity).unwrap_or_else(|_| Value::Null);
        let mut document = json!({ "spec": { "affinity": affinity } });
        for segment in template_path.iter().rev() {
            let mut wrapper = Map::new();
            wrapper.insert(segment.clone(), document);
            document = Value::Object(wrapper);
        }

        Self {
            excluded: excluded.clone(),
            document,
        }
    }

    #[must_use]
    pub fn excluded(&self) -> &NodeArch {
        &self.excluded
    }

    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }
}
