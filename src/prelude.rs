//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use arch_scheduling_controller::prelude::*;
//! ```

// Cluster seams - implemented by the kube adapter and by test fakes
pub use crate::cluster::{ApiError, ClusterClient, KubeClusterClient, PodCache};

// Controller and its components
pub use crate::controller::classifier::FailureClassifier;
pub use crate::controller::kinds::{KindMapping, KindMappingSpec, KindRegistry};
pub use crate::controller::owner::{ControllerObject, OwnerChainResolver, ResolveError};
pub use crate::controller::patch::{AffinityPatch, NodeArch};
pub use crate::controller::queue::{QueueConfig, WorkQueue};
pub use crate::controller::reconciler::{ReconcileError, Reconciler, WorkKey};
pub use crate::controller::router::ChangeRouter;
pub use crate::controller::{ArchSchedulingController, ControllerError};

// Config and retry policy
pub use crate::config::{ConfigError, ControllerConfig};
pub use crate::runtime::error_policy::{Outcome, RetryPolicy};
