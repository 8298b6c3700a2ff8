//! # Reconciler
//!
//! Turns a work key into an exclusion patch on the Pod's controller object.
//!
//! ## Reconciliation Flow
//!
//! `Popped -> ResolvingInstance -> ResolvingOwnerChain -> ReadingNode ->
//! BuildingPatch -> Applying -> {Forgotten | RequeuedWithBackoff}`
//!
//! The terminal transition is decided by [`crate::runtime::error_policy`].

pub mod reconcile;
pub mod types;

pub use reconcile::Reconciler;
pub use types::{ReconcileError, WorkKey};
