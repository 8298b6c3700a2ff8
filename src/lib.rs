//! Architecture Scheduling Controller Library
//!
//! Watches Pods crash-looping with `exec format error`, walks their owner chain
//! to the controlling workload and patches that workload's pod template with a
//! required node affinity excluding the offending CPU architecture.
//!
//! ## Quick Start
//!
//! ```rust
//! use arch_scheduling_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
