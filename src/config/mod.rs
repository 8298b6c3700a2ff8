//! # Configuration
//!
//! Controller settings from environment variables, overridable by CLI flags.

pub mod controller;

pub use controller::{ConfigError, ControllerConfig};
