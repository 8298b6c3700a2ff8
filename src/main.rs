//! # Architecture Scheduling Controller
//!
//! A Kubernetes controller that notices Pods crash-looping because their image
//! was built for a different CPU architecture than their node, and adds a
//! required node affinity to the owning workload so its Pods are no longer
//! scheduled onto nodes of that architecture.
//!
//! ## Configuration
//!
//! Environment variables (`WORKERS`, `MAX_RETRIES`, `WATCH_NAMESPACE`, ...) with
//! command line flags taking precedence. Run with `--help` for the flags.

use anyhow::Result;
use arch_scheduling_controller::cli::Cli;
use arch_scheduling_controller::runtime;
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    runtime::initialization::init_tracing();
    runtime::run(cli).await.inspect_err(|e| error!("Controller failed: {e:#}"))
}
