//! # Command Line
//!
//! Flags override the environment-derived [`ControllerConfig`].
//!
//! ```bash
//! arch-scheduling-controller --namespace team-a --workers 4 --max-retries 10
//! ```

use crate::config::ControllerConfig;
use clap::Parser;
use std::path::PathBuf;

/// Steers workloads away from nodes whose CPU architecture their images cannot run on
#[derive(Debug, Parser)]
#[command(name = "arch-scheduling-controller", version, long_about = None)]
pub struct Cli {
    /// Path to a kubeconfig file (defaults to KUBECONFIG, ~/.kube/config or in-cluster config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Only watch Pods in this namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Number of concurrent reconciliation workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Port for /metrics, /healthz and /readyz
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Requeues per Pod before giving up (0 retries forever)
    #[arg(long)]
    pub max_retries: Option<u32>,
}

impl Cli {
    /// Overwrite `config` with every flag that was given
    pub fn apply_to(&self, config: &mut ControllerConfig) {
        if let Some(namespace) = &self.namespace {
            config.watch_namespace = Some(namespace.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
    }
}
