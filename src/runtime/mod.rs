//! # Runtime
//!
//! Process-level wiring around the controller.
//!
//! - `error_policy`: forget/requeue decisions and watch error classification
//! - `initialization`: tracing, rustls, metrics, HTTP server and client setup
//! - `watch_loop`: Pod watch feeding the reflector store and the change router

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

use crate::cli::Cli;
use crate::cluster::KubeClusterClient;
use crate::config::ControllerConfig;
use crate::controller::{ArchSchedulingController, ControllerError};
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube_runtime::reflector;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the controller until SIGINT/SIGTERM, then drain and return
///
/// # Errors
///
/// Fails on invalid configuration, client setup failure, or when the controller
/// stops abnormally.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = ControllerConfig::from_env().context("Failed to load configuration")?;
    cli.apply_to(&mut config);

    let token = CancellationToken::new();
    let init =
        initialization::initialize(&config, cli.kubeconfig.as_deref(), token.clone()).await?;

    let pods: Api<Pod> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(init.client.clone(), namespace),
        None => Api::all(init.client.clone()),
    };
    let (store, writer) = reflector::store::<Pod>();

    let cluster = Arc::new(KubeClusterClient::new(
        init.client.clone(),
        config.api_timeout(),
        config.log_limit_bytes,
    ));
    let controller = Arc::new(ArchSchedulingController::new(
        cluster,
        Arc::new(store.clone()),
        &config,
    ));

    {
        let token = token.clone();
        let state = Arc::clone(&init.server_state);
        tokio::spawn(async move {
            initialization::shutdown_signal().await;
            info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
            state.set_ready(false);
            token.cancel();
        });
    }

    let watch = tokio::spawn(watch_loop::run_pod_watch(
        pods,
        writer,
        controller.router(),
        token.clone(),
    ));

    let caches_synced = {
        let state = Arc::clone(&init.server_state);
        async move {
            let synced = store.wait_until_ready().await.is_ok();
            state.set_ready(synced);
            synced
        }
    };

    let result = Arc::clone(&controller).run(caches_synced, token.clone()).await;
    init.server_state.set_ready(false);
    token.cancel();

    if let Err(e) = watch.await {
        error!("Pod watch task failed: {}", e);
    }
    if let Err(e) = init.server_handle.await {
        error!("HTTP server task failed: {}", e);
    }

    match result {
        Ok(()) => {}
        Err(ControllerError::SyncCancelled) => {
            info!("Shutdown requested before the pod cache synced");
        }
        Err(e) => return Err(e).context("Controller stopped with an error"),
    }
    info!("Shutdown complete");
    Ok(())
}
