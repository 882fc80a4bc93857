// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use lbsync::{
    backend::{
        appliance::{client::BigIpClient, ApplianceBackend},
        keepalived::{daemon::ShellDaemonControl, KeepalivedBackend},
        Backend,
    },
    cli::{BackendKind, Cli},
    cluster::ClusterView,
    constants::IP_ALLOCATION_CONFIGMAP_NAME,
    context::{stores, StoreClusterView},
    controller::{self, ControllerConfig},
    metrics,
    vip::{ConfigMapAllocationStore, VirtualIpAllocator},
};
use std::sync::Arc;
use tracing::{debug, error, info};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("lbsync-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_tracing() {
    // Respects RUST_LOG (default info) and RUST_LOG_FORMAT (text or json)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_tracing();
    cli.validate()?;

    info!(backend = ?cli.backend, "Starting lbsync controller");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let parse_mode = cli.parse_mode();
    let (stores, writers) = stores();
    let view: Arc<dyn ClusterView> = Arc::new(StoreClusterView::new(stores, parse_mode));

    let allocator = cli.vip_range()?.map(|range| {
        info!(
            start = %range.start(),
            end = %range.end(),
            namespace = %cli.pod_namespace,
            "Allocating Virtual IPs from range"
        );
        let store =
            ConfigMapAllocationStore::new(client.clone(), &cli.pod_namespace, IP_ALLOCATION_CONFIGMAP_NAME);
        Arc::new(VirtualIpAllocator::new(range, Arc::new(store)))
    });

    let backend = match cli.backend {
        BackendKind::Appliance => {
            let appliance = BigIpClient::new(&cli.appliance_config()?)
                .context("failed to create appliance client")?;
            let allocator =
                allocator.context("the appliance backend needs a Virtual IP range")?;
            Backend::Appliance(ApplianceBackend::new(
                Arc::new(appliance),
                allocator,
                view.clone(),
            ))
        }
        BackendKind::Keepalived => {
            let keepalived = KeepalivedBackend::new(
                cli.keepalived_config(),
                Arc::new(ShellDaemonControl::new()),
                allocator,
            );
            keepalived
                .start()
                .await
                .context("failed to start keepalived")?;
            Backend::Keepalived(keepalived)
        }
    };

    let metrics_addr = cli.metrics_addr;
    tokio::spawn(async move {
        info!(addr = %metrics_addr, "Serving metrics");
        if let Err(e) = metrics::serve_metrics(metrics_addr).await {
            error!(addr = %metrics_addr, error = %e, "Metrics server failed");
        }
    });

    let config = ControllerConfig {
        watch_namespace: cli.watch_namespace(),
        parse_mode,
    };
    let result = controller::run(client, writers, view, Arc::new(backend), config).await;
    if let Err(e) = &result {
        error!(error = %e, "Controller stopped");
    }
    result
}
