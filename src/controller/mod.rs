// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation controller.
//!
//! Three watch loops feed the controller:
//!
//! - ConfigMaps labelled `loadbalancer=configmap` (the configuration)
//! - Nodes
//! - Services
//!
//! Each loop keeps its reflector store current, turns watch events into
//! [`events::ObjectChange`]s, plans backend [`plan::Command`]s and hands them to
//! the [`dispatch::Dispatcher`].
//!
//! Per-command failures are logged and counted. A fatal backend error (the local
//! daemon can no longer be configured) stops the controller. Whatever ends the
//! controller (a signal, a fatal error or a watch stream ending) the workers
//! are drained first and the backend shutdown hook runs last, before [`run`]
//! returns.

pub mod dispatch;
pub mod events;
pub mod plan;

use crate::backend::Backend;
use crate::cluster::ClusterView;
use crate::config::ParseMode;
use crate::constants::{SHUTDOWN_GRACE_SECS, WORKER_IDLE_TIMEOUT_SECS};
use crate::context::Writers;
use crate::errors::BackendError;
use crate::labels::config_label_selector;
use crate::metrics;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dispatch::{CommandHandler, Dispatcher};
use events::{ObjectChange, ObjectTracker};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Service};
use kube::runtime::reflector::store::Writer;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use plan::Command;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Controller settings.
#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Namespace watched for configuration, `None` for all namespaces
    pub watch_namespace: Option<String>,
    /// How configuration fields are parsed
    pub parse_mode: ParseMode,
}

/// Runs commands against the backend and reports the outcome.
pub struct BackendHandler {
    backend: Arc<Backend>,
    fatal: mpsc::UnboundedSender<BackendError>,
}

impl BackendHandler {
    /// Create a handler; fatal errors are forwarded to `fatal`.
    #[must_use]
    pub fn new(backend: Arc<Backend>, fatal: mpsc::UnboundedSender<BackendError>) -> Self {
        Self { backend, fatal }
    }
}

#[async_trait]
impl CommandHandler for BackendHandler {
    async fn handle(&self, command: Command) {
        let operation = command.operation();
        let key = command.key();
        let start = Instant::now();

        let result = match &command {
            Command::Provision(group) => self.backend.provision(group).await,
            Command::Deprovision(group) => self.backend.deprovision(group).await,
            Command::NodeAdded(node) => self.backend.on_node_added(node).await,
            Command::NodeRemoved(node) => self.backend.on_node_removed(node).await,
            Command::NodeUpdated { old, new } => self.backend.on_node_updated(old, new).await,
        };

        let duration = start.elapsed();
        match result {
            Ok(()) => {
                debug!(operation = operation, key = %key, elapsed = ?duration, "Command succeeded");
                metrics::record_operation_success(operation, duration);
            }
            Err(e) => {
                let class = e.error_class();
                metrics::record_operation_error(operation, duration, class);
                if e.is_fatal() {
                    error!(operation = operation, key = %key, error = %e, "Fatal backend error");
                    let _ = self.fatal.send(e);
                } else {
                    error!(
                        operation = operation,
                        key = %key,
                        error_class = class,
                        error = %e,
                        "Command failed"
                    );
                }
            }
        }
    }
}

/// Run the controller until a signal, a fatal error or a watch stream ending.
///
/// # Errors
///
/// Returns an error when a fatal backend error occurred or a watch stream
/// ended. The backend shutdown hook has run either way.
pub async fn run(
    client: Client,
    writers: Writers,
    view: Arc<dyn ClusterView>,
    backend: Arc<Backend>,
    config: ControllerConfig,
) -> Result<()> {
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let handler = Arc::new(BackendHandler::new(backend.clone(), fatal_tx));
    let dispatcher = Arc::new(Dispatcher::new(
        handler,
        Duration::from_secs(WORKER_IDLE_TIMEOUT_SECS),
    ));

    let configmaps: Api<ConfigMap> = match &config.watch_namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let nodes: Api<Node> = Api::all(client.clone());
    let services: Api<Service> = Api::all(client);

    let mode = config.parse_mode;
    let config_watch = watch(
        "configmap",
        configmaps,
        watcher::Config::default().labels(&config_label_selector()),
        writers.configmaps,
        {
            let dispatcher = dispatcher.clone();
            move |change: &ObjectChange<ConfigMap>| {
                for command in plan::config_commands(change, mode) {
                    dispatcher.dispatch(command);
                }
            }
        },
    );
    let node_watch = watch(
        "node",
        nodes,
        watcher::Config::default(),
        writers.nodes,
        {
            let dispatcher = dispatcher.clone();
            move |change: &ObjectChange<Node>| {
                for command in plan::node_commands(change) {
                    dispatcher.dispatch(command);
                }
            }
        },
    );
    let service_watch = watch(
        "service",
        services,
        watcher::Config::default(),
        writers.services,
        {
            let dispatcher = dispatcher.clone();
            move |change: &ObjectChange<Service>| {
                for command in plan::service_commands(change, &view.groups()) {
                    dispatcher.dispatch(command);
                }
            }
        },
    );

    info!(
        backend = backend.name(),
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        "Starting controller"
    );

    let result = tokio::select! {
        result = config_watch => result,
        result = node_watch => result,
        result = service_watch => result,
        Some(e) = fatal_rx.recv() => Err(anyhow!(e).context("fatal backend error")),
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    shut_down(
        &dispatcher,
        &backend,
        Duration::from_secs(SHUTDOWN_GRACE_SECS),
    )
    .await;
    result
}

/// Drain the workers, then run the backend shutdown hook.
///
/// No command reaches the backend once its shutdown hook has started.
pub(crate) async fn shut_down<H: CommandHandler>(
    dispatcher: &Dispatcher<H>,
    backend: &Backend,
    grace: Duration,
) {
    dispatcher.shutdown(grace).await;

    info!(backend = backend.name(), "Running backend shutdown");
    if let Err(e) = backend.shutdown().await {
        error!(error = %e, "Backend shutdown failed");
    }
}

/// Watch one kind, keep its store current and report every change.
async fn watch<K, F>(
    kind: &'static str,
    api: Api<K>,
    watch_config: watcher::Config,
    writer: Writer<K>,
    mut on_change: F,
) -> Result<()>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Send + Sync + serde::de::DeserializeOwned + 'static,
    F: FnMut(&ObjectChange<K>),
{
    let stream = reflector(writer, watcher(api, watch_config)).default_backoff();
    let mut stream = std::pin::pin!(stream);
    let mut tracker = ObjectTracker::new();

    info!(kind = kind, "Watching");
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                for change in tracker.apply(event) {
                    on_change(&change);
                }
            }
            Err(e) => warn!(kind = kind, error = %e, "Watch error, retrying"),
        }
    }

    error!(kind = kind, "Watch stream ended");
    Err(anyhow!("{kind} watch stream ended"))
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
