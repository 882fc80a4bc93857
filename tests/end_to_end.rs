// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! End-to-end tests for the appliance backend
//!
//! These tests drive the planner, the appliance backend and the Virtual IP
//! allocator together, with in-memory fakes standing in for the appliance,
//! the allocation ConfigMap and the cluster.
//!
//! Run with: cargo test --test end_to_end

use k8s_openapi::api::core::v1::{ConfigMap, Node, Service};
use lbsync::backend::appliance::memory::MemoryAppliance;
use lbsync::backend::appliance::ApplianceBackend;
use lbsync::backend::Backend;
use lbsync::cluster::{ServiceInfo, StaticClusterView};
use lbsync::config::{ConfigGroup, ParseMode};
use lbsync::controller::events::ObjectChange;
use lbsync::controller::plan::{self, Command};
use lbsync::node::ClusterNode;
use lbsync::vip::{IpRange, MemoryAllocationStore, VirtualIpAllocator};
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

struct Harness {
    appliance: Arc<MemoryAppliance>,
    store: Arc<MemoryAllocationStore>,
    cluster: Arc<StaticClusterView>,
    backend: Backend,
}

fn harness() -> Harness {
    let appliance = Arc::new(MemoryAppliance::new());
    let store = Arc::new(MemoryAllocationStore::new());
    let cluster = Arc::new(StaticClusterView::new());
    let range = IpRange::parse("10.0.0.1", "10.0.0.3").unwrap();
    let allocator = Arc::new(VirtualIpAllocator::new(range, store.clone()));
    let backend = Backend::Appliance(ApplianceBackend::new(
        appliance.clone(),
        allocator,
        cluster.clone(),
    ));

    Harness {
        appliance,
        store,
        cluster,
        backend,
    }
}

fn configmap(data: serde_json::Value) -> ConfigMap {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": "lb-config",
            "namespace": "shop",
            "labels": { "loadbalancer": "configmap" }
        },
        "data": data
    }))
    .unwrap()
}

fn app_service(node_port: u16) -> Service {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": "app", "namespace": "shop" },
        "spec": {
            "type": "NodePort",
            "ports": [{ "port": 8080, "targetPort": 8080, "nodePort": node_port }]
        }
    }))
    .unwrap()
}

fn node(name: &str, internal: &str, ready: bool) -> Node {
    let status = if ready { "True" } else { "False" };
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": { "name": name },
        "status": {
            "addresses": [{ "type": "InternalIP", "address": internal }],
            "conditions": [{ "type": "Ready", "status": status }]
        }
    }))
    .unwrap()
}

async fn execute(backend: &Backend, commands: Vec<Command>) {
    for command in commands {
        let result = match &command {
            Command::Provision(group) => backend.provision(group).await,
            Command::Deprovision(group) => backend.deprovision(group).await,
            Command::NodeAdded(node) => backend.on_node_added(node).await,
            Command::NodeRemoved(node) => backend.on_node_removed(node).await,
            Command::NodeUpdated { old, new } => backend.on_node_updated(old, new).await,
        };
        result.unwrap_or_else(|e| panic!("{} failed: {e}", command.key()));
    }
}

fn seed_cluster(h: &Harness) {
    h.cluster
        .put_service(ServiceInfo::from_service(&app_service(30080)));
    h.cluster
        .put_node(ClusterNode::from_node(&node("node1", "192.168.0.1", true)));
    h.cluster
        .put_node(ClusterNode::from_node(&node("node2", "192.168.0.2", true)));
}

fn app_config() -> ConfigMap {
    configmap(json!({
        "ns-app.bind-port": "80",
        "ns-app.target-service-name": "app"
    }))
}

fn app_group() -> ConfigGroup {
    ConfigGroup::from_snapshot(
        "ns-app",
        &app_config().data.unwrap_or_default(),
        "shop",
        ParseMode::Lenient,
    )
    .unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_group_lifecycle() {
    let h = harness();
    seed_cluster(&h);
    let cm = app_config();

    let commands = plan::config_commands(&ObjectChange::Added(cm.clone()), ParseMode::Lenient);
    assert_eq!(commands.len(), 1);
    execute(&h.backend, commands).await;

    assert_eq!(h.appliance.monitor_names(), vec!["ns-app-monitor"]);
    assert_eq!(h.appliance.pool_names(), vec!["ns-app-pool"]);
    assert_eq!(
        h.appliance.members("ns-app-pool"),
        vec!["node1:30080", "node2:30080"]
    );
    let servers = h.appliance.virtual_servers();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].destination, "10.0.0.1:80");
    assert_eq!(servers[0].pool, "ns-app-pool");
    assert_eq!(
        h.store.entries().await.get("10.0.0.1").map(String::as_str),
        Some("ns-app")
    );

    let commands = plan::config_commands(&ObjectChange::Deleted(cm), ParseMode::Lenient);
    assert!(matches!(commands.as_slice(), [Command::Deprovision(_)]));
    execute(&h.backend, commands).await;

    assert!(h.appliance.monitor_names().is_empty());
    assert!(h.appliance.pool_names().is_empty());
    assert!(h.appliance.virtual_servers().is_empty());
    assert!(h.store.entries().await.is_empty());
}

#[tokio::test]
async fn test_provision_twice_is_idempotent() {
    let h = harness();
    seed_cluster(&h);
    let change = ObjectChange::Added(app_config());

    execute(&h.backend, plan::config_commands(&change, ParseMode::Lenient)).await;
    execute(&h.backend, plan::config_commands(&change, ParseMode::Lenient)).await;

    assert_eq!(h.appliance.monitor_names().len(), 1);
    assert_eq!(h.appliance.pool_names().len(), 1);
    assert_eq!(h.appliance.virtual_servers().len(), 1);
    assert_eq!(h.appliance.members("ns-app-pool").len(), 2);
    assert_eq!(h.store.entries().await.len(), 1);
}

#[tokio::test]
async fn test_node_readiness_changes_pool_membership() {
    let h = harness();
    seed_cluster(&h);
    execute(
        &h.backend,
        plan::config_commands(&ObjectChange::Added(app_config()), ParseMode::Lenient),
    )
    .await;
    h.cluster.put_group(app_group());

    let not_ready = ObjectChange::Updated {
        old: node("node2", "192.168.0.2", true),
        new: node("node2", "192.168.0.2", false),
    };
    h.cluster
        .put_node(ClusterNode::from_node(&node("node2", "192.168.0.2", false)));
    execute(&h.backend, plan::node_commands(&not_ready)).await;
    assert_eq!(h.appliance.members("ns-app-pool"), vec!["node1:30080"]);

    let ready = ObjectChange::Updated {
        old: node("node2", "192.168.0.2", false),
        new: node("node2", "192.168.0.2", true),
    };
    h.cluster
        .put_node(ClusterNode::from_node(&node("node2", "192.168.0.2", true)));
    execute(&h.backend, plan::node_commands(&ready)).await;
    assert_eq!(
        h.appliance.members("ns-app-pool"),
        vec!["node1:30080", "node2:30080"]
    );
}

#[tokio::test]
async fn test_service_change_reprovisions_targeting_groups() {
    let h = harness();
    seed_cluster(&h);
    let cm = app_config();
    execute(
        &h.backend,
        plan::config_commands(&ObjectChange::Added(cm), ParseMode::Lenient),
    )
    .await;

    let groups = vec![app_group()];
    let change = ObjectChange::Updated {
        old: app_service(30080),
        new: app_service(30090),
    };
    h.cluster
        .put_service(ServiceInfo::from_service(&app_service(30090)));

    let commands = plan::service_commands(&change, &groups);
    assert_eq!(commands.len(), 1);
    execute(&h.backend, commands).await;

    let members = h.appliance.members("ns-app-pool");
    assert!(members.contains(&"node1:30090".to_string()));
    assert!(members.contains(&"node2:30090".to_string()));
    assert_eq!(h.appliance.virtual_servers().len(), 1);
}
