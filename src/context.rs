// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared reflector stores.
//!
//! The controller runs one reflector per watched kind. Backends read the
//! resulting in-memory stores through [`StoreClusterView`], so looking up a
//! service, listing nodes or listing configured groups never hits the API
//! server.

use crate::cluster::{ClusterView, ServiceInfo};
use crate::config::{config_groups, ConfigGroup, ConfigSnapshot, ParseMode};
use crate::node::ClusterNode;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Service};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::debug;

/// Read handles of every reflector store.
#[derive(Clone)]
pub struct Stores {
    /// Load balancer configuration ConfigMaps
    pub configmaps: Store<ConfigMap>,
    /// Cluster nodes
    pub nodes: Store<Node>,
    /// Services in every namespace
    pub services: Store<Service>,
}

/// Write handles feeding [`Stores`], consumed by the watch loops.
pub struct Writers {
    /// ConfigMap store writer
    pub configmaps: reflector::store::Writer<ConfigMap>,
    /// Node store writer
    pub nodes: reflector::store::Writer<Node>,
    /// Service store writer
    pub services: reflector::store::Writer<Service>,
}

/// Create empty stores and their writers.
#[must_use]
pub fn stores() -> (Stores, Writers) {
    let (configmaps, configmap_writer) = reflector::store();
    let (nodes, node_writer) = reflector::store();
    let (services, service_writer) = reflector::store();
    (
        Stores {
            configmaps,
            nodes,
            services,
        },
        Writers {
            configmaps: configmap_writer,
            nodes: node_writer,
            services: service_writer,
        },
    )
}

/// [`ClusterView`] backed by reflector stores.
#[derive(Clone)]
pub struct StoreClusterView {
    stores: Stores,
    mode: ParseMode,
}

impl StoreClusterView {
    /// Create a view parsing configuration in `mode`.
    #[must_use]
    pub fn new(stores: Stores, mode: ParseMode) -> Self {
        Self { stores, mode }
    }
}

impl ClusterView for StoreClusterView {
    fn service(&self, namespace: &str, name: &str) -> Option<ServiceInfo> {
        self.stores
            .services
            .get(&ObjectRef::new(name).within(namespace))
            .map(|svc| ServiceInfo::from_service(&svc))
    }

    fn nodes(&self) -> Vec<ClusterNode> {
        self.stores
            .nodes
            .state()
            .iter()
            .map(|node| ClusterNode::from_node(node))
            .collect()
    }

    fn groups(&self) -> Vec<ConfigGroup> {
        let mut groups: BTreeMap<String, ConfigGroup> = BTreeMap::new();
        for cm in self.stores.configmaps.state() {
            let snapshot: ConfigSnapshot = cm.data.clone().unwrap_or_default();
            let namespace = cm.namespace().unwrap_or_default();
            for name in config_groups(&snapshot) {
                match ConfigGroup::from_snapshot(&name, &snapshot, &namespace, self.mode)
                    .and_then(|group| group.validate().map(|()| group))
                {
                    Ok(group) => {
                        groups.insert(name, group);
                    }
                    Err(e) => debug!(group = %name, error = %e, "Ignoring invalid group"),
                }
            }
        }
        groups.into_values().collect()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
