// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-only view of the cluster state the backends reconcile against.
//!
//! Backends never talk to the Kubernetes API directly. They read services,
//! nodes and the currently configured groups through [`ClusterView`], which the
//! controller backs with reflector stores and tests back with
//! [`StaticClusterView`].

use crate::config::ConfigGroup;
use crate::errors::BackendError;
use crate::node::ClusterNode;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// One port exposed by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePortInfo {
    /// Port name, empty when unnamed
    pub name: String,
    /// Service port number
    pub port: u16,
    /// Numeric container target port, when given as a number
    pub target_port: Option<u16>,
    /// Node port, when the service is of type NodePort or LoadBalancer
    pub node_port: Option<u16>,
}

/// A service reduced to its identity and ordered port list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service namespace
    pub namespace: String,
    /// Service name
    pub name: String,
    /// Ports in declaration order
    pub ports: Vec<ServicePortInfo>,
}

/// A service port selected for a group, with everything provisioning needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPort {
    /// Resource name qualifier (the port name), `None` for unnamed ports
    pub qualifier: Option<String>,
    /// Service port number
    pub port: u16,
    /// Node port pool members listen on
    pub node_port: u16,
}

impl ServiceInfo {
    /// Build a service view from a Kubernetes `Service`.
    #[must_use]
    pub fn from_service(service: &Service) -> Self {
        let ports = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePortInfo {
                        name: p.name.clone().unwrap_or_default(),
                        port: u16::try_from(p.port).unwrap_or_default(),
                        target_port: match &p.target_port {
                            Some(IntOrString::Int(n)) => u16::try_from(*n).ok(),
                            _ => None,
                        },
                        node_port: p.node_port.and_then(|n| u16::try_from(n).ok()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            namespace: service.namespace().unwrap_or_default(),
            name: service.name_any(),
            ports,
        }
    }

    /// `namespace/name` of the service.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Resource name qualifiers of every port, `None` for unnamed ports.
    #[must_use]
    pub fn qualifiers(&self) -> Vec<Option<String>> {
        self.ports
            .iter()
            .map(|p| (!p.name.is_empty()).then(|| p.name.clone()))
            .collect()
    }
}

/// Select the service ports a group load balances.
///
/// With `target-port` unset every port is used. Otherwise a port is used when
/// its service port or numeric target port equals `target-port`, or when its
/// name equals the group's `target-service-id`.
///
/// # Errors
///
/// - [`BackendError::NoServicePorts`] when no port is selected
/// - [`BackendError::MissingNodePort`] when a selected port has no node port
pub fn select_target_ports(
    group: &ConfigGroup,
    service: &ServiceInfo,
) -> Result<Vec<TargetPort>, BackendError> {
    let selected: Vec<&ServicePortInfo> = service
        .ports
        .iter()
        .filter(|p| {
            group.target_port == 0
                || p.port == group.target_port
                || p.target_port == Some(group.target_port)
                || (!group.target_service_id.is_empty() && p.name == group.target_service_id)
        })
        .collect();

    if selected.is_empty() {
        return Err(BackendError::NoServicePorts {
            namespace: service.namespace.clone(),
            name: service.name.clone(),
        });
    }

    selected
        .into_iter()
        .map(|p| {
            let node_port = p.node_port.ok_or_else(|| BackendError::MissingNodePort {
                service: service.key(),
                port: if p.name.is_empty() {
                    p.port.to_string()
                } else {
                    p.name.clone()
                },
            })?;
            Ok(TargetPort {
                qualifier: (!p.name.is_empty()).then(|| p.name.clone()),
                port: p.port,
                node_port,
            })
        })
        .collect()
}

/// Read access to services, nodes and configured groups.
pub trait ClusterView: Send + Sync {
    /// Look up a service by namespace and name.
    fn service(&self, namespace: &str, name: &str) -> Option<ServiceInfo>;

    /// Every known cluster node.
    fn nodes(&self) -> Vec<ClusterNode>;

    /// Every currently configured group that passes validation.
    fn groups(&self) -> Vec<ConfigGroup>;

    /// Nodes whose `Ready` condition is `True`.
    fn ready_nodes(&self) -> Vec<ClusterNode> {
        self.nodes().into_iter().filter(|n| n.ready).collect()
    }
}

/// A [`ClusterView`] over fixed, mutable in-memory state.
#[derive(Debug, Default)]
pub struct StaticClusterView {
    services: RwLock<BTreeMap<(String, String), ServiceInfo>>,
    nodes: RwLock<BTreeMap<String, ClusterNode>>,
    groups: RwLock<BTreeMap<String, ConfigGroup>>,
}

impl StaticClusterView {
    /// Create an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a service.
    pub fn put_service(&self, service: ServiceInfo) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service.namespace.clone(), service.name.clone()), service);
    }

    /// Remove a service.
    pub fn remove_service(&self, namespace: &str, name: &str) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Insert or replace a node.
    pub fn put_node(&self, node: ClusterNode) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.name.clone(), node);
    }

    /// Remove a node.
    pub fn remove_node(&self, name: &str) {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Insert or replace a configured group.
    pub fn put_group(&self, group: ConfigGroup) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group.name.clone(), group);
    }

    /// Remove a configured group.
    pub fn remove_group(&self, name: &str) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl ClusterView for StaticClusterView {
    fn service(&self, namespace: &str, name: &str) -> Option<ServiceInfo> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn nodes(&self) -> Vec<ClusterNode> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn groups(&self) -> Vec<ConfigGroup> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "cluster_tests.rs"]
mod cluster_tests;
