// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster node membership as seen by the load balancer.
//!
//! Each node contributes one pool member per target port. The member address is
//! selected from the node's reported addresses by class priority:
//!
//! 1. `ExternalIP`
//! 2. `LegacyHostIP`
//! 3. `InternalIP`
//!
//! A node reporting none of these classes is unusable: it is skipped with a
//! reported [`NodeAddressError`] and never aborts processing of other nodes.

use crate::errors::NodeAddressError;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

/// Node address type reported for external addresses
pub const ADDRESS_EXTERNAL_IP: &str = "ExternalIP";

/// Node address type reported by legacy kubelets
pub const ADDRESS_LEGACY_HOST_IP: &str = "LegacyHostIP";

/// Node address type reported for cluster-internal addresses
pub const ADDRESS_INTERNAL_IP: &str = "InternalIP";

/// Address classes in selection priority order
const ADDRESS_PRIORITY: [&str; 3] = [ADDRESS_EXTERNAL_IP, ADDRESS_LEGACY_HOST_IP, ADDRESS_INTERNAL_IP];

/// One address reported by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    /// Address class (`ExternalIP`, `InternalIP`, ...)
    pub kind: String,
    /// The address itself
    pub address: String,
}

/// A cluster node reduced to what pool membership needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    /// Node name, also the appliance node name
    pub name: String,
    /// Reported addresses in the order the node lists them
    pub addresses: Vec<NodeAddress>,
    /// Whether the node's `Ready` condition is `True`
    pub ready: bool,
}

impl ClusterNode {
    /// Build a node view from a Kubernetes `Node`.
    #[must_use]
    pub fn from_node(node: &Node) -> Self {
        let status = node.status.as_ref();

        let addresses = status
            .and_then(|s| s.addresses.as_ref())
            .map(|list| {
                list.iter()
                    .map(|a| NodeAddress {
                        kind: a.type_.clone(),
                        address: a.address.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let ready = status
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            });

        Self {
            name: node.name_any(),
            addresses,
            ready,
        }
    }

    /// Select the node's address by class priority.
    ///
    /// # Errors
    ///
    /// Returns [`NodeAddressError::NoUsableAddress`] when no address belongs to a
    /// recognized class.
    pub fn host_address(&self) -> Result<&str, NodeAddressError> {
        ADDRESS_PRIORITY
            .iter()
            .find_map(|class| {
                self.addresses
                    .iter()
                    .find(|a| a.kind == *class)
                    .map(|a| a.address.as_str())
            })
            .ok_or_else(|| NodeAddressError::NoUsableAddress {
                node: self.name.clone(),
                known: self
                    .addresses
                    .iter()
                    .map(|a| format!("{}={}", a.kind, a.address))
                    .collect(),
            })
    }

    /// Pool member name for this node at a node port.
    #[must_use]
    pub fn member_name(&self, node_port: u16) -> String {
        format!("{}:{node_port}", self.name)
    }

    /// Returns true if the change from `old` to `self` affects pool membership.
    ///
    /// Only readiness and the selected address matter; heartbeat-only status
    /// updates are ignored.
    #[must_use]
    pub fn membership_changed(&self, old: &Self) -> bool {
        self.ready != old.ready || self.host_address().ok() != old.host_address().ok()
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod node_tests;
