// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object changes to backend commands.
//!
//! Planning is pure: it reads the changed objects (and, for services, the
//! configured groups) and returns the commands to run. Nothing here talks to
//! the cluster or to a backend.
//!
//! | Change | Commands |
//! |--------|----------|
//! | ConfigMap added / updated / deleted | `Provision` per added or updated group, `Deprovision` per removed group |
//! | Node added / deleted | `NodeAdded` / `NodeRemoved` |
//! | Node updated | `NodeUpdated` when readiness or the selected address changed |
//! | Service added / updated | `Provision` for every group targeting the service |
//! | Service deleted | none |

use super::events::ObjectChange;
use crate::cluster::ServiceInfo;
use crate::config::{diff, ConfigGroup, ConfigSnapshot, GroupChange, ParseMode};
use crate::node::ClusterNode;
use k8s_openapi::api::core::v1::{ConfigMap, Node, Service};
use kube::ResourceExt;
use tracing::{debug, error, info};

/// Work for a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create or update a group's resources
    Provision(ConfigGroup),
    /// Remove a group's resources; holds the group's last known configuration
    Deprovision(ConfigGroup),
    /// A node appeared
    NodeAdded(ClusterNode),
    /// A node disappeared
    NodeRemoved(ClusterNode),
    /// A node's membership relevant state changed
    NodeUpdated {
        /// Previous state
        old: ClusterNode,
        /// Current state
        new: ClusterNode,
    },
}

impl Command {
    /// Serialization key: commands with the same key run one at a time, in order.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Provision(group) | Self::Deprovision(group) => format!("group:{}", group.name),
            Self::NodeAdded(node) | Self::NodeRemoved(node) => format!("node:{}", node.name),
            Self::NodeUpdated { new, .. } => format!("node:{}", new.name),
        }
    }

    /// Operation name used in logs and metrics.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Provision(_) => "provision",
            Self::Deprovision(_) => "deprovision",
            Self::NodeAdded(_) => "node_added",
            Self::NodeRemoved(_) => "node_removed",
            Self::NodeUpdated { .. } => "node_updated",
        }
    }
}

fn snapshot(cm: &ConfigMap) -> ConfigSnapshot {
    cm.data.clone().unwrap_or_default()
}

/// Parse and validate a group that should be provisioned.
fn desired_group(
    name: &str,
    snapshot: &ConfigSnapshot,
    namespace: &str,
    mode: ParseMode,
) -> Option<ConfigGroup> {
    match ConfigGroup::from_snapshot(name, snapshot, namespace, mode)
        .and_then(|group| group.validate().map(|()| group))
    {
        Ok(group) => Some(group),
        Err(e) => {
            error!(group = %name, error = %e, "Invalid group configuration, skipping");
            None
        }
    }
}

/// Parse the last known configuration of a group being removed.
///
/// Always lenient: removal must not depend on the old values being well formed.
fn removed_group(name: &str, snapshot: &ConfigSnapshot, namespace: &str) -> Option<ConfigGroup> {
    match ConfigGroup::from_snapshot(name, snapshot, namespace, ParseMode::Lenient) {
        Ok(group) => Some(group),
        Err(e) => {
            error!(group = %name, error = %e, "Cannot read removed group configuration");
            None
        }
    }
}

/// Commands for a configuration ConfigMap change.
#[must_use]
pub fn config_commands(change: &ObjectChange<ConfigMap>, mode: ParseMode) -> Vec<Command> {
    let (old_cm, new_cm) = match change {
        ObjectChange::Added(cm) => (None, Some(cm)),
        ObjectChange::Updated { old, new } => (Some(old), Some(new)),
        ObjectChange::Deleted(cm) => (Some(cm), None),
    };
    let old = old_cm.map(snapshot).unwrap_or_default();
    let new = new_cm.map(snapshot).unwrap_or_default();
    let namespace = new_cm
        .or(old_cm)
        .and_then(|cm| cm.namespace())
        .unwrap_or_default();

    let diffs = diff(&old, &new);
    debug!(namespace = %namespace, groups = diffs.len(), "Configuration changed");

    diffs
        .into_iter()
        .filter_map(|group_diff| {
            let name = group_diff.group.as_str();
            match &group_diff.change {
                GroupChange::Added => {
                    info!(group = %name, "Group added");
                    desired_group(name, &new, &namespace, mode).map(Command::Provision)
                }
                GroupChange::Updated(keys) => {
                    info!(group = %name, keys = ?keys, "Group updated");
                    desired_group(name, &new, &namespace, mode).map(Command::Provision)
                }
                GroupChange::Removed => {
                    info!(group = %name, "Group removed");
                    removed_group(name, &old, &namespace).map(Command::Deprovision)
                }
            }
        })
        .collect()
}

/// Commands for a node change.
#[must_use]
pub fn node_commands(change: &ObjectChange<Node>) -> Vec<Command> {
    match change {
        ObjectChange::Added(node) => vec![Command::NodeAdded(ClusterNode::from_node(node))],
        ObjectChange::Deleted(node) => vec![Command::NodeRemoved(ClusterNode::from_node(node))],
        ObjectChange::Updated { old, new } => {
            let old = ClusterNode::from_node(old);
            let new = ClusterNode::from_node(new);
            if new.membership_changed(&old) {
                vec![Command::NodeUpdated { old, new }]
            } else {
                Vec::new()
            }
        }
    }
}

/// Commands for a service change, given the currently configured groups.
#[must_use]
pub fn service_commands(change: &ObjectChange<Service>, groups: &[ConfigGroup]) -> Vec<Command> {
    let service = match change {
        ObjectChange::Added(svc) => ServiceInfo::from_service(svc),
        ObjectChange::Updated { old, new } => {
            let old = ServiceInfo::from_service(old);
            let new = ServiceInfo::from_service(new);
            if old == new {
                return Vec::new();
            }
            new
        }
        ObjectChange::Deleted(svc) => {
            info!(
                service = %ServiceInfo::from_service(svc).key(),
                "Service deleted, leaving load balancer resources in place"
            );
            return Vec::new();
        }
    };

    groups
        .iter()
        .filter(|group| group.targets_service(&service.namespace, &service.name))
        .cloned()
        .map(Command::Provision)
        .collect()
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod plan_tests;
