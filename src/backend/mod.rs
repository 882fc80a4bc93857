// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Load balancer backends.
//!
//! Exactly one backend is active per process, selected at startup:
//!
//! - [`appliance`] - Monitors, pools and virtual servers on a remote appliance
//! - [`keepalived`] - Virtual addresses announced by a local keepalived daemon

pub mod appliance;
pub mod keepalived;

use crate::config::ConfigGroup;
use crate::errors::BackendError;
use crate::node::ClusterNode;
use appliance::ApplianceBackend;
use keepalived::KeepalivedBackend;

/// The active backend.
pub enum Backend {
    /// Remote appliance
    Appliance(ApplianceBackend),
    /// Local keepalived daemon
    Keepalived(KeepalivedBackend),
}

impl Backend {
    /// Backend name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Appliance(_) => "appliance",
            Self::Keepalived(_) => "keepalived",
        }
    }

    /// Create or update everything a group needs.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`].
    pub async fn provision(&self, group: &ConfigGroup) -> Result<(), BackendError> {
        match self {
            Self::Appliance(backend) => backend.provision(group).await,
            Self::Keepalived(backend) => backend.provision(group).await,
        }
    }

    /// Remove everything a group owns.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`].
    pub async fn deprovision(&self, group: &ConfigGroup) -> Result<(), BackendError> {
        match self {
            Self::Appliance(backend) => backend.deprovision(group).await,
            Self::Keepalived(backend) => backend.deprovision(group).await,
        }
    }

    /// A node appeared.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`].
    pub async fn on_node_added(&self, node: &ClusterNode) -> Result<(), BackendError> {
        match self {
            Self::Appliance(backend) => backend.on_node_added(node).await,
            Self::Keepalived(_) => Ok(()),
        }
    }

    /// A node disappeared.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`].
    pub async fn on_node_removed(&self, node: &ClusterNode) -> Result<(), BackendError> {
        match self {
            Self::Appliance(backend) => backend.on_node_removed(node).await,
            Self::Keepalived(_) => Ok(()),
        }
    }

    /// A node's readiness or address changed.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`].
    pub async fn on_node_updated(
        &self,
        old: &ClusterNode,
        new: &ClusterNode,
    ) -> Result<(), BackendError> {
        match self {
            Self::Appliance(backend) => backend.on_node_updated(old, new).await,
            Self::Keepalived(_) => Ok(()),
        }
    }

    /// Release process-held resources before exit.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`BackendError`].
    pub async fn shutdown(&self) -> Result<(), BackendError> {
        match self {
            Self::Appliance(_) => Ok(()),
            Self::Keepalived(backend) => backend.shutdown().await,
        }
    }
}
