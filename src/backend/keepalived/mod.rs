// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Local VIP daemon backend.
//!
//! Keeps the set of virtual addresses this host should announce and hands it
//! to keepalived. Every change to the set re-renders the configuration file
//! and reloads the daemon before the call returns.
//!
//! # State
//!
//! | Map | Meaning |
//! |-----|---------|
//! | `held` | Addresses currently written to the daemon configuration |
//! | `groups` | Address each provisioned group announces |
//!
//! Several groups may share an address through an explicit `bind-ip`; the
//! address is only dropped once no group refers to it.
//!
//! # Errors
//!
//! Adding a held address or deleting an unheld one is reported but harmless.
//! Failing to write the configuration or to run the reload command is fatal:
//! the in-memory set and the daemon have diverged.

pub mod daemon;
pub mod render;

use crate::config::ConfigGroup;
use crate::constants::KEEPALIVED_SYSCTLS;
use crate::errors::{BackendError, ConfigError, LocalDaemonError};
use crate::metrics;
use crate::vip::VirtualIpAllocator;
use daemon::DaemonControl;
use render::render_config;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Settings of the local keepalived daemon.
#[derive(Debug, Clone)]
pub struct KeepalivedConfig {
    /// Path of the rendered configuration file
    pub config_path: PathBuf,
    /// Interface carrying the virtual addresses
    pub interface: String,
    /// Command starting the daemon
    pub start_command: String,
    /// Command reloading the daemon
    pub reload_command: String,
}

#[derive(Debug, Default)]
struct VipState {
    held: BTreeSet<Ipv4Addr>,
    groups: BTreeMap<String, Ipv4Addr>,
    shutting_down: bool,
}

impl VipState {
    fn refuse_if_shutting_down(&self, vip: Ipv4Addr) -> Result<(), LocalDaemonError> {
        if self.shutting_down {
            return Err(LocalDaemonError::ShuttingDown {
                vip: vip.to_string(),
            });
        }
        Ok(())
    }

    fn in_use_by_other(&self, group: &str, vip: Ipv4Addr) -> bool {
        self.groups
            .iter()
            .any(|(name, address)| name != group && *address == vip)
    }
}

/// keepalived-driven backend.
pub struct KeepalivedBackend {
    config: KeepalivedConfig,
    control: Arc<dyn DaemonControl>,
    allocator: Option<Arc<VirtualIpAllocator>>,
    state: Mutex<VipState>,
}

impl KeepalivedBackend {
    /// Create a backend. Without an allocator every group needs a `bind-ip`.
    #[must_use]
    pub fn new(
        config: KeepalivedConfig,
        control: Arc<dyn DaemonControl>,
        allocator: Option<Arc<VirtualIpAllocator>>,
    ) -> Self {
        Self {
            config,
            control,
            allocator,
            state: Mutex::new(VipState::default()),
        }
    }

    /// Prepare the host and start the daemon with an empty address set.
    ///
    /// Kernel parameters are set on a best-effort basis.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial configuration cannot be written or the
    /// start command fails.
    pub async fn start(&self) -> Result<(), BackendError> {
        for key in KEEPALIVED_SYSCTLS {
            if let Err(e) = self.control.set_sysctl(key, "1").await {
                warn!(sysctl = %key, error = %e, "Failed to set kernel parameter");
            }
        }

        let state = self.state.lock().await;
        let contents = render_config(&self.config.interface, &state.held);
        self.control
            .write_config(&self.config.config_path, &contents)
            .await?;
        self.control.run(&self.config.start_command).await?;
        metrics::set_vips_held(state.held.len());

        info!(
            interface = %self.config.interface,
            config = %self.config.config_path.display(),
            "Started keepalived"
        );
        Ok(())
    }

    /// Currently held addresses, ascending.
    pub async fn held_vips(&self) -> Vec<Ipv4Addr> {
        self.state.lock().await.held.iter().copied().collect()
    }

    /// Announce an address.
    ///
    /// # Errors
    ///
    /// [`LocalDaemonError::VipAlreadyHeld`] when the address is already held,
    /// [`LocalDaemonError::ShuttingDown`] after [`Self::shutdown`];
    /// a fatal error when the daemon cannot be reconfigured.
    pub async fn add_vip(&self, vip: Ipv4Addr) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.refuse_if_shutting_down(vip)?;
        if !state.held.insert(vip) {
            return Err(LocalDaemonError::VipAlreadyHeld {
                vip: vip.to_string(),
            }
            .into());
        }
        info!(vip = %vip, "Adding VIP");
        self.apply(&state.held).await
    }

    /// Withdraw an address.
    ///
    /// # Errors
    ///
    /// [`LocalDaemonError::VipNotHeld`] when the address is not held; a fatal
    /// error when the daemon cannot be reconfigured.
    pub async fn delete_vip(&self, vip: Ipv4Addr) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        if !state.held.remove(&vip) {
            return Err(LocalDaemonError::VipNotHeld {
                vip: vip.to_string(),
            }
            .into());
        }
        state.groups.retain(|_, address| *address != vip);
        info!(vip = %vip, "Deleting VIP");
        self.apply(&state.held).await
    }

    /// Withdraw every address.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the daemon cannot be reconfigured.
    pub async fn delete_all_vips(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        info!(count = state.held.len(), "Deleting all VIPs");
        state.held.clear();
        state.groups.clear();
        self.apply(&state.held).await
    }

    /// Announce the group's address.
    ///
    /// The address is the group's `bind-ip` or one allocated for it. Provisioning
    /// a group again with the same address changes nothing; with a different
    /// address the old one is withdrawn in the same reload.
    ///
    /// # Errors
    ///
    /// Validation and allocation errors, [`LocalDaemonError::ShuttingDown`]
    /// after [`Self::shutdown`], or a fatal daemon error.
    pub async fn provision(&self, group: &ConfigGroup) -> Result<(), BackendError> {
        group.validate()?;
        if self.state.lock().await.shutting_down {
            return Err(LocalDaemonError::ShuttingDown {
                vip: group.bind_ip.map_or_else(|| "unallocated".to_string(), |ip| ip.to_string()),
            }
            .into());
        }

        let vip = match (group.bind_ip, &self.allocator) {
            (Some(ip), _) => ip,
            (None, Some(allocator)) => allocator.allocate(&group.name).await?.address,
            (None, None) => {
                return Err(ConfigError::MissingBindIp {
                    group: group.name.clone(),
                }
                .into())
            }
        };

        let mut state = self.state.lock().await;
        state.refuse_if_shutting_down(vip)?;
        let previous = state.groups.insert(group.name.clone(), vip);
        if previous == Some(vip) && state.held.contains(&vip) {
            debug!(group = %group.name, vip = %vip, "VIP already held");
            return Ok(());
        }

        if let Some(old) = previous.filter(|old| *old != vip) {
            if !state.in_use_by_other(&group.name, old) {
                state.held.remove(&old);
                info!(group = %group.name, old = %old, new = %vip, "Replacing VIP");
            }
        }

        if !state.held.insert(vip) && previous.is_none() {
            debug!(group = %group.name, vip = %vip, "VIP shared with another group");
            return Ok(());
        }

        info!(group = %group.name, vip = %vip, "Adding VIP");
        self.apply(&state.held).await
    }

    /// Withdraw the group's address and release its allocation.
    ///
    /// # Errors
    ///
    /// Allocation table errors, or a fatal daemon error.
    pub async fn deprovision(&self, group: &ConfigGroup) -> Result<(), BackendError> {
        {
            let mut state = self.state.lock().await;
            match state.groups.remove(&group.name) {
                Some(vip) if !state.in_use_by_other(&group.name, vip) => {
                    state.held.remove(&vip);
                    info!(group = %group.name, vip = %vip, "Deleting VIP");
                    self.apply(&state.held).await?;
                }
                Some(vip) => {
                    debug!(group = %group.name, vip = %vip, "VIP still used by another group");
                }
                None => {
                    debug!(group = %group.name, "Group holds no VIP");
                }
            }
        }

        if let Some(allocator) = &self.allocator {
            allocator.release(&group.name).await?;
        }
        Ok(())
    }

    /// Withdraw everything before the process exits.
    ///
    /// Later `provision` and `add_vip` calls are refused, so work still in
    /// flight cannot announce an address again.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the daemon cannot be reconfigured.
    pub async fn shutdown(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.shutting_down = true;
        info!(count = state.held.len(), "Withdrawing all VIPs for shutdown");
        state.held.clear();
        state.groups.clear();
        self.apply(&state.held).await
    }

    async fn apply(&self, held: &BTreeSet<Ipv4Addr>) -> Result<(), BackendError> {
        let contents = render_config(&self.config.interface, held);
        if let Err(e) = self
            .control
            .write_config(&self.config.config_path, &contents)
            .await
        {
            error!(error = %e, "Failed to write keepalived configuration");
            return Err(e.into());
        }
        if let Err(e) = self.control.run(&self.config.reload_command).await {
            error!(error = %e, "Failed to reload keepalived");
            return Err(e.into());
        }
        metrics::set_vips_held(held.len());
        Ok(())
    }
}
