// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command line and environment configuration.
//!
//! Every flag can also be set through the environment variable named in its
//! help text. Cross-field requirements are checked by [`Cli::validate`].

use crate::backend::appliance::client::ApplianceConfig;
use crate::backend::keepalived::KeepalivedConfig;
use crate::config::ParseMode;
use crate::constants::{
    DEFAULT_APPLIANCE_PARTITION, DEFAULT_KEEPALIVED_CONFIG_PATH, DEFAULT_KEEPALIVED_RELOAD_COMMAND,
    DEFAULT_KEEPALIVED_START_COMMAND, DEFAULT_METRICS_ADDR, DEFAULT_POD_NAMESPACE,
    DEFAULT_VIP_INTERFACE,
};
use crate::vip::IpRange;
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Which backend drives the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Remote load balancer appliance
    Appliance,
    /// Local keepalived daemon
    Keepalived,
}

/// Load balancer reconciliation controller for Kubernetes.
#[derive(Debug, Clone, Parser)]
#[command(name = "lbsync", version, about)]
pub struct Cli {
    /// Backend to drive
    #[arg(long, env = "LBSYNC_BACKEND", value_enum, default_value = "appliance")]
    pub backend: BackendKind,

    /// Namespace watched for configuration ConfigMaps (empty for all)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    pub watch_namespace: String,

    /// Namespace holding the allocation table
    #[arg(long, env = "POD_NAMESPACE", default_value = DEFAULT_POD_NAMESPACE)]
    pub pod_namespace: String,

    /// First address of the Virtual IP range
    #[arg(long, env = "VIP_RANGE_START")]
    pub vip_range_start: Option<String>,

    /// Last address of the Virtual IP range
    #[arg(long, env = "VIP_RANGE_END")]
    pub vip_range_end: Option<String>,

    /// Appliance management URL or host
    #[arg(long, env = "F5_HOST")]
    pub appliance_url: Option<String>,

    /// Appliance API user
    #[arg(long, env = "F5_USER", default_value = "")]
    pub appliance_user: String,

    /// Appliance API password
    #[arg(long, env = "F5_PASSWORD", default_value = "", hide_env_values = true)]
    pub appliance_password: String,

    /// Appliance administrative partition
    #[arg(long, env = "F5_PARTITION", default_value = DEFAULT_APPLIANCE_PARTITION)]
    pub appliance_partition: String,

    /// Accept self-signed appliance certificates
    #[arg(long, env = "F5_INSECURE")]
    pub appliance_insecure: bool,

    /// Interface carrying the virtual addresses
    #[arg(long, env = "VIP_INTERFACE", default_value = DEFAULT_VIP_INTERFACE)]
    pub interface: String,

    /// keepalived configuration file
    #[arg(long, env = "KEEPALIVED_CONFIG", default_value = DEFAULT_KEEPALIVED_CONFIG_PATH)]
    pub keepalived_config: PathBuf,

    /// Command starting keepalived
    #[arg(long, env = "KEEPALIVED_START_COMMAND", default_value = DEFAULT_KEEPALIVED_START_COMMAND)]
    pub keepalived_start_command: String,

    /// Command reloading keepalived
    #[arg(long, env = "KEEPALIVED_RELOAD_COMMAND", default_value = DEFAULT_KEEPALIVED_RELOAD_COMMAND)]
    pub keepalived_reload_command: String,

    /// Reject groups with malformed numeric or boolean fields
    #[arg(long, env = "STRICT_CONFIG")]
    pub strict_config: bool,

    /// Listen address of the metrics endpoint
    #[arg(long, env = "METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: SocketAddr,
}

impl Cli {
    /// Check requirements spanning several flags.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first unmet requirement.
    pub fn validate(&self) -> Result<()> {
        let range = self.vip_range()?;
        match self.backend {
            BackendKind::Appliance => {
                if self.appliance_url.as_deref().unwrap_or_default().is_empty() {
                    bail!("the appliance backend needs --appliance-url (F5_HOST)");
                }
                if range.is_none() {
                    bail!("the appliance backend needs --vip-range-start and --vip-range-end");
                }
            }
            BackendKind::Keepalived => {
                if self.interface.is_empty() {
                    bail!("the keepalived backend needs --interface");
                }
            }
        }
        Ok(())
    }

    /// The Virtual IP range, if configured.
    ///
    /// # Errors
    ///
    /// Returns an error when only one end is given or the range is invalid.
    pub fn vip_range(&self) -> Result<Option<IpRange>> {
        match (&self.vip_range_start, &self.vip_range_end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => IpRange::parse(start, end)
                .map(Some)
                .context("invalid Virtual IP range"),
            _ => bail!("--vip-range-start and --vip-range-end must be given together"),
        }
    }

    /// How configuration fields are parsed.
    #[must_use]
    pub fn parse_mode(&self) -> ParseMode {
        if self.strict_config {
            ParseMode::Strict
        } else {
            ParseMode::Lenient
        }
    }

    /// Watched namespace, `None` for all namespaces.
    #[must_use]
    pub fn watch_namespace(&self) -> Option<String> {
        (!self.watch_namespace.is_empty()).then(|| self.watch_namespace.clone())
    }

    /// Appliance connection settings. A bare host gets an `https://` scheme.
    ///
    /// # Errors
    ///
    /// Returns an error when no appliance URL is configured.
    pub fn appliance_config(&self) -> Result<ApplianceConfig> {
        let url = self
            .appliance_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .context("no appliance URL configured")?;
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };
        Ok(ApplianceConfig {
            url,
            user: self.appliance_user.clone(),
            password: self.appliance_password.clone(),
            partition: self.appliance_partition.clone(),
            insecure: self.appliance_insecure,
        })
    }

    /// keepalived settings.
    #[must_use]
    pub fn keepalived_config(&self) -> KeepalivedConfig {
        KeepalivedConfig {
            config_path: self.keepalived_config.clone(),
            interface: self.interface.clone(),
            start_command: self.keepalived_start_command.clone(),
            reload_command: self.keepalived_reload_command.clone(),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod cli_tests;
