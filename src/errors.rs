// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for configuration parsing, address allocation and backend operations.
//!
//! This module provides specialized error types for:
//! - Configuration groups that fail validation
//! - Nodes without a usable address
//! - Virtual IP allocation failures (range exhaustion, table conflicts)
//! - Load balancer appliance API calls
//! - The local keepalived daemon
//!
//! [`BackendError`] is the composite type every backend operation returns. Its
//! [`BackendError::is_fatal`] method separates the local misconfiguration class,
//! which must stop the process, from everything else, which is logged and
//! abandoned for the current event.

use thiserror::Error;

/// Errors raised while turning a configuration snapshot into a [`crate::config::ConfigGroup`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The group does not declare a bind port and cannot be provisioned.
    #[error("Group '{group}' has no bind-port and cannot be provisioned")]
    MissingBindPort {
        /// Group name
        group: String,
    },

    /// The group does not name a target service.
    #[error("Group '{group}' has no target-service-name")]
    MissingTargetService {
        /// Group name
        group: String,
    },

    /// The group has no bind-ip and no virtual IP range is configured.
    #[error("Group '{group}' has no bind-ip and no Virtual IP range is configured")]
    MissingBindIp {
        /// Group name
        group: String,
    },

    /// A numeric or boolean field could not be parsed (strict mode only).
    #[error("Group '{group}' field '{field}' has malformed value '{value}'")]
    MalformedField {
        /// Group name
        group: String,
        /// Field name without the group prefix
        field: String,
        /// Raw value found in the snapshot
        value: String,
    },

    /// The group's appliance object names are already used by another group.
    #[error("Group '{group}' object name '{name}' is already used by group '{other}'")]
    NameConflict {
        /// Group name
        group: String,
        /// Group already using the name
        other: String,
        /// Conflicting object name
        name: String,
    },

    /// The bind-ip field is present but is not an IPv4 address.
    #[error("Group '{group}' has invalid bind-ip '{value}'")]
    InvalidBindIp {
        /// Group name
        group: String,
        /// Raw value found in the snapshot
        value: String,
    },
}

/// Errors raised when no address can be selected for a cluster node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeAddressError {
    /// None of the node's addresses belongs to a recognized class.
    #[error("Host IP unknown for node '{node}'; known addresses: {known:?}")]
    NoUsableAddress {
        /// Node name
        node: String,
        /// The `type=address` pairs reported by the node
        known: Vec<String>,
    },
}

/// Errors raised by the virtual IP allocator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
    /// Every address of the configured range is taken.
    #[error("Exhausted given Virtual IP range {start}-{end}")]
    RangeExhausted {
        /// First address of the range
        start: String,
        /// Last address of the range
        end: String,
    },

    /// The configured range cannot be used.
    #[error("Invalid Virtual IP range {start}-{end}: {reason}")]
    InvalidRange {
        /// Configured start address
        start: String,
        /// Configured end address
        end: String,
        /// Why the range was rejected
        reason: String,
    },

    /// The allocation table changed between read and write.
    #[error("Allocation table '{table}' was modified concurrently")]
    Conflict {
        /// Name of the allocation table
        table: String,
    },

    /// Concurrent modifications kept winning the compare-and-swap race.
    #[error("Gave up updating allocation table '{table}' after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        /// Name of the allocation table
        table: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// The persisted table could not be read or written.
    #[error("Allocation table '{table}' unavailable: {reason}")]
    Store {
        /// Name of the allocation table
        table: String,
        /// Underlying failure
        reason: String,
    },
}

/// Errors returned by the load balancer appliance API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplianceError {
    /// The addressed object does not exist (HTTP 404).
    #[error("{kind} '{name}' not found on appliance")]
    NotFound {
        /// Object kind (monitor, pool, ...)
        kind: String,
        /// Object name
        name: String,
    },

    /// The object being created already exists (HTTP 409).
    #[error("{kind} '{name}' already exists on appliance")]
    AlreadyExists {
        /// Object kind (monitor, pool, ...)
        kind: String,
        /// Object name
        name: String,
    },

    /// The appliance rejected the credentials (HTTP 401/403).
    #[error("Appliance rejected credentials (HTTP {status})")]
    Unauthorized {
        /// HTTP status code
        status: u16,
    },

    /// Any other non-success HTTP response.
    #[error("Appliance request {method} {path} failed with HTTP {status}: {message}")]
    Http {
        /// HTTP method
        method: String,
        /// Request path
        path: String,
        /// HTTP status code
        status: u16,
        /// Response body or error message
        message: String,
    },

    /// The request never produced a response.
    #[error("Connection to appliance failed: {reason}")]
    Connection {
        /// Transport failure
        reason: String,
    },

    /// The response body could not be decoded.
    #[error("Could not decode appliance response for {path}: {reason}")]
    Decode {
        /// Request path
        path: String,
        /// Decoder message
        reason: String,
    },
}

impl ApplianceError {
    /// Returns true if the error means the addressed object is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error means the object being created already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

/// Errors raised by the local keepalived integration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalDaemonError {
    /// The VIP is already part of the held set.
    #[error("VIP {vip} has already been added")]
    VipAlreadyHeld {
        /// Virtual address
        vip: String,
    },

    /// The VIP is not part of the held set.
    #[error("VIP {vip} had not been added")]
    VipNotHeld {
        /// Virtual address
        vip: String,
    },

    /// The backend is shutting down and no longer announces addresses.
    #[error("VIP {vip} refused: keepalived backend is shutting down")]
    ShuttingDown {
        /// Virtual address
        vip: String,
    },

    /// The daemon configuration file could not be written.
    #[error("Failed to write keepalived configuration {path}: {reason}")]
    ConfigWrite {
        /// Configuration file path
        path: String,
        /// I/O failure
        reason: String,
    },

    /// The daemon control command failed.
    #[error("Command '{command}' failed: {reason}")]
    CommandFailed {
        /// Shell command
        command: String,
        /// Exit status and captured stderr
        reason: String,
    },
}

/// Composite error type returned by every backend operation.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Group configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Node has no selectable address
    #[error(transparent)]
    NodeAddress(#[from] NodeAddressError),

    /// Virtual IP allocation failure
    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    /// Appliance API failure
    #[error(transparent)]
    Appliance(#[from] ApplianceError),

    /// Local daemon failure
    #[error(transparent)]
    LocalDaemon(#[from] LocalDaemonError),

    /// The group's backing service is not known to the cluster.
    #[error("Service {namespace}/{name} not found")]
    ServiceNotFound {
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
    },

    /// The backing service exposes no port the group can use.
    #[error("Could not find any port from service {namespace}/{name}")]
    NoServicePorts {
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
    },

    /// A selected service port has no node port.
    #[error("NodePort is needed for loadbalancer: service {service} port '{port}' has none")]
    MissingNodePort {
        /// Service `namespace/name`
        service: String,
        /// Port name or number
        port: String,
    },

    /// Provisioning failed and the resources created so far were compensated.
    #[error(
        "Provisioning group '{group}' failed: {source}{}",
        format_compensation_errors(.compensation_errors)
    )]
    ProvisionFailed {
        /// Group identity
        group: String,
        /// The error that aborted provisioning
        source: Box<BackendError>,
        /// Errors raised while undoing partially created resources
        compensation_errors: Vec<String>,
    },

    /// A best-effort operation finished but some steps failed.
    #[error("{operation} for '{target}' completed with {} error(s): {}", .errors.len(), .errors.join("; "))]
    Incomplete {
        /// Operation name (deprovision, node-sync, ...)
        operation: String,
        /// Group identity or node name
        target: String,
        /// Individual failures
        errors: Vec<String>,
    },
}

fn format_compensation_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(" (cleanup errors: {})", errors.join("; "))
    }
}

impl BackendError {
    /// Returns true if this error is a fatal local misconfiguration.
    ///
    /// Only keepalived configuration and command failures are fatal: there is
    /// no safe partial state to continue from once the daemon configuration
    /// and the in-memory VIP set have diverged.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::LocalDaemon(
                LocalDaemonError::ConfigWrite { .. } | LocalDaemonError::CommandFailed { .. },
            ) => true,
            Self::ProvisionFailed { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Returns the error class used in logs and metrics.
    #[must_use]
    pub fn error_class(&self) -> &'static str {
        match self {
            _ if self.is_fatal() => "fatal",
            Self::Config(_)
            | Self::NodeAddress(_)
            | Self::ServiceNotFound { .. }
            | Self::NoServicePorts { .. }
            | Self::MissingNodePort { .. }
            | Self::LocalDaemon(_) => "validation",
            Self::Allocator(AllocatorError::RangeExhausted { .. }) => "exhausted",
            Self::ProvisionFailed { source, .. } => source.error_class(),
            Self::Allocator(_) | Self::Appliance(_) | Self::Incomplete { .. } => "transient",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
