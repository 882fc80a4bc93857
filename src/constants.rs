// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the lbsync controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Configuration Group Field Keys
// ============================================================================

/// Separator between the group name and the field name in a configuration key
pub const GROUP_KEY_SEPARATOR: char = '.';

/// Hostname served by the group (informational)
pub const FIELD_HOST: &str = "host";

/// Namespace of the target service
pub const FIELD_NAMESPACE: &str = "namespace";

/// Pre-assigned bind address
pub const FIELD_BIND_IP: &str = "bind-ip";

/// Port the virtual server listens on
pub const FIELD_BIND_PORT: &str = "bind-port";

/// Name of the target service
pub const FIELD_TARGET_SERVICE_NAME: &str = "target-service-name";

/// Identifier of the target service (port name selector)
pub const FIELD_TARGET_SERVICE_ID: &str = "target-service-id";

/// Target port number on the service
pub const FIELD_TARGET_PORT: &str = "target-port";

/// TLS flag
pub const FIELD_SSL: &str = "SSL";

/// TLS listening port
pub const FIELD_SSL_PORT: &str = "ssl-port";

/// HTTP path
pub const FIELD_PATH: &str = "path";

// ============================================================================
// Backend Resource Kinds
// ============================================================================

/// Resource kind suffix for health monitors
pub const KIND_MONITOR: &str = "monitor";

/// Resource kind suffix for pools
pub const KIND_POOL: &str = "pool";

/// Resource kind suffix for virtual servers
pub const KIND_VIRTUAL_SERVER: &str = "virtualserver";

/// Separator used when joining resource name parts
pub const RESOURCE_NAME_SEPARATOR: &str = "-";

// ============================================================================
// Appliance Defaults
// ============================================================================

/// Protocol of the health monitors created on the appliance
pub const MONITOR_PROTOCOL: &str = "tcp";

/// Health monitor probe interval in seconds
pub const MONITOR_INTERVAL_SECS: u32 = 5;

/// Health monitor timeout in seconds
pub const MONITOR_TIMEOUT_SECS: u32 = 16;

/// Host mask applied to every virtual server destination
pub const VIRTUAL_SERVER_MASK: &str = "255.255.255.255";

/// Source address translation mode for virtual servers
pub const SNAT_AUTOMAP: &str = "automap";

/// Default administrative partition on the appliance
pub const DEFAULT_APPLIANCE_PARTITION: &str = "Common";

/// Timeout for a single appliance API request in seconds
pub const APPLIANCE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Base path of the appliance local traffic management API
pub const APPLIANCE_LTM_PATH: &str = "/mgmt/tm/ltm";

// ============================================================================
// Virtual IP Allocation Constants
// ============================================================================

/// Name of the ConfigMap holding the virtual IP allocation table
pub const IP_ALLOCATION_CONFIGMAP_NAME: &str = "ip-manager-configmap";

/// Maximum number of compare-and-swap attempts per allocation table mutation
pub const ALLOCATION_MAX_ATTEMPTS: u32 = 8;

// ============================================================================
// Keepalived Constants
// ============================================================================

/// Default path of the keepalived configuration file
pub const DEFAULT_KEEPALIVED_CONFIG_PATH: &str = "/etc/keepalived/keepalived.conf";

/// Default command used to start keepalived
pub const DEFAULT_KEEPALIVED_START_COMMAND: &str = "service keepalived start";

/// Default command used to reload keepalived
pub const DEFAULT_KEEPALIVED_RELOAD_COMMAND: &str = "service keepalived reload";

/// Default network interface carrying the virtual addresses
pub const DEFAULT_VIP_INTERFACE: &str = "eth0";

/// VRRP router id used in the rendered keepalived configuration
pub const KEEPALIVED_VIRTUAL_ROUTER_ID: u8 = 50;

/// iptables chain keepalived manages for the virtual addresses
pub const KEEPALIVED_IPTABLES_CHAIN: &str = "LOADBALANCER-DAEMON";

/// Kernel settings required by keepalived, relative to `/proc/sys`
pub const KEEPALIVED_SYSCTLS: &[&str] = &["net/ipv4/ip_nonlocal_bind", "net/ipv4/vs/conntrack"];

// ============================================================================
// Controller Constants
// ============================================================================

/// Idle time after which a per-key worker task exits
pub const WORKER_IDLE_TIMEOUT_SECS: u64 = 300;

/// Time workers get to finish in-flight commands on shutdown
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// Default listen address of the metrics endpoint
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Namespace used when the pod namespace is not provided
pub const DEFAULT_POD_NAMESPACE: &str = "default";
