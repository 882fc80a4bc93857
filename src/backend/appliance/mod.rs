// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Remote load balancer appliance backend.
//!
//! For every service port a group load balances, the backend owns three
//! appliance objects named after the group:
//!
//! ```text
//! <group>[-<port>]-monitor       TCP health monitor
//! <group>[-<port>]-pool          pool bound to the monitor, one member per ready node
//! <group>[-<port>]-virtualserver <vip>:<port> forwarding to the pool
//! ```
//!
//! ## Provisioning
//!
//! Provisioning is idempotent and runs as a compensating transaction: every
//! object created by the current call is recorded, and on failure the records
//! are undone in reverse order before the original error is returned.
//! Pre-existing objects are never removed by compensation.
//!
//! Once everything is in place, objects of the group for ports it no longer
//! selects are deleted. A group is refused when one of its object names is
//! already used by another configured group (`web` with port `api` and an
//! unqualified group `web-api` both map to `web-api-pool`).
//!
//! ## Deprovisioning
//!
//! Best effort: virtual server, pool, then monitor for every port the service
//! selects and every port found on the appliance under the group's names,
//! then the group's virtual IP is released. Missing objects are skipped and failures
//! do not stop the remaining deletions.
//!
//! ## Nodes
//!
//! Pool members reference appliance node objects named after Kubernetes nodes.
//! Node events add or remove the node's `<node>:<node-port>` member in every
//! pool of every configured group.

pub mod client;
pub mod memory;
pub mod naming;

use crate::cluster::{select_target_ports, ClusterView, TargetPort};
use crate::config::ConfigGroup;
use crate::constants::{
    MONITOR_INTERVAL_SECS, MONITOR_TIMEOUT_SECS, SNAT_AUTOMAP, VIRTUAL_SERVER_MASK,
};
use crate::errors::{ApplianceError, BackendError, ConfigError};
use crate::metrics;
use crate::node::ClusterNode;
use crate::vip::VirtualIpAllocator;
use client::{ApplianceApi, ApplianceNode, Monitor, Pool, SourceAddressTranslation, VirtualServer};
use naming::{normalize_destination, parse_qualifier, resource_name, ResourceKind};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Metric label for pool members
const KIND_MEMBER: &str = "member";

/// Metric label for appliance nodes
const KIND_NODE: &str = "node";

/// Something provisioning created and compensation must undo.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Created {
    Monitor(String),
    Pool(String),
    VirtualIp,
    VirtualServer(String),
}

/// Appliance-driven backend.
pub struct ApplianceBackend {
    api: Arc<dyn ApplianceApi>,
    allocator: Arc<VirtualIpAllocator>,
    cluster: Arc<dyn ClusterView>,
}

impl ApplianceBackend {
    /// Create a backend.
    #[must_use]
    pub fn new(
        api: Arc<dyn ApplianceApi>,
        allocator: Arc<VirtualIpAllocator>,
        cluster: Arc<dyn ClusterView>,
    ) -> Self {
        Self {
            api,
            allocator,
            cluster,
        }
    }

    /// Bring the appliance in line with a group.
    ///
    /// # Errors
    ///
    /// Validation errors, including [`ConfigError::NameConflict`], are returned
    /// as is. Failures after the first appliance write are returned as
    /// [`BackendError::ProvisionFailed`], carrying any errors raised while
    /// compensating. [`BackendError::Incomplete`] reports objects of unselected
    /// ports that could not be deleted.
    pub async fn provision(&self, group: &ConfigGroup) -> Result<(), BackendError> {
        group.validate()?;
        if group.target_service_name.is_empty() {
            return Err(ConfigError::MissingTargetService {
                group: group.name.clone(),
            }
            .into());
        }

        let service = self
            .cluster
            .service(&group.namespace, &group.target_service_name)
            .ok_or_else(|| BackendError::ServiceNotFound {
                namespace: group.namespace.clone(),
                name: group.target_service_name.clone(),
            })?;
        let ports = select_target_ports(group, &service)?;
        let claimed = self.claimed_names(&group.name);
        for port in &ports {
            let name = resource_name(&group.name, port.qualifier.as_deref(), ResourceKind::Pool);
            if let Some(other) = claimed.get(&name) {
                return Err(ConfigError::NameConflict {
                    group: group.name.clone(),
                    other: other.clone(),
                    name,
                }
                .into());
            }
        }
        let nodes = self.cluster.ready_nodes();

        info!(
            group = %group.name,
            service = %service.key(),
            ports = ports.len(),
            nodes = nodes.len(),
            "Provisioning group"
        );

        let mut created = Vec::new();
        match self.apply(group, &ports, &nodes, &mut created).await {
            Ok(()) => {
                info!(group = %group.name, "Provisioned group");
                let errors = self.remove_stale(group, &ports, &claimed).await;
                incomplete("provision-cleanup", &group.name, errors)
            }
            Err(source) => {
                error!(group = %group.name, error = %source, "Provisioning failed, compensating");
                let compensation_errors = self.compensate(group, created).await;
                Err(BackendError::ProvisionFailed {
                    group: group.name.clone(),
                    source: Box::new(source),
                    compensation_errors,
                })
            }
        }
    }

    async fn apply(
        &self,
        group: &ConfigGroup,
        ports: &[TargetPort],
        nodes: &[ClusterNode],
        created: &mut Vec<Created>,
    ) -> Result<(), BackendError> {
        let mut vip: Option<Ipv4Addr> = None;

        for port in ports {
            let qualifier = port.qualifier.as_deref();
            let monitor_name = resource_name(&group.name, qualifier, ResourceKind::Monitor);
            let pool_name = resource_name(&group.name, qualifier, ResourceKind::Pool);
            let server_name = resource_name(&group.name, qualifier, ResourceKind::VirtualServer);

            if self.ensure_monitor(&monitor_name).await? {
                created.push(Created::Monitor(monitor_name.clone()));
            }
            if self.ensure_pool(&pool_name, &monitor_name).await? {
                created.push(Created::Pool(pool_name.clone()));
            }

            for node in nodes {
                let address = match node.host_address() {
                    Ok(address) => address,
                    Err(e) => {
                        warn!(node = %node.name, error = %e, "Skipping node without usable address");
                        continue;
                    }
                };
                self.ensure_node(&node.name, address).await?;
                self.add_member(&pool_name, &node.member_name(port.node_port))
                    .await;
            }

            let address = match vip {
                Some(address) => address,
                None => {
                    let address = self.virtual_ip(group, created).await?;
                    vip = Some(address);
                    address
                }
            };

            let listen_port = if ports.len() == 1 {
                group.bind_port
            } else {
                port.port
            };
            let destination = format!("{address}:{listen_port}");
            if self
                .ensure_virtual_server(&server_name, &pool_name, &destination)
                .await?
            {
                created.push(Created::VirtualServer(server_name));
            }
        }
        Ok(())
    }

    async fn virtual_ip(
        &self,
        group: &ConfigGroup,
        created: &mut Vec<Created>,
    ) -> Result<Ipv4Addr, BackendError> {
        if let Some(address) = group.bind_ip {
            return Ok(address);
        }
        let allocation = self.allocator.allocate(&group.name).await?;
        if allocation.newly_allocated {
            created.push(Created::VirtualIp);
        }
        Ok(allocation.address)
    }

    /// Returns true if the monitor was created by this call.
    async fn ensure_monitor(&self, name: &str) -> Result<bool, BackendError> {
        if self.api.get_monitor(name).await?.is_some() {
            debug!(monitor = %name, "Monitor already exists");
            return Ok(false);
        }
        let monitor = Monitor {
            name: name.to_string(),
            interval: MONITOR_INTERVAL_SECS,
            timeout: MONITOR_TIMEOUT_SECS,
        };
        match self.api.create_monitor(&monitor).await {
            Ok(()) => {
                info!(monitor = %name, "Created monitor");
                metrics::record_resource_created(ResourceKind::Monitor.as_str());
                Ok(true)
            }
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns true if the pool was created by this call.
    async fn ensure_pool(&self, name: &str, monitor: &str) -> Result<bool, BackendError> {
        if self.api.get_pool(name).await?.is_some() {
            debug!(pool = %name, "Pool already exists");
            return Ok(false);
        }
        let pool = Pool {
            name: name.to_string(),
            monitor: monitor.to_string(),
            allow_nat: "yes".to_string(),
            allow_snat: "yes".to_string(),
        };
        match self.api.create_pool(&pool).await {
            Ok(()) => {
                info!(pool = %name, monitor = %monitor, "Created pool");
                metrics::record_resource_created(ResourceKind::Pool.as_str());
                Ok(true)
            }
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the appliance node, or correct its address.
    async fn ensure_node(&self, name: &str, address: &str) -> Result<(), ApplianceError> {
        let desired = ApplianceNode {
            name: name.to_string(),
            address: address.to_string(),
        };
        match self.api.get_node(name).await? {
            None => match self.api.create_node(&desired).await {
                Ok(()) => {
                    info!(node = %name, address = %address, "Created appliance node");
                    metrics::record_resource_created(KIND_NODE);
                    Ok(())
                }
                Err(e) if e.is_already_exists() => Ok(()),
                Err(e) => Err(e),
            },
            Some(existing) if existing.address != address => {
                self.api.modify_node(&desired).await?;
                info!(
                    node = %name,
                    old = %existing.address,
                    new = %address,
                    "Updated appliance node address"
                );
                metrics::record_resource_updated(KIND_NODE);
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// Add a pool member.
    ///
    /// The appliance reports failure for some successful insertions, so
    /// failures are logged and never abort the caller.
    async fn add_member(&self, pool: &str, member: &str) {
        match self.api.add_pool_member(pool, member).await {
            Ok(()) => {
                debug!(pool = %pool, member = %member, "Added pool member");
                metrics::record_resource_created(KIND_MEMBER);
            }
            Err(e) if e.is_already_exists() => {
                debug!(pool = %pool, member = %member, "Pool member already exists");
            }
            Err(e) => {
                warn!(pool = %pool, member = %member, error = %e, "Adding pool member reported failure");
            }
        }
    }

    /// Returns true if the virtual server was created by this call.
    async fn ensure_virtual_server(
        &self,
        name: &str,
        pool: &str,
        destination: &str,
    ) -> Result<bool, BackendError> {
        match self.api.get_virtual_server(name).await? {
            Some(existing) if normalize_destination(&existing.destination) == destination => {
                debug!(virtual_server = %name, destination = %destination, "Virtual server up to date");
                Ok(false)
            }
            Some(mut existing) => {
                info!(
                    virtual_server = %name,
                    old = %existing.destination,
                    new = %destination,
                    "Updating virtual server destination"
                );
                existing.destination = destination.to_string();
                self.api.modify_virtual_server(&existing).await?;
                metrics::record_resource_updated(ResourceKind::VirtualServer.as_str());
                Ok(false)
            }
            None => {
                let server = VirtualServer {
                    name: name.to_string(),
                    destination: destination.to_string(),
                    mask: VIRTUAL_SERVER_MASK.to_string(),
                    pool: pool.to_string(),
                    source_address_translation: SourceAddressTranslation {
                        kind: SNAT_AUTOMAP.to_string(),
                    },
                };
                match self.api.create_virtual_server(&server).await {
                    Ok(()) => {
                        info!(virtual_server = %name, destination = %destination, "Created virtual server");
                        metrics::record_resource_created(ResourceKind::VirtualServer.as_str());
                        Ok(true)
                    }
                    Err(e) if e.is_already_exists() => Ok(false),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Undo `created` in reverse order, returning the failures.
    async fn compensate(&self, group: &ConfigGroup, created: Vec<Created>) -> Vec<String> {
        let mut errors = Vec::new();
        for item in created.into_iter().rev() {
            let result = match &item {
                Created::VirtualServer(name) => self
                    .delete_object(ResourceKind::VirtualServer, name)
                    .await
                    .map_err(|e| e.to_string()),
                Created::VirtualIp => self
                    .allocator
                    .release(&group.name)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Created::Pool(name) => self
                    .delete_object(ResourceKind::Pool, name)
                    .await
                    .map_err(|e| e.to_string()),
                Created::Monitor(name) => self
                    .delete_object(ResourceKind::Monitor, name)
                    .await
                    .map_err(|e| e.to_string()),
            };
            match result {
                Ok(()) => debug!(group = %group.name, undone = ?item, "Compensated"),
                Err(e) => {
                    warn!(group = %group.name, undone = ?item, error = %e, "Compensation failed");
                    errors.push(e);
                }
            }
        }
        errors
    }

    /// Delete one object; a missing object counts as deleted.
    async fn delete_object(&self, kind: ResourceKind, name: &str) -> Result<(), ApplianceError> {
        let result = match kind {
            ResourceKind::VirtualServer => self.api.delete_virtual_server(name).await,
            ResourceKind::Pool => self.api.delete_pool(name).await,
            ResourceKind::Monitor => self.api.delete_monitor(name).await,
        };
        match result {
            Ok(()) => {
                info!(kind = %kind, name = %name, "Deleted appliance object");
                metrics::record_resource_deleted(kind.as_str());
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(kind = %kind, name = %name, "Appliance object already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Remove everything a group owns and release its virtual IP.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Incomplete`] listing every step that failed;
    /// all steps are attempted regardless.
    pub async fn deprovision(&self, group: &ConfigGroup) -> Result<(), BackendError> {
        let mut errors = Vec::new();
        let mut qualifiers: BTreeSet<Option<String>> = self
            .cluster
            .service(&group.namespace, &group.target_service_name)
            .map(|service| service.qualifiers().into_iter().collect())
            .unwrap_or_default();
        match self.discover_qualifiers(&group.name).await {
            Ok(discovered) => qualifiers.extend(discovered),
            Err(e) => errors.push(e.to_string()),
        }
        let claimed = self.claimed_names(&group.name);
        qualifiers.retain(|qualifier| {
            let name = resource_name(&group.name, qualifier.as_deref(), ResourceKind::Pool);
            match claimed.get(&name) {
                Some(other) => {
                    warn!(group = %group.name, other = %other, name = %name, "Leaving objects used by another group");
                    false
                }
                None => true,
            }
        });

        info!(group = %group.name, ports = qualifiers.len(), "Deprovisioning group");

        for qualifier in &qualifiers {
            errors.extend(self.delete_port_objects(&group.name, qualifier.as_deref()).await);
        }

        match self.allocator.release(&group.name).await {
            Ok(Some(address)) => info!(group = %group.name, vip = %address, "Released virtual IP"),
            Ok(None) => {}
            Err(e) => errors.push(e.to_string()),
        }

        incomplete("deprovision", &group.name, errors)
    }

    /// Delete the virtual server, pool and monitor of one port, returning the failures.
    async fn delete_port_objects(&self, group: &str, qualifier: Option<&str>) -> Vec<String> {
        let mut errors = Vec::new();
        for kind in ResourceKind::deletion_order() {
            let name = resource_name(group, qualifier, kind);
            if let Err(e) = self.delete_object(kind, &name).await {
                error!(group = %group, kind = %kind, name = %name, error = %e, "Failed to delete");
                errors.push(format!("{kind} {name}: {e}"));
            }
        }
        errors
    }

    /// Delete the group's objects for ports it no longer selects.
    async fn remove_stale(
        &self,
        group: &ConfigGroup,
        ports: &[TargetPort],
        claimed: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let discovered = match self.discover_qualifiers(&group.name).await {
            Ok(discovered) => discovered,
            Err(e) => {
                warn!(group = %group.name, error = %e, "Cannot list appliance objects, stale objects kept");
                return vec![e.to_string()];
            }
        };
        let selected: BTreeSet<Option<&str>> =
            ports.iter().map(|port| port.qualifier.as_deref()).collect();

        let mut errors = Vec::new();
        for qualifier in &discovered {
            if selected.contains(&qualifier.as_deref()) {
                continue;
            }
            let name = resource_name(&group.name, qualifier.as_deref(), ResourceKind::Pool);
            if claimed.contains_key(&name) {
                continue;
            }
            info!(group = %group.name, port = ?qualifier, "Removing objects of unselected port");
            errors.extend(self.delete_port_objects(&group.name, qualifier.as_deref()).await);
        }
        errors
    }

    /// Port qualifiers found on the appliance under the group's names.
    ///
    /// Names that belong to another configured group with a longer,
    /// overlapping name are left out.
    async fn discover_qualifiers(
        &self,
        group: &str,
    ) -> Result<BTreeSet<Option<String>>, ApplianceError> {
        let others: Vec<String> = self
            .cluster
            .groups()
            .into_iter()
            .map(|g| g.name)
            .filter(|name| name.len() > group.len() && name.starts_with(group))
            .collect();

        let mut qualifiers = BTreeSet::new();
        for kind in ResourceKind::deletion_order() {
            for name in self.api.list_names(kind).await? {
                if others
                    .iter()
                    .any(|other| parse_qualifier(other, kind, &name).is_some())
                {
                    continue;
                }
                if let Some(qualifier) = parse_qualifier(group, kind, &name) {
                    qualifiers.insert(qualifier);
                }
            }
        }
        Ok(qualifiers)
    }

    /// Pool names used by the other configured groups, mapped to their group.
    fn claimed_names(&self, group: &str) -> BTreeMap<String, String> {
        let mut ignored = Vec::new();
        self.group_ports(&mut ignored)
            .into_iter()
            .filter(|(other, _)| other.name != group)
            .flat_map(|(other, ports)| {
                ports.into_iter().map(move |port| {
                    (
                        resource_name(&other.name, port.qualifier.as_deref(), ResourceKind::Pool),
                        other.name.clone(),
                    )
                })
            })
            .collect()
    }

    /// Add a node to every configured group's pools.
    ///
    /// Not-ready nodes are ignored.
    ///
    /// # Errors
    ///
    /// [`BackendError::NodeAddress`] when the node has no usable address;
    /// [`BackendError::Incomplete`] when some groups could not be updated.
    pub async fn on_node_added(&self, node: &ClusterNode) -> Result<(), BackendError> {
        if !node.ready {
            debug!(node = %node.name, "Node not ready, not adding");
            return Ok(());
        }
        let address = node.host_address()?;
        self.ensure_node(&node.name, address).await?;

        let mut errors = Vec::new();
        for (group, ports) in self.group_ports(&mut errors) {
            for port in ports {
                let pool = resource_name(&group.name, port.qualifier.as_deref(), ResourceKind::Pool);
                self.add_member(&pool, &node.member_name(port.node_port))
                    .await;
            }
        }
        info!(node = %node.name, address = %address, "Added node to pools");
        incomplete("node-add", &node.name, errors)
    }

    /// Remove a node from every configured group's pools.
    ///
    /// # Errors
    ///
    /// [`BackendError::Incomplete`] when some members could not be removed.
    pub async fn on_node_removed(&self, node: &ClusterNode) -> Result<(), BackendError> {
        let mut errors = Vec::new();
        for (group, ports) in self.group_ports(&mut errors) {
            for port in ports {
                let pool = resource_name(&group.name, port.qualifier.as_deref(), ResourceKind::Pool);
                let member = node.member_name(port.node_port);
                match self.api.delete_pool_member(&pool, &member).await {
                    Ok(()) => {
                        debug!(pool = %pool, member = %member, "Removed pool member");
                        metrics::record_resource_deleted(KIND_MEMBER);
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        error!(pool = %pool, member = %member, error = %e, "Failed to remove pool member");
                        errors.push(format!("{pool} {member}: {e}"));
                    }
                }
            }
        }
        info!(node = %node.name, "Removed node from pools");
        incomplete("node-remove", &node.name, errors)
    }

    /// React to a node's readiness or address change.
    ///
    /// # Errors
    ///
    /// Same as [`Self::on_node_added`] and [`Self::on_node_removed`].
    pub async fn on_node_updated(
        &self,
        old: &ClusterNode,
        new: &ClusterNode,
    ) -> Result<(), BackendError> {
        match (old.ready, new.ready) {
            (true, false) => self.on_node_removed(new).await,
            (false, true) => self.on_node_added(new).await,
            (true, true) => {
                let address = new.host_address()?;
                self.ensure_node(&new.name, address).await?;
                Ok(())
            }
            (false, false) => Ok(()),
        }
    }

    /// Target ports of every configured group whose service is known.
    fn group_ports(&self, errors: &mut Vec<String>) -> Vec<(ConfigGroup, Vec<TargetPort>)> {
        let mut result = Vec::new();
        for group in self.cluster.groups() {
            let Some(service) = self
                .cluster
                .service(&group.namespace, &group.target_service_name)
            else {
                debug!(group = %group.name, "Service not found, skipping group");
                continue;
            };
            match select_target_ports(&group, &service) {
                Ok(ports) => result.push((group, ports)),
                Err(e) => {
                    warn!(group = %group.name, error = %e, "Skipping group");
                    errors.push(format!("{}: {e}", group.name));
                }
            }
        }
        result
    }
}

fn incomplete(operation: &str, target: &str, errors: Vec<String>) -> Result<(), BackendError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(BackendError::Incomplete {
            operation: operation.to_string(),
            target: target.to_string(),
            errors,
        })
    }
}
