// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory [`ApplianceApi`] used by tests and dry runs.
//!
//! Behaves like the real appliance for existence checks (404/409 semantics)
//! and records every mutating call so tests can assert on ordering. Failures
//! can be injected per operation and object name.

use super::client::{ApplianceApi, ApplianceNode, Monitor, Pool, VirtualServer};
use super::naming::ResourceKind;
use crate::errors::ApplianceError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    monitors: BTreeMap<String, Monitor>,
    pools: BTreeMap<String, Pool>,
    members: BTreeMap<String, BTreeSet<String>>,
    nodes: BTreeMap<String, ApplianceNode>,
    virtual_servers: BTreeMap<String, VirtualServer>,
    calls: Vec<String>,
    failures: BTreeSet<(String, String)>,
    member_add_reports_failure: bool,
}

/// Appliance state held in memory.
#[derive(Debug, Default)]
pub struct MemoryAppliance {
    state: Mutex<State>,
}

fn not_found(kind: &str, name: &str) -> ApplianceError {
    ApplianceError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn already_exists(kind: &str, name: &str) -> ApplianceError {
    ApplianceError::AlreadyExists {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

impl MemoryAppliance {
    /// Create an empty appliance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `operation` (e.g. `create_pool`) fail for object `name`.
    pub fn fail_on(&self, operation: &str, name: &str) {
        self.lock()
            .failures
            .insert((operation.to_string(), name.to_string()));
    }

    /// Make member additions report failure even though the member is added.
    pub fn report_member_add_failures(&self, enabled: bool) {
        self.lock().member_add_reports_failure = enabled;
    }

    /// Every mutating call in order, as `"<operation> <name>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Names of existing monitors.
    #[must_use]
    pub fn monitor_names(&self) -> Vec<String> {
        self.lock().monitors.keys().cloned().collect()
    }

    /// Names of existing pools.
    #[must_use]
    pub fn pool_names(&self) -> Vec<String> {
        self.lock().pools.keys().cloned().collect()
    }

    /// Members of a pool.
    #[must_use]
    pub fn members(&self, pool: &str) -> Vec<String> {
        self.lock()
            .members
            .get(pool)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Existing virtual servers.
    #[must_use]
    pub fn virtual_servers(&self) -> Vec<VirtualServer> {
        self.lock().virtual_servers.values().cloned().collect()
    }

    /// Existing nodes.
    #[must_use]
    pub fn nodes(&self) -> Vec<ApplianceNode> {
        self.lock().nodes.values().cloned().collect()
    }

    /// Insert a monitor directly, bypassing call recording.
    pub fn seed_monitor(&self, monitor: Monitor) {
        self.lock().monitors.insert(monitor.name.clone(), monitor);
    }

    /// Insert a virtual server directly, bypassing call recording.
    pub fn seed_virtual_server(&self, server: VirtualServer) {
        self.lock()
            .virtual_servers
            .insert(server.name.clone(), server);
    }

    /// Record a call and return the injected failure for it, if any.
    fn record(state: &mut State, operation: &str, name: &str) -> Result<(), ApplianceError> {
        state.calls.push(format!("{operation} {name}"));
        if state
            .failures
            .contains(&(operation.to_string(), name.to_string()))
        {
            return Err(ApplianceError::Http {
                method: "TEST".to_string(),
                path: operation.to_string(),
                status: 500,
                message: format!("injected failure for {name}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ApplianceApi for MemoryAppliance {
    async fn get_monitor(&self, name: &str) -> Result<Option<Monitor>, ApplianceError> {
        Ok(self.lock().monitors.get(name).cloned())
    }

    async fn create_monitor(&self, monitor: &Monitor) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "create_monitor", &monitor.name)?;
        if state.monitors.contains_key(&monitor.name) {
            return Err(already_exists("monitor", &monitor.name));
        }
        state.monitors.insert(monitor.name.clone(), monitor.clone());
        Ok(())
    }

    async fn delete_monitor(&self, name: &str) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "delete_monitor", name)?;
        if state.pools.values().any(|p| p.monitor == name) {
            return Err(ApplianceError::Http {
                method: "DELETE".to_string(),
                path: name.to_string(),
                status: 400,
                message: "monitor is in use by a pool".to_string(),
            });
        }
        state
            .monitors
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("monitor", name))
    }

    async fn get_pool(&self, name: &str) -> Result<Option<Pool>, ApplianceError> {
        Ok(self.lock().pools.get(name).cloned())
    }

    async fn create_pool(&self, pool: &Pool) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "create_pool", &pool.name)?;
        if state.pools.contains_key(&pool.name) {
            return Err(already_exists("pool", &pool.name));
        }
        state.pools.insert(pool.name.clone(), pool.clone());
        state.members.insert(pool.name.clone(), BTreeSet::new());
        Ok(())
    }

    async fn delete_pool(&self, name: &str) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "delete_pool", name)?;
        if state.virtual_servers.values().any(|vs| vs.pool == name) {
            return Err(ApplianceError::Http {
                method: "DELETE".to_string(),
                path: name.to_string(),
                status: 400,
                message: "pool is in use by a virtual server".to_string(),
            });
        }
        state.members.remove(name);
        state
            .pools
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("pool", name))
    }

    async fn add_pool_member(&self, pool: &str, member: &str) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "add_pool_member", member)?;
        let report_failure = state.member_add_reports_failure;
        let members = state
            .members
            .get_mut(pool)
            .ok_or_else(|| not_found("pool", pool))?;
        if !members.insert(member.to_string()) {
            return Err(already_exists("member", member));
        }
        if report_failure {
            return Err(not_found("member", member));
        }
        Ok(())
    }

    async fn delete_pool_member(&self, pool: &str, member: &str) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "delete_pool_member", member)?;
        let members = state
            .members
            .get_mut(pool)
            .ok_or_else(|| not_found("pool", pool))?;
        if members.remove(member) {
            Ok(())
        } else {
            Err(not_found("member", member))
        }
    }

    async fn get_node(&self, name: &str) -> Result<Option<ApplianceNode>, ApplianceError> {
        Ok(self.lock().nodes.get(name).cloned())
    }

    async fn create_node(&self, node: &ApplianceNode) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "create_node", &node.name)?;
        if state.nodes.contains_key(&node.name) {
            return Err(already_exists("node", &node.name));
        }
        state.nodes.insert(node.name.clone(), node.clone());
        Ok(())
    }

    async fn modify_node(&self, node: &ApplianceNode) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "modify_node", &node.name)?;
        match state.nodes.get_mut(&node.name) {
            Some(existing) => {
                existing.clone_from(node);
                Ok(())
            }
            None => Err(not_found("node", &node.name)),
        }
    }

    async fn get_virtual_server(&self, name: &str) -> Result<Option<VirtualServer>, ApplianceError> {
        Ok(self.lock().virtual_servers.get(name).cloned())
    }

    async fn create_virtual_server(&self, server: &VirtualServer) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "create_virtual_server", &server.name)?;
        if state.virtual_servers.contains_key(&server.name) {
            return Err(already_exists("virtualserver", &server.name));
        }
        state
            .virtual_servers
            .insert(server.name.clone(), server.clone());
        Ok(())
    }

    async fn modify_virtual_server(&self, server: &VirtualServer) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "modify_virtual_server", &server.name)?;
        match state.virtual_servers.get_mut(&server.name) {
            Some(existing) => {
                existing.clone_from(server);
                Ok(())
            }
            None => Err(not_found("virtualserver", &server.name)),
        }
    }

    async fn delete_virtual_server(&self, name: &str) -> Result<(), ApplianceError> {
        let mut state = self.lock();
        Self::record(&mut state, "delete_virtual_server", name)?;
        state
            .virtual_servers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found("virtualserver", name))
    }

    async fn list_names(&self, kind: ResourceKind) -> Result<Vec<String>, ApplianceError> {
        let state = self.lock();
        Ok(match kind {
            ResourceKind::Monitor => state.monitors.keys().cloned().collect(),
            ResourceKind::Pool => state.pools.keys().cloned().collect(),
            ResourceKind::VirtualServer => state.virtual_servers.keys().cloned().collect(),
        })
    }
}
