// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persisted virtual IP allocation table.
//!
//! The table maps allocated addresses (dotted string form) to the identity of
//! the owning group. Every write is a compare-and-swap against the version
//! observed at load time: a store whose version no longer matches fails with
//! [`AllocatorError::Conflict`] and the caller re-reads and retries.

use crate::errors::AllocatorError;
use crate::labels::{K8S_MANAGED_BY, MANAGED_BY_LBSYNC};
use crate::retry::{is_api_status, retry_api_call};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A snapshot of the allocation table together with its version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationTable {
    /// Address → owning group
    pub entries: BTreeMap<String, String>,
    /// Opaque version used for compare-and-swap, `None` for a table never stored
    pub version: Option<String>,
}

impl AllocationTable {
    /// Returns the address held by `owner`, if any.
    #[must_use]
    pub fn address_of(&self, owner: &str) -> Option<Ipv4Addr> {
        self.entries
            .iter()
            .find(|(_, holder)| holder.as_str() == owner)
            .and_then(|(ip, _)| ip.parse().ok())
    }

    /// Returns true if `ip` is allocated to anyone.
    #[must_use]
    pub fn is_used(&self, ip: Ipv4Addr) -> bool {
        self.entries.contains_key(&ip.to_string())
    }
}

/// Storage for the allocation table.
#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Name of the table, used in errors and logs.
    fn name(&self) -> &str;

    /// Read the full table.
    async fn load(&self) -> Result<AllocationTable, AllocatorError>;

    /// Write the full table if its version still matches `table.version`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Conflict`] when the table was modified since it
    /// was loaded.
    async fn store(&self, table: &AllocationTable) -> Result<(), AllocatorError>;
}

/// Allocation table persisted in a Kubernetes ConfigMap.
///
/// The ConfigMap's `resourceVersion` is the table version; the API server
/// rejects a replace carrying a stale version with HTTP 409.
pub struct ConfigMapAllocationStore {
    api: Api<ConfigMap>,
    name: String,
}

impl ConfigMapAllocationStore {
    /// Create a store over ConfigMap `name` in `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }

    fn store_error(&self, e: &kube::Error) -> AllocatorError {
        AllocatorError::Store {
            table: self.name.clone(),
            reason: e.to_string(),
        }
    }

    fn table_from(config_map: ConfigMap) -> AllocationTable {
        AllocationTable {
            entries: config_map.data.unwrap_or_default(),
            version: config_map.metadata.resource_version,
        }
    }

    async fn create_empty(&self) -> Result<AllocationTable, AllocatorError> {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels: Some(BTreeMap::from([(
                    K8S_MANAGED_BY.to_string(),
                    MANAGED_BY_LBSYNC.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::new()),
            ..Default::default()
        };

        match self.api.create(&PostParams::default(), &config_map).await {
            Ok(created) => {
                info!(table = %self.name, "Created allocation table ConfigMap");
                Ok(Self::table_from(created))
            }
            // Another writer created it first
            Err(e) if is_api_status(&e, 409) => {
                let existing = retry_api_call(
                    || self.api.get(&self.name),
                    "get allocation table after create conflict",
                )
                .await
                .map_err(|e| self.store_error(&e))?;
                Ok(Self::table_from(existing))
            }
            Err(e) => Err(self.store_error(&e)),
        }
    }
}

#[async_trait]
impl AllocationStore for ConfigMapAllocationStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<AllocationTable, AllocatorError> {
        match retry_api_call(|| self.api.get(&self.name), "get allocation table").await {
            Ok(config_map) => Ok(Self::table_from(config_map)),
            Err(e) if is_api_status(&e, 404) => self.create_empty().await,
            Err(e) => Err(self.store_error(&e)),
        }
    }

    async fn store(&self, table: &AllocationTable) -> Result<(), AllocatorError> {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                resource_version: table.version.clone(),
                labels: Some(BTreeMap::from([(
                    K8S_MANAGED_BY.to_string(),
                    MANAGED_BY_LBSYNC.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(table.entries.clone()),
            ..Default::default()
        };

        let params = PostParams::default();
        match retry_api_call(
            || self.api.replace(&self.name, &params, &config_map),
            "replace allocation table",
        )
        .await
        {
            Ok(_) => {
                debug!(table = %self.name, entries = table.entries.len(), "Stored allocation table");
                Ok(())
            }
            Err(e) if is_api_status(&e, 409) => Err(AllocatorError::Conflict {
                table: self.name.clone(),
            }),
            Err(e) => Err(self.store_error(&e)),
        }
    }
}

/// In-memory allocation table with the same compare-and-swap semantics.
#[derive(Debug, Default)]
pub struct MemoryAllocationStore {
    state: Mutex<(BTreeMap<String, String>, u64)>,
    pending_conflicts: AtomicU32,
    writes: AtomicU32,
}

/// Name reported by [`MemoryAllocationStore`]
const MEMORY_TABLE_NAME: &str = "memory";

impl MemoryAllocationStore {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding `entries`.
    #[must_use]
    pub fn with_entries(entries: BTreeMap<String, String>) -> Self {
        Self {
            state: Mutex::new((entries, 1)),
            ..Default::default()
        }
    }

    /// Make the next `count` stores fail as if another writer got there first.
    pub fn inject_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of successful stores.
    #[must_use]
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current table contents.
    pub async fn entries(&self) -> BTreeMap<String, String> {
        self.state.lock().await.0.clone()
    }
}

#[async_trait]
impl AllocationStore for MemoryAllocationStore {
    fn name(&self) -> &str {
        MEMORY_TABLE_NAME
    }

    async fn load(&self) -> Result<AllocationTable, AllocatorError> {
        let state = self.state.lock().await;
        Ok(AllocationTable {
            entries: state.0.clone(),
            version: Some(state.1.to_string()),
        })
    }

    async fn store(&self, table: &AllocationTable) -> Result<(), AllocatorError> {
        let mut state = self.state.lock().await;

        let conflict = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            // Simulate a competing writer bumping the version
            state.1 += 1;
        }

        if table.version.as_deref() != Some(state.1.to_string().as_str()) {
            return Err(AllocatorError::Conflict {
                table: MEMORY_TABLE_NAME.to_string(),
            });
        }

        state.0.clone_from(&table.entries);
        state.1 += 1;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
