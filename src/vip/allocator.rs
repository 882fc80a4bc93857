// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Virtual IP allocation from a bounded range.
//!
//! ## Allocation
//!
//! `allocate(owner)` reads the table and returns the owner's existing address
//! when it already holds one. Otherwise the first address of the range is taken
//! when free; failing that the range is scanned upward and the first address
//! absent from the table is taken. [`AllocatorError::RangeExhausted`] is returned
//! when every address is in use.
//!
//! ## Concurrency
//!
//! Calls within one process are serialized by an async mutex. Across processes
//! each write is a compare-and-swap on the table version; on conflict the table
//! is re-read and the decision recomputed, with backoff, for a bounded number
//! of attempts.

use super::range::IpRange;
use super::store::{AllocationStore, AllocationTable};
use crate::constants::ALLOCATION_MAX_ATTEMPTS;
use crate::errors::AllocatorError;
use crate::metrics;
use crate::retry::conflict_backoff;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// The owner's address
    pub address: Ipv4Addr,
    /// False when the owner already held this address before the call
    pub newly_allocated: bool,
}

/// Outcome of one table mutation attempt.
enum Mutation<T> {
    /// The table was changed and must be written back
    Write(T),
    /// Nothing to write
    Unchanged(T),
}

/// Allocates virtual IPs to groups under a persisted allocation table.
pub struct VirtualIpAllocator {
    range: IpRange,
    store: Arc<dyn AllocationStore>,
    lock: Mutex<()>,
    max_attempts: u32,
}

impl VirtualIpAllocator {
    /// Create an allocator over `range` backed by `store`.
    #[must_use]
    pub fn new(range: IpRange, store: Arc<dyn AllocationStore>) -> Self {
        Self {
            range,
            store,
            lock: Mutex::new(()),
            max_attempts: ALLOCATION_MAX_ATTEMPTS,
        }
    }

    /// The range addresses are drawn from.
    #[must_use]
    pub fn range(&self) -> IpRange {
        self.range
    }

    /// Allocate an address for `owner`, or return the one it already holds.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::RangeExhausted`] when no address is free
    /// - [`AllocatorError::ConflictRetriesExhausted`] when concurrent writers kept winning
    /// - [`AllocatorError::Store`] when the table cannot be read or written
    pub async fn allocate(&self, owner: &str) -> Result<Allocation, AllocatorError> {
        let range = self.range;
        let result = self
            .mutate("allocate", |table| {
                if let Some(address) = table.address_of(owner) {
                    return Ok(Mutation::Unchanged(Allocation {
                        address,
                        newly_allocated: false,
                    }));
                }

                let address = first_free(&range, table).ok_or_else(|| range.exhausted())?;
                table
                    .entries
                    .insert(address.to_string(), owner.to_string());
                Ok(Mutation::Write(Allocation {
                    address,
                    newly_allocated: true,
                }))
            })
            .await;

        match &result {
            Ok(allocation) if allocation.newly_allocated => {
                metrics::record_vip_allocation("allocated");
                info!(owner = %owner, address = %allocation.address, "Allocated virtual IP");
            }
            Ok(allocation) => {
                metrics::record_vip_allocation("reused");
                debug!(owner = %owner, address = %allocation.address, "Owner already holds virtual IP");
            }
            Err(AllocatorError::RangeExhausted { .. }) => {
                metrics::record_vip_allocation("exhausted");
            }
            Err(_) => {}
        }
        result
    }

    /// Release the address held by `owner`.
    ///
    /// Returns the released address, or `None` without writing when the owner
    /// holds nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError`] when the table cannot be read or written.
    pub async fn release(&self, owner: &str) -> Result<Option<Ipv4Addr>, AllocatorError> {
        let released = self
            .mutate("release", |table| {
                let held: Vec<String> = table
                    .entries
                    .iter()
                    .filter(|(_, holder)| holder.as_str() == owner)
                    .map(|(ip, _)| ip.clone())
                    .collect();
                if held.is_empty() {
                    return Ok(Mutation::Unchanged(None));
                }

                for ip in &held {
                    table.entries.remove(ip);
                }
                Ok(Mutation::Write(held.first().and_then(|ip| ip.parse().ok())))
            })
            .await?;

        if let Some(address) = released {
            metrics::record_vip_allocation("released");
            info!(owner = %owner, address = %address, "Released virtual IP");
        }
        Ok(released)
    }

    /// Return the address held by `owner` without changing the table.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError`] when the table cannot be read.
    pub async fn lookup(&self, owner: &str) -> Result<Option<Ipv4Addr>, AllocatorError> {
        Ok(self.store.load().await?.address_of(owner))
    }

    /// Run a read-modify-write cycle with compare-and-swap retries.
    async fn mutate<T, F>(&self, operation: &str, mut apply: F) -> Result<T, AllocatorError>
    where
        F: FnMut(&mut AllocationTable) -> Result<Mutation<T>, AllocatorError>,
    {
        let _guard = self.lock.lock().await;
        let mut backoff = conflict_backoff();

        for attempt in 1..=self.max_attempts {
            let mut table = self.store.load().await?;

            let value = match apply(&mut table)? {
                Mutation::Unchanged(value) => return Ok(value),
                Mutation::Write(value) => value,
            };

            match self.store.store(&table).await {
                Ok(()) => return Ok(value),
                Err(AllocatorError::Conflict { table: name }) => {
                    metrics::record_allocation_conflict();
                    if attempt == self.max_attempts {
                        break;
                    }
                    let delay = backoff.next_backoff().unwrap_or_default();
                    warn!(
                        table = %name,
                        operation = operation,
                        attempt = attempt,
                        retry_after = ?delay,
                        "Allocation table changed concurrently, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(AllocatorError::ConflictRetriesExhausted {
            table: self.store.name().to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// First free address of `range` in scan order.
fn first_free(range: &IpRange, table: &AllocationTable) -> Option<Ipv4Addr> {
    if !table.is_used(range.start()) {
        return Some(range.start());
    }
    range.iter().find(|ip| !table.is_used(*ip))
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod allocator_tests;
