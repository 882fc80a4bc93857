// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Virtual IP management.
//!
//! - [`range`] - Inclusive IPv4 ranges and the carry increment used to scan them
//! - [`store`] - The persisted allocation table and its compare-and-swap contract
//! - [`allocator`] - Allocation and release of addresses for groups

pub mod allocator;
pub mod range;
pub mod store;

pub use allocator::{Allocation, VirtualIpAllocator};
pub use range::IpRange;
pub use store::{AllocationStore, AllocationTable, ConfigMapAllocationStore, MemoryAllocationStore};
