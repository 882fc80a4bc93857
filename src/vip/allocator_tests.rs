// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `allocator.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::vip::store::MemoryAllocationStore;
    use std::collections::BTreeMap;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn allocator(store: Arc<MemoryAllocationStore>) -> VirtualIpAllocator {
        let range = IpRange::parse("10.0.0.1", "10.0.0.3").unwrap();
        VirtualIpAllocator::new(range, store)
    }

    #[tokio::test]
    async fn test_allocates_in_scan_order_until_exhausted() {
        let store = Arc::new(MemoryAllocationStore::new());
        let allocator = allocator(store.clone());

        assert_eq!(allocator.allocate("a").await.unwrap().address, ip("10.0.0.1"));
        assert_eq!(allocator.allocate("b").await.unwrap().address, ip("10.0.0.2"));
        assert_eq!(allocator.allocate("c").await.unwrap().address, ip("10.0.0.3"));

        let err = allocator.allocate("d").await.unwrap_err();
        assert_eq!(
            err,
            AllocatorError::RangeExhausted {
                start: "10.0.0.1".to_string(),
                end: "10.0.0.3".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_released_address_is_reused_first() {
        let store = Arc::new(MemoryAllocationStore::new());
        let allocator = allocator(store.clone());
        for owner in ["a", "b", "c"] {
            allocator.allocate(owner).await.unwrap();
        }

        assert_eq!(allocator.release("b").await.unwrap(), Some(ip("10.0.0.2")));

        let again = allocator.allocate("d").await.unwrap();
        assert_eq!(again.address, ip("10.0.0.2"));
        assert!(again.newly_allocated);
    }

    #[tokio::test]
    async fn test_allocation_is_idempotent_per_owner() {
        let store = Arc::new(MemoryAllocationStore::new());
        let allocator = allocator(store.clone());

        let first = allocator.allocate("web").await.unwrap();
        let second = allocator.allocate("web").await.unwrap();

        assert_eq!(first.address, second.address);
        assert!(first.newly_allocated);
        assert!(!second.newly_allocated);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_release_without_allocation_is_noop() {
        let store = Arc::new(MemoryAllocationStore::new());
        let allocator = allocator(store.clone());

        assert_eq!(allocator.release("nobody").await.unwrap(), None);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_start_taken_by_foreign_entry_scans_forward() {
        let store = Arc::new(MemoryAllocationStore::with_entries(BTreeMap::from([(
            "10.0.0.1".to_string(),
            "other".to_string(),
        )])));
        let allocator = allocator(store.clone());

        assert_eq!(allocator.allocate("web").await.unwrap().address, ip("10.0.0.2"));
    }

    #[tokio::test]
    async fn test_lookup_reports_held_address() {
        let store = Arc::new(MemoryAllocationStore::new());
        let allocator = allocator(store.clone());
        allocator.allocate("web").await.unwrap();

        assert_eq!(allocator.lookup("web").await.unwrap(), Some(ip("10.0.0.1")));
        assert_eq!(allocator.lookup("api").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let store = Arc::new(MemoryAllocationStore::new());
        store.inject_conflicts(2);
        let allocator = allocator(store.clone());

        let allocation = allocator.allocate("web").await.unwrap();

        assert_eq!(allocation.address, ip("10.0.0.1"));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_persistent_conflicts_give_up() {
        let store = Arc::new(MemoryAllocationStore::new());
        store.inject_conflicts(u32::MAX);
        let allocator = allocator(store.clone());

        let err = allocator.allocate("web").await.unwrap_err();

        assert!(matches!(
            err,
            AllocatorError::ConflictRetriesExhausted { attempts, .. } if attempts == ALLOCATION_MAX_ATTEMPTS
        ));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_allocations_never_share_an_address() {
        let store = Arc::new(MemoryAllocationStore::new());
        let allocator = Arc::new(allocator(store.clone()));

        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|owner| {
                let allocator = allocator.clone();
                tokio::spawn(async move { allocator.allocate(owner).await })
            })
            .collect();

        let mut addresses = Vec::new();
        for handle in handles {
            addresses.push(handle.await.unwrap().unwrap().address);
        }
        addresses.sort();
        addresses.dedup();

        assert_eq!(addresses.len(), 3);
    }
}
