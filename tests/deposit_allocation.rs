//! Address pool allocation under concurrency, over the in-process store.

use std::collections::HashSet;
use std::sync::Arc;

use wallet_io::deposit::{AddressAllocator, AddressFilter};
use wallet_io::memory::{MemoryStore, fixtures};
use wallet_io::network::NetworkRegistry;
use wallet_io::pagination::Page;

async fn allocator(network_id: &str, pool_size: usize) -> (Arc<MemoryStore>, Arc<AddressAllocator>) {
    let store = Arc::new(MemoryStore::new());
    store.put_network(fixtures::network(network_id)).await;
    for i in 0..pool_size {
        store
            .provision_address(network_id, (i % 2) as u32, &format!("addr-{:03}", i), None)
            .await;
    }
    let networks = Arc::new(NetworkRegistry::new(store.clone()));
    let allocator = Arc::new(AddressAllocator::new(store.clone(), networks));
    (store, allocator)
}

async fn pooled(store: &Arc<MemoryStore>, network_id: &str) -> usize {
    let allocator = AddressAllocator::new(
        store.clone(),
        Arc::new(NetworkRegistry::new(store.clone())),
    );
    let filter = AddressFilter {
        network_id: Some(network_id.to_string()),
        owner: Some(None),
        ..Default::default()
    };
    allocator
        .list_addresses(&filter, &Page::new(0, 500))
        .await
        .unwrap()
        .items
        .len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_user_consume_one_address() {
    let (store, allocator) = allocator("BTC", 10).await;

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.assign_or_get(42, "BTC").await })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let addr = handle.await.unwrap().unwrap();
        assert_eq!(addr.owner, Some(42));
        seen.insert(addr.addr_id);
    }

    assert_eq!(seen.len(), 1, "every caller must see the same address");
    assert_eq!(pooled(&store, "BTC").await, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_users_never_share_an_address() {
    let (store, allocator) = allocator("ETH", 20).await;

    let handles: Vec<_> = (0..20u64)
        .map(|uid| {
            let allocator = allocator.clone();
            tokio::spawn(async move { allocator.assign_or_get(uid, "ETH").await })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap().addr_id);
    }
    assert_eq!(ids.len(), 20);
    assert_eq!(pooled(&store, "ETH").await, 0);
}

#[tokio::test]
async fn exhausted_pool_fails_without_consuming_state() {
    let (store, allocator) = allocator("TRON", 1).await;

    let first = allocator.assign_or_get(1, "TRON").await.unwrap();
    let err = allocator.assign_or_get(2, "TRON").await.unwrap_err();
    assert_eq!(err.code(), "ASSIGN_ADDR_FAILED");

    // Nothing changed for the first owner, nothing recorded for the second
    let again = allocator.assign_or_get(1, "TRON").await.unwrap();
    assert_eq!(again, first);
    let owned_by_2 = allocator
        .list_addresses(
            &AddressFilter {
                owner: Some(Some(2)),
                ..Default::default()
            },
            &Page::default(),
        )
        .await
        .unwrap();
    assert!(owned_by_2.items.is_empty());
    assert_eq!(pooled(&store, "TRON").await, 0);

    // Refilling the pool unblocks the next user
    store.provision_address("TRON", 0, "addr-refill", None).await;
    let refilled = allocator.assign_or_get(2, "TRON").await.unwrap();
    assert_eq!(refilled.address, "addr-refill");
}

#[tokio::test]
async fn unknown_network_is_not_found() {
    let (_, allocator) = allocator("BTC", 1).await;
    let err = allocator.assign_or_get(1, "DOGE").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
