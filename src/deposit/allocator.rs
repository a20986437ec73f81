//! Deposit Address Allocator
//!
//! Addresses are provisioned out of band into a per-network pool. Each
//! (user, network) pair gets at most one address for the lifetime of the
//! system and an address is never handed to two users.
//!
//! # Allocation
//!
//! ```text
//! find_owned (no lock)  ── hit ──> return
//!        │ miss
//!        v
//! claim_exclusive (network-scoped lock)
//!   ├─ owned now?      ──> Existing
//!   ├─ free row?       ──> Claimed
//!   └─ pool empty      ──> Exhausted -> PoolExhausted
//! ```
//!
//! The lock covers only the re-check and the claim. It is never held across
//! a call to another service.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::core_types::{AddrId, NetworkId, ShardNo, UserId};
use crate::error::WalletError;
use crate::network::{NetworkKey, NetworkRegistry};
use crate::pagination::{Page, Paged};
use crate::validation::NetworkSymbol;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositAddress {
    pub addr_id: AddrId,
    pub network_id: NetworkId,
    pub shard_no: ShardNo,
    pub address: String,
    pub memo: Option<String>,
    /// `None` while the address sits in the pool
    pub owner: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Another caller assigned the user an address before we got the lock
    Existing(DepositAddress),
    Claimed(DepositAddress),
    Exhausted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    pub network_id: Option<NetworkId>,
    pub shard_no: Option<ShardNo>,
    /// `Some(None)` selects pooled (unassigned) addresses only
    pub owner: Option<Option<UserId>>,
    /// Case-insensitive substring over address and memo
    pub search: Option<String>,
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Plain read, no locking.
    async fn find_owned(
        &self,
        uid: UserId,
        network_id: &str,
    ) -> Result<Option<DepositAddress>, WalletError>;

    /// Under a lock scoped to the network's pool: return the user's address
    /// if one exists by now, else claim the lowest free address.
    async fn claim_exclusive(
        &self,
        uid: UserId,
        network_id: &str,
    ) -> Result<ClaimOutcome, WalletError>;

    async fn get(&self, addr_id: AddrId) -> Result<Option<DepositAddress>, WalletError>;

    /// Exact match on (network, address, memo). A `None` memo only matches
    /// rows without memo.
    async fn find_by_address(
        &self,
        network_id: &str,
        address: &str,
        memo: Option<&str>,
    ) -> Result<Option<DepositAddress>, WalletError>;

    /// Ordered by addr_id.
    async fn list(
        &self,
        filter: &AddressFilter,
        page: &Page,
    ) -> Result<Paged<DepositAddress>, WalletError>;
}

pub struct AddressAllocator {
    store: Arc<dyn AddressStore>,
    networks: Arc<NetworkRegistry>,
}

impl AddressAllocator {
    pub fn new(store: Arc<dyn AddressStore>, networks: Arc<NetworkRegistry>) -> Self {
        Self { store, networks }
    }

    /// Return the user's deposit address on `network_id`, assigning one from
    /// the pool on first use.
    pub async fn assign_or_get(
        &self,
        uid: UserId,
        network_id: &str,
    ) -> Result<DepositAddress, WalletError> {
        let key = NetworkKey::Id(NetworkSymbol::new(network_id)?);
        self.networks.get_network(&key).await?;

        if let Some(addr) = self.store.find_owned(uid, network_id).await? {
            return Ok(addr);
        }

        match self.store.claim_exclusive(uid, network_id).await? {
            ClaimOutcome::Existing(addr) => {
                tracing::debug!(uid, network = %network_id, addr_id = addr.addr_id, "Address assigned concurrently");
                Ok(addr)
            }
            ClaimOutcome::Claimed(addr) => {
                tracing::info!(
                    uid,
                    network = %network_id,
                    addr_id = addr.addr_id,
                    shard_no = addr.shard_no,
                    "Deposit address assigned"
                );
                Ok(addr)
            }
            ClaimOutcome::Exhausted => {
                tracing::warn!(uid, network = %network_id, "Deposit address pool exhausted");
                Err(WalletError::PoolExhausted(network_id.to_string()))
            }
        }
    }

    pub async fn get_address(&self, addr_id: AddrId) -> Result<DepositAddress, WalletError> {
        self.store
            .get(addr_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("Address {} not found", addr_id)))
    }

    pub async fn list_addresses(
        &self,
        filter: &AddressFilter,
        page: &Page,
    ) -> Result<Paged<DepositAddress>, WalletError> {
        if let Some(id) = &filter.network_id {
            NetworkSymbol::new(id)?;
        }
        self.store.list(filter, page).await
    }

    /// Address owned by this system, if any. Used to route withdrawals
    /// between two wallet users internally.
    pub async fn find_internal(
        &self,
        network_id: &str,
        address: &str,
        memo: Option<&str>,
    ) -> Result<Option<DepositAddress>, WalletError> {
        self.store.find_by_address(network_id, address, memo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, fixtures};

    async fn setup(pool_size: usize) -> (Arc<MemoryStore>, AddressAllocator) {
        let store = Arc::new(MemoryStore::new());
        store.put_network(fixtures::network("ETH")).await;
        for i in 0..pool_size {
            store
                .provision_address("ETH", 0, &format!("0x{:040x}", i + 1), None)
                .await;
        }
        let networks = Arc::new(NetworkRegistry::new(store.clone()));
        (store.clone(), AddressAllocator::new(store, networks))
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let (_store, allocator) = setup(3).await;
        let first = allocator.assign_or_get(1001, "ETH").await.unwrap();
        let again = allocator.assign_or_get(1001, "ETH").await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first.owner, Some(1001));
    }

    #[tokio::test]
    async fn test_distinct_users_get_distinct_addresses() {
        let (_store, allocator) = setup(3).await;
        let a = allocator.assign_or_get(1, "ETH").await.unwrap();
        let b = allocator.assign_or_get(2, "ETH").await.unwrap();
        assert_ne!(a.addr_id, b.addr_id);
        // Lowest free row first
        assert!(a.addr_id < b.addr_id);
    }

    #[tokio::test]
    async fn test_exhausted_pool_consumes_nothing() {
        let (store, allocator) = setup(1).await;
        allocator.assign_or_get(1, "ETH").await.unwrap();

        let before = store.list(&AddressFilter::default(), &Page::default()).await.unwrap();
        let err = allocator.assign_or_get(2, "ETH").await.unwrap_err();
        assert_eq!(err, WalletError::PoolExhausted("ETH".into()));
        let after = store.list(&AddressFilter::default(), &Page::default()).await.unwrap();
        assert_eq!(before, after);

        // Deterministic on retry
        assert!(allocator.assign_or_get(2, "ETH").await.is_err());
        // Existing owner unaffected
        assert!(allocator.assign_or_get(1, "ETH").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_network_rejected() {
        let (_store, allocator) = setup(1).await;
        let err = allocator.assign_or_get(1, "DOGE").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        let err = allocator.assign_or_get(1, "doge").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_list_unassigned_only() {
        let (_store, allocator) = setup(3).await;
        allocator.assign_or_get(7, "ETH").await.unwrap();
        let filter = AddressFilter {
            owner: Some(None),
            ..Default::default()
        };
        let pooled = allocator.list_addresses(&filter, &Page::default()).await.unwrap();
        assert_eq!(pooled.items.len(), 2);
        assert!(pooled.items.iter().all(|a| a.owner.is_none()));
    }

    #[tokio::test]
    async fn test_find_internal_respects_memo() {
        let store = Arc::new(MemoryStore::new());
        store.put_network(fixtures::memo_network("XRP")).await;
        store.provision_address("XRP", 0, "rHub", Some("1001")).await;
        let networks = Arc::new(NetworkRegistry::new(store.clone()));
        let allocator = AddressAllocator::new(store, networks);

        assert!(allocator.find_internal("XRP", "rHub", Some("1001")).await.unwrap().is_some());
        assert!(allocator.find_internal("XRP", "rHub", None).await.unwrap().is_none());
        assert!(allocator.find_internal("XRP", "rHub", Some("9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_address_not_found() {
        let (_store, allocator) = setup(0).await;
        let err = allocator.get_address(99).await.unwrap_err();
        assert_eq!(err.to_string(), "Address 99 not found");
    }
}
