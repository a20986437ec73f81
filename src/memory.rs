//! In-process implementation of every store trait
//!
//! Used by the test suites and for single-node development. Orderings and
//! conditional-update semantics match the PostgreSQL stores.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex, RwLock};

use crate::core_types::{AddrId, AssetId, NetworkId, NodeId, ShardNo, UserId, Xid};
use crate::deposit::{AddressFilter, AddressStore, ClaimOutcome, DepositAddress};
use crate::error::WalletError;
use crate::ledger::{
    LedgerStore, LedgerTransaction, NewTransaction, TransitionPatch, TxFilter, TxStatus, TxType,
};
use crate::liveness::{HeartbeatStore, NodeFilter, NodeHeartbeat};
use crate::network::{AssetNetworkPairing, Network, NetworkStore, PairingFilter, Shard};
use crate::pagination::{Page, Paged};
use crate::transfer::{SagaRecord, SagaStep, SagaStore};

#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<FxHashMap<NodeId, NodeHeartbeat>>,
    networks: RwLock<BTreeMap<NetworkId, Network>>,
    pairings: RwLock<BTreeMap<(AssetId, NetworkId), AssetNetworkPairing>>,
    shards: RwLock<BTreeMap<(NetworkId, ShardNo), Shard>>,
    addresses: RwLock<BTreeMap<AddrId, DepositAddress>>,
    /// Per-network allocation lock, the in-process advisory lock
    pool_locks: DashMap<NetworkId, Arc<Mutex<()>>>,
    next_addr_id: AtomicU64,
    transactions: RwLock<BTreeMap<Xid, LedgerTransaction>>,
    next_xid: AtomicU64,
    sagas: RwLock<FxHashMap<Xid, SagaRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_network(&self, network: Network) {
        self.networks
            .write()
            .await
            .insert(network.network_id.clone(), network);
    }

    pub async fn put_pairing(&self, pairing: AssetNetworkPairing) {
        self.pairings.write().await.insert(
            (pairing.asset_id.clone(), pairing.network_id.clone()),
            pairing,
        );
    }

    pub async fn put_shard(&self, shard: Shard) {
        self.shards
            .write()
            .await
            .insert((shard.network_id.clone(), shard.shard_no), shard);
    }

    /// Add an unassigned address to a network's pool.
    pub async fn provision_address(
        &self,
        network_id: &str,
        shard_no: ShardNo,
        address: &str,
        memo: Option<&str>,
    ) -> AddrId {
        let addr_id = self.next_addr_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.addresses.write().await.insert(
            addr_id,
            DepositAddress {
                addr_id,
                network_id: network_id.to_string(),
                shard_no,
                address: address.to_string(),
                memo: memo.map(str::to_string),
                owner: None,
            },
        );
        addr_id
    }

    /// Overwrite a saga's `updated_at`, for recovery scans.
    pub async fn backdate_saga(&self, xid: Xid, by: Duration) {
        if let Some(rec) = self.sagas.write().await.get_mut(&xid)
            && let Ok(delta) = chrono::Duration::from_std(by)
        {
            rec.updated_at -= delta;
        }
    }

    fn pool_lock(&self, network_id: &str) -> Arc<Mutex<()>> {
        self.pool_locks
            .entry(network_id.to_string())
            .or_default()
            .clone()
    }

    async fn owned(&self, uid: UserId, network_id: &str) -> Option<DepositAddress> {
        self.addresses
            .read()
            .await
            .values()
            .find(|a| a.owner == Some(uid) && a.network_id == network_id)
            .cloned()
    }

    async fn update_saga<F>(&self, xid: Xid, expected: SagaStep, apply: F) -> bool
    where
        F: FnOnce(&mut SagaRecord),
    {
        let mut sagas = self.sagas.write().await;
        match sagas.get_mut(&xid) {
            Some(rec) if rec.step == expected => {
                apply(rec);
                rec.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Liveness
// ============================================================================

#[async_trait]
impl HeartbeatStore for MemoryStore {
    async fn upsert_heartbeat(&self, heartbeat: &NodeHeartbeat) -> Result<(), WalletError> {
        let mut nodes = self.nodes.write().await;
        nodes
            .entry(heartbeat.node_id)
            .and_modify(|node| {
                node.network_id = heartbeat.network_id.clone();
                node.shard_no = heartbeat.shard_no;
                node.last_ping = node.last_ping.max(heartbeat.last_ping);
            })
            .or_insert_with(|| heartbeat.clone());
        Ok(())
    }

    async fn last_ping(
        &self,
        network_id: &str,
        shard_no: Option<ShardNo>,
    ) -> Result<Option<DateTime<Utc>>, WalletError> {
        Ok(self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.network_id == network_id && shard_no.is_none_or(|s| n.shard_no == s))
            .map(|n| n.last_ping)
            .max())
    }

    async fn get_node(&self, node_id: NodeId) -> Result<Option<NodeHeartbeat>, WalletError> {
        Ok(self.nodes.read().await.get(&node_id).cloned())
    }

    async fn list_nodes(
        &self,
        filter: &NodeFilter,
        page: &Page,
    ) -> Result<Paged<NodeHeartbeat>, WalletError> {
        let mut nodes: Vec<NodeHeartbeat> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| {
                filter.network_id.as_ref().is_none_or(|net| &n.network_id == net)
                    && filter.shard_no.is_none_or(|s| n.shard_no == s)
            })
            .cloned()
            .collect();
        nodes.sort_by(|a, b| {
            (&a.network_id, a.shard_no, a.node_id).cmp(&(&b.network_id, b.shard_no, b.node_id))
        });
        Ok(Paged::from_slice(nodes, page))
    }
}

// ============================================================================
// Networks
// ============================================================================

#[async_trait]
impl NetworkStore for MemoryStore {
    async fn get_network(&self, network_id: &str) -> Result<Option<Network>, WalletError> {
        Ok(self.networks.read().await.get(network_id).cloned())
    }

    async fn list_networks(
        &self,
        enabled: Option<bool>,
        page: &Page,
    ) -> Result<Paged<Network>, WalletError> {
        let networks = self.networks.read().await;
        Ok(Paged::from_slice(
            networks
                .values()
                .filter(|n| enabled.is_none_or(|e| n.enabled == e))
                .cloned(),
            page,
        ))
    }

    async fn get_pairing(
        &self,
        asset_id: &str,
        network_id: &str,
    ) -> Result<Option<AssetNetworkPairing>, WalletError> {
        Ok(self
            .pairings
            .read()
            .await
            .get(&(asset_id.to_string(), network_id.to_string()))
            .cloned())
    }

    async fn list_pairings(
        &self,
        filter: &PairingFilter,
        page: &Page,
    ) -> Result<Paged<AssetNetworkPairing>, WalletError> {
        let networks = self.networks.read().await;
        let pairings = self.pairings.read().await;
        Ok(Paged::from_slice(
            pairings
                .values()
                .filter(|p| {
                    // Inner join: pairings of unknown networks are invisible
                    let Some(network) = networks.get(&p.network_id) else {
                        return false;
                    };
                    filter.asset_id.as_ref().is_none_or(|a| &p.asset_id == a)
                        && filter.network_id.as_ref().is_none_or(|n| &p.network_id == n)
                        && filter.enabled.is_none_or(|e| p.enabled == e)
                        && filter.enabled_network.is_none_or(|e| network.enabled == e)
                })
                .cloned(),
            page,
        ))
    }

    async fn get_shard(
        &self,
        network_id: &str,
        shard_no: ShardNo,
    ) -> Result<Option<Shard>, WalletError> {
        Ok(self
            .shards
            .read()
            .await
            .get(&(network_id.to_string(), shard_no))
            .cloned())
    }

    async fn list_shards(
        &self,
        network_id: Option<&str>,
        page: &Page,
    ) -> Result<Paged<Shard>, WalletError> {
        let shards = self.shards.read().await;
        Ok(Paged::from_slice(
            shards
                .values()
                .filter(|s| network_id.is_none_or(|n| s.network_id == n))
                .cloned(),
            page,
        ))
    }
}

// ============================================================================
// Deposit addresses
// ============================================================================

#[async_trait]
impl AddressStore for MemoryStore {
    async fn find_owned(
        &self,
        uid: UserId,
        network_id: &str,
    ) -> Result<Option<DepositAddress>, WalletError> {
        Ok(self.owned(uid, network_id).await)
    }

    async fn claim_exclusive(
        &self,
        uid: UserId,
        network_id: &str,
    ) -> Result<ClaimOutcome, WalletError> {
        let lock = self.pool_lock(network_id);
        let _guard = lock.lock().await;

        if let Some(addr) = self.owned(uid, network_id).await {
            return Ok(ClaimOutcome::Existing(addr));
        }

        let mut addresses = self.addresses.write().await;
        let free = addresses
            .values_mut()
            .find(|a| a.network_id == network_id && a.owner.is_none());
        Ok(match free {
            Some(addr) => {
                addr.owner = Some(uid);
                ClaimOutcome::Claimed(addr.clone())
            }
            None => ClaimOutcome::Exhausted,
        })
    }

    async fn get(&self, addr_id: AddrId) -> Result<Option<DepositAddress>, WalletError> {
        Ok(self.addresses.read().await.get(&addr_id).cloned())
    }

    async fn find_by_address(
        &self,
        network_id: &str,
        address: &str,
        memo: Option<&str>,
    ) -> Result<Option<DepositAddress>, WalletError> {
        Ok(self
            .addresses
            .read()
            .await
            .values()
            .find(|a| a.network_id == network_id && a.address == address && a.memo.as_deref() == memo)
            .cloned())
    }

    async fn list(
        &self,
        filter: &AddressFilter,
        page: &Page,
    ) -> Result<Paged<DepositAddress>, WalletError> {
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());
        let addresses = self.addresses.read().await;
        Ok(Paged::from_slice(
            addresses
                .values()
                .filter(|a| {
                    filter.network_id.as_ref().is_none_or(|n| &a.network_id == n)
                        && filter.shard_no.is_none_or(|s| a.shard_no == s)
                        && filter.owner.is_none_or(|o| a.owner == o)
                        && needle.as_ref().is_none_or(|n| {
                            a.address.to_lowercase().contains(n.as_str())
                                || a.memo
                                    .as_ref()
                                    .is_some_and(|m| m.to_lowercase().contains(n.as_str()))
                        })
                })
                .cloned(),
            page,
        ))
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert(&self, tx: &NewTransaction) -> Result<LedgerTransaction, WalletError> {
        let mut rows = self.transactions.write().await;
        if let (Some(net), Some(txid)) = (&tx.network_id, &tx.external_tx_id)
            && rows.values().any(|r| {
                r.network_id.as_ref() == Some(net) && r.external_tx_id.as_ref() == Some(txid)
            })
        {
            return Err(WalletError::Conflict(format!(
                "Transaction {} already recorded",
                txid
            )));
        }
        let xid = self.next_xid.fetch_add(1, Ordering::SeqCst) + 1;
        let row = tx.clone().into_row(xid, Utc::now());
        rows.insert(xid, row.clone());
        Ok(row)
    }

    async fn fetch(&self, xid: Xid) -> Result<Option<LedgerTransaction>, WalletError> {
        Ok(self.transactions.read().await.get(&xid).cloned())
    }

    async fn fetch_by_external(
        &self,
        network_id: &str,
        external_tx_id: &str,
    ) -> Result<Option<LedgerTransaction>, WalletError> {
        Ok(self
            .transactions
            .read()
            .await
            .values()
            .find(|r| {
                r.network_id.as_deref() == Some(network_id)
                    && r.external_tx_id.as_deref() == Some(external_tx_id)
            })
            .cloned())
    }

    async fn transition(
        &self,
        xid: Xid,
        from: TxStatus,
        to: TxStatus,
        patch: &TransitionPatch,
    ) -> Result<bool, WalletError> {
        let mut rows = self.transactions.write().await;
        match rows.get_mut(&xid) {
            Some(row) if row.status == from => {
                row.status = to;
                patch.apply(row);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pair_transfer(
        &self,
        out_xid: Xid,
        incoming: &NewTransaction,
        exec_time: DateTime<Utc>,
    ) -> Result<Option<Xid>, WalletError> {
        let mut rows = self.transactions.write().await;
        let fenced = rows.get(&out_xid).is_some_and(|r| {
            r.tx_type == TxType::TransferOut && r.status == TxStatus::Pending
        });
        if !fenced {
            return Ok(None);
        }

        let in_xid = self.next_xid.fetch_add(1, Ordering::SeqCst) + 1;
        let mut in_row = incoming.clone().into_row(in_xid, exec_time);
        in_row.exec_time = Some(exec_time);
        rows.insert(in_xid, in_row);

        if let Some(out) = rows.get_mut(&out_xid) {
            out.status = TxStatus::Done;
            out.exec_time = Some(exec_time);
            out.opposite_xid = Some(in_xid);
        }
        Ok(Some(in_xid))
    }

    async fn query(
        &self,
        filter: &TxFilter,
        page: &Page,
    ) -> Result<Paged<LedgerTransaction>, WalletError> {
        let rows = self.transactions.read().await;
        Ok(Paged::from_slice(
            rows.values().rev().filter(|r| filter.matches(r)).cloned(),
            page,
        ))
    }
}

// ============================================================================
// Sagas
// ============================================================================

#[async_trait]
impl SagaStore for MemoryStore {
    async fn insert_saga(&self, record: &SagaRecord) -> Result<bool, WalletError> {
        let mut sagas = self.sagas.write().await;
        if sagas.contains_key(&record.xid) {
            return Ok(false);
        }
        sagas.insert(record.xid, record.clone());
        Ok(true)
    }

    async fn get_saga(&self, xid: Xid) -> Result<Option<SagaRecord>, WalletError> {
        Ok(self.sagas.read().await.get(&xid).cloned())
    }

    async fn update_step_if(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
    ) -> Result<bool, WalletError> {
        Ok(self.update_saga(xid, expected, |r| r.step = new).await)
    }

    async fn update_step_with_in_xid(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
        in_xid: Xid,
    ) -> Result<bool, WalletError> {
        Ok(self
            .update_saga(xid, expected, |r| {
                r.step = new;
                r.in_xid = Some(in_xid);
            })
            .await)
    }

    async fn update_step_with_error(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
        error: &str,
    ) -> Result<bool, WalletError> {
        Ok(self
            .update_saga(xid, expected, |r| {
                r.step = new;
                r.error_message = Some(error.to_string());
            })
            .await)
    }

    async fn find_stale(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<SagaRecord>, WalletError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold)
                .map_err(|e| WalletError::validation("stale_threshold", e.to_string()))?;
        let mut stale: Vec<SagaRecord> = self
            .sagas
            .read()
            .await
            .values()
            .filter(|r| !r.step.is_terminal() && r.updated_at <= cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }
}

/// Ready-made configuration rows for tests and local development
pub mod fixtures {
    use rust_decimal::Decimal;

    use crate::core_types::ShardNo;
    use crate::network::{AssetNetworkPairing, Network, Shard};
    use crate::services::Asset;

    /// Enabled network, 12 confirmations, no memo, no warnings.
    pub fn network(network_id: &str) -> Network {
        Network {
            network_id: network_id.to_string(),
            name: format!("{} network", network_id),
            icon_url: None,
            native_asset_id: network_id.to_string(),
            confirm_target: 12,
            enabled: true,
            memo_name: None,
            qr_template_native: None,
            qr_template_token: None,
            deposit_warning: None,
            withdrawal_warning: None,
            block_deposits_msg: None,
            block_withdrawals_msg: None,
        }
    }

    /// Like [`network`], with a "Tag" memo field.
    pub fn memo_network(network_id: &str) -> Network {
        Network {
            memo_name: Some("Tag".to_string()),
            ..network(network_id)
        }
    }

    /// Enabled pairing with fee schedule base 0, min 0.001, max 0.004.
    pub fn pairing(asset_id: &str, network_id: &str, precision: u32) -> AssetNetworkPairing {
        AssetNetworkPairing {
            asset_id: asset_id.to_string(),
            network_id: network_id.to_string(),
            enabled: true,
            contract: None,
            precision,
            min_deposit: None,
            min_withdrawal: None,
            withdrawal_fee_base: Decimal::ZERO,
            withdrawal_fee_min: Decimal::new(1, 3),
            withdrawal_fee_max: Decimal::new(4, 3),
            deposit_warning: None,
            withdrawal_warning: None,
            block_deposits_msg: None,
            block_withdrawals_msg: None,
        }
    }

    pub fn shard(network_id: &str, shard_no: ShardNo) -> Shard {
        Shard {
            network_id: network_id.to_string(),
            shard_no,
            deposit_warning: None,
            block_deposits_msg: None,
            block_withdrawals_msg: None,
        }
    }

    /// Enabled asset whose id equals its symbol.
    pub fn asset(symbol: &str, default_prec: u32) -> Asset {
        Asset {
            asset_id: symbol.to_string(),
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            enabled: true,
            default_prec,
            min_deposit: None,
            min_withdrawal: None,
        }
    }
}
