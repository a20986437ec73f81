//! Wallet core facade
//!
//! Wires every component from explicit stores and collaborators and exposes
//! the boundary operations an API layer calls.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::WalletConfig;
use crate::core_types::{NetworkId, NodeId, ShardNo, UserId, Xid};
use crate::db::Database;
use crate::deposit::{AddressAllocator, AddressStore, DepositAddress, DepositInfo, DepositService, PgAddressStore};
use crate::error::WalletError;
use crate::fee::FeeResolver;
use crate::ledger::{Ledger, LedgerStore, LedgerTransaction, PgLedgerStore, TxFilter, TxLookup};
use crate::liveness::{HeartbeatStore, LivenessTracker, OperatingStatus, PgHeartbeatStore};
use crate::memory::MemoryStore;
use crate::money::format_amount;
use crate::network::{NetworkRegistry, NetworkStore, PairingFilter, PgNetworkStore, ShardRegistry};
use crate::pagination::{Page, Paged};
use crate::services::{AccountDirectory, AssetDirectory, AssetKey, BalanceService, Notifier};
use crate::transfer::{
    ChannelBus, EventReceiver, PgSagaStore, RecoveryWorker, SagaStore, SagaWorker,
    TransferRequest, TransferSaga, WorkerConfig, event_channel,
};
use crate::withdrawal::{
    Broadcaster, TargetValidator, WithdrawalOrchestrator, WithdrawalPreflight, WithdrawalRequest,
};

/// Storage backends, one per component
#[derive(Clone)]
pub struct Stores {
    pub heartbeats: Arc<dyn HeartbeatStore>,
    pub networks: Arc<dyn NetworkStore>,
    pub addresses: Arc<dyn AddressStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub sagas: Arc<dyn SagaStore>,
}

impl Stores {
    pub fn postgres(db: &Database) -> Self {
        let pool = db.pool().clone();
        Self {
            heartbeats: Arc::new(PgHeartbeatStore::new(pool.clone())),
            networks: Arc::new(PgNetworkStore::new(pool.clone())),
            addresses: Arc::new(PgAddressStore::new(pool.clone())),
            ledger: Arc::new(PgLedgerStore::new(pool.clone())),
            sagas: Arc::new(PgSagaStore::new(pool)),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            heartbeats: store.clone(),
            networks: store.clone(),
            addresses: store.clone(),
            ledger: store.clone(),
            sagas: store,
        }
    }
}

/// Services owned by other systems
#[derive(Clone)]
pub struct Collaborators {
    pub assets: Arc<dyn AssetDirectory>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub balances: Arc<dyn BalanceService>,
    pub notifier: Arc<dyn Notifier>,
    pub validator: Arc<dyn TargetValidator>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

/// One row of an asset's fee schedule. Amounts are display strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkFee {
    pub network_id: NetworkId,
    pub min_deposit: String,
    pub min_withdrawal: String,
    pub fee_min: String,
    pub fee_max: String,
    pub operating: bool,
}

pub struct WalletCore {
    config: WalletConfig,
    assets: Arc<dyn AssetDirectory>,
    liveness: Arc<LivenessTracker>,
    networks: Arc<NetworkRegistry>,
    shards: Arc<ShardRegistry>,
    allocator: Arc<AddressAllocator>,
    deposits: DepositService,
    ledger: Arc<Ledger>,
    transfers: Arc<TransferSaga>,
    withdrawals: WithdrawalOrchestrator,
    sagas: Arc<dyn SagaStore>,
    bus: Arc<ChannelBus>,
    events: Mutex<Option<EventReceiver>>,
}

impl WalletCore {
    pub fn new(config: WalletConfig, stores: Stores, collab: Collaborators) -> Self {
        let liveness = Arc::new(LivenessTracker::new(stores.heartbeats, &config.liveness));
        let networks = Arc::new(NetworkRegistry::new(stores.networks.clone()));
        let shards = Arc::new(ShardRegistry::new(stores.networks, liveness.clone()));
        let allocator = Arc::new(AddressAllocator::new(stores.addresses, networks.clone()));
        let ledger = Arc::new(Ledger::new(stores.ledger));

        let deposits = DepositService::new(
            collab.assets.clone(),
            networks.clone(),
            shards.clone(),
            allocator.clone(),
        );

        let (bus, events) = event_channel();
        let bus = Arc::new(bus);
        let transfers = Arc::new(TransferSaga::new(
            ledger.clone(),
            stores.sagas.clone(),
            bus.clone(),
            collab.assets.clone(),
            collab.accounts,
            collab.balances.clone(),
            collab.notifier,
        ));

        let withdrawals = WithdrawalOrchestrator::new(
            collab.assets.clone(),
            networks.clone(),
            liveness.clone(),
            allocator.clone(),
            ledger.clone(),
            collab.balances,
            collab.validator,
            collab.broadcaster,
        );

        Self {
            config,
            assets: collab.assets,
            liveness,
            networks,
            shards,
            allocator,
            deposits,
            ledger,
            transfers,
            withdrawals,
            sagas: stores.sagas,
            bus,
            events: Mutex::new(Some(events)),
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn liveness(&self) -> &Arc<LivenessTracker> {
        &self.liveness
    }

    pub fn networks(&self) -> &Arc<NetworkRegistry> {
        &self.networks
    }

    pub fn shards(&self) -> &Arc<ShardRegistry> {
        &self.shards
    }

    pub fn allocator(&self) -> &Arc<AddressAllocator> {
        &self.allocator
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn withdrawals(&self) -> &WithdrawalOrchestrator {
        &self.withdrawals
    }

    /// Take the saga event consumer. Only one may exist.
    pub fn saga_worker(&self) -> Result<SagaWorker, WalletError> {
        let events = self
            .events
            .lock()
            .map_err(|_| WalletError::Unknown("saga event receiver poisoned".into()))?
            .take()
            .ok_or_else(|| WalletError::Conflict("Saga worker already started".into()))?;
        Ok(SagaWorker::new(self.transfers.clone(), events))
    }

    pub fn recovery_worker(&self) -> RecoveryWorker {
        RecoveryWorker::new(
            self.sagas.clone(),
            self.bus.clone(),
            WorkerConfig::from(&self.config.recovery),
        )
    }

    /// Start the saga and recovery workers on the current tokio runtime.
    pub fn spawn_workers(&self) -> Result<Vec<JoinHandle<()>>, WalletError> {
        let saga_worker = self.saga_worker()?;
        let recovery = self.recovery_worker();

        let handles = vec![
            tokio::spawn(saga_worker.run()),
            tokio::spawn(async move {
                recovery.run().await;
            }),
        ];
        info!(git_hash = crate::BUILD_GIT_HASH, "Wallet workers started");
        Ok(handles)
    }

    // ========================================================================
    // Liveness
    // ========================================================================

    pub async fn record_heartbeat(
        &self,
        node_id: NodeId,
        network_id: &str,
        shard_no: ShardNo,
        timestamp: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        self.liveness
            .record_heartbeat(node_id, network_id, shard_no, timestamp)
            .await
    }

    pub async fn operating_status(
        &self,
        network_id: &str,
        shard_no: Option<ShardNo>,
    ) -> Result<OperatingStatus, WalletError> {
        self.liveness.operating_status(network_id, shard_no).await
    }

    // ========================================================================
    // Deposits and fees
    // ========================================================================

    pub async fn assign_deposit_address(
        &self,
        uid: UserId,
        network_id: &str,
    ) -> Result<DepositAddress, WalletError> {
        self.allocator.assign_or_get(uid, network_id).await
    }

    pub async fn deposit_info(
        &self,
        uid: UserId,
        asset_symbol: &str,
        network_symbol: &str,
    ) -> Result<DepositInfo, WalletError> {
        self.deposits
            .deposit_info(uid, asset_symbol, network_symbol)
            .await
    }

    /// Minimums and fee range on every open network for an asset.
    pub async fn fees_for_asset(&self, asset_symbol: &str) -> Result<Vec<NetworkFee>, WalletError> {
        let asset = self
            .assets
            .get_asset(&AssetKey::Symbol(asset_symbol.to_string()))
            .await?;

        let filter = PairingFilter {
            asset_id: Some(asset.asset_id.clone()),
            enabled: Some(true),
            enabled_network: Some(true),
            ..Default::default()
        };
        let mut views = Vec::new();
        let mut page = Page::new(0, self.config.pagination.max_limit);
        loop {
            let batch = self.networks.list_pairings(&filter, &page).await?;
            let more = batch.more;
            page.offset += batch.items.len() as u64;
            views.extend(batch.items);
            if !more {
                break;
            }
        }

        let statuses = try_join_all(
            views
                .iter()
                .map(|v| self.liveness.operating_status(&v.network.network_id, None)),
        )
        .await?;

        views
            .into_iter()
            .zip(statuses)
            .map(|(view, status)| {
                let fee = FeeResolver::fee_range(&view.pairing)?;
                Ok(NetworkFee {
                    network_id: view.network.network_id,
                    min_deposit: format_amount(FeeResolver::min_deposit_amount(
                        &asset,
                        &view.pairing,
                    )),
                    min_withdrawal: format_amount(FeeResolver::min_withdrawal_amount(
                        &asset,
                        &view.pairing,
                    )),
                    fee_min: format_amount(fee.min),
                    fee_max: format_amount(fee.max),
                    operating: status.operating,
                })
            })
            .collect()
    }

    // ========================================================================
    // Transfers and withdrawals
    // ========================================================================

    pub async fn create_transfer(&self, req: TransferRequest) -> Result<Xid, WalletError> {
        self.transfers.create_transfer(req).await
    }

    pub async fn withdrawal_preflight(
        &self,
        asset_symbol: &str,
        network_symbol: &str,
    ) -> Result<WithdrawalPreflight, WalletError> {
        self.withdrawals.preflight(asset_symbol, network_symbol).await
    }

    pub async fn create_withdrawal(
        &self,
        req: WithdrawalRequest,
    ) -> Result<LedgerTransaction, WalletError> {
        self.withdrawals.create_withdrawal(req).await
    }

    pub async fn cancel_withdrawal(
        &self,
        uid: UserId,
        xid: Xid,
    ) -> Result<LedgerTransaction, WalletError> {
        self.withdrawals.cancel_withdrawal(uid, xid).await
    }

    // ========================================================================
    // Ledger reads
    // ========================================================================

    /// Exactly one of `xid` or `(netid, txid)` identifies the row.
    pub async fn get_transaction(
        &self,
        xid: Option<Xid>,
        netid: Option<&str>,
        txid: Option<&str>,
    ) -> Result<LedgerTransaction, WalletError> {
        let lookup = TxLookup::from_parts(xid, netid, txid)?;
        self.ledger.get(&lookup).await
    }

    pub async fn get_transactions(
        &self,
        filter: &TxFilter,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Paged<LedgerTransaction>, WalletError> {
        let page = Page::clamp(offset, limit, &self.config.pagination);
        self.ledger.query(filter, &page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{TxStatus, TxType};
    use crate::memory::fixtures;
    use crate::services::LogNotifier;
    use crate::services::mock::{MockBalanceService, StaticDirectory};
    use crate::transfer::Recipient;
    use crate::withdrawal::{AddressFormatValidator, LogBroadcaster};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const ALICE: UserId = 1001;
    const BOB: UserId = 1002;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn core() -> (Arc<MemoryStore>, WalletCore) {
        let store = Arc::new(MemoryStore::new());
        store.put_network(fixtures::network("ETH")).await;
        store.put_network(fixtures::network("TRON")).await;
        let mut closed = fixtures::network("BSC");
        closed.enabled = false;
        store.put_network(closed).await;

        let mut eth = fixtures::pairing("USDT", "ETH", 6);
        eth.withdrawal_fee_base = dec("0.0005");
        eth.min_deposit = Some(dec("1.50"));
        store.put_pairing(eth).await;
        store.put_pairing(fixtures::pairing("USDT", "TRON", 6)).await;
        store.put_pairing(fixtures::pairing("USDT", "BSC", 6)).await;
        store.put_shard(fixtures::shard("ETH", 0)).await;
        store
            .provision_address("ETH", 0, "0x00000000000000000000000000000000000000aa", None)
            .await;

        let directory = Arc::new(
            StaticDirectory::new()
                .with_user(ALICE, "alice@example.com")
                .with_user(BOB, "bob@example.com")
                .with_asset(fixtures::asset("USDT", 8)),
        );
        let collab = Collaborators {
            assets: directory.clone(),
            accounts: directory,
            balances: Arc::new(MockBalanceService::new()),
            notifier: Arc::new(LogNotifier),
            validator: Arc::new(AddressFormatValidator::new()),
            broadcaster: Arc::new(LogBroadcaster),
        };
        let core = WalletCore::new(
            WalletConfig::default(),
            Stores::memory(store.clone()),
            collab,
        );
        (store, core)
    }

    #[tokio::test]
    async fn test_fees_for_asset_skips_closed_networks() {
        let (_, core) = core().await;
        let fees = core.fees_for_asset("USDT").await.unwrap();
        assert_eq!(fees.len(), 2);

        let eth = &fees[0];
        assert_eq!(eth.network_id, "ETH");
        assert_eq!(eth.min_deposit, "1.5");
        assert_eq!(eth.min_withdrawal, "0.00000001");
        assert_eq!(eth.fee_min, "0.0015");
        assert_eq!(eth.fee_max, "0.0045");
        assert!(!eth.operating);
        assert_eq!(fees[1].network_id, "TRON");
    }

    #[tokio::test]
    async fn test_fees_for_unknown_asset() {
        let (_, core) = core().await;
        let err = core.fees_for_asset("DOGE").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_transfer_through_facade() {
        let (_, core) = core().await;
        let mut worker = core.saga_worker().unwrap();

        let xid = core
            .create_transfer(TransferRequest::new(
                ALICE,
                Recipient::Uid(BOB),
                "USDT",
                dec("2.5"),
            ))
            .await
            .unwrap();
        // pending, materialized, credited
        assert_eq!(worker.drain().await, 3);

        let out = core.get_transaction(Some(xid), None, None).await.unwrap();
        assert_eq!(out.status, TxStatus::Done);
        assert_eq!(out.tx_type, TxType::TransferOut);

        let incoming = core
            .get_transactions(&TxFilter::for_user(BOB), None, None)
            .await
            .unwrap();
        assert_eq!(incoming.items.len(), 1);
        assert_eq!(incoming.items[0].opposite_xid, Some(xid));
    }

    #[tokio::test]
    async fn test_saga_worker_taken_once() {
        let (_, core) = core().await;
        let _worker = core.saga_worker().unwrap();
        let err = core.saga_worker().unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_get_transaction_argument_rules() {
        let (_, core) = core().await;
        let err = core
            .get_transaction(Some(1), Some("ETH"), Some("0xabc"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ARGUMENTS_CONFLICT");

        let err = core
            .get_transaction(None, None, Some("0xabc"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_DATA");
    }

    #[tokio::test]
    async fn test_withdrawal_and_deposit_through_facade() {
        let (_, core) = core().await;
        let addr = core.assign_deposit_address(BOB, "ETH").await.unwrap();
        assert_eq!(addr.owner, Some(BOB));

        let row = core
            .create_withdrawal(WithdrawalRequest {
                uid: ALICE,
                asset_symbol: "USDT".into(),
                network_symbol: "ETH".into(),
                address: addr.address.clone(),
                memo: None,
                amount: dec("3"),
                fee: None,
            })
            .await
            .unwrap();
        // Target belongs to the wallet
        assert_eq!(row.fee_this, Some(Decimal::ZERO));

        let canceled = core.cancel_withdrawal(ALICE, row.xid).await.unwrap();
        assert_eq!(canceled.status, TxStatus::CancelPending);
    }
}
