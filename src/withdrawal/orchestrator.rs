use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use super::validator::TargetValidator;
use crate::core_types::{AssetId, NetworkId, UserId, Xid};
use crate::deposit::AddressAllocator;
use crate::error::WalletError;
use crate::logging::INTEGRITY_TARGET;
use crate::fee::{FeeRange, FeeResolver};
use crate::ledger::{Ledger, LedgerTransaction, NewTransaction, TransitionPatch, TxLookup, TxStatus, TxType};
use crate::liveness::LivenessTracker;
use crate::money::{format_amount, truncate};
use crate::network::{Direction, NetworkRegistry, PairingView};
use crate::services::{Asset, AssetDirectory, AssetKey, BalanceReason, BalanceService};

/// On-chain execution, owned by another component.
///
/// Both calls are hand-offs: success means "accepted", the outcome arrives
/// later as a ledger transition.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn submit(&self, tx: &LedgerTransaction) -> Result<(), WalletError>;

    async fn request_cancel(&self, tx: &LedgerTransaction) -> Result<(), WalletError>;
}

/// Broadcaster that only logs. Used when no execution backend is wired.
pub struct LogBroadcaster;

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn submit(&self, tx: &LedgerTransaction) -> Result<(), WalletError> {
        info!(xid = tx.xid, address = ?tx.address, "Withdrawal handed off");
        Ok(())
    }

    async fn request_cancel(&self, tx: &LedgerTransaction) -> Result<(), WalletError> {
        info!(xid = tx.xid, "Withdrawal cancel requested");
        Ok(())
    }
}

/// Everything the withdrawal screen shows before the user submits
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalPreflight {
    pub asset_id: AssetId,
    pub network_id: NetworkId,
    pub min_amount: Decimal,
    pub fee: FeeRange,
    /// Amount precision: the stricter of asset and pairing precision
    pub prec: u32,
    pub operating: bool,
    pub memo_name: Option<String>,
    pub contract: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetCheck {
    pub valid_address: bool,
    pub valid_memo: bool,
    /// Target is one of this wallet's deposit addresses
    pub internal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalRequest {
    pub uid: UserId,
    pub asset_symbol: String,
    pub network_symbol: String,
    pub address: String,
    pub memo: Option<String>,
    pub amount: Decimal,
    /// Caller-chosen fee; the range midpoint when absent
    pub fee: Option<Decimal>,
}

struct Resolved {
    asset: Asset,
    view: PairingView,
    preflight: WithdrawalPreflight,
}

pub struct WithdrawalOrchestrator {
    assets: Arc<dyn AssetDirectory>,
    networks: Arc<NetworkRegistry>,
    liveness: Arc<LivenessTracker>,
    allocator: Arc<AddressAllocator>,
    ledger: Arc<Ledger>,
    balances: Arc<dyn BalanceService>,
    validator: Arc<dyn TargetValidator>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl WithdrawalOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assets: Arc<dyn AssetDirectory>,
        networks: Arc<NetworkRegistry>,
        liveness: Arc<LivenessTracker>,
        allocator: Arc<AddressAllocator>,
        ledger: Arc<Ledger>,
        balances: Arc<dyn BalanceService>,
        validator: Arc<dyn TargetValidator>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            assets,
            networks,
            liveness,
            allocator,
            ledger,
            balances,
            validator,
            broadcaster,
        }
    }

    pub async fn preflight(
        &self,
        asset_symbol: &str,
        network_symbol: &str,
    ) -> Result<WithdrawalPreflight, WalletError> {
        Ok(self.resolve(asset_symbol, network_symbol).await?.preflight)
    }

    async fn resolve(
        &self,
        asset_symbol: &str,
        network_symbol: &str,
    ) -> Result<Resolved, WalletError> {
        let asset = self
            .assets
            .get_asset(&AssetKey::Symbol(asset_symbol.to_string()))
            .await?;
        if !asset.enabled {
            return Err(WalletError::Forbidden(format!(
                "Asset {} is out of service",
                asset_symbol
            )));
        }

        let network = self.networks.get_network_by_symbol(network_symbol).await?;
        let view = self
            .networks
            .get_pairing(&asset.asset_id, &network.network_id)
            .await?;
        view.ensure_open(asset_symbol, Direction::Withdrawal)?;

        let fee = FeeResolver::fee_range(&view.pairing)?;
        let status = self
            .liveness
            .operating_status(&view.network.network_id, None)
            .await?;

        let preflight = WithdrawalPreflight {
            asset_id: asset.asset_id.clone(),
            network_id: view.network.network_id.clone(),
            min_amount: FeeResolver::min_withdrawal_amount(&asset, &view.pairing),
            fee,
            prec: asset.default_prec.min(view.pairing.precision),
            operating: status.operating,
            memo_name: view.network.memo_name.clone(),
            contract: view.pairing.contract.clone(),
            warnings: view.warnings(Direction::Withdrawal),
        };

        Ok(Resolved {
            asset,
            view,
            preflight,
        })
    }

    /// Check a target before any funds move. Internal targets skip the chain
    /// validator: they never reach a chain.
    pub async fn validate_target(
        &self,
        network_symbol: &str,
        address: Option<&str>,
        memo: Option<&str>,
    ) -> Result<TargetCheck, WalletError> {
        if address.is_none() && memo.is_none() {
            return Err(WalletError::MissingData("address or memo".into()));
        }
        let network = self.networks.get_network_by_symbol(network_symbol).await?;
        if memo.is_some() && !network.supports_memo() {
            return Err(WalletError::Conflict(format!(
                "Network {} does not support memo",
                network.network_id
            )));
        }

        if let Some(addr) = address
            && self
                .allocator
                .find_internal(&network.network_id, addr, memo)
                .await?
                .is_some()
        {
            return Ok(TargetCheck {
                valid_address: true,
                valid_memo: true,
                internal: true,
            });
        }

        let validity = self.validator.validate(&network, address, memo).await?;
        Ok(TargetCheck {
            valid_address: validity.valid_address,
            valid_memo: validity.valid_memo,
            internal: false,
        })
    }

    /// Lock funds, record a PENDING withdrawal and hand it to the broadcaster.
    pub async fn create_withdrawal(
        &self,
        req: WithdrawalRequest,
    ) -> Result<LedgerTransaction, WalletError> {
        let Resolved {
            asset,
            view,
            preflight,
        } = self.resolve(&req.asset_symbol, &req.network_symbol).await?;

        let target = self
            .validate_target(
                &view.network.network_id,
                Some(&req.address),
                req.memo.as_deref(),
            )
            .await?;
        if !target.valid_address {
            return Err(WalletError::validation(
                "address",
                format!("not a valid {} address", view.network.network_id),
            ));
        }
        if !target.valid_memo {
            return Err(WalletError::validation(
                "memo",
                format!("not a valid {} memo", view.network.network_id),
            ));
        }

        let amount = truncate(req.amount, preflight.prec);
        if amount <= Decimal::ZERO || amount < preflight.min_amount {
            return Err(WalletError::AmountOutOfRange(format!(
                "Withdrawal amount is less than minimal amount {}",
                format_amount(preflight.min_amount)
            )));
        }

        let fee = if target.internal {
            Decimal::ZERO
        } else {
            preflight.fee.select_fee(req.fee)?
        };
        if amount <= fee {
            return Err(WalletError::AmountOutOfRange(format!(
                "Withdrawal amount must exceed fee {}",
                format_amount(fee)
            )));
        }

        let lock_id = self
            .balances
            .lock(req.uid, &asset.asset_id, amount, BalanceReason::WithdrawalCreate)
            .await?;

        let mut tx = NewTransaction::new(
            TxType::Withdrawal,
            asset.asset_id.clone(),
            amount,
            TxStatus::Pending,
        );
        tx.uid = Some(req.uid);
        tx.network_id = Some(view.network.network_id.clone());
        tx.address = Some(req.address);
        tx.memo = req.memo;
        tx.confirm_target = Some(view.network.confirm_target);
        tx.fee_this = Some(fee);
        tx.lock_id = Some(lock_id);

        let row = match self.ledger.create(tx).await {
            Ok(row) => row,
            Err(e) => {
                error!(
                    target: INTEGRITY_TARGET,
                    marker = "DATA_INTEGRITY",
                    uid = req.uid,
                    lock_id = lock_id,
                    error = %e,
                    "Balance locked but withdrawal row not recorded"
                );
                return Err(e);
            }
        };

        info!(
            xid = row.xid,
            uid = req.uid,
            asset = %asset.symbol,
            network = %view.network.network_id,
            amount = %amount,
            fee = %fee,
            internal = target.internal,
            "Withdrawal created"
        );

        if let Err(e) = self.broadcaster.submit(&row).await {
            warn!(xid = row.xid, error = %e, "Withdrawal hand-off failed, row stays PENDING");
        }
        Ok(row)
    }

    /// Request cancellation. Success here only means `CANCEL_PENDING`; the
    /// broadcaster reports the outcome later.
    pub async fn cancel_withdrawal(
        &self,
        uid: UserId,
        xid: Xid,
    ) -> Result<LedgerTransaction, WalletError> {
        let lookup = TxLookup::Xid(xid);
        let row = self.ledger.get(&lookup).await?;
        if row.uid != Some(uid) || row.tx_type != TxType::Withdrawal {
            return Err(WalletError::NotFound(format!("Transaction {} not found", xid)));
        }
        if row.status != TxStatus::Pending {
            return Err(WalletError::Conflict(format!(
                "Withdrawal {} cannot be canceled in status {}",
                xid, row.status
            )));
        }

        self.ledger
            .transition(
                xid,
                TxStatus::Pending,
                TxStatus::CancelPending,
                TransitionPatch::default(),
            )
            .await?;
        let row = self.ledger.get(&lookup).await?;

        if let Err(e) = self.broadcaster.request_cancel(&row).await {
            warn!(xid = xid, error = %e, "Cancel hand-off failed");
        }
        info!(xid = xid, uid = uid, "Withdrawal cancel pending");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LivenessConfig;
    use crate::ledger::TxFilter;
    use crate::memory::{MemoryStore, fixtures};
    use crate::pagination::Page;
    use crate::services::mock::{MockBalanceService, StaticDirectory};
    use crate::withdrawal::AddressFormatValidator;
    use chrono::Utc;
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    const ALICE: UserId = 1001;
    const ETH_TARGET: &str = "0x52908400098527886e0f7030069857d2e4169ee7";

    #[derive(Default)]
    struct RecordingBroadcaster {
        submitted: Mutex<Vec<Xid>>,
        cancels: Mutex<Vec<Xid>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn submit(&self, tx: &LedgerTransaction) -> Result<(), WalletError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(WalletError::Unknown("broadcaster unreachable".into()));
            }
            self.submitted.lock().unwrap().push(tx.xid);
            Ok(())
        }

        async fn request_cancel(&self, tx: &LedgerTransaction) -> Result<(), WalletError> {
            self.cancels.lock().unwrap().push(tx.xid);
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        liveness: Arc<LivenessTracker>,
        ledger: Arc<Ledger>,
        balances: Arc<MockBalanceService>,
        broadcaster: Arc<RecordingBroadcaster>,
        orchestrator: WithdrawalOrchestrator,
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.put_network(fixtures::network("ETH")).await;
        store.put_network(fixtures::memo_network("XRP")).await;
        let mut usdt = fixtures::pairing("USDT", "ETH", 6);
        usdt.withdrawal_fee_base = dec("0.0005");
        usdt.contract = Some("0xdac17f958d2ee523a2206206994597c13d831ec7".into());
        store.put_pairing(usdt).await;
        store.put_pairing(fixtures::pairing("XRP", "XRP", 6)).await;
        store
            .provision_address("ETH", 0, "0x00000000000000000000000000000000000000aa", None)
            .await;

        let directory = Arc::new(
            StaticDirectory::new()
                .with_asset(fixtures::asset("USDT", 8))
                .with_asset(fixtures::asset("XRP", 6)),
        );
        let liveness = Arc::new(LivenessTracker::new(store.clone(), &LivenessConfig::default()));
        let networks = Arc::new(NetworkRegistry::new(store.clone()));
        let allocator = Arc::new(AddressAllocator::new(store.clone(), networks.clone()));
        let ledger = Arc::new(Ledger::new(store.clone()));
        let balances = Arc::new(MockBalanceService::new());
        let broadcaster = Arc::new(RecordingBroadcaster::default());

        let orchestrator = WithdrawalOrchestrator::new(
            directory,
            networks,
            liveness.clone(),
            allocator,
            ledger.clone(),
            balances.clone(),
            Arc::new(AddressFormatValidator::new()),
            broadcaster.clone(),
        );

        Harness {
            store,
            liveness,
            ledger,
            balances,
            broadcaster,
            orchestrator,
        }
    }

    fn request(amount: &str, fee: Option<&str>) -> WithdrawalRequest {
        WithdrawalRequest {
            uid: ALICE,
            asset_symbol: "USDT".into(),
            network_symbol: "ETH".into(),
            address: ETH_TARGET.into(),
            memo: None,
            amount: dec(amount),
            fee: fee.map(dec),
        }
    }

    // ========================================================================
    // Preflight
    // ========================================================================

    #[tokio::test]
    async fn test_preflight_fee_range_and_precision() {
        let h = harness().await;
        let pre = h.orchestrator.preflight("USDT", "ETH").await.unwrap();
        assert_eq!(pre.fee.min, dec("0.0015"));
        assert_eq!(pre.fee.max, dec("0.0045"));
        assert_eq!(pre.fee.prec, 4);
        assert_eq!(pre.prec, 6);
        assert_eq!(pre.min_amount, dec("0.00000001"));
        assert!(pre.contract.is_some());
        assert!(pre.memo_name.is_none());
        assert!(!pre.operating);
    }

    #[tokio::test]
    async fn test_preflight_operating_follows_heartbeat() {
        let h = harness().await;
        h.liveness
            .record_heartbeat(3, "ETH", 1, Utc::now())
            .await
            .unwrap();
        assert!(h.orchestrator.preflight("USDT", "ETH").await.unwrap().operating);
    }

    #[tokio::test]
    async fn test_preflight_network_block_message_wins() {
        let h = harness().await;
        let mut eth = fixtures::network("ETH");
        eth.block_withdrawals_msg = Some("ETH withdrawals paused for maintenance".into());
        eth.withdrawal_warning = Some("slow".into());
        h.store.put_network(eth).await;
        let mut usdt = fixtures::pairing("USDT", "ETH", 6);
        usdt.block_withdrawals_msg = Some("USDT paused".into());
        h.store.put_pairing(usdt).await;

        let err = h.orchestrator.preflight("USDT", "ETH").await.unwrap_err();
        assert_eq!(err.to_string(), "ETH withdrawals paused for maintenance");
    }

    #[tokio::test]
    async fn test_preflight_fee_precision_beyond_pairing_is_integrity_error() {
        let h = harness().await;
        let mut usdt = fixtures::pairing("USDT", "ETH", 2);
        usdt.withdrawal_fee_base = dec("0.0005");
        h.store.put_pairing(usdt).await;

        let err = h.orchestrator.preflight("USDT", "ETH").await.unwrap_err();
        assert_eq!(err.code(), "DATA_INTEGRITY");
    }

    // ========================================================================
    // Target validation
    // ========================================================================

    #[tokio::test]
    async fn test_target_requires_address_or_memo() {
        let h = harness().await;
        let err = h.orchestrator.validate_target("ETH", None, None).await.unwrap_err();
        assert_eq!(err.code(), "MISSING_DATA");
    }

    #[tokio::test]
    async fn test_memo_on_memoless_network_conflicts() {
        let h = harness().await;
        let err = h
            .orchestrator
            .validate_target("ETH", Some(ETH_TARGET), Some("123"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(err.http_status(), 409);
    }

    #[tokio::test]
    async fn test_internal_target_bypasses_validator() {
        let h = harness().await;
        h.store
            .provision_address("XRP", 0, "not a chain address", Some("42"))
            .await;

        let check = h
            .orchestrator
            .validate_target("XRP", Some("not a chain address"), Some("42"))
            .await
            .unwrap();
        assert!(check.internal);
        assert!(check.valid_address && check.valid_memo);

        // Different memo: external, and the validator rejects the format
        let check = h
            .orchestrator
            .validate_target("XRP", Some("not a chain address"), Some("43"))
            .await
            .unwrap();
        assert!(!check.internal);
        assert!(!check.valid_address);
    }

    // ========================================================================
    // Creation
    // ========================================================================

    #[tokio::test]
    async fn test_create_withdrawal_midpoint_fee() {
        let h = harness().await;
        let row = h
            .orchestrator
            .create_withdrawal(request("10.123456789", None))
            .await
            .unwrap();

        assert_eq!(row.status, TxStatus::Pending);
        assert_eq!(row.tx_type, TxType::Withdrawal);
        assert_eq!(row.amount, dec("10.123456"));
        assert_eq!(row.fee_this, Some(dec("0.003")));
        assert_eq!(row.confirm_target, Some(12));
        assert_eq!(row.lock_id, Some(500));
        assert_eq!(row.network_id.as_deref(), Some("ETH"));
        assert_eq!(h.balances.lock_count(), 1);
        assert_eq!(*h.broadcaster.submitted.lock().unwrap(), vec![row.xid]);
    }

    #[tokio::test]
    async fn test_create_withdrawal_fee_out_of_range() {
        let h = harness().await;
        let err = h
            .orchestrator
            .create_withdrawal(request("1", Some("0.01")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FEE_OUT_OF_RANGE");
        assert_eq!(h.balances.lock_count(), 0);

        let row = h
            .orchestrator
            .create_withdrawal(request("1", Some("0.002")))
            .await
            .unwrap();
        assert_eq!(row.fee_this, Some(dec("0.002")));
    }

    #[tokio::test]
    async fn test_create_withdrawal_below_minimum() {
        let h = harness().await;
        let mut usdt = fixtures::pairing("USDT", "ETH", 6);
        usdt.min_withdrawal = Some(dec("5"));
        h.store.put_pairing(usdt).await;

        let err = h
            .orchestrator
            .create_withdrawal(request("4.99", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AMOUNT_OUT_OF_RANGE");
        assert_eq!(h.balances.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_create_withdrawal_amount_must_exceed_fee() {
        let h = harness().await;
        let err = h
            .orchestrator
            .create_withdrawal(request("0.002", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AMOUNT_OUT_OF_RANGE");
    }

    #[tokio::test]
    async fn test_create_withdrawal_invalid_address() {
        let h = harness().await;
        let mut req = request("1", None);
        req.address = "0x1234".into();
        let err = h.orchestrator.create_withdrawal(req).await.unwrap_err();
        assert_eq!(
            err,
            WalletError::validation("address", "not a valid ETH address")
        );
    }

    #[tokio::test]
    async fn test_internal_withdrawal_is_fee_free() {
        let h = harness().await;
        let mut req = request("1", Some("0.01"));
        req.address = "0x00000000000000000000000000000000000000aa".into();
        let row = h.orchestrator.create_withdrawal(req).await.unwrap();
        assert_eq!(row.fee_this, Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_handoff_failure_keeps_pending_row() {
        let h = harness().await;
        h.broadcaster.fail.store(true, Ordering::SeqCst);
        let row = h
            .orchestrator
            .create_withdrawal(request("1", None))
            .await
            .unwrap();
        let stored = h.ledger.get(&TxLookup::Xid(row.xid)).await.unwrap();
        assert_eq!(stored.status, TxStatus::Pending);
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    #[tokio::test]
    async fn test_cancel_withdrawal() {
        let h = harness().await;
        let row = h
            .orchestrator
            .create_withdrawal(request("1", None))
            .await
            .unwrap();

        let err = h.orchestrator.cancel_withdrawal(7, row.xid).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let canceled = h.orchestrator.cancel_withdrawal(ALICE, row.xid).await.unwrap();
        assert_eq!(canceled.status, TxStatus::CancelPending);
        assert_eq!(*h.broadcaster.cancels.lock().unwrap(), vec![row.xid]);

        let err = h
            .orchestrator
            .cancel_withdrawal(ALICE, row.xid)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        let pending = h
            .ledger
            .query(
                &TxFilter {
                    statuses: vec![TxStatus::CancelPending],
                    ..TxFilter::for_user(ALICE)
                },
                &Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(pending.items.len(), 1);
    }
}
