use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::types::{
    LedgerTransaction, NewTransaction, TransitionPatch, TxFilter, TxLookup, TxStatus, TxType,
};
use crate::core_types::Xid;
use crate::error::WalletError;
use crate::pagination::{Page, Paged};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Assigns `xid` and `create_time`. A duplicate (network, external tx id)
    /// is a `Conflict`.
    async fn insert(&self, tx: &NewTransaction) -> Result<LedgerTransaction, WalletError>;

    async fn fetch(&self, xid: Xid) -> Result<Option<LedgerTransaction>, WalletError>;

    async fn fetch_by_external(
        &self,
        network_id: &str,
        external_tx_id: &str,
    ) -> Result<Option<LedgerTransaction>, WalletError>;

    /// `UPDATE ... WHERE xid = ? AND status = ?`. False when no row matched.
    async fn transition(
        &self,
        xid: Xid,
        from: TxStatus,
        to: TxStatus,
        patch: &TransitionPatch,
    ) -> Result<bool, WalletError>;

    /// One atomic unit: move the TRANSFER_OUT row `PENDING -> DONE`, insert
    /// `incoming`, and cross-link both `opposite_xid`s. `None` (nothing
    /// written) when the OUT row is not a pending TRANSFER_OUT.
    async fn pair_transfer(
        &self,
        out_xid: Xid,
        incoming: &NewTransaction,
        exec_time: DateTime<Utc>,
    ) -> Result<Option<Xid>, WalletError>;

    /// Ordered by xid descending.
    async fn query(
        &self,
        filter: &TxFilter,
        page: &Page,
    ) -> Result<Paged<LedgerTransaction>, WalletError>;
}

/// The `wallet_transactions` abstraction. Sole writer of `status`,
/// `exec_time` and `opposite_xid`.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, tx: NewTransaction) -> Result<LedgerTransaction, WalletError> {
        if tx.amount <= rust_decimal::Decimal::ZERO {
            return Err(WalletError::validation("amount", "must be positive"));
        }
        if !tx.tx_type.allows_initial(tx.status) {
            return Err(WalletError::validation(
                "status",
                format!("{} cannot start as {}", tx.tx_type, tx.status),
            ));
        }
        if tx.tx_type == TxType::TransferIn && tx.opposite_xid.is_none() {
            return Err(WalletError::MissingData("oppositeXid".into()));
        }

        let row = self.store.insert(&tx).await?;
        debug!(
            xid = row.xid,
            tx_type = %row.tx_type,
            status = %row.status,
            asset = %row.asset_id,
            "Ledger row created"
        );
        Ok(row)
    }

    pub async fn get(&self, lookup: &TxLookup) -> Result<LedgerTransaction, WalletError> {
        let row = match lookup {
            TxLookup::Xid(xid) => self.store.fetch(*xid).await?,
            TxLookup::External {
                network_id,
                external_tx_id,
            } => {
                self.store
                    .fetch_by_external(network_id, external_tx_id)
                    .await?
            }
        };
        row.ok_or_else(|| WalletError::NotFound(format!("Transaction {} not found", lookup)))
    }

    /// Conditional status change. Settled statuses stamp `exec_time` unless
    /// the patch carries one.
    pub async fn transition(
        &self,
        xid: Xid,
        from: TxStatus,
        to: TxStatus,
        mut patch: TransitionPatch,
    ) -> Result<(), WalletError> {
        if !from.can_transition_to(to) {
            return Err(WalletError::Conflict(format!(
                "Illegal transition {} -> {}",
                from, to
            )));
        }
        if to.is_settled() && patch.exec_time.is_none() {
            patch.exec_time = Some(Utc::now());
        }

        if !self.store.transition(xid, from, to, &patch).await? {
            warn!(xid = xid, expected = %from, target = %to, "Stale ledger transition");
            return Err(WalletError::StaleTransition { xid, expected: from });
        }

        debug!(xid = xid, from = %from, to = %to, "Ledger transition");
        Ok(())
    }

    /// Write the TRANSFER_IN leg for a pending TRANSFER_OUT row and settle
    /// both. Returns the IN row's xid.
    ///
    /// The conditional update on the OUT row is the idempotency fence: a
    /// second call for the same `out_xid` fails with `StaleTransition`.
    pub async fn materialize_transfer(
        &self,
        out_xid: Xid,
        mut incoming: NewTransaction,
    ) -> Result<Xid, WalletError> {
        if incoming.tx_type != TxType::TransferIn || incoming.status != TxStatus::Done {
            return Err(WalletError::validation(
                "type",
                "opposite leg must be a settled TRANSFER_IN",
            ));
        }
        incoming.opposite_xid = Some(out_xid);

        match self
            .store
            .pair_transfer(out_xid, &incoming, Utc::now())
            .await?
        {
            Some(in_xid) => {
                debug!(out_xid = out_xid, in_xid = in_xid, "Transfer legs paired");
                Ok(in_xid)
            }
            None => Err(WalletError::StaleTransition {
                xid: out_xid,
                expected: TxStatus::Pending,
            }),
        }
    }

    pub async fn query(
        &self,
        filter: &TxFilter,
        page: &Page,
    ) -> Result<Paged<LedgerTransaction>, WalletError> {
        self.store.query(filter, page).await
    }
}
