//! Internal transfer saga
//!
//! Creation runs synchronously up to the pending event; every later step is a
//! handler that reads the persisted saga, performs one action and publishes
//! the next event.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::channel::EventBus;
use super::db::SagaStore;
use super::state::SagaStep;
use super::types::{SagaEvent, SagaRecord, TransferPayload, TransferRequest};
use crate::core_types::Xid;
use crate::error::WalletError;
use crate::logging::INTEGRITY_TARGET;
use crate::ledger::{Ledger, NewTransaction, TxLookup, TxStatus, TxType};
use crate::money::{format_amount, truncate};
use crate::services::{
    AccountDirectory, AssetDirectory, AssetKey, BalanceReason, BalanceService, MailTemplate,
    Notification, Notifier, UserKey,
};
use crate::validation::validate_transfer_message;

pub struct TransferSaga {
    ledger: Arc<Ledger>,
    sagas: Arc<dyn SagaStore>,
    bus: Arc<dyn EventBus>,
    assets: Arc<dyn AssetDirectory>,
    accounts: Arc<dyn AccountDirectory>,
    balances: Arc<dyn BalanceService>,
    notifier: Arc<dyn Notifier>,
}

impl TransferSaga {
    pub fn new(
        ledger: Arc<Ledger>,
        sagas: Arc<dyn SagaStore>,
        bus: Arc<dyn EventBus>,
        assets: Arc<dyn AssetDirectory>,
        accounts: Arc<dyn AccountDirectory>,
        balances: Arc<dyn BalanceService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            sagas,
            bus,
            assets,
            accounts,
            balances,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn SagaStore> {
        &self.sagas
    }

    /// Validate, lock the source balance, record the TRANSFER_OUT row and
    /// publish the pending event. Returns the OUT row's xid.
    pub async fn create_transfer(&self, req: TransferRequest) -> Result<Xid, WalletError> {
        if let Some(message) = &req.message {
            validate_transfer_message(message)?;
        }

        let src_key = UserKey::Uid(req.src_uid);
        let dst_key = req.recipient.to_key();
        let asset_key = AssetKey::Symbol(req.asset_symbol.clone());
        let (src, dst, asset) = tokio::try_join!(
            self.accounts.get_user(&src_key),
            self.accounts.get_user(&dst_key),
            self.assets.get_asset(&asset_key),
        )?;

        if src.uid == dst.uid {
            return Err(WalletError::validation("recipient", "cannot transfer to yourself"));
        }
        if !asset.enabled {
            return Err(WalletError::Forbidden(
                "Transfer asset is out of service".into(),
            ));
        }

        let amount = if req.ignore_prec {
            req.amount
        } else {
            truncate(req.amount, asset.default_prec)
        };
        if amount <= rust_decimal::Decimal::ZERO {
            return Err(WalletError::AmountOutOfRange(
                "Transfer amount is less than minimal amount".into(),
            ));
        }

        // The reservation gates everything below
        let lock_id = self
            .balances
            .lock(src.uid, &asset.asset_id, amount, BalanceReason::TransferCreate)
            .await?;

        let mut out = NewTransaction::new(
            TxType::TransferOut,
            asset.asset_id.clone(),
            amount,
            TxStatus::Pending,
        );
        out.uid = Some(src.uid);
        out.address = Some(dst.email.clone());
        out.memo = req.message.clone();
        out.fee_this = Some(rust_decimal::Decimal::ZERO);
        out.lock_id = Some(lock_id);

        let out = match self.ledger.create(out).await {
            Ok(row) => row,
            Err(e) => {
                error!(
                    target: INTEGRITY_TARGET,
                    marker = "DATA_INTEGRITY",
                    lock_id = lock_id,
                    uid = src.uid,
                    error = %e,
                    "Balance locked but transfer row not recorded"
                );
                return Err(e);
            }
        };

        let payload = TransferPayload {
            out_xid: out.xid,
            src_uid: src.uid,
            src_email: src.email,
            dst_uid: dst.uid,
            dst_email: dst.email,
            asset_id: asset.asset_id,
            asset_symbol: asset.symbol,
            amount,
            lock_id,
            message: req.message,
        };

        if let Err(e) = self
            .sagas
            .insert_saga(&SagaRecord::recorded(payload.clone()))
            .await
        {
            error!(
                target: INTEGRITY_TARGET,
                marker = "DATA_INTEGRITY",
                xid = out.xid,
                error = %e,
                "Transfer row recorded without saga"
            );
            return Err(e);
        }

        info!(
            xid = out.xid,
            src = payload.src_uid,
            dst = payload.dst_uid,
            asset = %payload.asset_symbol,
            amount = %payload.amount,
            "Transfer recorded"
        );

        // A lost event is re-published by the recovery worker
        if let Err(e) = self.bus.publish(SagaEvent::TransferPending(payload)).await {
            warn!(xid = out.xid, error = %e, "Pending event not published");
        }

        Ok(out.xid)
    }

    pub async fn handle(&self, event: SagaEvent) -> Result<(), WalletError> {
        match event {
            SagaEvent::TransferPending(payload) => self.handle_pending(payload).await,
            SagaEvent::TransferMaterialized { xid } => self.handle_materialized(xid).await,
            SagaEvent::TransferCredited { xid } => self.handle_credited(xid).await,
        }
    }

    /// Write the TRANSFER_IN leg. The conditional OUT-row transition fences
    /// duplicate deliveries.
    pub async fn handle_pending(&self, payload: TransferPayload) -> Result<(), WalletError> {
        let xid = payload.out_xid;
        let saga = self.load(xid).await?;
        if saga.step != SagaStep::Recorded {
            // Redelivery or tampering. The saga keeps running.
            error!(
                target: INTEGRITY_TARGET,
                marker = "DATA_INTEGRITY",
                xid = xid,
                step = %saga.step,
                "Pending event for saga past RECORDED"
            );
            return Ok(());
        }

        let mut incoming = NewTransaction::new(
            TxType::TransferIn,
            payload.asset_id.clone(),
            payload.amount,
            TxStatus::Done,
        );
        incoming.uid = Some(payload.dst_uid);
        incoming.address = Some(payload.src_email.clone());
        incoming.memo = payload.message.clone();
        incoming.fee_this = Some(rust_decimal::Decimal::ZERO);

        let in_xid = match self.ledger.materialize_transfer(xid, incoming).await {
            Ok(in_xid) => in_xid,
            Err(WalletError::StaleTransition { .. }) => {
                // Crash between the ledger pair and the saga update
                let out = self.ledger.get(&TxLookup::Xid(xid)).await?;
                match (out.status, out.opposite_xid) {
                    (TxStatus::Done, Some(in_xid)) => {
                        info!(xid = xid, in_xid = in_xid, "Resuming already materialized transfer");
                        in_xid
                    }
                    _ => {
                        return self
                            .halt(
                                xid,
                                SagaStep::Recorded,
                                format!("TRANSFER_OUT row in status {}, expected PENDING", out.status),
                            )
                            .await;
                    }
                }
            }
            Err(e) => return Err(e),
        };

        if !self
            .sagas
            .update_step_with_in_xid(xid, SagaStep::Recorded, SagaStep::Materialized, in_xid)
            .await?
        {
            warn!(xid = xid, "Saga advanced concurrently, dropping pending event");
            return Ok(());
        }

        debug!(xid = xid, in_xid = in_xid, "Transfer materialized");
        self.bus
            .publish(SagaEvent::TransferMaterialized { xid })
            .await
    }

    /// Credit the recipient. Persist-before-call: a crash after the call
    /// leaves the saga in CREDITING for manual reconciliation.
    pub async fn handle_materialized(&self, xid: Xid) -> Result<(), WalletError> {
        let saga = self.load(xid).await?;
        if saga.step != SagaStep::Materialized {
            debug!(xid = xid, step = %saga.step, "Materialized event ignored");
            return Ok(());
        }
        let Some(in_xid) = saga.in_xid else {
            return self
                .halt(xid, SagaStep::Materialized, "materialized saga without in_xid".into())
                .await;
        };

        if !self
            .sagas
            .update_step_if(xid, SagaStep::Materialized, SagaStep::Crediting)
            .await?
        {
            return Ok(());
        }

        let p = &saga.payload;
        if let Err(e) = self
            .balances
            .credit(
                p.dst_uid,
                &p.asset_id,
                p.amount,
                BalanceReason::TransferReceived,
                in_xid,
            )
            .await
        {
            return self
                .halt(
                    xid,
                    SagaStep::Crediting,
                    format!("credit of in_xid {} failed: {}", in_xid, e),
                )
                .await;
        }

        if self
            .sagas
            .update_step_if(xid, SagaStep::Crediting, SagaStep::Credited)
            .await?
        {
            debug!(xid = xid, in_xid = in_xid, "Recipient credited");
            self.bus.publish(SagaEvent::TransferCredited { xid }).await?;
        }
        Ok(())
    }

    /// Commit the source lock and notify both parties. A failed commit is
    /// logged and not retried.
    pub async fn handle_credited(&self, xid: Xid) -> Result<(), WalletError> {
        let saga = self.load(xid).await?;
        if saga.step != SagaStep::Credited {
            debug!(xid = xid, step = %saga.step, "Credited event ignored");
            return Ok(());
        }
        if !self
            .sagas
            .update_step_if(xid, SagaStep::Credited, SagaStep::Committing)
            .await?
        {
            return Ok(());
        }

        let p = &saga.payload;
        match self
            .balances
            .commit(p.lock_id, BalanceReason::TransferDone, xid)
            .await
        {
            Ok(()) => {
                self.sagas
                    .update_step_if(xid, SagaStep::Committing, SagaStep::Done)
                    .await?;
                info!(xid = xid, "Transfer done");
            }
            Err(e) => {
                error!(
                    xid = xid,
                    lock_id = p.lock_id,
                    error = %e,
                    "Lock commit failed"
                );
                self.sagas
                    .update_step_with_error(
                        xid,
                        SagaStep::Committing,
                        SagaStep::CommitFailed,
                        &e.to_string(),
                    )
                    .await?;
            }
        }

        self.notify(p).await;
        Ok(())
    }

    async fn load(&self, xid: Xid) -> Result<SagaRecord, WalletError> {
        match self.sagas.get_saga(xid).await? {
            Some(saga) => Ok(saga),
            None => {
                error!(target: INTEGRITY_TARGET, marker = "DATA_INTEGRITY", xid = xid, "Event for unknown saga");
                Err(WalletError::DataIntegrity(format!("Saga {} not found", xid)))
            }
        }
    }

    /// Log a data-integrity violation and park the saga.
    async fn halt(&self, xid: Xid, expected: SagaStep, reason: String) -> Result<(), WalletError> {
        error!(
            target: INTEGRITY_TARGET,
            marker = "DATA_INTEGRITY",
            xid = xid,
            step = %expected,
            reason = %reason,
            "Transfer saga halted"
        );
        self.sagas
            .update_step_with_error(xid, expected, SagaStep::Halted, &reason)
            .await?;
        Err(WalletError::DataIntegrity(reason))
    }

    async fn notify(&self, p: &TransferPayload) {
        let amount = format_amount(p.amount);
        let memo = p.message.clone().unwrap_or_else(|| "-".to_string());
        let notifications = [
            Notification {
                uid: p.src_uid,
                email: p.src_email.clone(),
                template: MailTemplate::TransferOut,
                asset: p.asset_symbol.clone(),
                amount: amount.clone(),
                address: p.dst_email.clone(),
                memo: memo.clone(),
            },
            Notification {
                uid: p.dst_uid,
                email: p.dst_email.clone(),
                template: MailTemplate::TransferIn,
                asset: p.asset_symbol.clone(),
                amount,
                address: p.src_email.clone(),
                memo,
            },
        ];
        for n in notifications {
            let uid = n.uid;
            if let Err(e) = self.notifier.send(n).await {
                warn!(xid = p.out_xid, uid = uid, error = %e, "Notification failed");
            }
        }
    }
}
