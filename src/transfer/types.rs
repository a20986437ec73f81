//! Transfer request, persisted saga record and saga events

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::SagaStep;
use crate::core_types::{AssetId, LockId, UserId, Xid};
use crate::services::UserKey;

/// Who receives the funds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Uid(UserId),
    Email(String),
}

impl Recipient {
    pub fn to_key(&self) -> UserKey {
        match self {
            Recipient::Uid(uid) => UserKey::Uid(*uid),
            Recipient::Email(email) => UserKey::Email(email.clone()),
        }
    }
}

/// Caller input for an internal transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub src_uid: UserId,
    pub recipient: Recipient,
    pub asset_symbol: String,
    pub amount: Decimal,
    /// Free text shown to both parties; stored as the memo of both rows
    pub message: Option<String>,
    /// Skip truncation to the asset precision
    pub ignore_prec: bool,
}

impl TransferRequest {
    pub fn new(
        src_uid: UserId,
        recipient: Recipient,
        asset_symbol: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            src_uid,
            recipient,
            asset_symbol: asset_symbol.into(),
            amount,
            message: None,
            ignore_prec: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Everything later steps need, captured once at creation.
/// Idempotency key is `out_xid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub out_xid: Xid,
    pub src_uid: UserId,
    pub src_email: String,
    pub dst_uid: UserId,
    pub dst_email: String,
    pub asset_id: AssetId,
    pub asset_symbol: String,
    pub amount: Decimal,
    pub lock_id: LockId,
    pub message: Option<String>,
}

/// One `transfer_sagas` row
#[derive(Debug, Clone, PartialEq)]
pub struct SagaRecord {
    pub xid: Xid,
    pub step: SagaStep,
    pub in_xid: Option<Xid>,
    pub payload: TransferPayload,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SagaRecord {
    pub fn recorded(payload: TransferPayload) -> Self {
        let now = Utc::now();
        Self {
            xid: payload.out_xid,
            step: SagaStep::Recorded,
            in_xid: None,
            payload,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Messages driving the saga between steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SagaEvent {
    TransferPending(TransferPayload),
    TransferMaterialized { xid: Xid },
    TransferCredited { xid: Xid },
}

impl SagaEvent {
    pub fn xid(&self) -> Xid {
        match self {
            SagaEvent::TransferPending(p) => p.out_xid,
            SagaEvent::TransferMaterialized { xid } | SagaEvent::TransferCredited { xid } => *xid,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SagaEvent::TransferPending(_) => "transfer_pending",
            SagaEvent::TransferMaterialized { .. } => "transfer_materialized",
            SagaEvent::TransferCredited { .. } => "transfer_credited",
        }
    }
}
