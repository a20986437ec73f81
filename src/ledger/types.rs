//! Ledger row types and the status state machine
//!
//! ```text
//! PENDING ──> PROCESSING ──> CONFIRM_PENDING ──> DONE
//!    │  │          │
//!    │  └──> DONE  └──> BLOCKED
//!    ├──> BLOCKED
//!    └──> CANCEL_PENDING ──> CANCELED
//!              └──> PROCESSING   (cancel refused by broadcaster)
//!
//! any state except DROPPED ──> DROPPED   (abnormal)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AssetId, LockId, NetworkId, UserId, Xid};
use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Deposit => "DEPOSIT",
            TxType::Withdrawal => "WITHDRAWAL",
            TxType::TransferIn => "TRANSFER_IN",
            TxType::TransferOut => "TRANSFER_OUT",
        }
    }

    /// Incoming rows may be born settled; outgoing rows always start pending.
    pub fn allows_initial(&self, status: TxStatus) -> bool {
        match self {
            TxType::Deposit | TxType::TransferIn => {
                matches!(status, TxStatus::Pending | TxStatus::Done)
            }
            TxType::Withdrawal | TxType::TransferOut => status == TxStatus::Pending,
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(TxType::Deposit),
            "WITHDRAWAL" => Ok(TxType::Withdrawal),
            "TRANSFER_IN" => Ok(TxType::TransferIn),
            "TRANSFER_OUT" => Ok(TxType::TransferOut),
            other => Err(WalletError::validation("type", format!("unknown type {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Pending,
    Processing,
    ConfirmPending,
    Done,
    CancelPending,
    Canceled,
    Blocked,
    Dropped,
}

impl TxStatus {
    pub const ALL: [TxStatus; 8] = [
        TxStatus::Pending,
        TxStatus::Processing,
        TxStatus::ConfirmPending,
        TxStatus::Done,
        TxStatus::CancelPending,
        TxStatus::Canceled,
        TxStatus::Blocked,
        TxStatus::Dropped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Processing => "PROCESSING",
            TxStatus::ConfirmPending => "CONFIRM_PENDING",
            TxStatus::Done => "DONE",
            TxStatus::CancelPending => "CANCEL_PENDING",
            TxStatus::Canceled => "CANCELED",
            TxStatus::Blocked => "BLOCKED",
            TxStatus::Dropped => "DROPPED",
        }
    }

    /// No further regular processing (DROPPED is still reachable).
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Done | TxStatus::Canceled | TxStatus::Dropped)
    }

    /// Statuses that stamp `exec_time`
    #[inline]
    pub fn is_settled(&self) -> bool {
        matches!(self, TxStatus::Done | TxStatus::Canceled)
    }

    pub fn can_transition_to(&self, to: TxStatus) -> bool {
        use TxStatus::*;
        match (self, to) {
            (Dropped, _) => false,
            (_, Dropped) => true,
            (Pending, Processing | Done | CancelPending | Blocked) => true,
            (Processing, ConfirmPending | Blocked) => true,
            (ConfirmPending, Done) => true,
            (CancelPending, Canceled | Processing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TxStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| WalletError::validation("status", format!("unknown status {}", s)))
    }
}

/// One `wallet_transactions` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub xid: Xid,
    pub uid: Option<UserId>,
    pub tx_type: TxType,
    pub asset_id: AssetId,
    pub network_id: Option<NetworkId>,
    pub amount: Decimal,
    pub status: TxStatus,
    pub create_time: DateTime<Utc>,
    /// On-chain address, or counterparty email for internal transfers
    pub address: Option<String>,
    pub memo: Option<String>,
    pub exec_time: Option<DateTime<Utc>>,
    pub confirmations: Option<u32>,
    pub confirm_target: Option<u32>,
    pub external_tx_id: Option<String>,
    pub height: Option<u64>,
    pub fee_this: Option<Decimal>,
    pub fee_native: Option<Decimal>,
    pub lock_id: Option<LockId>,
    pub opposite_xid: Option<Xid>,
}

/// Insert payload. `xid` and `create_time` are assigned by storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub uid: Option<UserId>,
    pub tx_type: TxType,
    pub asset_id: AssetId,
    pub network_id: Option<NetworkId>,
    pub amount: Decimal,
    pub status: TxStatus,
    pub address: Option<String>,
    pub memo: Option<String>,
    pub confirmations: Option<u32>,
    pub confirm_target: Option<u32>,
    pub external_tx_id: Option<String>,
    pub height: Option<u64>,
    pub fee_this: Option<Decimal>,
    pub fee_native: Option<Decimal>,
    pub lock_id: Option<LockId>,
    pub opposite_xid: Option<Xid>,
}

impl NewTransaction {
    pub fn new(tx_type: TxType, asset_id: impl Into<AssetId>, amount: Decimal, status: TxStatus) -> Self {
        Self {
            uid: None,
            tx_type,
            asset_id: asset_id.into(),
            network_id: None,
            amount,
            status,
            address: None,
            memo: None,
            confirmations: None,
            confirm_target: None,
            external_tx_id: None,
            height: None,
            fee_this: None,
            fee_native: None,
            lock_id: None,
            opposite_xid: None,
        }
    }

    /// Materialize a row as storage would, for in-process stores.
    pub fn into_row(self, xid: Xid, now: DateTime<Utc>) -> LedgerTransaction {
        LedgerTransaction {
            xid,
            uid: self.uid,
            tx_type: self.tx_type,
            asset_id: self.asset_id,
            network_id: self.network_id,
            amount: self.amount,
            status: self.status,
            create_time: now,
            address: self.address,
            memo: self.memo,
            exec_time: self.status.is_settled().then_some(now),
            confirmations: self.confirmations,
            confirm_target: self.confirm_target,
            external_tx_id: self.external_tx_id,
            height: self.height,
            fee_this: self.fee_this,
            fee_native: self.fee_native,
            lock_id: self.lock_id,
            opposite_xid: self.opposite_xid,
        }
    }
}

/// Optional fields written together with a status change. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPatch {
    pub exec_time: Option<DateTime<Utc>>,
    pub confirmations: Option<u32>,
    pub external_tx_id: Option<String>,
    pub height: Option<u64>,
    pub fee_native: Option<Decimal>,
    pub opposite_xid: Option<Xid>,
}

impl TransitionPatch {
    pub fn apply(&self, row: &mut LedgerTransaction) {
        if let Some(t) = self.exec_time {
            row.exec_time = Some(t);
        }
        if let Some(c) = self.confirmations {
            row.confirmations = Some(c);
        }
        if let Some(id) = &self.external_tx_id {
            row.external_tx_id = Some(id.clone());
        }
        if let Some(h) = self.height {
            row.height = Some(h);
        }
        if let Some(f) = self.fee_native {
            row.fee_native = Some(f);
        }
        if let Some(x) = self.opposite_xid {
            row.opposite_xid = Some(x);
        }
    }
}

/// Single-row lookup: by xid, or by (network, external tx id). Never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxLookup {
    Xid(Xid),
    External {
        network_id: NetworkId,
        external_tx_id: String,
    },
}

impl TxLookup {
    pub fn from_parts(
        xid: Option<Xid>,
        network_id: Option<&str>,
        external_tx_id: Option<&str>,
    ) -> Result<Self, WalletError> {
        match (xid, external_tx_id) {
            (Some(_), Some(_)) => Err(WalletError::ArgumentConflict(
                "Both xid and txid are set".into(),
            )),
            (Some(xid), None) => Ok(TxLookup::Xid(xid)),
            (None, Some(txid)) => match network_id {
                Some(net) => Ok(TxLookup::External {
                    network_id: net.to_string(),
                    external_tx_id: txid.to_string(),
                }),
                None => Err(WalletError::MissingData(
                    "netid is required if txid is set".into(),
                )),
            },
            (None, None) => Err(WalletError::MissingData("xid or txid".into())),
        }
    }
}

impl fmt::Display for TxLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxLookup::Xid(xid) => write!(f, "{}", xid),
            TxLookup::External {
                network_id,
                external_tx_id,
            } => write!(f, "{}:{}", network_id, external_tx_id),
        }
    }
}

/// Ledger query filter. Empty sets mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxFilter {
    pub uid: Option<UserId>,
    pub types: Vec<TxType>,
    pub statuses: Vec<TxStatus>,
    pub asset_id: Option<AssetId>,
    pub network_id: Option<NetworkId>,
    pub address: Option<String>,
    /// `Some(None)` selects rows without memo
    pub memo: Option<Option<String>>,
}

impl TxFilter {
    pub fn for_user(uid: UserId) -> Self {
        Self {
            uid: Some(uid),
            ..Default::default()
        }
    }

    pub fn matches(&self, row: &LedgerTransaction) -> bool {
        self.uid.is_none_or(|u| row.uid == Some(u))
            && (self.types.is_empty() || self.types.contains(&row.tx_type))
            && (self.statuses.is_empty() || self.statuses.contains(&row.status))
            && self.asset_id.as_ref().is_none_or(|a| &row.asset_id == a)
            && self
                .network_id
                .as_ref()
                .is_none_or(|n| row.network_id.as_ref() == Some(n))
            && self
                .address
                .as_ref()
                .is_none_or(|a| row.address.as_ref() == Some(a))
            && self.memo.as_ref().is_none_or(|m| &row.memo == m)
    }
}
