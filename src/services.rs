//! Collaborator contracts
//!
//! The wallet core does not own assets, users, balances or outbound mail.
//! Peer services provide them through the traits below; the wallet only relies
//! on the guarantees documented on each method.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AssetId, LockId, UserId, Xid};
use crate::error::WalletError;

// ============================================================================
// Assets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: AssetId,
    pub symbol: String,
    pub name: String,
    pub enabled: bool,
    /// Display and truncation precision
    pub default_prec: u32,
    /// Asset-wide deposit floor, if any
    pub min_deposit: Option<Decimal>,
    /// Asset-wide withdrawal floor, if any
    pub min_withdrawal: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKey {
    Id(AssetId),
    Symbol(String),
}

#[async_trait]
pub trait AssetDirectory: Send + Sync {
    /// `NotFound` when the asset does not exist.
    async fn get_asset(&self, key: &AssetKey) -> Result<Asset, WalletError>;
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserKey {
    Uid(UserId),
    Email(String),
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// `NotFound` when the user does not exist.
    async fn get_user(&self, key: &UserKey) -> Result<User, WalletError>;
}

// ============================================================================
// Balances
// ============================================================================

/// Reason tag recorded by the balance service with every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceReason {
    TransferCreate,
    TransferReceived,
    TransferDone,
    WithdrawalCreate,
}

impl BalanceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceReason::TransferCreate => "TRANSFER_CREATE",
            BalanceReason::TransferReceived => "TRANSFER_RECEIVED",
            BalanceReason::TransferDone => "TRANSFER_DONE",
            BalanceReason::WithdrawalCreate => "WITHDRAWAL_CREATE",
        }
    }
}

/// Balance ledger owned by a peer service.
///
/// `credit` and `commit` take the ledger xid as context; the wallet assumes
/// nothing about their idempotency and never retries them blindly.
#[async_trait]
pub trait BalanceService: Send + Sync {
    /// Reserve `amount` of the user's available balance.
    async fn lock(
        &self,
        uid: UserId,
        asset_id: &str,
        amount: Decimal,
        reason: BalanceReason,
    ) -> Result<LockId, WalletError>;

    async fn credit(
        &self,
        uid: UserId,
        asset_id: &str,
        amount: Decimal,
        reason: BalanceReason,
        context: Xid,
    ) -> Result<(), WalletError>;

    /// Finalize a reservation made by `lock`.
    async fn commit(
        &self,
        lock_id: LockId,
        reason: BalanceReason,
        context: Xid,
    ) -> Result<(), WalletError>;
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTemplate {
    TransferOut,
    TransferIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub uid: UserId,
    pub email: String,
    pub template: MailTemplate,
    pub asset: String,
    pub amount: String,
    /// Counterparty email
    pub address: String,
    /// `-` when the transfer carried no message
    pub memo: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), WalletError>;
}

/// Notifier that only logs. Used when no mail transport is wired.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), WalletError> {
        tracing::info!(
            uid = notification.uid,
            template = ?notification.template,
            asset = %notification.asset,
            amount = %notification.amount,
            "Notification dispatched"
        );
        Ok(())
    }
}

// ============================================================================
// Test doubles
// ============================================================================

#[cfg(test)]
pub mod mock {
    //! Collaborator doubles with call counters and failure switches.

    use super::*;
    use rustc_hash::FxHashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    /// In-memory asset and user directory.
    #[derive(Default)]
    pub struct StaticDirectory {
        assets: Mutex<Vec<Asset>>,
        users: Mutex<Vec<User>>,
    }

    impl StaticDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_asset(self, asset: Asset) -> Self {
            self.assets.lock().unwrap().push(asset);
            self
        }

        pub fn with_user(self, uid: UserId, email: &str) -> Self {
            self.users.lock().unwrap().push(User {
                uid,
                email: email.to_string(),
            });
            self
        }

        pub fn set_asset_enabled(&self, asset_id: &str, enabled: bool) {
            for a in self.assets.lock().unwrap().iter_mut() {
                if a.asset_id == asset_id {
                    a.enabled = enabled;
                }
            }
        }
    }

    #[async_trait]
    impl AssetDirectory for StaticDirectory {
        async fn get_asset(&self, key: &AssetKey) -> Result<Asset, WalletError> {
            let assets = self.assets.lock().unwrap();
            assets
                .iter()
                .find(|a| match key {
                    AssetKey::Id(id) => &a.asset_id == id,
                    AssetKey::Symbol(s) => &a.symbol == s,
                })
                .cloned()
                .ok_or_else(|| WalletError::NotFound("Asset not found".into()))
        }
    }

    #[async_trait]
    impl AccountDirectory for StaticDirectory {
        async fn get_user(&self, key: &UserKey) -> Result<User, WalletError> {
            let users = self.users.lock().unwrap();
            users
                .iter()
                .find(|u| match key {
                    UserKey::Uid(uid) => u.uid == *uid,
                    UserKey::Email(e) => &u.email == e,
                })
                .cloned()
                .ok_or_else(|| WalletError::NotFound("User not found".into()))
        }
    }

    /// Balance service double
    pub struct MockBalanceService {
        next_lock: AtomicU64,
        pub lock_calls: AtomicU64,
        pub credit_calls: AtomicU64,
        pub commit_calls: AtomicU64,
        pub fail_lock: AtomicBool,
        pub fail_credit: AtomicBool,
        pub fail_commit: AtomicBool,
        /// (uid, asset, amount) per successful credit
        pub credits: Mutex<Vec<(UserId, String, Decimal)>>,
        /// lock_id -> amount for outstanding reservations
        pub locks: Mutex<FxHashMap<LockId, (UserId, Decimal)>>,
    }

    impl Default for MockBalanceService {
        fn default() -> Self {
            Self {
                next_lock: AtomicU64::new(500),
                lock_calls: AtomicU64::new(0),
                credit_calls: AtomicU64::new(0),
                commit_calls: AtomicU64::new(0),
                fail_lock: AtomicBool::new(false),
                fail_credit: AtomicBool::new(false),
                fail_commit: AtomicBool::new(false),
                credits: Mutex::new(Vec::new()),
                locks: Mutex::new(FxHashMap::default()),
            }
        }
    }

    impl MockBalanceService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lock_count(&self) -> u64 {
            self.lock_calls.load(Ordering::SeqCst)
        }

        pub fn credit_count(&self) -> u64 {
            self.credit_calls.load(Ordering::SeqCst)
        }

        pub fn commit_count(&self) -> u64 {
            self.commit_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BalanceService for MockBalanceService {
        async fn lock(
            &self,
            uid: UserId,
            _asset_id: &str,
            amount: Decimal,
            _reason: BalanceReason,
        ) -> Result<LockId, WalletError> {
            self.lock_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_lock.load(Ordering::SeqCst) {
                return Err(WalletError::Unknown("Insufficient balance".into()));
            }
            let lock_id = self.next_lock.fetch_add(1, Ordering::SeqCst);
            self.locks.lock().unwrap().insert(lock_id, (uid, amount));
            Ok(lock_id)
        }

        async fn credit(
            &self,
            uid: UserId,
            asset_id: &str,
            amount: Decimal,
            _reason: BalanceReason,
            _context: Xid,
        ) -> Result<(), WalletError> {
            self.credit_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_credit.load(Ordering::SeqCst) {
                return Err(WalletError::Unknown("credit timed out".into()));
            }
            self.credits
                .lock()
                .unwrap()
                .push((uid, asset_id.to_string(), amount));
            Ok(())
        }

        async fn commit(
            &self,
            lock_id: LockId,
            _reason: BalanceReason,
            _context: Xid,
        ) -> Result<(), WalletError> {
            self.commit_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(WalletError::Unknown("commit rejected".into()));
            }
            self.locks.lock().unwrap().remove(&lock_id);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: Notification) -> Result<(), WalletError> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_tags() {
        assert_eq!(BalanceReason::TransferCreate.as_str(), "TRANSFER_CREATE");
        assert_eq!(BalanceReason::TransferReceived.as_str(), "TRANSFER_RECEIVED");
        assert_eq!(BalanceReason::TransferDone.as_str(), "TRANSFER_DONE");
    }

    #[test]
    fn test_mail_template_serde() {
        let json = serde_json::to_string(&MailTemplate::TransferOut).unwrap();
        assert_eq!(json, "\"transfer_out\"");
    }
}
