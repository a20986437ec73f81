//! Core types used throughout the system
//!
//! These are the identifier aliases shared by every component. Asset and
//! network identifiers are symbols (`BTC`, `ETH`, `BSC_BEP20`), everything
//! else is a numeric id assigned by storage or by a peer service.

/// User ID - owned by the account service, immutable after assignment.
pub type UserId = u64;

/// Asset ID - symbol-like identifier owned by the asset service.
pub type AssetId = String;

/// Network ID - doubles as the network symbol (`^[A-Z0-9_]{1,32}$`).
pub type NetworkId = String;

/// Shard number within a network.
pub type ShardNo = u32;

/// Wallet node ID (signing/broadcasting process).
pub type NodeId = u64;

/// Deposit address row ID.
pub type AddrId = u64;

/// Ledger transaction ID (`wallet_transactions.xid`).
///
/// Also the idempotency key of every transfer saga step.
pub type Xid = u64;

/// Balance reservation ID returned by the balance service `lock` call.
///
/// Opaque to this crate: only stored and passed back on `commit`.
pub type LockId = u64;
