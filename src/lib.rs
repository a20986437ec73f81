//! wallet_io - crypto wallet ledger core
//!
//! Deposit address pools, node liveness, fee resolution, the transaction
//! ledger, the internal transfer saga and withdrawal validation.
//!
//! ```text
//!            ┌──────────────┐
//! caller ───▶│  WalletCore  │
//!            └──────┬───────┘
//!   ┌─────────┬─────┴─────┬──────────────┬───────────────┐
//!   ▼         ▼           ▼              ▼               ▼
//! Liveness  Networks   Allocator   TransferSaga   WithdrawalOrchestrator
//!   │         │           │              │               │
//!   └─────────┴───────────┴──── Ledger ──┴───────────────┘
//! ```
//!
//! Every component reaches storage through a store trait with a PostgreSQL
//! implementation and the in-process [`memory::MemoryStore`].

pub mod app;
pub mod config;
pub mod core_types;
pub mod db;
pub mod deposit;
pub mod error;
pub mod fee;
pub mod ledger;
pub mod liveness;
pub mod logging;
pub mod memory;
pub mod money;
pub mod network;
pub mod pagination;
pub mod services;
pub mod transfer;
pub mod validation;
pub mod withdrawal;

pub use app::{Collaborators, NetworkFee, Stores, WalletCore};
pub use error::WalletError;

/// Git commit the crate was built from
pub const BUILD_GIT_HASH: &str = env!("GIT_HASH");
