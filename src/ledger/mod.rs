//! Wallet transaction ledger
//!
//! Rows are created by their owning operation (deposit detection, withdrawal
//! creation, transfer creation) and only ever change status through
//! [`Ledger::transition`] or [`Ledger::materialize_transfer`].

pub mod db;
pub mod service;
pub mod types;

pub use db::PgLedgerStore;
pub use service::{Ledger, LedgerStore};
pub use types::{
    LedgerTransaction, NewTransaction, TransitionPatch, TxFilter, TxLookup, TxStatus, TxType,
};
