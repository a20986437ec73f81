//! Deposit addresses and the deposit screen

pub mod allocator;
pub mod db;
pub mod service;

pub use allocator::{AddressAllocator, AddressFilter, AddressStore, ClaimOutcome, DepositAddress};
pub use db::PgAddressStore;
pub use service::{DepositInfo, DepositService};
