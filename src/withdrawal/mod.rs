//! Withdrawal validation, creation and cancellation
//!
//! Execution on chain belongs to a [`Broadcaster`]; this module only decides
//! whether a withdrawal may exist and records it.

pub mod orchestrator;
pub mod validator;

pub use orchestrator::{
    Broadcaster, LogBroadcaster, TargetCheck, WithdrawalOrchestrator, WithdrawalPreflight,
    WithdrawalRequest,
};
pub use validator::{AddressFormat, AddressFormatValidator, TargetValidator, TargetValidity};
