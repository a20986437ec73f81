//! Internal transfer saga
//!
//! Moves funds between two accounts hosted by this wallet. Balances live in a
//! peer service reached only through `lock`/`credit`/`commit`, so the transfer
//! is a persisted state machine keyed by the TRANSFER_OUT row's xid.
//!
//! # Steps
//!
//! ```text
//! lock → OUT row (PENDING) → RECORDED ─pending─→ MATERIALIZED ─→ CREDITING ─→ CREDITED
//!                                                                   │             │
//!                                                                HALTED      COMMITTING ─→ DONE
//!                                                                                 │
//!                                                                           COMMIT_FAILED
//! ```
//!
//! # Invariants
//!
//! 1. **Lock first**: no ledger row exists without a balance reservation
//! 2. **Persist-before-call**: CREDITING and COMMITTING are written before the
//!    external call, so an unknown outcome is visible after a crash
//! 3. **Fenced materialization**: the OUT row's conditional `PENDING -> DONE`
//!    admits exactly one TRANSFER_IN row per transfer
//! 4. **No blind credit retry**: a saga stuck in CREDITING is halted, never
//!    re-credited

pub mod channel;
pub mod db;
pub mod saga;
pub mod state;
pub mod types;
pub mod worker;


pub use channel::{ChannelBus, EventBus, EventReceiver, event_channel};
pub use db::{PgSagaStore, SagaStore};
pub use saga::TransferSaga;
pub use state::SagaStep;
pub use types::{Recipient, SagaEvent, SagaRecord, TransferPayload, TransferRequest};
pub use worker::{RecoveryWorker, SagaWorker, WorkerConfig};
