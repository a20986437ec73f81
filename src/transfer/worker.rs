//! Saga workers
//!
//! `SagaWorker` drains the event bus; `RecoveryWorker` periodically scans for
//! sagas that stopped moving and either re-publishes their next event or
//! parks them for manual reconciliation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::channel::{EventBus, EventReceiver};
use super::db::SagaStore;
use super::saga::TransferSaga;
use super::state::SagaStep;
use super::types::{SagaEvent, SagaRecord};
use crate::config::RecoveryConfig;
use crate::error::WalletError;
use crate::logging::INTEGRITY_TARGET;

/// Consumes saga events until the bus closes.
pub struct SagaWorker {
    saga: Arc<TransferSaga>,
    events: EventReceiver,
}

impl std::fmt::Debug for SagaWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaWorker").finish_non_exhaustive()
    }
}

impl SagaWorker {
    pub fn new(saga: Arc<TransferSaga>, events: EventReceiver) -> Self {
        Self { saga, events }
    }

    pub async fn run(mut self) {
        info!("Starting saga worker");
        while let Some(event) = self.events.recv().await {
            let xid = event.xid();
            let name = event.name();
            if let Err(e) = self.saga.handle(event).await {
                error!(xid = xid, event = name, error = %e, "Saga step failed");
            }
        }
        info!("Saga event bus closed, saga worker stopped");
    }

    /// Handle every event already queued. Returns how many were handled.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.try_recv() {
            let xid = event.xid();
            if let Err(e) = self.saga.handle(event).await {
                debug!(xid = xid, error = %e, "Saga step failed during drain");
            }
            handled += 1;
        }
        handled
    }
}

/// Configuration for the recovery worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to scan for stale sagas
    pub scan_interval: Duration,
    /// How long a saga must be idle to be considered stale
    pub stale_threshold: Duration,
    /// Maximum sagas to process per scan
    pub batch_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&RecoveryConfig::default())
    }
}

impl From<&RecoveryConfig> for WorkerConfig {
    fn from(config: &RecoveryConfig) -> Self {
        Self {
            scan_interval: Duration::from_millis(config.scan_interval_ms),
            stale_threshold: Duration::from_secs(config.stale_threshold_secs),
            batch_size: config.batch_size,
        }
    }
}

pub struct RecoveryWorker {
    sagas: Arc<dyn SagaStore>,
    bus: Arc<dyn EventBus>,
    config: WorkerConfig,
}

impl RecoveryWorker {
    pub fn new(sagas: Arc<dyn SagaStore>, bus: Arc<dyn EventBus>, config: WorkerConfig) -> Self {
        Self { sagas, bus, config }
    }

    /// Runs forever, scanning every `scan_interval`.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_ms = self.config.scan_interval.as_millis() as u64,
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            "Starting recovery worker"
        );

        loop {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan. Returns the number of sagas acted on.
    pub async fn scan_and_recover(&self) -> Result<usize, WalletError> {
        let stale = self
            .sagas
            .find_stale(self.config.stale_threshold, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale sagas found");
            return Ok(0);
        }

        info!(count = stale.len(), "Found stale sagas to recover");

        let mut recovered = 0;
        for saga in stale {
            match self.recover(&saga).await {
                Ok(true) => recovered += 1,
                Ok(false) => {}
                Err(e) => error!(xid = saga.xid, step = %saga.step, error = %e, "Failed to recover saga"),
            }
        }

        if recovered > 0 {
            info!(count = recovered, "Recovered sagas this scan");
        }
        Ok(recovered)
    }

    async fn recover(&self, saga: &SagaRecord) -> Result<bool, WalletError> {
        if saga.step.is_in_flight() {
            return self.park(saga).await;
        }
        let xid = saga.xid;
        let event = match saga.step {
            SagaStep::Recorded => SagaEvent::TransferPending(saga.payload.clone()),
            SagaStep::Materialized => SagaEvent::TransferMaterialized { xid },
            SagaStep::Credited => SagaEvent::TransferCredited { xid },
            _ => return Ok(false),
        };

        debug!(xid = xid, step = %saga.step, event = event.name(), "Re-publishing saga event");
        self.bus.publish(event).await?;
        Ok(true)
    }

    /// In-flight sagas are never retried: the external outcome is unknown.
    async fn park(&self, saga: &SagaRecord) -> Result<bool, WalletError> {
        let xid = saga.xid;
        match saga.step {
            SagaStep::Crediting => {
                // A blind retry could pay twice
                error!(
                    target: INTEGRITY_TARGET,
                    marker = "DATA_INTEGRITY",
                    xid = xid,
                    in_xid = ?saga.in_xid,
                    "Saga stuck in CREDITING, halting for reconciliation"
                );
                self.sagas
                    .update_step_with_error(
                        xid,
                        SagaStep::Crediting,
                        SagaStep::Halted,
                        "credit outcome unknown",
                    )
                    .await
            }
            SagaStep::Committing => {
                warn!(
                    xid = xid,
                    lock_id = saga.payload.lock_id,
                    "Saga stuck in COMMITTING, marking commit failed"
                );
                self.sagas
                    .update_step_with_error(
                        xid,
                        SagaStep::Committing,
                        SagaStep::CommitFailed,
                        "commit outcome unknown",
                    )
                    .await
            }
            _ => Ok(false),
        }
    }
}
