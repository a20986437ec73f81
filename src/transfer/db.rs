//! Saga persistence (`transfer_sagas`)
//!
//! Every step change is a compare-and-set on the expected step, so two
//! deliveries of the same event cannot both advance a saga.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::state::SagaStep;
use super::types::{SagaRecord, TransferPayload};
use crate::core_types::Xid;
use crate::error::WalletError;

#[async_trait]
pub trait SagaStore: Send + Sync {
    /// False when a saga for this xid already exists.
    async fn insert_saga(&self, record: &SagaRecord) -> Result<bool, WalletError>;

    async fn get_saga(&self, xid: Xid) -> Result<Option<SagaRecord>, WalletError>;

    async fn update_step_if(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
    ) -> Result<bool, WalletError>;

    async fn update_step_with_in_xid(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
        in_xid: Xid,
    ) -> Result<bool, WalletError>;

    async fn update_step_with_error(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
        error: &str,
    ) -> Result<bool, WalletError>;

    /// Non-terminal sagas not touched for `threshold`, oldest first.
    async fn find_stale(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<SagaRecord>, WalletError>;
}

const SAGA_COLUMNS: &str = "xid, step, in_xid, payload, error_message, created_at, updated_at";

pub struct PgSagaStore {
    pool: PgPool,
}

impl PgSagaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<SagaRecord, WalletError> {
        let step_id: i16 = row.try_get("step")?;
        let step = SagaStep::from_id(step_id)
            .ok_or_else(|| WalletError::DataIntegrity(format!("Invalid saga step {}", step_id)))?;
        let payload: String = row.try_get("payload")?;
        let payload: TransferPayload = serde_json::from_str(&payload)?;

        Ok(SagaRecord {
            xid: row.try_get::<i64, _>("xid")? as Xid,
            step,
            in_xid: row.try_get::<Option<i64>, _>("in_xid")?.map(|x| x as Xid),
            payload,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl SagaStore for PgSagaStore {
    async fn insert_saga(&self, record: &SagaRecord) -> Result<bool, WalletError> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| WalletError::Unknown(format!("Payload encoding failed: {}", e)))?;
        let result = sqlx::query(
            r#"
            INSERT INTO transfer_sagas (xid, step, in_xid, payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (xid) DO NOTHING
            "#,
        )
        .bind(record.xid as i64)
        .bind(record.step.id())
        .bind(record.in_xid.map(|x| x as i64))
        .bind(payload)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_saga(&self, xid: Xid) -> Result<Option<SagaRecord>, WalletError> {
        let sql = format!("SELECT {} FROM transfer_sagas WHERE xid = $1", SAGA_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(xid as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn update_step_if(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
    ) -> Result<bool, WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_sagas
            SET step = $3, updated_at = NOW()
            WHERE xid = $1 AND step = $2
            "#,
        )
        .bind(xid as i64)
        .bind(expected.id())
        .bind(new.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_step_with_in_xid(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
        in_xid: Xid,
    ) -> Result<bool, WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_sagas
            SET step = $3, in_xid = $4, updated_at = NOW()
            WHERE xid = $1 AND step = $2
            "#,
        )
        .bind(xid as i64)
        .bind(expected.id())
        .bind(new.id())
        .bind(in_xid as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_step_with_error(
        &self,
        xid: Xid,
        expected: SagaStep,
        new: SagaStep,
        error: &str,
    ) -> Result<bool, WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_sagas
            SET step = $3, error_message = $4, updated_at = NOW()
            WHERE xid = $1 AND step = $2
            "#,
        )
        .bind(xid as i64)
        .bind(expected.id())
        .bind(new.id())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_stale(
        &self,
        threshold: Duration,
        limit: usize,
    ) -> Result<Vec<SagaRecord>, WalletError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold)
                .map_err(|e| WalletError::validation("stale_threshold", e.to_string()))?;
        let sql = format!(
            r#"
            SELECT {}
            FROM transfer_sagas
            WHERE step = ANY($1)
              AND updated_at <= $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#,
            SAGA_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(SagaStep::active_ids().to_vec())
            .bind(cutoff)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}
