//! PostgreSQL ledger (`wallet_transactions`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::service::LedgerStore;
use super::types::{LedgerTransaction, NewTransaction, TransitionPatch, TxFilter, TxStatus, TxType};
use crate::core_types::{LockId, UserId, Xid};
use crate::error::WalletError;
use crate::pagination::{Page, Paged};

const TX_COLUMNS: &str = "xid, uid, type, assetid, netid, amount, status, create_time, \
    address, memo, exec_time, confirmations, confirms_target, txid, height, \
    wd_fee_this, wd_fee_native, lockid, opposite_xid";

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_tx(row: &PgRow) -> Result<LedgerTransaction, WalletError> {
        let tx_type: String = row.try_get("type")?;
        let status: String = row.try_get("status")?;
        Ok(LedgerTransaction {
            xid: row.try_get::<i64, _>("xid")? as Xid,
            uid: row.try_get::<Option<i64>, _>("uid")?.map(|u| u as UserId),
            tx_type: tx_type
                .parse::<TxType>()
                .map_err(|_| WalletError::DataIntegrity(format!("Unknown type {}", tx_type)))?,
            asset_id: row.try_get("assetid")?,
            network_id: row.try_get("netid")?,
            amount: row.try_get("amount")?,
            status: status
                .parse::<TxStatus>()
                .map_err(|_| WalletError::DataIntegrity(format!("Unknown status {}", status)))?,
            create_time: row.try_get("create_time")?,
            address: row.try_get("address")?,
            memo: row.try_get("memo")?,
            exec_time: row.try_get("exec_time")?,
            confirmations: row.try_get::<Option<i32>, _>("confirmations")?.map(|c| c as u32),
            confirm_target: row
                .try_get::<Option<i32>, _>("confirms_target")?
                .map(|c| c as u32),
            external_tx_id: row.try_get("txid")?,
            height: row.try_get::<Option<i64>, _>("height")?.map(|h| h as u64),
            fee_this: row.try_get("wd_fee_this")?,
            fee_native: row.try_get("wd_fee_native")?,
            lock_id: row.try_get::<Option<i64>, _>("lockid")?.map(|l| l as LockId),
            opposite_xid: row.try_get::<Option<i64>, _>("opposite_xid")?.map(|x| x as Xid),
        })
    }

    async fn insert_in(
        conn: &mut Transaction<'_, Postgres>,
        tx: &NewTransaction,
        exec_time: Option<DateTime<Utc>>,
    ) -> Result<LedgerTransaction, WalletError> {
        let sql = format!(
            r#"
            INSERT INTO wallet_transactions (
                uid, type, assetid, netid, amount, status, address, memo,
                exec_time, confirmations, confirms_target, txid, height,
                wd_fee_this, wd_fee_native, lockid, opposite_xid
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {}
            "#,
            TX_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(tx.uid.map(|u| u as i64))
            .bind(tx.tx_type.as_str())
            .bind(&tx.asset_id)
            .bind(tx.network_id.as_deref())
            .bind(tx.amount)
            .bind(tx.status.as_str())
            .bind(tx.address.as_deref())
            .bind(tx.memo.as_deref())
            .bind(exec_time)
            .bind(tx.confirmations.map(|c| c as i32))
            .bind(tx.confirm_target.map(|c| c as i32))
            .bind(tx.external_tx_id.as_deref())
            .bind(tx.height.map(|h| h as i64))
            .bind(tx.fee_this)
            .bind(tx.fee_native)
            .bind(tx.lock_id.map(|l| l as i64))
            .bind(tx.opposite_xid.map(|x| x as i64))
            .fetch_one(&mut **conn)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => WalletError::Conflict(
                    format!(
                        "Transaction {} already recorded",
                        tx.external_tx_id.as_deref().unwrap_or("-")
                    ),
                ),
                _ => WalletError::from(e),
            })?;
        Self::row_to_tx(&row)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert(&self, tx: &NewTransaction) -> Result<LedgerTransaction, WalletError> {
        let mut conn = self.pool.begin().await?;
        let exec_time = tx.status.is_settled().then(Utc::now);
        let row = Self::insert_in(&mut conn, tx, exec_time).await?;
        conn.commit().await?;
        Ok(row)
    }

    async fn fetch(&self, xid: Xid) -> Result<Option<LedgerTransaction>, WalletError> {
        let sql = format!("SELECT {} FROM wallet_transactions WHERE xid = $1", TX_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(xid as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_tx).transpose()
    }

    async fn fetch_by_external(
        &self,
        network_id: &str,
        external_tx_id: &str,
    ) -> Result<Option<LedgerTransaction>, WalletError> {
        let sql = format!(
            "SELECT {} FROM wallet_transactions WHERE netid = $1 AND txid = $2",
            TX_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(network_id)
            .bind(external_tx_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_tx).transpose()
    }

    async fn transition(
        &self,
        xid: Xid,
        from: TxStatus,
        to: TxStatus,
        patch: &TransitionPatch,
    ) -> Result<bool, WalletError> {
        let result = sqlx::query(
            r#"
            UPDATE wallet_transactions
            SET status = $3,
                exec_time = COALESCE($4, exec_time),
                confirmations = COALESCE($5, confirmations),
                txid = COALESCE($6, txid),
                height = COALESCE($7, height),
                wd_fee_native = COALESCE($8, wd_fee_native),
                opposite_xid = COALESCE($9, opposite_xid)
            WHERE xid = $1 AND status = $2
            "#,
        )
        .bind(xid as i64)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(patch.exec_time)
        .bind(patch.confirmations.map(|c| c as i32))
        .bind(patch.external_tx_id.as_deref())
        .bind(patch.height.map(|h| h as i64))
        .bind(patch.fee_native)
        .bind(patch.opposite_xid.map(|x| x as i64))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn pair_transfer(
        &self,
        out_xid: Xid,
        incoming: &NewTransaction,
        exec_time: DateTime<Utc>,
    ) -> Result<Option<Xid>, WalletError> {
        let mut conn = self.pool.begin().await?;

        // Row lock on the OUT leg serializes concurrent deliveries
        let fenced = sqlx::query(
            r#"
            UPDATE wallet_transactions
            SET status = 'DONE', exec_time = $2
            WHERE xid = $1 AND type = 'TRANSFER_OUT' AND status = 'PENDING'
            "#,
        )
        .bind(out_xid as i64)
        .bind(exec_time)
        .execute(&mut *conn)
        .await?;

        if fenced.rows_affected() == 0 {
            conn.rollback().await?;
            return Ok(None);
        }

        let in_row = Self::insert_in(&mut conn, incoming, Some(exec_time)).await?;

        sqlx::query("UPDATE wallet_transactions SET opposite_xid = $2 WHERE xid = $1")
            .bind(out_xid as i64)
            .bind(in_row.xid as i64)
            .execute(&mut *conn)
            .await?;

        conn.commit().await?;
        Ok(Some(in_row.xid))
    }

    async fn query(
        &self,
        filter: &TxFilter,
        page: &Page,
    ) -> Result<Paged<LedgerTransaction>, WalletError> {
        let types: Option<Vec<String>> = (!filter.types.is_empty())
            .then(|| filter.types.iter().map(|t| t.as_str().to_string()).collect());
        let statuses: Option<Vec<String>> = (!filter.statuses.is_empty())
            .then(|| filter.statuses.iter().map(|s| s.as_str().to_string()).collect());

        let sql = format!(
            r#"
            SELECT {}
            FROM wallet_transactions
            WHERE ($1::BIGINT IS NULL OR uid = $1)
              AND ($2::TEXT[] IS NULL OR type = ANY($2))
              AND ($3::TEXT[] IS NULL OR status = ANY($3))
              AND ($4::TEXT IS NULL OR assetid = $4)
              AND ($5::TEXT IS NULL OR netid = $5)
              AND ($6::TEXT IS NULL OR address = $6)
              AND (NOT $7::BOOLEAN OR memo IS NOT DISTINCT FROM $8::TEXT)
            ORDER BY xid DESC
            OFFSET $9 LIMIT $10
            "#,
            TX_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.uid.map(|u| u as i64))
            .bind(types)
            .bind(statuses)
            .bind(filter.asset_id.as_deref())
            .bind(filter.network_id.as_deref())
            .bind(filter.address.as_deref())
            .bind(filter.memo.is_some())
            .bind(filter.memo.clone().flatten())
            .bind(page.offset as i64)
            .bind(page.fetch_limit() as i64)
            .fetch_all(&self.pool)
            .await?;

        let txs = rows
            .iter()
            .map(Self::row_to_tx)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paged::from_overfetch(txs, page))
    }
}
