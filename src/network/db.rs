//! PostgreSQL network store (`networks`, `asset_network`, `wallet_shards`)

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use super::models::{AssetNetworkPairing, Network, PairingFilter, Shard};
use super::registry::NetworkStore;
use crate::core_types::ShardNo;
use crate::error::WalletError;
use crate::pagination::{Page, Paged};

const NETWORK_COLUMNS: &str = r#"
    netid, description, icon_url, native_assetid, confirms_target, enabled,
    memo_name, native_qr_format, token_qr_format, deposit_warning,
    withdrawal_warning, block_deposits_msg, block_withdrawals_msg
"#;

const PAIRING_COLUMNS: &str = r#"
    an.assetid, an.netid, an.prec, an.enabled, an.contract,
    an.min_deposit, an.min_withdrawal, an.wd_fee_base, an.wd_fee_min, an.wd_fee_max,
    an.deposit_warning, an.withdrawal_warning, an.block_deposits_msg, an.block_withdrawals_msg
"#;

pub struct PgNetworkStore {
    pool: PgPool,
}

impl PgNetworkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_network(row: &sqlx::postgres::PgRow) -> Result<Network, WalletError> {
        Ok(Network {
            network_id: row.try_get("netid")?,
            name: row.try_get("description")?,
            icon_url: row.try_get("icon_url")?,
            native_asset_id: row.try_get("native_assetid")?,
            confirm_target: row.try_get::<i32, _>("confirms_target")? as u32,
            enabled: row.try_get("enabled")?,
            memo_name: row.try_get("memo_name")?,
            qr_template_native: row.try_get("native_qr_format")?,
            qr_template_token: row.try_get("token_qr_format")?,
            deposit_warning: row.try_get("deposit_warning")?,
            withdrawal_warning: row.try_get("withdrawal_warning")?,
            block_deposits_msg: row.try_get("block_deposits_msg")?,
            block_withdrawals_msg: row.try_get("block_withdrawals_msg")?,
        })
    }

    fn row_to_pairing(row: &sqlx::postgres::PgRow) -> Result<AssetNetworkPairing, WalletError> {
        Ok(AssetNetworkPairing {
            asset_id: row.try_get("assetid")?,
            network_id: row.try_get("netid")?,
            enabled: row.try_get("enabled")?,
            contract: row.try_get("contract")?,
            precision: row.try_get::<i32, _>("prec")? as u32,
            min_deposit: row.try_get("min_deposit")?,
            min_withdrawal: row.try_get("min_withdrawal")?,
            withdrawal_fee_base: row.try_get("wd_fee_base")?,
            withdrawal_fee_min: row.try_get("wd_fee_min")?,
            withdrawal_fee_max: row.try_get("wd_fee_max")?,
            deposit_warning: row.try_get("deposit_warning")?,
            withdrawal_warning: row.try_get("withdrawal_warning")?,
            block_deposits_msg: row.try_get("block_deposits_msg")?,
            block_withdrawals_msg: row.try_get("block_withdrawals_msg")?,
        })
    }

    fn row_to_shard(row: &sqlx::postgres::PgRow) -> Result<Shard, WalletError> {
        Ok(Shard {
            network_id: row.try_get("netid")?,
            shard_no: row.try_get::<i32, _>("shardno")? as ShardNo,
            deposit_warning: row.try_get("deposit_warning")?,
            block_deposits_msg: row.try_get("block_deposits_msg")?,
            block_withdrawals_msg: row.try_get("block_withdrawals_msg")?,
        })
    }
}

#[async_trait]
impl NetworkStore for PgNetworkStore {
    async fn get_network(&self, network_id: &str) -> Result<Option<Network>, WalletError> {
        let sql = format!("SELECT {} FROM networks WHERE netid = $1", NETWORK_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(network_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_network).transpose()
    }

    async fn list_networks(
        &self,
        enabled: Option<bool>,
        page: &Page,
    ) -> Result<Paged<Network>, WalletError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM networks
            WHERE ($1::BOOLEAN IS NULL OR enabled = $1)
            ORDER BY netid ASC
            OFFSET $2 LIMIT $3
            "#,
            NETWORK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(enabled)
            .bind(page.offset as i64)
            .bind(page.fetch_limit() as i64)
            .fetch_all(&self.pool)
            .await?;

        let networks = rows
            .iter()
            .map(Self::row_to_network)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paged::from_overfetch(networks, page))
    }

    async fn get_pairing(
        &self,
        asset_id: &str,
        network_id: &str,
    ) -> Result<Option<AssetNetworkPairing>, WalletError> {
        let sql = format!(
            "SELECT {} FROM asset_network an WHERE an.assetid = $1 AND an.netid = $2",
            PAIRING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(asset_id)
            .bind(network_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_pairing).transpose()
    }

    async fn list_pairings(
        &self,
        filter: &PairingFilter,
        page: &Page,
    ) -> Result<Paged<AssetNetworkPairing>, WalletError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM asset_network an
            JOIN networks n ON n.netid = an.netid
            WHERE ($1::TEXT IS NULL OR an.assetid = $1)
              AND ($2::TEXT IS NULL OR an.netid = $2)
              AND ($3::BOOLEAN IS NULL OR an.enabled = $3)
              AND ($4::BOOLEAN IS NULL OR n.enabled = $4)
            ORDER BY an.assetid ASC, an.netid ASC
            OFFSET $5 LIMIT $6
            "#,
            PAIRING_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(filter.asset_id.as_deref())
            .bind(filter.network_id.as_deref())
            .bind(filter.enabled)
            .bind(filter.enabled_network)
            .bind(page.offset as i64)
            .bind(page.fetch_limit() as i64)
            .fetch_all(&self.pool)
            .await?;

        let pairings = rows
            .iter()
            .map(Self::row_to_pairing)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paged::from_overfetch(pairings, page))
    }

    async fn get_shard(
        &self,
        network_id: &str,
        shard_no: ShardNo,
    ) -> Result<Option<Shard>, WalletError> {
        let row = sqlx::query(
            r#"
            SELECT netid, shardno, deposit_warning, block_deposits_msg, block_withdrawals_msg
            FROM wallet_shards
            WHERE netid = $1 AND shardno = $2
            "#,
        )
        .bind(network_id)
        .bind(shard_no as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_shard).transpose()
    }

    async fn list_shards(
        &self,
        network_id: Option<&str>,
        page: &Page,
    ) -> Result<Paged<Shard>, WalletError> {
        let rows = sqlx::query(
            r#"
            SELECT netid, shardno, deposit_warning, block_deposits_msg, block_withdrawals_msg
            FROM wallet_shards
            WHERE ($1::TEXT IS NULL OR netid = $1)
            ORDER BY netid ASC, shardno ASC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(network_id)
        .bind(page.offset as i64)
        .bind(page.fetch_limit() as i64)
        .fetch_all(&self.pool)
        .await?;

        let shards = rows
            .iter()
            .map(Self::row_to_shard)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paged::from_overfetch(shards, page))
    }
}
