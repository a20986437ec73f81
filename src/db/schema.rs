//! Idempotent schema bootstrap

use anyhow::{Context, Result};
use sqlx::PgPool;

const STATEMENTS: &[(&str, &str)] = &[
    (
        "networks",
        r#"
        CREATE TABLE IF NOT EXISTS networks (
            netid                 VARCHAR(32) PRIMARY KEY,
            description           VARCHAR(255) NOT NULL,
            icon_url              VARCHAR(255),
            native_assetid        VARCHAR(32) NOT NULL,
            confirms_target       INT NOT NULL,
            enabled               BOOLEAN NOT NULL DEFAULT FALSE,
            memo_name             VARCHAR(32),
            native_qr_format      VARCHAR(255),
            token_qr_format       VARCHAR(255),
            deposit_warning       TEXT,
            withdrawal_warning    TEXT,
            block_deposits_msg    TEXT,
            block_withdrawals_msg TEXT
        )
        "#,
    ),
    (
        "asset_network",
        r#"
        CREATE TABLE IF NOT EXISTS asset_network (
            assetid               VARCHAR(32) NOT NULL,
            netid                 VARCHAR(32) NOT NULL REFERENCES networks(netid),
            prec                  INT NOT NULL,
            enabled               BOOLEAN NOT NULL DEFAULT FALSE,
            contract              VARCHAR(255),
            min_deposit           NUMERIC(38, 18),
            min_withdrawal        NUMERIC(38, 18),
            wd_fee_base           NUMERIC(38, 18) NOT NULL,
            wd_fee_min            NUMERIC(38, 18) NOT NULL,
            wd_fee_max            NUMERIC(38, 18) NOT NULL,
            deposit_warning       TEXT,
            withdrawal_warning    TEXT,
            block_deposits_msg    TEXT,
            block_withdrawals_msg TEXT,
            PRIMARY KEY (assetid, netid)
        )
        "#,
    ),
    (
        "wallet_shards",
        r#"
        CREATE TABLE IF NOT EXISTS wallet_shards (
            netid                 VARCHAR(32) NOT NULL REFERENCES networks(netid),
            shardno               INT NOT NULL,
            deposit_warning       TEXT,
            block_deposits_msg    TEXT,
            block_withdrawals_msg TEXT,
            PRIMARY KEY (netid, shardno)
        )
        "#,
    ),
    (
        "wallet_nodes",
        r#"
        CREATE TABLE IF NOT EXISTS wallet_nodes (
            nodeid    BIGINT PRIMARY KEY,
            netid     VARCHAR(32) NOT NULL,
            shardno   INT NOT NULL,
            last_ping TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "wallet_nodes_netid_idx",
        "CREATE INDEX IF NOT EXISTS wallet_nodes_netid_idx ON wallet_nodes (netid, shardno)",
    ),
    (
        "deposit_addr",
        r#"
        CREATE TABLE IF NOT EXISTS deposit_addr (
            addrid  BIGSERIAL PRIMARY KEY,
            netid   VARCHAR(32) NOT NULL,
            shardno INT NOT NULL,
            address VARCHAR(255) NOT NULL,
            memo    VARCHAR(255),
            uid     BIGINT
        )
        "#,
    ),
    (
        "deposit_addr_owner_uidx",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS deposit_addr_owner_uidx
            ON deposit_addr (netid, uid) WHERE uid IS NOT NULL
        "#,
    ),
    (
        "deposit_addr_lookup_idx",
        "CREATE INDEX IF NOT EXISTS deposit_addr_lookup_idx ON deposit_addr (netid, address)",
    ),
    (
        "wallet_transactions",
        r#"
        CREATE TABLE IF NOT EXISTS wallet_transactions (
            xid              BIGSERIAL PRIMARY KEY,
            uid              BIGINT,
            type             VARCHAR(16) NOT NULL,
            assetid          VARCHAR(32) NOT NULL,
            netid            VARCHAR(32),
            amount           NUMERIC(38, 18) NOT NULL,
            status           VARCHAR(16) NOT NULL,
            create_time      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            address          VARCHAR(255),
            memo             VARCHAR(255),
            exec_time        TIMESTAMPTZ,
            confirmations    INT,
            confirms_target  INT,
            txid             VARCHAR(255),
            height           BIGINT,
            wd_fee_this      NUMERIC(38, 18),
            wd_fee_native    NUMERIC(38, 18),
            lockid           BIGINT,
            opposite_xid     BIGINT
        )
        "#,
    ),
    (
        "wallet_transactions_uid_idx",
        "CREATE INDEX IF NOT EXISTS wallet_transactions_uid_idx ON wallet_transactions (uid, xid DESC)",
    ),
    (
        "wallet_transactions_txid_uidx",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS wallet_transactions_txid_uidx
            ON wallet_transactions (netid, txid) WHERE txid IS NOT NULL
        "#,
    ),
    (
        "transfer_sagas",
        r#"
        CREATE TABLE IF NOT EXISTS transfer_sagas (
            xid           BIGINT PRIMARY KEY,
            step          SMALLINT NOT NULL,
            in_xid        BIGINT,
            payload       TEXT NOT NULL,
            error_message TEXT,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "transfer_sagas_stale_idx",
        "CREATE INDEX IF NOT EXISTS transfer_sagas_stale_idx ON transfer_sagas (step, updated_at)",
    ),
];

/// Create every wallet table and index that does not exist yet.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    for (name, sql) in STATEMENTS {
        sqlx::query(*sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {}", name))?;
        tracing::debug!(object = *name, "Schema object ensured");
    }
    tracing::info!(objects = STATEMENTS.len(), "Wallet schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_idempotent() {
        for (name, sql) in STATEMENTS {
            assert!(sql.contains("IF NOT EXISTS"), "{} must be idempotent", name);
        }
    }

    #[test]
    fn test_every_table_is_created() {
        for table in [
            "networks",
            "asset_network",
            "wallet_shards",
            "wallet_nodes",
            "deposit_addr",
            "wallet_transactions",
            "transfer_sagas",
        ] {
            assert!(STATEMENTS.iter().any(|(name, _)| *name == table), "{}", table);
        }
    }
}
