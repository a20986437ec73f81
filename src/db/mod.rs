//! PostgreSQL pool shared by every `Pg*Store`

pub mod schema;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::WalletConfig;
use crate::error::WalletError;

const MAX_CONNECTIONS: u32 = 20;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, WalletError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = MAX_CONNECTIONS, "PostgreSQL pool established");
        Ok(Self { pool })
    }

    /// Connect to `postgres_url`; a config without one is `MissingData`.
    pub async fn from_config(config: &WalletConfig) -> Result<Self, WalletError> {
        let url = config
            .postgres_url
            .as_deref()
            .ok_or_else(|| WalletError::MissingData("postgres_url".into()))?;
        Self::connect(url).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), WalletError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
