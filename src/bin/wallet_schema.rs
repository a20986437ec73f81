//! Create the wallet tables in PostgreSQL.
//!
//! ```text
//! wallet_schema [--env dev]
//! ```
//! The environment falls back to `WALLET_ENV`, then `dev`.

use anyhow::{Context, Result};

use wallet_io::config::WalletConfig;
use wallet_io::db::{Database, schema};
use wallet_io::logging::init_logging;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    std::env::var("WALLET_ENV").unwrap_or_else(|_| "dev".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let config = WalletConfig::load(&env).with_context(|| format!("Loading config for {}", env))?;
    let _guard = init_logging(&config);

    tracing::info!(env = %env, git_hash = wallet_io::BUILD_GIT_HASH, "wallet_schema starting");

    let db = Database::from_config(&config)
        .await
        .context("Connecting to PostgreSQL")?;
    db.health_check().await.context("PostgreSQL health check")?;

    schema::init_schema(db.pool()).await?;
    Ok(())
}
