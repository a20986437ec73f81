use std::sync::Arc;

use serde::Serialize;

use super::allocator::AddressAllocator;
use crate::core_types::UserId;
use crate::error::WalletError;
use crate::fee::FeeResolver;
use crate::money::{format_amount, truncate};
use crate::network::{Direction, NetworkRegistry, ShardRegistry};
use crate::services::{AssetDirectory, AssetKey};

/// Everything a user needs to make a deposit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositInfo {
    pub address: String,
    pub memo_name: Option<String>,
    pub memo: Option<String>,
    pub confirm_target: u32,
    pub contract: Option<String>,
    pub min_amount: String,
    /// Liveness of the shard that owns the address
    pub operating: bool,
    pub warnings: Vec<String>,
}

pub struct DepositService {
    assets: Arc<dyn AssetDirectory>,
    networks: Arc<NetworkRegistry>,
    shards: Arc<ShardRegistry>,
    allocator: Arc<AddressAllocator>,
}

impl DepositService {
    pub fn new(
        assets: Arc<dyn AssetDirectory>,
        networks: Arc<NetworkRegistry>,
        shards: Arc<ShardRegistry>,
        allocator: Arc<AddressAllocator>,
    ) -> Self {
        Self {
            assets,
            networks,
            shards,
            allocator,
        }
    }

    pub async fn deposit_info(
        &self,
        uid: UserId,
        asset_symbol: &str,
        network_symbol: &str,
    ) -> Result<DepositInfo, WalletError> {
        let asset = self
            .assets
            .get_asset(&AssetKey::Symbol(asset_symbol.to_string()))
            .await?;
        if !asset.enabled {
            return Err(WalletError::Forbidden(format!(
                "Asset {} is out of service",
                asset_symbol
            )));
        }

        let network = self.networks.get_network_by_symbol(network_symbol).await?;
        let view = self
            .networks
            .get_pairing(&asset.asset_id, &network.network_id)
            .await?;
        view.ensure_open(asset_symbol, Direction::Deposit)?;

        let address = self
            .allocator
            .assign_or_get(uid, &view.network.network_id)
            .await?;

        // The shard is only known once an address is held, so a shard block
        // is checked after assignment and the address stays with the user.
        let shard = self
            .shards
            .get_shard(&address.network_id, address.shard_no)
            .await?;
        if let Some(msg) = &shard.shard.block_deposits_msg {
            return Err(WalletError::Forbidden(msg.clone()));
        }

        let min_amount = FeeResolver::min_deposit_amount(&asset, &view.pairing);

        let mut warnings = view.warnings(Direction::Deposit);
        if let Some(w) = &shard.shard.deposit_warning {
            warnings.push(w.clone());
        }

        Ok(DepositInfo {
            address: address.address,
            memo_name: view.network.memo_name.clone(),
            memo: address.memo,
            confirm_target: view.network.confirm_target,
            contract: view.pairing.contract.clone(),
            min_amount: format_amount(truncate(min_amount, asset.default_prec)),
            operating: shard.status.operating,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LivenessConfig;
    use crate::deposit::{AddressFilter, AddressStore};
    use crate::pagination::Page;
    use crate::liveness::LivenessTracker;
    use crate::memory::{MemoryStore, fixtures};
    use crate::services::mock::StaticDirectory;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    struct Harness {
        store: Arc<MemoryStore>,
        directory: Arc<StaticDirectory>,
        liveness: Arc<LivenessTracker>,
        service: DepositService,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.put_network(fixtures::network("ETH")).await;
        store.put_shard(fixtures::shard("ETH", 0)).await;
        let mut usdt = fixtures::pairing("USDT", "ETH", 6);
        usdt.contract = Some("0xdac17f958d2ee523a2206206994597c13d831ec7".into());
        usdt.min_deposit = Some(Decimal::from_str("1.5").unwrap());
        store.put_pairing(usdt).await;
        store
            .provision_address("ETH", 0, "0x00000000000000000000000000000000000000aa", None)
            .await;

        let directory = Arc::new(
            StaticDirectory::new()
                .with_asset(fixtures::asset("USDT", 6))
                .with_asset(fixtures::asset("BTC", 8)),
        );
        let liveness = Arc::new(LivenessTracker::new(store.clone(), &LivenessConfig::default()));
        let networks = Arc::new(NetworkRegistry::new(store.clone()));
        let shards = Arc::new(ShardRegistry::new(store.clone(), liveness.clone()));
        let allocator = Arc::new(AddressAllocator::new(store.clone(), networks.clone()));
        let service = DepositService::new(directory.clone(), networks, shards, allocator);

        Harness {
            store,
            directory,
            liveness,
            service,
        }
    }

    #[tokio::test]
    async fn test_deposit_info_happy_path() {
        let h = harness().await;
        h.liveness
            .record_heartbeat(1, "ETH", 0, Utc::now())
            .await
            .unwrap();

        let info = h.service.deposit_info(1001, "USDT", "ETH").await.unwrap();
        assert_eq!(info.address, "0x00000000000000000000000000000000000000aa");
        assert_eq!(info.min_amount, "1.5");
        assert_eq!(info.confirm_target, 12);
        assert!(info.contract.is_some());
        assert!(info.operating);
        assert!(info.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_deposit_info_reports_down_shard() {
        let h = harness().await;
        let info = h.service.deposit_info(1001, "USDT", "ETH").await.unwrap();
        assert!(!info.operating);
    }

    #[tokio::test]
    async fn test_disabled_asset_forbidden() {
        let h = harness().await;
        h.directory.set_asset_enabled("USDT", false);
        let err = h.service.deposit_info(1001, "USDT", "ETH").await.unwrap_err();
        assert_eq!(err.to_string(), "Asset USDT is out of service");
    }

    #[tokio::test]
    async fn test_blocked_network_does_not_consume_pool() {
        let h = harness().await;
        let mut eth = fixtures::network("ETH");
        eth.block_deposits_msg = Some("ETH deposits suspended during upgrade".into());
        h.store.put_network(eth).await;

        let err = h.service.deposit_info(1001, "USDT", "ETH").await.unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.to_string(), "ETH deposits suspended during upgrade");
        assert!(h.store.find_owned(1001, "ETH").await.unwrap().is_none());
    }

    async fn pooled(store: &MemoryStore) -> usize {
        let filter = AddressFilter {
            network_id: Some("ETH".into()),
            owner: Some(None),
            ..Default::default()
        };
        store.list(&filter, &Page::default()).await.unwrap().items.len()
    }

    #[tokio::test]
    async fn test_blocked_shard_keeps_assigned_address() {
        let h = harness().await;
        h.store
            .provision_address("ETH", 0, "0x00000000000000000000000000000000000000bb", None)
            .await;
        let mut shard = fixtures::shard("ETH", 0);
        shard.block_deposits_msg = Some("Shard 0 under maintenance".into());
        h.store.put_shard(shard).await;

        assert_eq!(pooled(&h.store).await, 2);

        let err = h.service.deposit_info(1001, "USDT", "ETH").await.unwrap_err();
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.to_string(), "Shard 0 under maintenance");
        let owned = h.store.find_owned(1001, "ETH").await.unwrap().unwrap();
        assert_eq!(pooled(&h.store).await, 1);

        let err = h.service.deposit_info(1001, "USDT", "ETH").await.unwrap_err();
        assert_eq!(err.to_string(), "Shard 0 under maintenance");
        let again = h.store.find_owned(1001, "ETH").await.unwrap().unwrap();
        assert_eq!(again.address, owned.address);
        assert_eq!(pooled(&h.store).await, 1);
    }

    #[tokio::test]
    async fn test_missing_pairing() {
        let h = harness().await;
        let err = h.service.deposit_info(1001, "BTC", "ETH").await.unwrap_err();
        assert_eq!(err.to_string(), "Network ETH is not associated with asset BTC");
    }
}
