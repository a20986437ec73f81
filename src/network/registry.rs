//! Network and shard registries
//!
//! Both are read paths over configuration maintained by an admin process.
//! Components receive them by injection; nothing here is global.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use super::models::{AssetNetworkPairing, Network, PairingFilter, PairingView, Shard, ShardStatus};
use crate::core_types::{NetworkId, ShardNo};
use crate::error::WalletError;
use crate::liveness::LivenessTracker;
use crate::pagination::{Page, Paged};
use crate::validation::NetworkSymbol;

#[async_trait]
pub trait NetworkStore: Send + Sync {
    async fn get_network(&self, network_id: &str) -> Result<Option<Network>, WalletError>;

    /// Ordered by network id.
    async fn list_networks(
        &self,
        enabled: Option<bool>,
        page: &Page,
    ) -> Result<Paged<Network>, WalletError>;

    async fn get_pairing(
        &self,
        asset_id: &str,
        network_id: &str,
    ) -> Result<Option<AssetNetworkPairing>, WalletError>;

    /// Ordered by (asset, network).
    async fn list_pairings(
        &self,
        filter: &PairingFilter,
        page: &Page,
    ) -> Result<Paged<AssetNetworkPairing>, WalletError>;

    async fn get_shard(
        &self,
        network_id: &str,
        shard_no: ShardNo,
    ) -> Result<Option<Shard>, WalletError>;

    /// Ordered by (network, shard).
    async fn list_shards(
        &self,
        network_id: Option<&str>,
        page: &Page,
    ) -> Result<Paged<Shard>, WalletError>;
}

/// Network lookup key. The id and the symbol name the same column, but a
/// caller must pick exactly one form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkKey {
    Id(NetworkSymbol),
    Symbol(NetworkSymbol),
}

impl NetworkKey {
    pub fn from_parts(netid: Option<&str>, symbol: Option<&str>) -> Result<Self, WalletError> {
        match (netid, symbol) {
            (Some(_), Some(_)) => Err(WalletError::ArgumentConflict(
                "Both netid and symbol are set".into(),
            )),
            (Some(id), None) => Ok(NetworkKey::Id(NetworkSymbol::new(id)?)),
            (None, Some(sym)) => Ok(NetworkKey::Symbol(NetworkSymbol::new(sym)?)),
            (None, None) => Err(WalletError::MissingData("netid or symbol".into())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NetworkKey::Id(s) | NetworkKey::Symbol(s) => s.as_str(),
        }
    }
}

pub struct NetworkRegistry {
    store: Arc<dyn NetworkStore>,
}

impl NetworkRegistry {
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self { store }
    }

    pub async fn get_network(&self, key: &NetworkKey) -> Result<Network, WalletError> {
        self.store
            .get_network(key.as_str())
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("Network {} not found", key.as_str())))
    }

    /// Lookup by public symbol, validating its format first.
    pub async fn get_network_by_symbol(&self, symbol: &str) -> Result<Network, WalletError> {
        self.get_network(&NetworkKey::Symbol(NetworkSymbol::new(symbol)?))
            .await
    }

    pub async fn list_networks(
        &self,
        enabled: Option<bool>,
        page: &Page,
    ) -> Result<Paged<Network>, WalletError> {
        self.store.list_networks(enabled, page).await
    }

    pub async fn get_pairing(
        &self,
        asset_id: &str,
        network_id: &str,
    ) -> Result<PairingView, WalletError> {
        let network = self
            .get_network(&NetworkKey::Id(NetworkSymbol::new(network_id)?))
            .await?;
        let pairing = self
            .store
            .get_pairing(asset_id, network_id)
            .await?
            .ok_or_else(|| {
                WalletError::NotFound(format!(
                    "Network {} is not associated with asset {}",
                    network_id, asset_id
                ))
            })?;
        Ok(PairingView { pairing, network })
    }

    pub async fn list_pairings(
        &self,
        filter: &PairingFilter,
        page: &Page,
    ) -> Result<Paged<PairingView>, WalletError> {
        if let Some(network_id) = &filter.network_id {
            // Unknown network is an error, not an empty page
            self.get_network(&NetworkKey::Id(NetworkSymbol::new(network_id)?))
                .await?;
        }

        let pairings = self.store.list_pairings(filter, page).await?;

        let mut networks: FxHashMap<NetworkId, Network> = FxHashMap::default();
        let mut items = Vec::with_capacity(pairings.items.len());
        for pairing in pairings.items {
            let network = match networks.get(&pairing.network_id) {
                Some(n) => n.clone(),
                None => {
                    let n = self
                        .store
                        .get_network(&pairing.network_id)
                        .await?
                        .ok_or_else(|| {
                            WalletError::DataIntegrity(format!(
                                "Pairing {}/{} references missing network",
                                pairing.asset_id, pairing.network_id
                            ))
                        })?;
                    networks.insert(n.network_id.clone(), n.clone());
                    n
                }
            };
            items.push(PairingView { pairing, network });
        }

        Ok(Paged {
            items,
            more: pairings.more,
        })
    }
}

pub struct ShardRegistry {
    store: Arc<dyn NetworkStore>,
    liveness: Arc<LivenessTracker>,
}

impl ShardRegistry {
    pub fn new(store: Arc<dyn NetworkStore>, liveness: Arc<LivenessTracker>) -> Self {
        Self { store, liveness }
    }

    pub async fn get_shard(
        &self,
        network_id: &str,
        shard_no: ShardNo,
    ) -> Result<ShardStatus, WalletError> {
        NetworkSymbol::new(network_id)?;
        let shard = self
            .store
            .get_shard(network_id, shard_no)
            .await?
            .ok_or_else(|| {
                WalletError::NotFound(format!("Shard {}:{} not found", network_id, shard_no))
            })?;
        self.with_status(shard).await
    }

    pub async fn list_shards(
        &self,
        network_id: Option<&str>,
        page: &Page,
    ) -> Result<Paged<ShardStatus>, WalletError> {
        if let Some(id) = network_id {
            NetworkSymbol::new(id)?;
        }
        let shards = self.store.list_shards(network_id, page).await?;
        let mut items = Vec::with_capacity(shards.items.len());
        for shard in shards.items {
            items.push(self.with_status(shard).await?);
        }
        Ok(Paged {
            items,
            more: shards.more,
        })
    }

    async fn with_status(&self, shard: Shard) -> Result<ShardStatus, WalletError> {
        let status = self
            .liveness
            .operating_status(&shard.network_id, Some(shard.shard_no))
            .await?;
        Ok(ShardStatus { shard, status })
    }
}
