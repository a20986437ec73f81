//! Networks, asset-network pairings and shards

pub mod db;
pub mod models;
pub mod registry;

pub use db::PgNetworkStore;
pub use models::{
    AssetNetworkPairing, Direction, Network, PairingFilter, PairingView, Shard, ShardStatus,
};
pub use registry::{NetworkKey, NetworkRegistry, NetworkStore, ShardRegistry};
