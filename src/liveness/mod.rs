//! Node Liveness
//!
//! Wallet nodes (signing/broadcasting processes) report heartbeats. A network
//! or shard is *operating* when its freshest heartbeat is no older than the
//! configured timeout. The check fails closed: no heartbeat means not
//! operating.
//!
//! ```text
//! operating = (now - max(last_ping)) <= timeout
//! ```

pub mod db;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::config::LivenessConfig;
use crate::core_types::{NetworkId, NodeId, ShardNo};
use crate::error::WalletError;
use crate::pagination::{Page, Paged};

pub use db::PgHeartbeatStore;

/// Last heartbeat of one wallet node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHeartbeat {
    pub node_id: NodeId,
    pub network_id: NetworkId,
    pub shard_no: ShardNo,
    pub last_ping: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperatingStatus {
    pub last_ping: Option<DateTime<Utc>>,
    pub operating: bool,
}

impl OperatingStatus {
    /// Exactly `timeout` old still counts as operating.
    pub fn evaluate(last_ping: Option<DateTime<Utc>>, now: DateTime<Utc>, timeout: Duration) -> Self {
        let Some(ts) = last_ping else {
            return Self::down();
        };
        // A timeout too large for TimeDelta never expires.
        let operating = TimeDelta::from_std(timeout).map_or(true, |limit| now - ts <= limit);
        Self {
            last_ping,
            operating,
        }
    }

    /// Status reported when nothing is known.
    pub fn down() -> Self {
        Self {
            last_ping: None,
            operating: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    #[serde(flatten)]
    pub node: NodeHeartbeat,
    pub operating: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub network_id: Option<NetworkId>,
    pub shard_no: Option<ShardNo>,
}

#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Insert or refresh a node row. `last_ping` never moves backwards.
    async fn upsert_heartbeat(&self, heartbeat: &NodeHeartbeat) -> Result<(), WalletError>;

    /// `MAX(last_ping)` for the network, or for one shard of it.
    async fn last_ping(
        &self,
        network_id: &str,
        shard_no: Option<ShardNo>,
    ) -> Result<Option<DateTime<Utc>>, WalletError>;

    async fn get_node(&self, node_id: NodeId) -> Result<Option<NodeHeartbeat>, WalletError>;

    /// Ordered by (network, shard, node).
    async fn list_nodes(
        &self,
        filter: &NodeFilter,
        page: &Page,
    ) -> Result<Paged<NodeHeartbeat>, WalletError>;
}

pub struct LivenessTracker {
    store: Arc<dyn HeartbeatStore>,
    timeout: Duration,
}

impl LivenessTracker {
    pub fn new(store: Arc<dyn HeartbeatStore>, config: &LivenessConfig) -> Self {
        Self {
            store,
            timeout: config.operating_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn record_heartbeat(
        &self,
        node_id: NodeId,
        network_id: &str,
        shard_no: ShardNo,
        timestamp: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        let heartbeat = NodeHeartbeat {
            node_id,
            network_id: network_id.to_string(),
            shard_no,
            last_ping: timestamp,
        };
        self.store.upsert_heartbeat(&heartbeat).await?;
        tracing::trace!(node_id, network = %network_id, shard_no, "Heartbeat recorded");
        Ok(())
    }

    pub async fn operating_status(
        &self,
        network_id: &str,
        shard_no: Option<ShardNo>,
    ) -> Result<OperatingStatus, WalletError> {
        let last_ping = self.store.last_ping(network_id, shard_no).await?;
        let status = OperatingStatus::evaluate(last_ping, Utc::now(), self.timeout);
        if !status.operating {
            tracing::debug!(
                network = %network_id,
                shard_no = ?shard_no,
                last_ping = ?last_ping,
                timeout_secs = self.timeout().as_secs(),
                "Network not operating"
            );
        }
        Ok(status)
    }

    pub async fn get_node(&self, node_id: NodeId) -> Result<NodeStatus, WalletError> {
        let node = self
            .store
            .get_node(node_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("Node {} not found", node_id)))?;
        Ok(self.with_status(node, Utc::now()))
    }

    pub async fn get_nodes(
        &self,
        filter: &NodeFilter,
        page: &Page,
    ) -> Result<Paged<NodeStatus>, WalletError> {
        if filter.shard_no.is_some() && filter.network_id.is_none() {
            return Err(WalletError::ArgumentConflict(
                "shardno is allowed only with netid".into(),
            ));
        }
        let now = Utc::now();
        let nodes = self.store.list_nodes(filter, page).await?;
        Ok(nodes.map(|n| self.with_status(n, now)))
    }

    fn with_status(&self, node: NodeHeartbeat, now: DateTime<Utc>) -> NodeStatus {
        let operating = OperatingStatus::evaluate(Some(node.last_ping), now, self.timeout).operating;
        NodeStatus { node, operating }
    }
}
