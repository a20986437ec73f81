use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AssetId, NetworkId, ShardNo};
use crate::error::WalletError;
use crate::liveness::OperatingStatus;

/// Blockchain network configuration. Read-only to the wallet core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Also the public symbol
    pub network_id: NetworkId,
    pub name: String,
    pub icon_url: Option<String>,
    pub native_asset_id: AssetId,
    pub confirm_target: u32,
    pub enabled: bool,
    /// Label of the memo/tag field; `None` when the network has no memos
    pub memo_name: Option<String>,
    pub qr_template_native: Option<String>,
    pub qr_template_token: Option<String>,
    pub deposit_warning: Option<String>,
    pub withdrawal_warning: Option<String>,
    pub block_deposits_msg: Option<String>,
    pub block_withdrawals_msg: Option<String>,
}

impl Network {
    pub fn supports_memo(&self) -> bool {
        self.memo_name.is_some()
    }
}

/// Per (asset, network) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetNetworkPairing {
    pub asset_id: AssetId,
    pub network_id: NetworkId,
    pub enabled: bool,
    /// Token contract; `None` for the network's native asset
    pub contract: Option<String>,
    pub precision: u32,
    pub min_deposit: Option<Decimal>,
    pub min_withdrawal: Option<Decimal>,
    pub withdrawal_fee_base: Decimal,
    pub withdrawal_fee_min: Decimal,
    pub withdrawal_fee_max: Decimal,
    pub deposit_warning: Option<String>,
    pub withdrawal_warning: Option<String>,
    pub block_deposits_msg: Option<String>,
    pub block_withdrawals_msg: Option<String>,
}

/// Pairing joined with its network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairingView {
    #[serde(flatten)]
    pub pairing: AssetNetworkPairing,
    pub network: Network,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingFilter {
    pub asset_id: Option<AssetId>,
    pub network_id: Option<NetworkId>,
    pub enabled: Option<bool>,
    /// Filter on the joined network's `enabled`
    pub enabled_network: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub network_id: NetworkId,
    pub shard_no: ShardNo,
    pub deposit_warning: Option<String>,
    pub block_deposits_msg: Option<String>,
    pub block_withdrawals_msg: Option<String>,
}

/// Shard metadata merged with derived liveness
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardStatus {
    #[serde(flatten)]
    pub shard: Shard,
    #[serde(flatten)]
    pub status: OperatingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Deposit,
    Withdrawal,
}

impl PairingView {
    /// Gate deposits or withdrawals on this pairing. The network's own state
    /// is checked before the pairing's, so a network-wide block message wins.
    pub fn ensure_open(&self, asset_symbol: &str, direction: Direction) -> Result<(), WalletError> {
        let network = &self.network;
        let pairing = &self.pairing;

        if !network.enabled {
            return Err(WalletError::Forbidden(format!(
                "Network {} is out of service",
                network.network_id
            )));
        }
        let network_block = match direction {
            Direction::Deposit => &network.block_deposits_msg,
            Direction::Withdrawal => &network.block_withdrawals_msg,
        };
        if let Some(msg) = network_block {
            return Err(WalletError::Forbidden(msg.clone()));
        }

        if !pairing.enabled {
            return Err(WalletError::Forbidden(format!(
                "Network {} is out of service for {}",
                network.network_id, asset_symbol
            )));
        }
        let pairing_block = match direction {
            Direction::Deposit => &pairing.block_deposits_msg,
            Direction::Withdrawal => &pairing.block_withdrawals_msg,
        };
        if let Some(msg) = pairing_block {
            return Err(WalletError::Forbidden(msg.clone()));
        }

        Ok(())
    }

    /// Network warning first, then pairing warning.
    pub fn warnings(&self, direction: Direction) -> Vec<String> {
        let (network, pairing) = match direction {
            Direction::Deposit => (&self.network.deposit_warning, &self.pairing.deposit_warning),
            Direction::Withdrawal => (
                &self.network.withdrawal_warning,
                &self.pairing.withdrawal_warning,
            ),
        };
        [network, pairing].into_iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fixtures;

    fn view() -> PairingView {
        PairingView {
            pairing: fixtures::pairing("USDT", "ETH", 6),
            network: fixtures::network("ETH"),
        }
    }

    #[test]
    fn test_open_pairing() {
        assert!(view().ensure_open("USDT", Direction::Deposit).is_ok());
        assert!(view().ensure_open("USDT", Direction::Withdrawal).is_ok());
    }

    #[test]
    fn test_network_block_wins_over_pairing_block() {
        let mut v = view();
        v.network.block_withdrawals_msg = Some("ETH withdrawals paused".into());
        v.pairing.block_withdrawals_msg = Some("USDT paused".into());
        let err = v.ensure_open("USDT", Direction::Withdrawal).unwrap_err();
        assert_eq!(err, WalletError::Forbidden("ETH withdrawals paused".into()));
        // Deposits unaffected by withdrawal blocks at network level
        let err = v.ensure_open("USDT", Direction::Deposit);
        assert!(err.is_ok());
    }

    #[test]
    fn test_disabled_messages() {
        let mut v = view();
        v.pairing.enabled = false;
        let err = v.ensure_open("USDT", Direction::Deposit).unwrap_err();
        assert_eq!(err.to_string(), "Network ETH is out of service for USDT");

        v.network.enabled = false;
        let err = v.ensure_open("USDT", Direction::Deposit).unwrap_err();
        assert_eq!(err.to_string(), "Network ETH is out of service");
    }

    #[test]
    fn test_warning_order() {
        let mut v = view();
        v.network.withdrawal_warning = Some("net".into());
        v.pairing.withdrawal_warning = Some("pair".into());
        assert_eq!(v.warnings(Direction::Withdrawal), vec!["net", "pair"]);
        assert!(v.warnings(Direction::Deposit).is_empty());
    }
}
