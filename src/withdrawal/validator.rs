//! Withdrawal target validation
//!
//! Chain rules are pluggable. [`AddressFormatValidator`] only checks formats;
//! a deployment wanting checksum or on-chain existence checks supplies its
//! own [`TargetValidator`].

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::core_types::NetworkId;
use crate::error::WalletError;
use crate::network::Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetValidity {
    pub valid_address: bool,
    pub valid_memo: bool,
}

impl TargetValidity {
    pub fn is_valid(&self) -> bool {
        self.valid_address && self.valid_memo
    }
}

#[async_trait]
pub trait TargetValidator: Send + Sync {
    /// `address` is `None` when only a memo was supplied.
    async fn validate(
        &self,
        network: &Network,
        address: Option<&str>,
        memo: Option<&str>,
    ) -> Result<TargetValidity, WalletError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFormat {
    /// `0x` followed by 20 hex-encoded bytes
    Evm,
    /// Base58 legacy (`1`, `3`) or bech32 (`bc1`)
    Bitcoin,
    /// Non-empty, printable, no whitespace
    Generic,
}

const MAX_ADDRESS_LEN: usize = 128;
const MAX_MEMO_LEN: usize = 64;

/// Per-network format rules, generic for networks without a rule.
pub struct AddressFormatValidator {
    formats: FxHashMap<NetworkId, AddressFormat>,
}

impl Default for AddressFormatValidator {
    fn default() -> Self {
        let mut formats = FxHashMap::default();
        for evm in ["ETH", "BSC", "POLYGON", "ARBITRUM", "OPTIMISM", "AVAXC"] {
            formats.insert(evm.to_string(), AddressFormat::Evm);
        }
        formats.insert("BTC".to_string(), AddressFormat::Bitcoin);
        Self { formats }
    }
}

impl AddressFormatValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, network_id: &str, format: AddressFormat) -> Self {
        self.formats.insert(network_id.to_string(), format);
        self
    }

    pub fn format_of(&self, network_id: &str) -> AddressFormat {
        self.formats
            .get(network_id)
            .copied()
            .unwrap_or(AddressFormat::Generic)
    }

    pub fn check_address(format: AddressFormat, address: &str) -> bool {
        match format {
            AddressFormat::Evm => address
                .strip_prefix("0x")
                .filter(|body| body.len() == 40)
                .is_some_and(|body| hex::decode(body).is_ok()),
            AddressFormat::Bitcoin => {
                let charset_ok = address.chars().all(|c| c.is_ascii_alphanumeric());
                let legacy = (address.starts_with('1') || address.starts_with('3'))
                    && (26..=35).contains(&address.len());
                let segwit = address.to_ascii_lowercase().starts_with("bc1")
                    && (14..=74).contains(&address.len());
                charset_ok && (legacy || segwit)
            }
            AddressFormat::Generic => Self::is_token(address, MAX_ADDRESS_LEN),
        }
    }

    fn is_token(value: &str, max_len: usize) -> bool {
        !value.is_empty()
            && value.len() <= max_len
            && value.chars().all(|c| c.is_ascii_graphic())
    }
}

#[async_trait]
impl TargetValidator for AddressFormatValidator {
    async fn validate(
        &self,
        network: &Network,
        address: Option<&str>,
        memo: Option<&str>,
    ) -> Result<TargetValidity, WalletError> {
        let valid_address = address
            .is_some_and(|a| Self::check_address(self.format_of(&network.network_id), a));
        let valid_memo = match memo {
            None => true,
            Some(m) => network.supports_memo() && Self::is_token(m, MAX_MEMO_LEN),
        };
        Ok(TargetValidity {
            valid_address,
            valid_memo,
        })
    }
}
