//! Fee and minimum amount resolution
//!
//! Pure functions over asset and pairing configuration. Fixed-point only,
//! truncation toward zero only.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::WalletError;
use crate::logging::INTEGRITY_TARGET;
use crate::money::{decimal_places, truncate, unit};
use crate::network::AssetNetworkPairing;
use crate::services::Asset;

/// Inclusive withdrawal fee bounds at a fixed precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeRange {
    pub min: Decimal,
    pub max: Decimal,
    pub prec: u32,
}

impl FeeRange {
    #[inline]
    pub fn contains(&self, fee: Decimal) -> bool {
        fee >= self.min && fee <= self.max
    }

    /// Middle of the range, truncated to the range precision.
    pub fn midpoint(&self) -> Decimal {
        truncate((self.min + self.max) / Decimal::TWO, self.prec)
    }

    /// Pick the fee for a withdrawal. A caller supplied fee is truncated to
    /// the range precision and must land inside the range; otherwise the
    /// midpoint is charged.
    pub fn select_fee(&self, requested: Option<Decimal>) -> Result<Decimal, WalletError> {
        match requested {
            None => Ok(self.midpoint()),
            Some(fee) => {
                let fee = truncate(fee, self.prec);
                if self.contains(fee) {
                    Ok(fee)
                } else {
                    Err(WalletError::FeeOutOfRange {
                        fee,
                        min: self.min,
                        max: self.max,
                    })
                }
            }
        }
    }
}

pub struct FeeResolver;

impl FeeResolver {
    /// `max(10^-precision, asset floor, pairing floor)`
    pub fn min_amount(
        default_prec: u32,
        asset_floor: Option<Decimal>,
        pairing_floor: Option<Decimal>,
    ) -> Decimal {
        [asset_floor, pairing_floor]
            .into_iter()
            .flatten()
            .fold(unit(default_prec), Decimal::max)
    }

    pub fn min_deposit_amount(asset: &Asset, pairing: &AssetNetworkPairing) -> Decimal {
        Self::min_amount(asset.default_prec, asset.min_deposit, pairing.min_deposit)
    }

    pub fn min_withdrawal_amount(asset: &Asset, pairing: &AssetNetworkPairing) -> Decimal {
        Self::min_amount(
            asset.default_prec,
            asset.min_withdrawal,
            pairing.min_withdrawal,
        )
    }

    /// Fee bounds for a pairing. A range that needs more decimals than the
    /// pairing displays is a configuration error, never silently rounded.
    pub fn fee_range(pairing: &AssetNetworkPairing) -> Result<FeeRange, WalletError> {
        let min = pairing.withdrawal_fee_min + pairing.withdrawal_fee_base;
        let max = pairing.withdrawal_fee_max + pairing.withdrawal_fee_base;
        let prec = decimal_places(min).max(decimal_places(max));

        if prec > pairing.precision {
            tracing::error!(
                target: INTEGRITY_TARGET,
                marker = "DATA_INTEGRITY",
                asset = %pairing.asset_id,
                network = %pairing.network_id,
                fee_prec = prec,
                pairing_prec = pairing.precision,
                "Fee range precision exceeds pairing precision"
            );
            return Err(WalletError::DataIntegrity(format!(
                "Fee precision {} exceeds precision {} of {}/{}",
                prec, pairing.precision, pairing.asset_id, pairing.network_id
            )));
        }

        if min > max || min.is_sign_negative() {
            return Err(WalletError::DataIntegrity(format!(
                "Invalid fee range [{}, {}] for {}/{}",
                min, max, pairing.asset_id, pairing.network_id
            )));
        }

        Ok(FeeRange {
            min: min.normalize(),
            max: max.normalize(),
            prec,
        })
    }
}
