//! Money Module
//!
//! Fixed-point helpers shared by fee resolution, withdrawals and transfers.
//! Amounts are `rust_decimal::Decimal` end to end; there is no floating point
//! anywhere in the wallet.
//!
//! ## Rules
//! 1. Truncation toward zero only: an amount is never rounded up, so a credit
//!    can never exceed what was reserved.
//! 2. Client strings are parsed strictly (`0.5`, never `.5` or `5.`).
//! 3. Display strips trailing zeros (`0.0010` -> `0.001`).

use rust_decimal::prelude::*;

use crate::error::WalletError;

/// Truncate `amount` toward zero to `precision` decimal places.
///
/// ```
/// use rust_decimal::Decimal;
/// use std::str::FromStr;
/// use wallet_io::money::truncate;
///
/// let a = Decimal::from_str("10.12345").unwrap();
/// assert_eq!(truncate(a, 4).to_string(), "10.1234");
/// ```
#[inline]
pub fn truncate(amount: Decimal, precision: u32) -> Decimal {
    amount.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}

/// Number of significant decimal places (`1.2300` -> 2).
#[inline]
pub fn decimal_places(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Smallest representable unit at `precision` (`10^-precision`).
#[inline]
pub fn unit(precision: u32) -> Decimal {
    Decimal::new(1, precision)
}

/// Client-facing representation with trailing zeros removed.
pub fn format_amount(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Parse a client supplied amount string.
///
/// Accepts `123` or `123.456`. Rejects signs, exponents, empty parts around
/// the dot, and zero.
pub fn parse_amount(field: &str, amount_str: &str) -> Result<Decimal, WalletError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(WalletError::validation(field, "empty amount"));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(WalletError::validation(field, "amount must be unsigned"));
    }

    let (whole, frac) = match amount_str.split_once('.') {
        None => (amount_str, ""),
        Some((w, f)) => {
            if w.is_empty() {
                return Err(WalletError::validation(
                    field,
                    "missing leading zero (e.g., use 0.5 instead of .5)",
                ));
            }
            if f.is_empty() {
                return Err(WalletError::validation(
                    field,
                    "missing fractional part (e.g., use 5.0 instead of 5.)",
                ));
            }
            (w, f)
        }
    };

    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !digits_only(whole) || !digits_only(frac) {
        return Err(WalletError::validation(field, "invalid character in amount"));
    }

    let value = Decimal::from_str(amount_str)
        .map_err(|e| WalletError::validation(field, e.to_string()))?;

    if value.is_zero() {
        return Err(WalletError::AmountOutOfRange(format!(
            "{} must be greater than zero",
            field
        )));
    }

    Ok(value)
}
