//! Conversion between human decimal units and integer base units.
//!
//! Parsing goes through rust_decimal so user input never touches floating
//! point; all downstream arithmetic is integer base units.

use crate::domain::{SlopeWei, Wei};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Base units per whole unit of the native currency.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Seconds per hour, for converting the hourly slope a user types into the
/// per-second rate the authority stores.
const SECONDS_PER_HOUR: i128 = 3_600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("not a valid decimal number: {0}")]
    Invalid(String),
    #[error("value must not be negative")]
    Negative,
    #[error("value does not fit in base units")]
    Overflow,
    #[error("value is finer than one base unit")]
    SubUnit,
}

/// Parse a non-negative decimal string into base units.
pub fn parse_ether(input: &str) -> Result<Wei, UnitsError> {
    let scaled = scale_to_base_units(input)?;
    if scaled.is_sign_negative() {
        return Err(UnitsError::Negative);
    }
    scaled.to_u128().map(Wei::new).ok_or(UnitsError::Overflow)
}

/// Parse a signed decimal string into signed base units.
pub fn parse_ether_signed(input: &str) -> Result<i128, UnitsError> {
    let scaled = scale_to_base_units(input)?;
    scaled.to_i128().ok_or(UnitsError::Overflow)
}

fn scale_to_base_units(input: &str) -> Result<Decimal, UnitsError> {
    let trimmed = input.trim();
    let value =
        Decimal::from_str(trimmed).map_err(|_| UnitsError::Invalid(trimmed.to_string()))?;
    let scaled = value
        .checked_mul(Decimal::from(WEI_PER_ETHER as u64))
        .ok_or(UnitsError::Overflow)?;
    if !scaled.fract().is_zero() {
        return Err(UnitsError::SubUnit);
    }
    Ok(scaled.trunc())
}

/// Convert an hourly slope in base units to the per-second rate.
///
/// Integer division truncates toward zero; any sub-unit remainder is
/// dropped, matching the authority's arithmetic.
pub fn slope_per_second(per_hour: i128) -> SlopeWei {
    SlopeWei::new(per_hour / SECONDS_PER_HOUR)
}

/// Format base units as a decimal string in whole units, trailing zeros
/// trimmed (e.g. 10_000_000_000_000_000 -> "0.01").
pub fn format_ether(value: Wei) -> String {
    let whole = value.as_u128() / WEI_PER_ETHER;
    let frac = value.as_u128() % WEI_PER_ETHER;
    if frac == 0 {
        return whole.to_string();
    }
    let digits = format!("{:018}", frac);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}
