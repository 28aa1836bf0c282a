//! Deterministic price extrapolation.
//!
//! Reproduces the authority's on-chain linear pricing evaluation in integer
//! base-unit arithmetic, so the cached order book can be re-priced locally
//! every second without a chain read. Zero is the "not currently executable"
//! sentinel; the evaluation order is fixed: linear clamp, then expiry, then
//! stop. Expiry wins over stop.

use crate::domain::{PricingParams, Side, Timestamp, Wei};

/// Evaluate the current price of an order at `now`.
///
/// Pure: identical inputs always yield identical output. Clock skew between
/// the local clock and the authority's is not corrected here; callers that
/// make monetary decisions re-fetch the authoritative price instead.
pub fn evaluate(params: &PricingParams, now: Timestamp) -> Wei {
    let elapsed = now.seconds_since(params.start_time);
    let start = i128::try_from(params.start_price.as_u128()).unwrap_or(i128::MAX);
    let raw = params
        .price_slope
        .as_i128()
        .saturating_mul(elapsed)
        .saturating_add(start);

    let mut price: u128 = if raw < 0 { 0 } else { raw as u128 };

    if params.expiry_time.is_set() && now >= params.expiry_time {
        price = 0;
    }

    if !params.stop_price.is_zero() {
        let stop = params.stop_price.as_u128();
        match params.side {
            Side::Buy if price <= stop => price = 0,
            Side::Sell if price >= stop => price = 0,
            _ => {}
        }
    }

    Wei::new(price)
}
