//! Order types: the authoritative order record and its cache-local projection.

use crate::domain::{Address, OrderId, Side, SlopeWei, Timestamp, Wei};
use serde::{Deserialize, Serialize};

/// The immutable pricing parameters of an order.
///
/// These are fixed at creation and are everything the price engine needs,
/// which is what makes local extrapolation between resyncs possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingParams {
    /// Order side. The stop condition is directional: floor for buys,
    /// ceiling for sells.
    pub side: Side,
    /// Price in base units at `start_time`.
    pub start_price: Wei,
    /// Signed price change per second in base units.
    pub price_slope: SlopeWei,
    /// Timestamp when pricing began.
    pub start_time: Timestamp,
    /// Stop price; zero means no stop.
    pub stop_price: Wei,
    /// Absolute expiry timestamp; zero means no expiry.
    pub expiry_time: Timestamp,
}

/// An order as reported by the authority.
///
/// All fields except `amount`, `escrowed_value` and `active` are immutable
/// once created. The mutable ones are tracked authoritatively and only ever
/// refreshed here by a full resync, never recomputed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier assigned by the authority.
    pub id: OrderId,
    /// The order's originator.
    pub creator: Address,
    /// Remaining quantity in whole units; non-increasing across partial fills.
    pub amount: u64,
    /// Immutable pricing snapshot.
    pub pricing: PricingParams,
    /// Authoritative escrow balance.
    pub escrowed_value: Wei,
    /// Whether the authority still considers this order live.
    pub active: bool,
}

impl Order {
    /// Order side.
    pub fn side(&self) -> Side {
        self.pricing.side
    }
}

/// A cached order snapshot plus its locally derived price.
///
/// `current_price` is recomputed in place on every tick and never written
/// back to the authority; it does not survive a resync that replaces the
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedOrder {
    /// Authoritative order snapshot.
    pub order: Order,
    /// Derived price at the last tick; zero means "not currently executable".
    pub current_price: Wei,
}

impl CachedOrder {
    /// Whether the order can be executed at the last-ticked price.
    ///
    /// Display-level only. Monetary decisions re-fetch the authoritative
    /// price instead of trusting this.
    pub fn is_executable(&self) -> bool {
        !self.current_price.is_zero()
    }
}
