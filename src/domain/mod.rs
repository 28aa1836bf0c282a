//! Domain types shared across the client: primitives, orders, trades, units.

pub mod order;
pub mod primitives;
pub mod trade;
pub mod units;

pub use order::{CachedOrder, Order, PricingParams};
pub use primitives::{Address, OrderId, Side, SlopeWei, Timestamp, TxHash, Wei};
pub use trade::{Trade, TRADE_HISTORY_LIMIT};
pub use units::UnitsError;
