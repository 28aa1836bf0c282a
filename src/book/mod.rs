//! In-memory order book cache.
//!
//! Holds the working set of order snapshots plus their derived prices.
//! Mutation is funneled through exactly three paths: `tick` (derived field
//! only), `replace_all` (wholesale swap from a resync) and `clear`
//! (disconnect). Nothing else touches the cache, which is what rules out
//! partial-merge and optimistic-update bugs.

use crate::domain::{CachedOrder, OrderId, Timestamp, Trade, TRADE_HISTORY_LIMIT};
use crate::engine::pricing;

/// The local mirror of the authority's active order set and recent trades.
#[derive(Debug, Default)]
pub struct OrderCache {
    orders: Vec<CachedOrder>,
    trades: Vec<Trade>,
}

/// Immutable view of the cache published to observers after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSnapshot {
    /// Active orders with their last-ticked prices.
    pub orders: Vec<CachedOrder>,
    /// Recent executions, newest first, capped at [`TRADE_HISTORY_LIMIT`].
    pub trades: Vec<Trade>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every derived price from the unchanged pricing snapshots.
    ///
    /// Idempotent for a fixed `now`; touches no authoritative field.
    pub fn tick(&mut self, now: Timestamp) {
        for cached in &mut self.orders {
            cached.current_price = pricing::evaluate(&cached.order.pricing, now);
        }
    }

    /// Atomically swap the entire contents with a freshly fetched snapshot.
    ///
    /// The only path that adds or removes orders or updates authoritative
    /// fields. The trade list is capped here so a caller can hand over
    /// whatever the authority returned.
    pub fn replace_all(&mut self, orders: Vec<CachedOrder>, mut trades: Vec<Trade>) {
        trades.truncate(TRADE_HISTORY_LIMIT);
        self.orders = orders;
        self.trades = trades;
    }

    /// Empty the cache. Used on disconnect; no stale state survives a
    /// session boundary.
    pub fn clear(&mut self) {
        self.orders.clear();
        self.trades.clear();
    }

    /// Look up a cached order by id.
    pub fn get(&self, id: OrderId) -> Option<&CachedOrder> {
        self.orders.iter().find(|c| c.order.id == id)
    }

    /// Number of cached orders.
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Clone the contents into a publishable snapshot.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            orders: self.orders.clone(),
            trades: self.trades.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Order, OrderId, PricingParams, Side, SlopeWei, TxHash, Wei};

    const ETH: u128 = 1_000_000_000_000_000_000;
    const START: u64 = 1_700_000_000;

    fn make_cached(id: u64, slope: i128) -> CachedOrder {
        CachedOrder {
            order: Order {
                id: OrderId::new(id),
                creator: Address::new(format!("0x{:040x}", id)),
                amount: 10,
                pricing: PricingParams {
                    side: Side::Buy,
                    start_price: Wei::new(ETH / 100),
                    price_slope: SlopeWei::new(slope),
                    start_time: Timestamp::new(START),
                    stop_price: Wei::ZERO,
                    expiry_time: Timestamp::new(0),
                },
                escrowed_value: Wei::new(ETH / 10),
                active: true,
            },
            current_price: Wei::ZERO,
        }
    }

    fn make_trade(id: u64) -> Trade {
        Trade {
            order_id: OrderId::new(id),
            amount: 1,
            price: Wei::new(ETH / 100),
            tx_hash: TxHash::new(format!("0xtx{}", id)),
        }
    }

    #[test]
    fn test_tick_updates_only_derived_price() {
        let mut cache = OrderCache::new();
        cache.replace_all(vec![make_cached(1, -1_000)], vec![]);

        cache.tick(Timestamp::new(START + 10));
        let cached = cache.get(OrderId::new(1)).unwrap();
        assert_eq!(cached.current_price, Wei::new(ETH / 100 - 10_000));
        // Authoritative fields untouched.
        assert_eq!(cached.order.amount, 10);
        assert_eq!(cached.order.escrowed_value, Wei::new(ETH / 10));
    }

    #[test]
    fn test_tick_is_idempotent_at_fixed_now() {
        let mut cache = OrderCache::new();
        cache.replace_all(vec![make_cached(1, -1_000)], vec![]);

        let now = Timestamp::new(START + 42);
        cache.tick(now);
        let first = cache.snapshot();
        cache.tick(now);
        assert_eq!(cache.snapshot(), first);
    }

    #[test]
    fn test_replace_all_swaps_never_merges() {
        let mut cache = OrderCache::new();
        cache.replace_all(
            vec![make_cached(1, 0), make_cached(2, 0), make_cached(3, 0)],
            vec![],
        );
        assert_eq!(cache.len(), 3);

        // Resync reports only {2, 4}: afterwards exactly {2, 4}, with 4's
        // fields fully populated and no remnants of 1 or 3.
        cache.replace_all(vec![make_cached(2, 0), make_cached(4, -500)], vec![]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(OrderId::new(1)).is_none());
        assert!(cache.get(OrderId::new(3)).is_none());
        assert!(cache.get(OrderId::new(2)).is_some());
        let four = cache.get(OrderId::new(4)).unwrap();
        assert_eq!(four.order.pricing.price_slope, SlopeWei::new(-500));
        assert_eq!(four.order.amount, 10);
    }

    #[test]
    fn test_trade_history_is_capped_newest_first() {
        let mut cache = OrderCache::new();
        let trades: Vec<Trade> = (0..15).map(make_trade).collect();
        cache.replace_all(vec![], trades);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.trades.len(), TRADE_HISTORY_LIMIT);
        // The head of the handed-over list is preserved.
        assert_eq!(snapshot.trades[0].order_id, OrderId::new(0));
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut cache = OrderCache::new();
        cache.replace_all(vec![make_cached(1, 0)], vec![make_trade(1)]);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.snapshot(), BookSnapshot::default());
    }
}
