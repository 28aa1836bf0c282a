//! Full resynchronization against the authority.
//!
//! A resync always fetches the complete active set, never a delta. That
//! trades bandwidth for the guarantee that the cache can never hold a
//! partial merge, and the active set is expected to stay small. It is the
//! sole path by which orders appear, disappear, or change authoritative
//! fields locally, including changes made by other participants.

use crate::book::{BookSnapshot, OrderCache};
use crate::domain::{CachedOrder, Order, Timestamp, Trade, Wei, TRADE_HISTORY_LIMIT};
use crate::engine::pricing;
use crate::gateway::{ChainGateway, GatewayError};
use crate::session::WalletSession;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Local/authority price divergence tolerated as clock skew, in seconds of
/// slope drift. Anything beyond it points at an extrapolation bug and is
/// surfaced instead of silently trusted.
const PRICE_SKEW_TOLERANCE_SECS: u128 = 2;

#[derive(Clone)]
pub struct SyncCoordinator {
    gateway: Arc<dyn ChainGateway>,
    cache: Arc<Mutex<OrderCache>>,
    session: Arc<Mutex<Option<WalletSession>>>,
    snapshots: watch::Sender<BookSnapshot>,
}

impl SyncCoordinator {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        cache: Arc<Mutex<OrderCache>>,
        session: Arc<Mutex<Option<WalletSession>>>,
        snapshots: watch::Sender<BookSnapshot>,
    ) -> Self {
        Self {
            gateway,
            cache,
            session,
            snapshots,
        }
    }

    /// Refresh the cache from the authority, guarded by the session epoch.
    ///
    /// The fetch runs without holding the cache lock, so the tick timer
    /// keeps re-pricing the previous snapshot while this is in flight; the
    /// swap itself is atomic from the timer's point of view. Results are
    /// discarded if the session changed underneath the fetch.
    pub async fn resync(&self, epoch: Uuid) -> Result<(), GatewayError> {
        if !self.epoch_is_current(epoch).await {
            debug!("skipping resync for a stale session");
            return Ok(());
        }

        let now = Timestamp::now();
        let (orders, trades) = self.fetch_book(now).await?;

        if !self.epoch_is_current(epoch).await {
            warn!("discarding resync results for a stale session");
            return Ok(());
        }

        let mut cache = self.cache.lock().await;
        cache.replace_all(orders, trades);
        let _ = self.snapshots.send(cache.snapshot());
        info!(orders = cache.len(), "resync complete");
        Ok(())
    }

    async fn epoch_is_current(&self, epoch: Uuid) -> bool {
        self.session.lock().await.as_ref().map(|s| s.epoch) == Some(epoch)
    }

    async fn fetch_book(
        &self,
        now: Timestamp,
    ) -> Result<(Vec<CachedOrder>, Vec<Trade>), GatewayError> {
        let ids = self.gateway.list_active_order_ids().await?;
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            match self.gateway.get_order_with_price(id).await {
                Ok((order, authority_price)) => {
                    reconcile_price(&order, authority_price, now);
                    orders.push(CachedOrder {
                        order,
                        current_price: authority_price,
                    });
                }
                // Another participant can consume an order between the id
                // listing and this fetch; drop it, the next resync settles it.
                Err(GatewayError::Reverted(reason)) => {
                    warn!(id = %id, reason = %reason, "order vanished mid-resync");
                }
                Err(e) => return Err(e),
            }
        }

        let trades = self.gateway.list_recent_executions(TRADE_HISTORY_LIMIT).await?;
        Ok((orders, trades))
    }
}

/// Compare the local extrapolation with the authority's evaluation.
fn reconcile_price(order: &Order, authority_price: Wei, now: Timestamp) {
    let local = pricing::evaluate(&order.pricing, now);
    if local == authority_price {
        return;
    }

    if local.is_zero() != authority_price.is_zero() {
        // One clock sits on the far side of a stop/expiry boundary.
        debug!(
            id = %order.id,
            local = %local,
            authority = %authority_price,
            "price crossed an execution boundary between clocks"
        );
        return;
    }

    let tolerance = order
        .pricing
        .price_slope
        .as_i128()
        .unsigned_abs()
        .saturating_mul(PRICE_SKEW_TOLERANCE_SECS);
    let divergence = local.as_u128().abs_diff(authority_price.as_u128());
    if divergence > tolerance {
        warn!(
            id = %order.id,
            local = %local,
            authority = %authority_price,
            "local price extrapolation diverges beyond clock skew"
        );
    }
}
