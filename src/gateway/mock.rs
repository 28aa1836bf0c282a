//! In-memory gateway for testing without a node.
//!
//! Behaves as the authority: evaluates prices with the same closed form the
//! contract uses, enforces escrow and amount rules, decrements on partial
//! fills and appends execution events. Writes apply at submission; `confirm`
//! is a lookup, with failure injection hooks for both phases.

use super::{ChainGateway, CreateOrderRequest, GatewayError, PendingTx};
use crate::domain::{Address, Order, OrderId, PricingParams, Timestamp, Trade, TxHash, Wei};
use crate::engine::pricing;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct MockState {
    orders: BTreeMap<u64, Order>,
    // Oldest first, like the chain's event log.
    trades: Vec<Trade>,
    next_id: u64,
    next_tx: u64,
    now: Timestamp,
    caller: Address,
    fail_next_submit: Option<GatewayError>,
    fail_next_confirm: Option<GatewayError>,
    submissions: u64,
}

/// Mock authority with predefined and scriptable state.
#[derive(Debug)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    /// Create an empty mock authority whose clock reads `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            state: Mutex::new(MockState {
                orders: BTreeMap::new(),
                trades: Vec::new(),
                next_id: 1,
                next_tx: 0,
                now,
                caller: Address::zero(),
                fail_next_submit: None,
                fail_next_confirm: None,
                submissions: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an order, keeping the id counter ahead of it.
    pub fn with_order(self, order: Order) -> Self {
        {
            let mut state = self.state();
            state.next_id = state.next_id.max(order.id.as_u64() + 1);
            state.orders.insert(order.id.as_u64(), order);
        }
        self
    }

    /// Seed an execution event.
    pub fn with_trade(self, trade: Trade) -> Self {
        self.state().trades.push(trade);
        self
    }

    /// Account subsequent writes are attributed to.
    pub fn set_caller(&self, caller: Address) {
        self.state().caller = caller;
    }

    /// Move the authority clock.
    pub fn set_now(&self, now: Timestamp) {
        self.state().now = now;
    }

    /// Advance the authority clock by `secs`.
    pub fn advance_secs(&self, secs: u64) {
        let mut state = self.state();
        state.now = Timestamp::new(state.now.as_u64() + secs);
    }

    /// Make the next write submission fail with `err`.
    pub fn fail_next_submit(&self, err: GatewayError) {
        self.state().fail_next_submit = Some(err);
    }

    /// Make the next confirmation fail with `err`.
    pub fn fail_next_confirm(&self, err: GatewayError) {
        self.state().fail_next_confirm = Some(err);
    }

    /// Number of write submissions attempted, including failed ones.
    pub fn submission_count(&self) -> u64 {
        self.state().submissions
    }

    /// Current authoritative record of an order, for assertions.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state().orders.get(&id.as_u64()).cloned()
    }

    fn mint_tx(state: &mut MockState) -> PendingTx {
        state.next_tx += 1;
        PendingTx(TxHash::new(format!("0x{:064x}", state.next_tx)))
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn list_active_order_ids(&self) -> Result<Vec<OrderId>, GatewayError> {
        Ok(self
            .state()
            .orders
            .values()
            .filter(|o| o.active)
            .map(|o| o.id)
            .collect())
    }

    async fn get_order_with_price(&self, id: OrderId) -> Result<(Order, Wei), GatewayError> {
        let state = self.state();
        let order = state
            .orders
            .get(&id.as_u64())
            .cloned()
            .ok_or_else(|| GatewayError::Reverted("order does not exist".to_string()))?;
        let price = pricing::evaluate(&order.pricing, state.now);
        Ok((order, price))
    }

    async fn current_price(&self, id: OrderId) -> Result<Wei, GatewayError> {
        let state = self.state();
        let order = state
            .orders
            .get(&id.as_u64())
            .ok_or_else(|| GatewayError::Reverted("order does not exist".to_string()))?;
        Ok(pricing::evaluate(&order.pricing, state.now))
    }

    async fn list_recent_executions(&self, limit: usize) -> Result<Vec<Trade>, GatewayError> {
        let state = self.state();
        let skip = state.trades.len().saturating_sub(limit);
        let mut recent: Vec<Trade> = state.trades[skip..].to_vec();
        recent.reverse();
        Ok(recent)
    }

    async fn create_order(&self, req: &CreateOrderRequest) -> Result<PendingTx, GatewayError> {
        let mut state = self.state();
        state.submissions += 1;
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }
        if req.amount == 0 {
            return Err(GatewayError::Reverted("zero amount".to_string()));
        }

        let expected_escrow = if req.side.is_buy() {
            req.start_price
                .checked_mul_amount(req.amount)
                .ok_or_else(|| GatewayError::Reverted("escrow overflow".to_string()))?
        } else {
            Wei::ZERO
        };
        if req.escrow != expected_escrow {
            return Err(GatewayError::Reverted("incorrect escrow".to_string()));
        }

        let id = state.next_id;
        state.next_id += 1;
        let order = Order {
            id: OrderId::new(id),
            creator: state.caller.clone(),
            amount: req.amount,
            pricing: PricingParams {
                side: req.side,
                start_price: req.start_price,
                price_slope: req.price_slope,
                start_time: state.now,
                stop_price: req.stop_price,
                expiry_time: req.expiry_time,
            },
            // Sell-side escrow is the asset itself; tracked in whole units.
            escrowed_value: if req.side.is_buy() {
                req.escrow
            } else {
                Wei::new(req.amount as u128)
            },
            active: true,
        };
        state.orders.insert(id, order);
        Ok(Self::mint_tx(&mut state))
    }

    async fn execute_order(
        &self,
        id: OrderId,
        amount: u64,
        escrow: Wei,
    ) -> Result<PendingTx, GatewayError> {
        let mut state = self.state();
        state.submissions += 1;
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }

        let now = state.now;
        let order = state
            .orders
            .get(&id.as_u64())
            .filter(|o| o.active)
            .cloned()
            .ok_or_else(|| GatewayError::Reverted("order not active".to_string()))?;

        let price = pricing::evaluate(&order.pricing, now);
        if price.is_zero() {
            return Err(GatewayError::Reverted("order not executable".to_string()));
        }
        if amount == 0 || amount > order.amount {
            return Err(GatewayError::Reverted("amount exceeds order".to_string()));
        }

        let expected_escrow = if order.side().is_buy() {
            Wei::ZERO
        } else {
            price
                .checked_mul_amount(amount)
                .ok_or_else(|| GatewayError::Reverted("escrow overflow".to_string()))?
        };
        if escrow != expected_escrow {
            return Err(GatewayError::Reverted("incorrect escrow".to_string()));
        }

        let pending = Self::mint_tx(&mut state);
        if let Some(stored) = state.orders.get_mut(&id.as_u64()) {
            stored.amount -= amount;
            let spent = if stored.side().is_buy() {
                price.checked_mul_amount(amount).unwrap_or(Wei::ZERO)
            } else {
                Wei::new(amount as u128)
            };
            stored.escrowed_value =
                Wei::new(stored.escrowed_value.as_u128().saturating_sub(spent.as_u128()));
            if stored.amount == 0 {
                stored.active = false;
            }
        }
        let tx_hash = pending.hash().clone();
        state.trades.push(Trade {
            order_id: id,
            amount,
            price,
            tx_hash,
        });
        Ok(pending)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<PendingTx, GatewayError> {
        let mut state = self.state();
        state.submissions += 1;
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }

        let caller = state.caller.clone();
        let order = state
            .orders
            .get_mut(&id.as_u64())
            .filter(|o| o.active)
            .ok_or_else(|| GatewayError::Reverted("order not active".to_string()))?;
        if !order.creator.matches(&caller) {
            return Err(GatewayError::Reverted("only creator can cancel".to_string()));
        }
        order.active = false;
        Ok(Self::mint_tx(&mut state))
    }

    async fn expire_order(&self, id: OrderId) -> Result<PendingTx, GatewayError> {
        let mut state = self.state();
        state.submissions += 1;
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }

        let now = state.now;
        let order = state
            .orders
            .get_mut(&id.as_u64())
            .filter(|o| o.active)
            .ok_or_else(|| GatewayError::Reverted("order not active".to_string()))?;
        if !order.pricing.expiry_time.is_set() || now < order.pricing.expiry_time {
            return Err(GatewayError::Reverted("order not expired".to_string()));
        }
        order.active = false;
        Ok(Self::mint_tx(&mut state))
    }

    async fn confirm(&self, pending: &PendingTx) -> Result<TxHash, GatewayError> {
        let mut state = self.state();
        if let Some(err) = state.fail_next_confirm.take() {
            return Err(err);
        }
        Ok(pending.hash().clone())
    }
}
