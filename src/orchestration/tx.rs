//! Transaction lifecycle orchestration.
//!
//! Validates user input locally, converts human units to base units,
//! submits through the gateway and waits for confirmation, then triggers a
//! resync so the book is never stale right after a successful mutation.
//! Single-flight: while one mutating operation is in flight, further ones
//! are rejected as busy rather than queued, which rules out nonce conflicts
//! and duplicate escrow commitments. No local state is ever mutated
//! optimistically, so failures roll back nothing.

use crate::domain::{units, Order, OrderId, Side, Timestamp, TxHash, Wei};
use crate::error::AppError;
use crate::gateway::{ChainGateway, CreateOrderRequest, PendingTx};
use crate::orchestration::sync::SyncCoordinator;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// User-typed order form, in human units.
///
/// Amount is a whole-unit count, prices are decimals of the native
/// currency, the slope is per hour, and expiry is minutes from now. Blank
/// slope means flat; blank stop or expiry means none.
#[derive(Debug, Clone)]
pub struct CreateOrderForm {
    pub side: Side,
    pub amount: String,
    pub start_price: String,
    pub price_slope: String,
    pub stop_price: String,
    pub expiry_minutes: String,
}

/// Lifecycle of the single in-flight mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Validating,
    Submitting,
    AwaitingConfirmation,
}

#[derive(Clone)]
pub struct TransactionOrchestrator {
    gateway: Arc<dyn ChainGateway>,
    sync: SyncCoordinator,
    state: Arc<Mutex<TxState>>,
    read_only: bool,
}

impl TransactionOrchestrator {
    pub fn new(gateway: Arc<dyn ChainGateway>, sync: SyncCoordinator, read_only: bool) -> Self {
        Self {
            gateway,
            sync,
            state: Arc::new(Mutex::new(TxState::Idle)),
            read_only,
        }
    }

    /// Current lifecycle state; anything but `Idle` reads as busy.
    pub async fn state(&self) -> TxState {
        *self.state.lock().await
    }

    /// Validate, convert and submit a new order.
    pub async fn create_order(
        &self,
        form: &CreateOrderForm,
        epoch: Uuid,
    ) -> Result<TxHash, AppError> {
        self.begin().await?;
        let result = self.create_order_inner(form, epoch).await;
        self.set_state(TxState::Idle).await;
        result
    }

    /// Execute `requested` units against an order.
    ///
    /// The authoritative price is re-fetched immediately before submission;
    /// the last-ticked local price is never the basis of a monetary
    /// decision.
    pub async fn execute_order(
        &self,
        order: &Order,
        requested: u64,
        epoch: Uuid,
    ) -> Result<TxHash, AppError> {
        self.begin().await?;
        let result = self.execute_order_inner(order, requested, epoch).await;
        self.set_state(TxState::Idle).await;
        result
    }

    /// Cancel one of the session's own orders.
    pub async fn cancel_order(&self, id: OrderId, epoch: Uuid) -> Result<TxHash, AppError> {
        self.begin().await?;
        self.set_state(TxState::Submitting).await;
        let result = async {
            let pending = self.gateway.cancel_order(id).await?;
            self.confirm_and_resync(pending, epoch).await
        }
        .await;
        self.set_state(TxState::Idle).await;
        result
    }

    /// Clean up an order past its expiry time.
    pub async fn expire_order(&self, id: OrderId, epoch: Uuid) -> Result<TxHash, AppError> {
        self.begin().await?;
        self.set_state(TxState::Submitting).await;
        let result = async {
            let pending = self.gateway.expire_order(id).await?;
            self.confirm_and_resync(pending, epoch).await
        }
        .await;
        self.set_state(TxState::Idle).await;
        result
    }

    async fn create_order_inner(
        &self,
        form: &CreateOrderForm,
        epoch: Uuid,
    ) -> Result<TxHash, AppError> {
        let request = build_create_request(form, Timestamp::now())?;
        self.set_state(TxState::Submitting).await;
        let pending = self.gateway.create_order(&request).await?;
        let hash = self.confirm_and_resync(pending, epoch).await?;
        info!(tx = %hash, side = %request.side, amount = request.amount, "order created");
        Ok(hash)
    }

    async fn execute_order_inner(
        &self,
        order: &Order,
        requested: u64,
        epoch: Uuid,
    ) -> Result<TxHash, AppError> {
        if requested == 0 || requested > order.amount {
            return Err(AppError::Validation(format!(
                "execute amount must be between 1 and {}",
                order.amount
            )));
        }

        let fresh_price = self.gateway.current_price(order.id).await?;
        if fresh_price.is_zero() {
            return Err(AppError::NotExecutable);
        }

        // Executing a sell order is a buy counter-order and escrows the
        // value; executing a buy order is paid out of the order's escrow.
        let escrow = match order.side() {
            Side::Sell => fresh_price
                .checked_mul_amount(requested)
                .ok_or_else(|| AppError::Validation("escrow overflows base units".to_string()))?,
            Side::Buy => Wei::ZERO,
        };

        self.set_state(TxState::Submitting).await;
        let pending = self.gateway.execute_order(order.id, requested, escrow).await?;
        let hash = self.confirm_and_resync(pending, epoch).await?;
        info!(tx = %hash, order = %order.id, amount = requested, "order executed");
        Ok(hash)
    }

    /// Reject if read-only or if another mutating operation is in flight.
    async fn begin(&self) -> Result<(), AppError> {
        if self.read_only {
            return Err(AppError::ReadOnly);
        }
        let mut state = self.state.lock().await;
        if *state != TxState::Idle {
            return Err(AppError::Busy);
        }
        *state = TxState::Validating;
        Ok(())
    }

    async fn set_state(&self, next: TxState) {
        *self.state.lock().await = next;
    }

    async fn confirm_and_resync(
        &self,
        pending: PendingTx,
        epoch: Uuid,
    ) -> Result<TxHash, AppError> {
        self.set_state(TxState::AwaitingConfirmation).await;
        let hash = self.gateway.confirm(&pending).await?;
        self.sync.resync(epoch).await?;
        Ok(hash)
    }
}

fn build_create_request(
    form: &CreateOrderForm,
    now: Timestamp,
) -> Result<CreateOrderRequest, AppError> {
    let amount = form
        .amount
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|a| *a > 0)
        .ok_or_else(|| AppError::Validation("amount must be a positive integer".to_string()))?;

    let start_price = units::parse_ether(&form.start_price)?;

    let slope_per_hour = if form.price_slope.trim().is_empty() {
        0
    } else {
        units::parse_ether_signed(&form.price_slope)?
    };
    let price_slope = units::slope_per_second(slope_per_hour);

    let stop_price = if form.stop_price.trim().is_empty() {
        Wei::ZERO
    } else {
        units::parse_ether(&form.stop_price)?
    };

    let expiry_minutes = if form.expiry_minutes.trim().is_empty() {
        0
    } else {
        form.expiry_minutes.trim().parse::<u64>().map_err(|_| {
            AppError::Validation("expiry must be a non-negative number of minutes".to_string())
        })?
    };
    let expiry_time = if expiry_minutes == 0 {
        Timestamp::new(0)
    } else {
        Timestamp::new(now.as_u64() + expiry_minutes * 60)
    };

    let escrow = match form.side {
        Side::Buy => start_price
            .checked_mul_amount(amount)
            .ok_or_else(|| AppError::Validation("escrow overflows base units".to_string()))?,
        Side::Sell => Wei::ZERO,
    };

    Ok(CreateOrderRequest {
        side: form.side,
        amount,
        start_price,
        price_slope,
        stop_price,
        expiry_time,
        escrow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{BookSnapshot, OrderCache};
    use crate::domain::{Address, SlopeWei};
    use crate::gateway::{GatewayError, MockGateway};
    use crate::session::{NetworkProfile, WalletSession};
    use async_trait::async_trait;
    use tokio::sync::{watch, Notify};

    const ETH: u128 = 1_000_000_000_000_000_000;
    const NOW: u64 = 1_700_000_000;

    struct Harness {
        gateway: Arc<MockGateway>,
        orchestrator: TransactionOrchestrator,
        cache: Arc<Mutex<OrderCache>>,
        epoch: Uuid,
    }

    fn setup() -> Harness {
        setup_with(Arc::new(MockGateway::new(Timestamp::new(NOW))), false)
    }

    fn setup_with(gateway: Arc<MockGateway>, read_only: bool) -> Harness {
        let session = WalletSession::new(
            Address::new("0xabc".to_string()),
            NetworkProfile::localhost(),
        );
        let epoch = session.epoch;
        let cache = Arc::new(Mutex::new(OrderCache::new()));
        let session = Arc::new(Mutex::new(Some(session)));
        let (snapshots, _) = watch::channel(BookSnapshot::default());
        let sync = SyncCoordinator::new(gateway.clone(), cache.clone(), session, snapshots);
        let orchestrator = TransactionOrchestrator::new(gateway.clone(), sync, read_only);
        Harness {
            gateway,
            orchestrator,
            cache,
            epoch,
        }
    }

    fn buy_form() -> CreateOrderForm {
        CreateOrderForm {
            side: Side::Buy,
            amount: "10".to_string(),
            start_price: "0.01".to_string(),
            price_slope: "-0.0001".to_string(),
            stop_price: "0.005".to_string(),
            expiry_minutes: "120".to_string(),
        }
    }

    #[test]
    fn test_build_request_converts_units() {
        let request = build_create_request(&buy_form(), Timestamp::new(NOW)).unwrap();
        assert_eq!(request.amount, 10);
        assert_eq!(request.start_price, Wei::new(ETH / 100));
        // -0.0001 ETH/hr, integer-truncated to wei per second.
        assert_eq!(request.price_slope, SlopeWei::new(-27_777_777_777));
        assert_eq!(request.stop_price, Wei::new(5 * ETH / 1000));
        assert_eq!(request.expiry_time, Timestamp::new(NOW + 120 * 60));
        // Buy escrow is amount x start price.
        assert_eq!(request.escrow, Wei::new(10 * (ETH / 100)));
    }

    #[test]
    fn test_build_request_defaults_blanks() {
        let form = CreateOrderForm {
            side: Side::Sell,
            amount: "3".to_string(),
            start_price: "0.02".to_string(),
            price_slope: "".to_string(),
            stop_price: "".to_string(),
            expiry_minutes: "".to_string(),
        };
        let request = build_create_request(&form, Timestamp::new(NOW)).unwrap();
        assert_eq!(request.price_slope, SlopeWei::ZERO);
        assert_eq!(request.stop_price, Wei::ZERO);
        assert!(!request.expiry_time.is_set());
        // Sell side attaches nothing; the asset itself is the escrow.
        assert_eq!(request.escrow, Wei::ZERO);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_gateway_contact() {
        let harness = setup();

        for (field, value) in [
            ("amount", "0"),
            ("amount", "-3"),
            ("amount", "ten"),
            ("start_price", "-0.5"),
            ("start_price", "abc"),
            ("price_slope", "fast"),
            ("expiry_minutes", "-5"),
        ] {
            let mut form = buy_form();
            match field {
                "amount" => form.amount = value.to_string(),
                "start_price" => form.start_price = value.to_string(),
                "price_slope" => form.price_slope = value.to_string(),
                _ => form.expiry_minutes = value.to_string(),
            }
            let err = harness
                .orchestrator
                .create_order(&form, harness.epoch)
                .await
                .unwrap_err();
            assert!(
                matches!(err, AppError::Validation(_)),
                "{}={} should fail validation, got {:?}",
                field,
                value,
                err
            );
        }
        assert_eq!(harness.gateway.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_create_confirms_and_resyncs() {
        let harness = setup();
        harness.gateway.set_caller(Address::new("0xabc".to_string()));

        harness
            .orchestrator
            .create_order(&buy_form(), harness.epoch)
            .await
            .unwrap();

        // The post-confirmation resync already populated the cache.
        assert_eq!(harness.cache.lock().await.len(), 1);
        assert_eq!(harness.orchestrator.state().await, TxState::Idle);
    }

    #[tokio::test]
    async fn test_execute_aborts_on_zero_price_without_submitting() {
        let harness = setup();
        harness
            .orchestrator
            .create_order(&buy_form(), harness.epoch)
            .await
            .unwrap();
        let order = harness.gateway.order(OrderId::new(1)).unwrap();
        let submissions_after_create = harness.gateway.submission_count();

        // Decay far past the stop: the fresh authoritative price is zero.
        harness.gateway.advance_secs(10_000_000);
        let err = harness
            .orchestrator
            .execute_order(&order, 1, harness.epoch)
            .await
            .unwrap_err();
        assert_eq!(err, AppError::NotExecutable);
        assert_eq!(harness.gateway.submission_count(), submissions_after_create);
    }

    #[tokio::test]
    async fn test_execute_rejects_out_of_range_amount() {
        let harness = setup();
        harness
            .orchestrator
            .create_order(&buy_form(), harness.epoch)
            .await
            .unwrap();
        let order = harness.gateway.order(OrderId::new(1)).unwrap();

        for amount in [0, 11] {
            let err = harness
                .orchestrator
                .execute_order(&order, amount, harness.epoch)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_execute_sell_order_attaches_value_escrow() {
        let harness = setup();
        let mut form = buy_form();
        form.side = Side::Sell;
        form.stop_price = "".to_string();
        form.price_slope = "".to_string();
        harness
            .orchestrator
            .create_order(&form, harness.epoch)
            .await
            .unwrap();
        let order = harness.gateway.order(OrderId::new(1)).unwrap();

        // The mock reverts on an escrow mismatch, so success here means the
        // orchestrator computed requested x fresh price.
        harness
            .orchestrator
            .execute_order(&order, 4, harness.epoch)
            .await
            .unwrap();
        assert_eq!(harness.gateway.order(OrderId::new(1)).unwrap().amount, 6);
    }

    #[tokio::test]
    async fn test_read_only_mode_rejects_mutations() {
        let harness = setup_with(Arc::new(MockGateway::new(Timestamp::new(NOW))), true);
        let err = harness
            .orchestrator
            .create_order(&buy_form(), harness.epoch)
            .await
            .unwrap_err();
        assert_eq!(err, AppError::ReadOnly);
        assert_eq!(harness.gateway.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let harness = setup();
        harness
            .gateway
            .fail_next_submit(GatewayError::Rejected("user declined".to_string()));

        let err = harness
            .orchestrator
            .create_order(&buy_form(), harness.epoch)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Rejected(_)));
        assert!(harness.cache.lock().await.is_empty());
        assert_eq!(harness.orchestrator.state().await, TxState::Idle);
    }

    /// Delegates to the mock but parks in `confirm` until released, so a
    /// second operation can be attempted mid-flight.
    #[derive(Debug)]
    struct GatedGateway {
        inner: MockGateway,
        entered_confirm: Notify,
        release_confirm: Notify,
    }

    #[async_trait]
    impl ChainGateway for GatedGateway {
        async fn list_active_order_ids(&self) -> Result<Vec<OrderId>, GatewayError> {
            self.inner.list_active_order_ids().await
        }
        async fn get_order_with_price(
            &self,
            id: OrderId,
        ) -> Result<(crate::domain::Order, Wei), GatewayError> {
            self.inner.get_order_with_price(id).await
        }
        async fn current_price(&self, id: OrderId) -> Result<Wei, GatewayError> {
            self.inner.current_price(id).await
        }
        async fn list_recent_executions(
            &self,
            limit: usize,
        ) -> Result<Vec<crate::domain::Trade>, GatewayError> {
            self.inner.list_recent_executions(limit).await
        }
        async fn create_order(&self, req: &CreateOrderRequest) -> Result<PendingTx, GatewayError> {
            self.inner.create_order(req).await
        }
        async fn execute_order(
            &self,
            id: OrderId,
            amount: u64,
            escrow: Wei,
        ) -> Result<PendingTx, GatewayError> {
            self.inner.execute_order(id, amount, escrow).await
        }
        async fn cancel_order(&self, id: OrderId) -> Result<PendingTx, GatewayError> {
            self.inner.cancel_order(id).await
        }
        async fn expire_order(&self, id: OrderId) -> Result<PendingTx, GatewayError> {
            self.inner.expire_order(id).await
        }
        async fn confirm(&self, pending: &PendingTx) -> Result<TxHash, GatewayError> {
            self.entered_confirm.notify_one();
            self.release_confirm.notified().await;
            self.inner.confirm(pending).await
        }
    }

    #[tokio::test]
    async fn test_single_flight_rejects_second_mutation_as_busy() {
        let gateway = Arc::new(GatedGateway {
            inner: MockGateway::new(Timestamp::new(NOW)),
            entered_confirm: Notify::new(),
            release_confirm: Notify::new(),
        });
        let session = WalletSession::new(
            Address::new("0xabc".to_string()),
            NetworkProfile::localhost(),
        );
        let epoch = session.epoch;
        let cache = Arc::new(Mutex::new(OrderCache::new()));
        let session = Arc::new(Mutex::new(Some(session)));
        let (snapshots, _) = watch::channel(BookSnapshot::default());
        let sync = SyncCoordinator::new(gateway.clone(), cache, session, snapshots);
        let orchestrator = TransactionOrchestrator::new(gateway.clone(), sync, false);

        let first = {
            let orchestrator = orchestrator.clone();
            let form = buy_form();
            tokio::spawn(async move { orchestrator.create_order(&form, epoch).await })
        };
        gateway.entered_confirm.notified().await;

        // First operation is parked awaiting confirmation; the inner mock
        // saw exactly one submission.
        assert_eq!(orchestrator.state().await, TxState::AwaitingConfirmation);
        assert_eq!(gateway.inner.submission_count(), 1);

        let target = crate::domain::Order {
            id: OrderId::new(1),
            creator: Address::new("0xdef".to_string()),
            amount: 10,
            pricing: crate::domain::PricingParams {
                side: Side::Buy,
                start_price: Wei::new(ETH / 100),
                price_slope: SlopeWei::ZERO,
                start_time: Timestamp::new(NOW),
                stop_price: Wei::ZERO,
                expiry_time: Timestamp::new(0),
            },
            escrowed_value: Wei::new(ETH / 10),
            active: true,
        };
        let err = orchestrator
            .execute_order(&target, 1, epoch)
            .await
            .unwrap_err();
        assert_eq!(err, AppError::Busy);
        // The busy rejection never reached the gateway.
        assert_eq!(gateway.inner.submission_count(), 1);

        gateway.release_confirm.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(orchestrator.state().await, TxState::Idle);
    }
}
