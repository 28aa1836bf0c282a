//! The client actor: owns the order cache and wallet session, runs the
//! one-second re-pricing tick, and publishes immutable book snapshots over
//! a watch channel.
//!
//! All mutation funnels through three paths: the tick (derived prices
//! only), `replace_all` via resync (authoritative fields), and `clear` on
//! disconnect. Network operations never hold the cache lock while
//! suspended, so the timer keeps re-pricing the previous snapshot while a
//! resync or transaction is in flight.

use crate::book::{BookSnapshot, OrderCache};
use crate::config::Config;
use crate::domain::{Address, OrderId, Timestamp, TxHash};
use crate::error::AppError;
use crate::gateway::ChainGateway;
use crate::orchestration::{CreateOrderForm, SyncCoordinator, TransactionOrchestrator, TxState};
use crate::session::{NetworkProfile, SessionError, SessionProvider, WalletSession};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;
use tracing::{info, warn};

pub struct AuctionClient {
    cache: Arc<Mutex<OrderCache>>,
    session: Arc<Mutex<Option<WalletSession>>>,
    provider: Arc<dyn SessionProvider>,
    sync: SyncCoordinator,
    orchestrator: TransactionOrchestrator,
    snapshots: watch::Sender<BookSnapshot>,
    // Keep one receiver alive so the watch channel always retains the most
    // recently published snapshot, even while no external observer is
    // subscribed (tokio's `send` drops the value when the receiver count is
    // zero).
    _snapshot_keepalive: watch::Receiver<BookSnapshot>,
    profile: NetworkProfile,
    tick_interval: Duration,
    // Explicit cancel handles tied to the session lifetime.
    tick_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl AuctionClient {
    pub fn new(
        config: &Config,
        gateway: Arc<dyn ChainGateway>,
        provider: Arc<dyn SessionProvider>,
    ) -> Self {
        let cache = Arc::new(Mutex::new(OrderCache::new()));
        let session = Arc::new(Mutex::new(None));
        let (snapshots, snapshot_keepalive) = watch::channel(BookSnapshot::default());
        let sync = SyncCoordinator::new(
            gateway.clone(),
            cache.clone(),
            session.clone(),
            snapshots.clone(),
        );
        let orchestrator =
            TransactionOrchestrator::new(gateway, sync.clone(), config.is_read_only());

        Self {
            cache,
            session,
            provider,
            sync,
            orchestrator,
            snapshots,
            _snapshot_keepalive: snapshot_keepalive,
            profile: config.profile(),
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            tick_task: Arc::new(Mutex::new(None)),
            event_task: Mutex::new(None),
        }
    }

    /// Observe book snapshots; a fresh value arrives after every tick,
    /// resync and disconnect.
    pub fn subscribe(&self) -> watch::Receiver<BookSnapshot> {
        self.snapshots.subscribe()
    }

    /// Address of the connected session, if any.
    pub async fn connected_address(&self) -> Option<Address> {
        self.session.lock().await.as_ref().map(|s| s.address.clone())
    }

    /// Lifecycle state of the in-flight mutating operation, if any.
    pub async fn tx_state(&self) -> TxState {
        self.orchestrator.state().await
    }

    /// Connect the wallet: request accounts, settle on the configured
    /// network, resync the book and start the tick.
    pub async fn connect(&self) -> Result<Address, AppError> {
        let accounts = self.provider.request_accounts().await?;
        let address = accounts
            .into_iter()
            .next()
            .ok_or(SessionError::NoAccounts)?;
        self.provider.ensure_network(&self.profile).await?;

        let session = WalletSession::new(address.clone(), self.profile.clone());
        let epoch = session.epoch;
        *self.session.lock().await = Some(session);
        info!(address = %address.short(), chain = %self.profile.chain_name, "wallet connected");

        self.sync.resync(epoch).await?;
        self.start_tick_task().await;
        self.start_event_task().await;
        Ok(address)
    }

    /// Disconnect: stop the tick, revoke permissions (best-effort) and
    /// clear all session-scoped state.
    pub async fn disconnect(&self) {
        self.stop_tasks().await;
        if let Err(e) = self.provider.revoke_permissions().await {
            warn!("revoking permissions failed: {}", e);
        }
        self.invalidate_session().await;
        info!("wallet disconnected");
    }

    /// Manual refresh: a full resync of orders and trade history.
    pub async fn refresh(&self) -> Result<(), AppError> {
        let epoch = self.current_epoch().await?;
        self.sync.resync(epoch).await?;
        Ok(())
    }

    pub async fn create_order(&self, form: &CreateOrderForm) -> Result<TxHash, AppError> {
        let epoch = self.current_epoch().await?;
        self.orchestrator.create_order(form, epoch).await
    }

    pub async fn execute_order(&self, id: OrderId, amount: u64) -> Result<TxHash, AppError> {
        let epoch = self.current_epoch().await?;
        let order = self
            .cache
            .lock()
            .await
            .get(id)
            .map(|cached| cached.order.clone())
            .ok_or_else(|| AppError::Validation(format!("unknown order {}", id)))?;
        self.orchestrator.execute_order(&order, amount, epoch).await
    }

    pub async fn cancel_order(&self, id: OrderId) -> Result<TxHash, AppError> {
        let epoch = self.current_epoch().await?;
        self.orchestrator.cancel_order(id, epoch).await
    }

    pub async fn expire_order(&self, id: OrderId) -> Result<TxHash, AppError> {
        let epoch = self.current_epoch().await?;
        self.orchestrator.expire_order(id, epoch).await
    }

    async fn current_epoch(&self) -> Result<Uuid, AppError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.epoch)
            .ok_or_else(|| SessionError::NotConnected.into())
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
        let mut cache = self.cache.lock().await;
        cache.clear();
        let _ = self.snapshots.send(cache.snapshot());
    }

    async fn start_tick_task(&self) {
        let cache = self.cache.clone();
        let snapshots = self.snapshots.clone();
        let period = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; prices are already fresh
            // from the connect resync.
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut cache = cache.lock().await;
                cache.tick(Timestamp::now());
                let _ = snapshots.send(cache.snapshot());
            }
        });

        if let Some(old) = self.tick_task.lock().await.replace(handle) {
            old.abort();
        }
    }

    /// React to wallet environment events: any account or chain change
    /// invalidates the session and clears the cache.
    async fn start_event_task(&self) {
        let mut events = self.provider.subscribe_events();
        let session = self.session.clone();
        let cache = self.cache.clone();
        let snapshots = self.snapshots.clone();
        let tick_task = self.tick_task.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                warn!(?event, "wallet environment changed; invalidating session");
                if let Some(tick) = tick_task.lock().await.take() {
                    tick.abort();
                }
                *session.lock().await = None;
                let mut cache = cache.lock().await;
                cache.clear();
                let _ = snapshots.send(cache.snapshot());
            }
        });

        if let Some(old) = self.event_task.lock().await.replace(handle) {
            old.abort();
        }
    }

    async fn stop_tasks(&self) {
        if let Some(handle) = self.tick_task.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.event_task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Order, PricingParams, Side, SlopeWei, Wei};
    use crate::gateway::MockGateway;
    use crate::session::{MockSessionProvider, SessionEvent};
    use std::collections::HashMap;

    const ETH: u128 = 1_000_000_000_000_000_000;

    fn test_config() -> Config {
        let mut env_map = HashMap::new();
        env_map.insert(
            "AUCTION_CONTRACT_ADDRESS".to_string(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
        );
        env_map.insert("AUCTION_TICK_INTERVAL_MS".to_string(), "20".to_string());
        Config::from_env_map(env_map).unwrap()
    }

    fn seeded_gateway() -> Arc<MockGateway> {
        Arc::new(
            MockGateway::new(Timestamp::now()).with_order(Order {
                id: OrderId::new(1),
                creator: Address::new("0xfeed000000000000000000000000000000000001".to_string()),
                amount: 10,
                pricing: PricingParams {
                    side: Side::Buy,
                    start_price: Wei::new(ETH / 100),
                    price_slope: SlopeWei::ZERO,
                    start_time: Timestamp::now(),
                    stop_price: Wei::ZERO,
                    expiry_time: Timestamp::new(0),
                },
                escrowed_value: Wei::new(ETH / 10),
                active: true,
            }),
        )
    }

    fn wallet() -> Address {
        Address::new("0xabc0000000000000000000000000000000000002".to_string())
    }

    #[tokio::test]
    async fn test_connect_resyncs_and_reports_address() {
        let provider = Arc::new(MockSessionProvider::new(vec![wallet()]));
        let client = AuctionClient::new(&test_config(), seeded_gateway(), provider.clone());

        let address = client.connect().await.unwrap();
        assert_eq!(address, wallet());
        assert_eq!(client.connected_address().await, Some(wallet()));
        // The connect resync populated the published snapshot.
        assert_eq!(client.subscribe().borrow().orders.len(), 1);
        // The configured chain was requested from the provider.
        assert_eq!(provider.requested_networks(), vec!["0x7a69".to_string()]);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_fails_on_wrong_network() {
        let provider = Arc::new(MockSessionProvider::wrong_network(vec![wallet()]));
        let client = AuctionClient::new(&test_config(), seeded_gateway(), provider);

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, AppError::Session(SessionError::WrongNetwork(_))));
        assert!(client.connected_address().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_clears_published_state() {
        let provider = Arc::new(MockSessionProvider::new(vec![wallet()]));
        let client = AuctionClient::new(&test_config(), seeded_gateway(), provider);

        client.connect().await.unwrap();
        client.disconnect().await;

        assert!(client.connected_address().await.is_none());
        assert!(client.subscribe().borrow().orders.is_empty());
        let err = client.refresh().await.unwrap_err();
        assert_eq!(err, AppError::Session(SessionError::NotConnected));
    }

    #[tokio::test]
    async fn test_session_event_invalidates_session() {
        let provider = Arc::new(MockSessionProvider::new(vec![wallet()]));
        let client = AuctionClient::new(&test_config(), seeded_gateway(), provider.clone());

        client.connect().await.unwrap();
        provider.emit(SessionEvent::ChainChanged("0x1".to_string()));

        // Give the event task a moment to react.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.connected_address().await.is_none());
        assert!(client.subscribe().borrow().orders.is_empty());
    }

    #[tokio::test]
    async fn test_tick_republishes_snapshots() {
        let provider = Arc::new(MockSessionProvider::new(vec![wallet()]));
        let client = AuctionClient::new(&test_config(), seeded_gateway(), provider);

        client.connect().await.unwrap();
        let mut snapshots = client.subscribe();

        // At least one timer tick lands within a few periods.
        tokio::time::timeout(Duration::from_millis(500), snapshots.changed())
            .await
            .expect("tick never published")
            .unwrap();
        assert_eq!(snapshots.borrow_and_update().orders.len(), 1);

        client.disconnect().await;
    }
}
