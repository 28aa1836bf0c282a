pub mod book;
pub mod client;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod orchestration;
pub mod session;

pub use book::{BookSnapshot, OrderCache};
pub use client::AuctionClient;
pub use config::{Config, NetworkName};
pub use domain::{
    Address, CachedOrder, Order, OrderId, PricingParams, Side, SlopeWei, Timestamp, Trade, TxHash,
    Wei,
};
pub use error::AppError;
pub use gateway::{ChainGateway, GatewayError, MockGateway, RpcGateway};
pub use orchestration::{CreateOrderForm, SyncCoordinator, TransactionOrchestrator, TxState};
pub use session::{
    MockSessionProvider, NetworkProfile, RpcSessionProvider, SessionError, SessionEvent,
    SessionProvider, WalletSession,
};
