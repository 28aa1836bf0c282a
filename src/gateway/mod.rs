//! Chain gateway abstraction: the authoritative read/write boundary.
//!
//! Reads may be stale by one confirmed block; writes are submitted and then
//! confirmed as two separate suspensions, mirroring the submit/wait shape of
//! the underlying transaction flow. The gateway never mutates local state;
//! callers reflect confirmed writes by resyncing.

use crate::domain::{Order, OrderId, SlopeWei, Timestamp, Trade, TxHash, Side, Wei};
use async_trait::async_trait;
use thiserror::Error;

pub mod abi;
pub mod mock;
pub mod rpc;

pub use mock::MockGateway;
pub use rpc::RpcGateway;

/// Parameters for a new order, in authority units.
///
/// `start_time` is not included: the authority stamps it at inclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderRequest {
    pub side: Side,
    /// Quantity in whole units.
    pub amount: u64,
    pub start_price: Wei,
    pub price_slope: SlopeWei,
    /// Zero means no stop.
    pub stop_price: Wei,
    /// Absolute timestamp; zero means no expiry.
    pub expiry_time: Timestamp,
    /// Value attached to the transaction (buy side escrow; zero for sells).
    pub escrow: Wei,
}

/// A submitted but not yet confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTx(pub TxHash);

impl PendingTx {
    pub fn hash(&self) -> &TxHash {
        &self.0
    }
}

/// Error type for gateway operations.
///
/// The three write outcomes the client must distinguish for user messaging
/// (`Rejected`, `Reverted`, network trouble) are separate variants; all are
/// otherwise treated identically — the transaction did not complete and no
/// local state was touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// RPC endpoint unreachable or a read failed after retries.
    #[error("network error: {0}")]
    Network(String),
    /// The RPC node answered with an error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The user declined to sign the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),
    /// The authority rejected the state transition.
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// Malformed response payload.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<abi::AbiError> for GatewayError {
    fn from(err: abi::AbiError) -> Self {
        GatewayError::Parse(err.to_string())
    }
}

/// Authoritative read/write interface to the on-chain order book.
#[async_trait]
pub trait ChainGateway: Send + Sync + std::fmt::Debug {
    /// Ids of all orders the authority currently considers live.
    async fn list_active_order_ids(&self) -> Result<Vec<OrderId>, GatewayError>;

    /// Full order record plus the authority's own price evaluation.
    ///
    /// The returned price is ground truth; local extrapolation is
    /// reconciled against it on every resync.
    async fn get_order_with_price(&self, id: OrderId) -> Result<(Order, Wei), GatewayError>;

    /// The authority's current price for one order.
    ///
    /// Re-fetched immediately before every execution so a monetary decision
    /// never rests on a locally ticked price.
    async fn current_price(&self, id: OrderId) -> Result<Wei, GatewayError>;

    /// Most recent executions, newest first, at most `limit`.
    async fn list_recent_executions(&self, limit: usize) -> Result<Vec<Trade>, GatewayError>;

    /// Submit an order creation. Resolves once the transaction is accepted
    /// into the mempool; confirmation is a separate step.
    async fn create_order(&self, req: &CreateOrderRequest) -> Result<PendingTx, GatewayError>;

    /// Submit an execution against an order, attaching `escrow`.
    async fn execute_order(
        &self,
        id: OrderId,
        amount: u64,
        escrow: Wei,
    ) -> Result<PendingTx, GatewayError>;

    /// Submit a cancellation (creator only).
    async fn cancel_order(&self, id: OrderId) -> Result<PendingTx, GatewayError>;

    /// Submit an expiry cleanup for an order past its expiry time.
    async fn expire_order(&self, id: OrderId) -> Result<PendingTx, GatewayError>;

    /// Suspend until the submitted transaction is confirmed or fails.
    async fn confirm(&self, pending: &PendingTx) -> Result<TxHash, GatewayError>;
}
