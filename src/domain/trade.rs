//! Trade type: a read-only projection of a confirmed execution event.

use crate::domain::{OrderId, TxHash, Wei};
use serde::{Deserialize, Serialize};

/// Number of recent executions kept for display, newest first.
pub const TRADE_HISTORY_LIMIT: usize = 10;

/// A confirmed execution against an order.
///
/// Built from the authority's `OrderExecuted` event log; display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// The order that was executed against.
    pub order_id: OrderId,
    /// Quantity executed, in whole units.
    pub amount: u64,
    /// Price paid per unit, in base units.
    pub price: Wei,
    /// Transaction that carried the execution.
    pub tx_hash: TxHash,
}
