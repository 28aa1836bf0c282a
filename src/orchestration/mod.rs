//! Orchestration: resynchronization and the transaction lifecycle.

pub mod sync;
pub mod tx;

pub use sync::SyncCoordinator;
pub use tx::{CreateOrderForm, TransactionOrchestrator, TxState};
