use crate::domain::UnitsError;
use crate::gateway::GatewayError;
use crate::session::SessionError;
use thiserror::Error;

/// User-facing error taxonomy.
///
/// Validation errors are resolved locally and never reach the gateway. The
/// rest are surfaced verbatim as a single message and treated identically:
/// the action did not complete, nothing was committed locally, and the user
/// re-initiates if they want to retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("another transaction is pending")]
    Busy,
    #[error("read-only mode: no order book contract configured")]
    ReadOnly,
    #[error("order is not executable now")]
    NotExecutable,
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Rejected(msg) => AppError::Rejected(msg),
            GatewayError::Reverted(msg) => AppError::Reverted(msg),
            GatewayError::Network(msg) => AppError::Network(msg),
            GatewayError::Rpc { code, message } => {
                AppError::Network(format!("rpc error {}: {}", code, message))
            }
            GatewayError::Parse(msg) => AppError::Network(format!("bad response: {}", msg)),
        }
    }
}

impl From<UnitsError> for AppError {
    fn from(err: UnitsError) -> Self {
        AppError::Validation(err.to_string())
    }
}
