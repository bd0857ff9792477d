//! Error taxonomy shared across the engine, order service, risk engine and
//! settlement processor.

use uuid::Uuid;

/// Top-level error type returned by public crate APIs.
///
/// Validation and risk errors are synchronous and non-retryable. `Busy` /
/// `DeadlineExceeded` indicate back-pressure; the caller may retry.
/// `Internal` is fatal for the affected symbol: the matching shard that
/// raised it is quarantined rather than left to keep processing on
/// possibly-corrupted state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("risk check rejected order: {0:?}")]
    RiskRejected(Vec<crate::risk::Violation>),

    #[error("order not found: {0}")]
    NotFound(Uuid),

    #[error("user {0} does not own order {1}")]
    NotOwner(Uuid, Uuid),

    #[error("order {0} is already in a terminal state")]
    AlreadyTerminal(Uuid),

    #[error("symbol shard busy")]
    Busy,

    #[error("deadline exceeded waiting for symbol shard")]
    DeadlineExceeded,

    #[error("internal invariant violation on symbol {symbol}: {detail}")]
    Internal { symbol: String, detail: String },

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl CoreError {
    pub fn internal(symbol: impl Into<String>, detail: impl Into<String>) -> Self {
        CoreError::Internal {
            symbol: symbol.into(),
            detail: detail.into(),
        }
    }
}

/// Errors raised by the settlement processor. `Transient` variants are
/// retried with backoff; the rest are terminal.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("settlement {0} not found")]
    NotFound(Uuid),

    #[error("settlement {0} already terminal")]
    AlreadyTerminal(Uuid),

    #[error("transient settlement failure: {0}")]
    Transient(String),

    #[error("settlement retries exhausted for {0}")]
    RetriesExhausted(Uuid),
}
