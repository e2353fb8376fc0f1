//! Matching engine error types

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced to callers of the engine
///
/// `QueueFull` and `Timeout` are transient and may be retried by the caller
/// with backoff. `Halted` is permanent for the lifetime of the engine and must
/// be escalated to operational alerting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Engine has been halted by the circuit breaker
    #[error("Engine is halted")]
    Halted,

    /// Submission queue is at capacity
    #[error("Submission queue is full")]
    QueueFull,

    /// Order rejected before reaching the book
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// No resting order with this id
    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    /// Caller-side deadline expired before the worker replied
    #[error("Timed out waiting for the matching worker")]
    Timeout,

    /// Fatal failure inside the matching worker (engine is now halted)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Matching worker is gone (engine shut down)
    #[error("Matching worker disconnected")]
    Disconnected,
}

impl EngineError {
    /// Whether a caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::QueueFull | EngineError::Timeout)
    }

    /// Create an invalid order error
    pub fn invalid_order(msg: impl Into<String>) -> Self {
        Self::InvalidOrder(msg.into())
    }
}

/// Errors raised by the order book and the matching algorithm
///
/// Everything except [`MatchingError::DuplicateOrder`] is an invariant
/// violation: the book may already be partially mutated, so the worker
/// halts instead of trying to unwind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingError {
    /// Order id already rests in the book
    #[error("Duplicate order id: {0}")]
    DuplicateOrder(Uuid),

    /// Fill larger than the order's remaining quantity
    #[error("Overfill on order {order_id}: fill {fill} exceeds remaining {remaining}")]
    Overfill {
        order_id: Uuid,
        fill: Decimal,
        remaining: Decimal,
    },

    /// Non-positive match quantity computed inside a crossing level
    #[error("Non-positive match quantity {quantity} against order {order_id}")]
    EmptyFill { order_id: Uuid, quantity: Decimal },

    /// Order id index disagrees with the price levels
    #[error("Book index out of sync for order {0}")]
    IndexOutOfSync(Uuid),

    /// Aggregated resting quantity at a price does not fit in a decimal
    #[error("Resting quantity overflow at price {price}")]
    QuantityOverflow { price: Decimal },

    /// Sequence counter reached `u64::MAX`
    #[error("Sequence numbers exhausted after {0}")]
    SequenceExhausted(u64),
}

impl MatchingError {
    /// Whether this error leaves the book in an unknown state
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MatchingError::DuplicateOrder(_))
    }
}

/// Errors from an event sink (persistence collaborator)
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink rejected event: {0}")]
    Rejected(String),
}
