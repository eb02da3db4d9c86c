//! Error taxonomy. Matching and account arithmetic never raise
//! across the façade; they return these structured results instead.

use thiserror::Error;

use crate::domain::{OrderId, PositionId};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("unknown position: {0}")]
    UnknownPosition(PositionId),

    #[error("order {0} is already in a terminal state")]
    TerminalOrder(OrderId),

    #[error("position {0} is already closed")]
    PositionAlreadyClosed(PositionId),

    #[error("insufficient margin")]
    InsufficientMargin,

    #[error("maximum open/pending position count exceeded")]
    MaxPositions,

    #[error("invalid volume: {0}")]
    InvalidVolume(String),

    #[error("broker rejected the order (stochastic policy)")]
    BrokerReject,

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    #[error("data gap: {0}")]
    DataGap(String),
}

/// Durability-boundary error. Wraps the concrete storage backend's error
/// type so the façade never leaks `rusqlite::Error` directly.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
