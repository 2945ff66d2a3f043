//! Error types raised by the ports.
//!
//! Errors in the caller's own request (bad connection id, invalid queue depth) are returned
//! synchronously. Failures local to one connection are [`DeliveryError`]s which the
//! [`crate::OutPort`] absorbs into its per connection error counters.

use thiserror::Error;

/// Errors returned to the caller of a port operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortError {
    /// A connection with this id is already connected.
    #[error("connection id already in use: {0}")]
    DuplicateConnection(String),

    /// No connection with this id is connected.
    #[error("no connection with id: {0}")]
    UnknownConnection(String),

    /// Queue depth must be at least one.
    #[error("invalid max queue depth: {0}")]
    InvalidQueueDepth(usize),
}

/// Raised by a [`crate::RemoteEndpoint`] that could not accept a push.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("delivery failed: {reason}")]
pub struct DeliveryError {
    /// Human readable cause reported by the endpoint.
    pub reason: String,
}

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        DeliveryError { reason: reason.into() }
    }
}

/// Errors from [`crate::BitBuffer`] indexing and parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitBufferError {
    #[error("bit index {index} out of range for length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("slice step cannot be zero")]
    ZeroStep,

    #[error("invalid character {0:?} in bit pattern")]
    InvalidPattern(char),

    #[error("cannot read {bits} bits as an integer, at most 64")]
    IntegerTooWide { bits: usize },
}

pub type Result<T> = std::result::Result<T, PortError>;
