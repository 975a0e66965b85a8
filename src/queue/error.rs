//! Broadcast queue error types

use thiserror::Error;

/// Error type for broadcast queue operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Writer misused the queue (second header, packet before header)
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// No sync point is retained yet; the reader should retry later
    #[error("no sync point available yet")]
    NoSyncPointYet,

    /// Queue was closed by its publisher
    #[error("queue closed")]
    Closed,
}
