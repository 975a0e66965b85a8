//! Registry error types

use thiserror::Error;

use super::channel::StreamKey;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A publisher is already live on this key
    #[error("stream already has a publisher: {0}")]
    Conflict(StreamKey),

    /// No live channel for this key
    #[error("stream not found: {0}")]
    NotFound(StreamKey),
}
