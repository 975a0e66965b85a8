//! Error types
//!
//! Each area has its own error enum; `Error` collects them so session and
//! server code can use `?` across layers.

use std::io;

use thiserror::Error;

use crate::account::AccountError;
use crate::media::flv::FlvError;
use crate::queue::QueueError;
use crate::registry::RegistryError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Stream key or account id has the wrong shape
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Token mismatch, inactive account or unknown account
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Registry rejection (duplicate publisher, missing channel)
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Broadcast queue misuse or lifecycle error
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Account store failure
    #[error(transparent)]
    AccountStore(#[from] AccountError),

    /// Publisher side failed (network fault, bad container data)
    #[error("packet source failed: {0}")]
    SourceFailure(String),

    /// Viewer side failed (usually the viewer hung up)
    #[error("packet sink failed: {0}")]
    SinkFailure(String),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Socket level failure outside of a session
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<FlvError> for Error {
    fn from(e: FlvError) -> Self {
        Error::SourceFailure(e.to_string())
    }
}

impl Error {
    /// Whether this error is a rejection of the connection before any
    /// shared state was touched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::MalformedIdentifier(_)
                | Error::AuthenticationFailed
                | Error::Registry(RegistryError::Conflict(_))
                | Error::Registry(RegistryError::NotFound(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamKey;

    #[test]
    fn test_rejections() {
        assert!(Error::AuthenticationFailed.is_rejection());
        assert!(Error::MalformedIdentifier("x".into()).is_rejection());
        assert!(Error::from(RegistryError::Conflict(StreamKey::new("live/a"))).is_rejection());
        assert!(!Error::SinkFailure("gone".into()).is_rejection());
        assert!(!Error::from(QueueError::Closed).is_rejection());
    }

    #[test]
    fn test_flv_error_is_source_failure() {
        let err: Error = FlvError::BadSignature.into();
        assert!(matches!(err, Error::SourceFailure(_)));
    }
}
