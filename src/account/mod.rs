//! Account gateway
//!
//! The account record store lives outside this crate. Sessions only need
//! four operations from it: authenticate a publisher, flip the liveness
//! flag, and move the viewer counter. [`AccountGateway`] is that seam;
//! [`MongoAccountGateway`] talks to the production store and
//! [`MemoryAccountStore`] backs tests and embedded use.

use std::future::Future;

use thiserror::Error;

use crate::error::{Error, Result};

pub mod memory;
pub mod mongo;

pub use memory::MemoryAccountStore;
pub use mongo::MongoAccountGateway;

/// Length of a hex-encoded account id (12-byte object id)
pub const ACCOUNT_ID_LEN: usize = 24;

/// Account store failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    /// Store could not be reached
    #[error("account store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected or failed a query
    #[error("account store query failed: {0}")]
    Query(String),
}

/// Validated account identifier: 24 hex digits, stored lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    /// Parse a hex object id
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != ACCOUNT_ID_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::MalformedIdentifier(format!("invalid account id {s:?}")));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Logical shape of a persisted account stream record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub id: AccountId,
    pub stream_token: String,
    pub is_active: bool,
    pub is_live: bool,
    pub viewers: i64,
}

impl StreamRecord {
    /// Active, offline account with no viewers
    pub fn new(id: AccountId, stream_token: impl Into<String>) -> Self {
        Self {
            id,
            stream_token: stream_token.into(),
            is_active: true,
            is_live: false,
            viewers: 0,
        }
    }
}

/// Key-based access to account stream records
pub trait AccountGateway: Send + Sync + 'static {
    /// Whether an active account `account` exists with stream token `token`
    fn authenticate(
        &self,
        account: &AccountId,
        token: &str,
    ) -> impl Future<Output = std::result::Result<bool, AccountError>> + Send;

    /// Set the account's liveness flag
    fn set_live(
        &self,
        account: &AccountId,
        live: bool,
    ) -> impl Future<Output = std::result::Result<(), AccountError>> + Send;

    /// Add `delta` (may be negative) to the viewer counter
    fn add_viewers(
        &self,
        account: &AccountId,
        delta: i64,
    ) -> impl Future<Output = std::result::Result<(), AccountError>> + Send;

    /// Set the viewer counter to zero
    fn reset_viewers(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = std::result::Result<(), AccountError>> + Send;
}
