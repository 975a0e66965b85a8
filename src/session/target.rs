//! Connection addressing
//!
//! Publishers connect to `<proto>://<host>:<port>/<prefix...>/<accountId>?t=<token>`.
//! The whole path (prefix included) is the stream key, the last segment is
//! the account id and `t` carries the stream token.

use crate::account::AccountId;
use crate::error::{Error, Result};
use crate::registry::StreamKey;

/// Query parameter holding the publisher's stream token
pub const TOKEN_PARAM: &str = "t";

/// Parsed publish address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub key: StreamKey,
    pub account: AccountId,
    pub token: String,
}

impl PublishTarget {
    /// Parse from a request path and raw query string
    pub fn from_parts(path: &str, query: Option<&str>) -> Result<Self> {
        let key = StreamKey::new(path);
        let account = account_for(&key)?;

        let token = query
            .and_then(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .find(|(name, _)| name == TOKEN_PARAM)
                    .map(|(_, value)| value.into_owned())
            })
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::MalformedIdentifier("missing stream token".into()))?;

        Ok(Self {
            key,
            account,
            token,
        })
    }

    /// Parse from a full URL such as `rtmp://host:1935/live/<id>?t=<token>`
    pub fn from_url(target: &str) -> Result<Self> {
        let url = url::Url::parse(target)
            .map_err(|e| Error::MalformedIdentifier(format!("invalid target url: {e}")))?;
        Self::from_parts(url.path(), url.query())
    }
}

/// Account id addressed by a stream key (its last path segment)
pub fn account_for(key: &StreamKey) -> Result<AccountId> {
    AccountId::parse(key.last_segment())
}
