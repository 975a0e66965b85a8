//! Channel registry for pub/sub routing
//!
//! The registry maps each stream key to at most one live [`Channel`]. A
//! publisher owns its channel through a [`ChannelHandle`]; viewers only get a
//! shared `Arc<Channel>` from [`ChannelRegistry::lookup`].
//!
//! # Architecture
//!
//! ```text
//!                      Arc<ChannelRegistry>
//!                 ┌─────────────────────────────┐
//!                 │ channels: HashMap<Key,      │
//!                 │   Arc<Channel {             │
//!                 │     queue: BroadcastQueue,  │
//!                 │     publisher_id,           │
//!                 │   }>                        │
//!                 │ >                           │
//!                 └──────────────┬──────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!   [Publisher]              [Viewer]                [Viewer]
//!   register_if_absent()     lookup()                lookup()
//!   queue.append()           cursor.next()           cursor.next()
//! ```
//!
//! # Zero-Copy Design
//!
//! Packets carry `bytes::Bytes`, so every cursor shares the publisher's
//! allocation; reading clones a reference count, not the payload.

pub mod channel;
pub mod error;
pub mod store;

pub use channel::{Channel, StreamKey, ViewerGuard};
pub use error::RegistryError;
pub use store::{ChannelHandle, ChannelRegistry};
