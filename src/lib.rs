//! Live stream relay
//!
//! One authenticated publisher per channel, fanned out to any number of
//! HTTP-FLV viewers that may each read at their own pace.
//!
//! # Architecture
//!
//! ```text
//!  publisher ──HTTP-FLV push──► PublishSession ─┐
//!                                              │ register / append
//!                                              ▼
//!                                    ChannelRegistry ─► Channel ─► BroadcastQueue
//!                                                                      │ Cursor
//!  viewer ◄──────HTTP-FLV─────── PlaySession ◄─────────────────────────┘
//!
//!  both sessions ──► AccountGateway (authenticate, isLive, viewers)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use monday::{MemoryAccountStore, MondayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> monday::Result<()> {
//!     let server = MondayServer::new(ServerConfig::default(), MemoryAccountStore::new());
//!     server.run().await
//! }
//! ```

pub mod account;
pub mod error;
pub mod media;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;

pub use account::{
    AccountGateway, AccountId, MemoryAccountStore, MongoAccountGateway, StreamRecord,
};
pub use error::{Error, Result};
pub use media::{Packet, PacketKind, StreamHeader};
pub use queue::{BroadcastQueue, Cursor, QueueConfig};
pub use registry::{Channel, ChannelHandle, ChannelRegistry, StreamKey};
pub use server::{MondayServer, ServerConfig};
pub use session::{PacketSink, PacketSource, PlaySession, PublishSession};
