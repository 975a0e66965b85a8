//! Publisher and viewer sessions
//!
//! ```text
//!  PacketSource ──► PublishSession ──► ChannelRegistry ──► BroadcastQueue
//!                                                               │
//!  PacketSink   ◄── PlaySession    ◄── Cursor ◄─────────────────┘
//! ```
//!
//! Sessions only see the [`PacketSource`] and [`PacketSink`] traits, so the
//! same logic serves any transport that can produce or consume packets.

pub mod io;
pub mod play;
pub mod publish;
pub mod state;
pub mod target;

pub use io::{FlvSink, FlvSource, PacketSink, PacketSource};
pub use play::{PlayEnd, PlayReport, PlaySession};
pub use publish::{PublishEnd, PublishReport, PublishSession};
pub use state::{PlayPhase, PlayState, PublishPhase, PublishState};
pub use target::PublishTarget;
