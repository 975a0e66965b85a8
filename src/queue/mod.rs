//! Broadcast queue: one writer, many speed-mismatched readers
//!
//! ```text
//!             append()                       retention window
//!  [Publisher] ──────► ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!                      │ K │ . │ . │ K │ . │ . │ . │ . │ ◄── oldest evicted
//!                      └───┴───┴─▲─┴───┴───┴─▲─┴───┴─▲─┘
//!                                │           │       │
//!                            [Cursor]    [Cursor] [Cursor]
//!                            lagging     normal    live edge
//! ```
//!
//! The publisher never blocks on a reader. A cursor that falls out of the
//! window is moved to the first retained sync point (`K`) on its next read.

pub mod config;
pub mod cursor;
pub mod error;
pub mod store;

pub use config::QueueConfig;
pub use cursor::{Cursor, ReadOutcome};
pub use error::QueueError;
pub use store::{BroadcastQueue, QueueStats};
