//! Per-viewer read position into a broadcast queue

use std::sync::Arc;

use tokio::sync::watch;

use crate::media::{Packet, StreamHeader};

use super::store::{BroadcastQueue, ReadPosition};

/// Result of a non-suspending read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Next packet in append order
    Packet(Packet),
    /// Nothing new yet
    WouldBlock,
    /// Publisher closed the queue and everything retained was delivered
    Closed,
}

/// Independent reader of a [`BroadcastQueue`]
///
/// Owned by exactly one viewer. Reading never mutates the queue; a cursor
/// that falls out of the retention window skips ahead to a sync point,
/// losing frames for this viewer only.
pub struct Cursor {
    queue: Arc<BroadcastQueue>,
    header: Arc<StreamHeader>,
    pos: ReadPosition,
    changes: watch::Receiver<u64>,
}

impl Cursor {
    pub(super) fn new(queue: Arc<BroadcastQueue>, header: Arc<StreamHeader>, start: u64) -> Self {
        let changes = queue.subscribe();
        Self {
            queue,
            header,
            pos: ReadPosition {
                next: start,
                awaiting_sync: false,
                skipped: 0,
            },
            changes,
        }
    }

    /// Stream header; always set before a cursor can exist
    pub fn header(&self) -> &Arc<StreamHeader> {
        &self.header
    }

    /// Sequence number of the next packet to deliver
    pub fn position(&self) -> u64 {
        self.pos.next
    }

    /// Packets skipped because this cursor fell behind
    pub fn skipped(&self) -> u64 {
        self.pos.skipped
    }

    /// Read the next packet without suspending
    pub fn try_next(&mut self) -> ReadOutcome {
        let before = self.pos.skipped;
        let outcome = self.queue.lock().read(&mut self.pos);

        if self.pos.skipped > before {
            tracing::warn!(
                skipped = self.pos.skipped - before,
                total_skipped = self.pos.skipped,
                position = self.pos.next,
                "Cursor fell behind retention window, skipping to sync point"
            );
        }

        outcome
    }

    /// Wait for the next packet
    ///
    /// Returns `None` once the queue is closed and drained. Cancel safe.
    pub async fn next(&mut self) -> Option<Packet> {
        loop {
            self.changes.borrow_and_update();

            match self.try_next() {
                ReadOutcome::Packet(packet) => return Some(packet),
                ReadOutcome::Closed => return None,
                ReadOutcome::WouldBlock => {
                    if self.changes.changed().await.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.queue.cursor_dropped();
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.pos.next)
            .field("skipped", &self.pos.skipped)
            .finish()
    }
}
