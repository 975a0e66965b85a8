//! Broadcast queue implementation
//!
//! Single writer, many readers. The writer appends into a bounded window and
//! never waits on readers; each reader owns a [`Cursor`] and walks the window
//! at its own pace.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::media::{Packet, StreamHeader};

use super::config::QueueConfig;
use super::cursor::{Cursor, ReadOutcome};
use super::error::QueueError;

/// A retained packet and its sequence number
#[derive(Debug)]
struct Entry {
    seq: u64,
    packet: Packet,
}

#[derive(Debug, Default)]
pub(super) struct QueueState {
    header: Option<Arc<StreamHeader>>,
    entries: VecDeque<Entry>,
    /// Sequence number of the next appended packet
    next_seq: u64,
    /// Most recent sync point ever appended (may already be evicted)
    last_sync: Option<u64>,
    evicted: u64,
    closed: bool,
}

/// Read position of one cursor
#[derive(Debug, Clone, Copy)]
pub(super) struct ReadPosition {
    /// Next sequence number to deliver
    pub next: u64,
    /// Set after losing the window with no sync point retained
    pub awaiting_sync: bool,
    /// Packets this cursor skipped over
    pub skipped: u64,
}

impl QueueState {
    fn front_seq(&self) -> u64 {
        self.entries.front().map(|e| e.seq).unwrap_or(self.next_seq)
    }

    fn latest_sync(&self) -> Option<u64> {
        self.last_sync.filter(|&seq| seq >= self.front_seq())
    }

    fn first_sync_from(&self, from: u64) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.seq >= from && e.packet.is_sync)
            .map(|e| e.seq)
    }

    fn evict(&mut self, config: &QueueConfig) {
        let max_span = config.max_duration_ms();

        while self.entries.len() > 1 {
            let over_count = self.entries.len() > config.max_packets;
            let over_span = match (self.entries.front(), self.entries.back()) {
                (Some(oldest), Some(newest)) => {
                    newest.packet.timestamp.saturating_sub(oldest.packet.timestamp) > max_span
                }
                _ => false,
            };

            if !over_count && !over_span {
                break;
            }
            self.entries.pop_front();
            self.evicted += 1;
        }
    }

    /// Advance `pos` by one packet, re-anchoring it first if it fell out of
    /// the retained window.
    pub(super) fn read(&self, pos: &mut ReadPosition) -> ReadOutcome {
        let front = self.front_seq();

        if pos.next < front {
            match self.first_sync_from(front) {
                Some(seq) => {
                    pos.skipped += seq - pos.next;
                    pos.next = seq;
                }
                None => {
                    pos.skipped += self.next_seq - pos.next;
                    pos.next = self.next_seq;
                    pos.awaiting_sync = true;
                }
            }
        }

        if pos.awaiting_sync {
            match self.first_sync_from(pos.next) {
                Some(seq) => {
                    pos.skipped += seq - pos.next;
                    pos.next = seq;
                    pos.awaiting_sync = false;
                }
                None => {
                    pos.skipped += self.next_seq - pos.next;
                    pos.next = self.next_seq;
                }
            }
        }

        if pos.next < self.next_seq {
            let index = (pos.next - front) as usize;
            let packet = self.entries[index].packet.clone();
            pos.next += 1;
            ReadOutcome::Packet(packet)
        } else if self.closed {
            ReadOutcome::Closed
        } else {
            ReadOutcome::WouldBlock
        }
    }
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Packets appended since creation
    pub appended: u64,
    /// Packets currently retained
    pub retained: usize,
    /// Packets dropped by the retention bound
    pub evicted: u64,
    /// Live cursors
    pub open_cursors: usize,
    /// Whether the publisher closed the queue
    pub closed: bool,
}

/// Bounded multi-reader packet queue for one channel
pub struct BroadcastQueue {
    state: Mutex<QueueState>,
    /// Bumped on every append and on close; cursors wait on it
    version: watch::Sender<u64>,
    open_cursors: AtomicUsize,
    config: QueueConfig,
}

impl BroadcastQueue {
    /// Create a new queue with default retention
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a new queue with custom retention
    pub fn with_config(config: QueueConfig) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Mutex::new(QueueState::default()),
            version,
            open_cursors: AtomicUsize::new(0),
            config,
        }
    }

    /// Get the queue configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state stays consistent across a panicking reader; keep serving.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub(super) fn cursor_dropped(&self) {
        self.open_cursors.fetch_sub(1, Ordering::Relaxed);
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Set the stream format header. Must happen once, before any packet.
    pub fn set_header(&self, header: StreamHeader) -> Result<(), QueueError> {
        let mut state = self.lock();

        if state.closed {
            return Err(QueueError::Closed);
        }
        if state.header.is_some() {
            return Err(QueueError::ProtocolViolation("stream header already set"));
        }
        state.header = Some(Arc::new(header));
        Ok(())
    }

    /// Get the stream format header, if set
    pub fn header(&self) -> Option<Arc<StreamHeader>> {
        self.lock().header.clone()
    }

    /// Append a packet, evicting the oldest ones past the retention bound
    ///
    /// Never waits on readers. Returns the packet's sequence number.
    pub fn append(&self, packet: Packet) -> Result<u64, QueueError> {
        let seq = {
            let mut state = self.lock();

            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.header.is_none() {
                return Err(QueueError::ProtocolViolation("packet appended before header"));
            }

            let seq = state.next_seq;
            if packet.is_sync {
                state.last_sync = Some(seq);
            }
            state.entries.push_back(Entry { seq, packet });
            state.next_seq += 1;
            state.evict(&self.config);
            seq
        };

        self.notify();
        Ok(seq)
    }

    /// Close the queue; pending and future reads end once drained
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.notify();
    }

    /// Check whether the queue was closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Open a cursor at the most recent retained sync point
    pub fn open_cursor(self: &Arc<Self>) -> Result<Cursor, QueueError> {
        let state = self.lock();

        if state.closed {
            return Err(QueueError::Closed);
        }

        let (Some(start), Some(header)) = (state.latest_sync(), state.header.clone()) else {
            return Err(QueueError::NoSyncPointYet);
        };
        drop(state);

        self.open_cursors.fetch_add(1, Ordering::Relaxed);
        Ok(Cursor::new(Arc::clone(self), header, start))
    }

    /// Open a cursor, waiting up to `wait` for the first sync point
    pub async fn open_cursor_within(self: &Arc<Self>, wait: Duration) -> Result<Cursor, QueueError> {
        let deadline = Instant::now() + wait;
        let mut rx = self.subscribe();

        loop {
            rx.borrow_and_update();

            match self.open_cursor() {
                Err(QueueError::NoSyncPointYet) => {}
                other => return other,
            }

            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(QueueError::Closed),
                Err(_) => return Err(QueueError::NoSyncPointYet),
            }
        }
    }

    /// Get queue counters
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            appended: state.next_seq,
            retained: state.entries.len(),
            evicted: state.evicted,
            open_cursors: self.open_cursors.load(Ordering::Relaxed),
            closed: state.closed,
        }
    }
}

impl Default for BroadcastQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BroadcastQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastQueue")
            .field("stats", &self.stats())
            .field("config", &self.config)
            .finish()
    }
}
