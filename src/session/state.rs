//! Session state machines
//!
//! Tracks a publisher or viewer from connection to disconnection.
//! Transitions out of order are ignored; `Closed` is terminal.

use std::time::{Duration, Instant};

/// Publisher lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
    /// Connected, nothing checked yet
    Idle,
    /// Account id parsed, token being checked against the store
    Authenticating,
    /// Authenticated, claiming the stream key
    Registering,
    /// Channel registered and packets flowing
    Streaming,
    /// Tearing down the channel
    Closing,
    /// Session finished
    Closed,
}

/// Viewer lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayPhase {
    /// Connected, nothing checked yet
    Idle,
    /// Resolving the requested channel
    Locating,
    /// Viewer counted and receiving packets
    Streaming,
    /// Session finished
    Closed,
}

/// Publisher session state
#[derive(Debug)]
pub struct PublishState {
    /// Unique session ID
    pub id: u64,

    /// Current phase
    pub phase: PublishPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time the channel went live
    pub streaming_since: Option<Instant>,

    /// Packets appended to the channel
    pub packets: u64,

    /// Payload bytes appended to the channel
    pub bytes: u64,

    /// Every phase entered, in order
    history: Vec<PublishPhase>,
}

impl PublishState {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            phase: PublishPhase::Idle,
            connected_at: Instant::now(),
            streaming_since: None,
            packets: 0,
            bytes: 0,
            history: vec![PublishPhase::Idle],
        }
    }

    fn enter(&mut self, phase: PublishPhase) {
        tracing::trace!(session_id = self.id, from = ?self.phase, to = ?phase, "Publish phase");
        self.phase = phase;
        self.history.push(phase);
    }

    /// Phases entered so far, starting with `Idle`
    pub fn history(&self) -> &[PublishPhase] {
        &self.history
    }

    /// Begin checking credentials
    pub fn start_auth(&mut self) {
        if self.phase == PublishPhase::Idle {
            self.enter(PublishPhase::Authenticating);
        }
    }

    /// Credentials accepted
    pub fn authenticated(&mut self) {
        if self.phase == PublishPhase::Authenticating {
            self.enter(PublishPhase::Registering);
        }
    }

    /// Stream key claimed
    pub fn registered(&mut self) {
        if self.phase == PublishPhase::Registering {
            self.enter(PublishPhase::Streaming);
            self.streaming_since = Some(Instant::now());
        }
    }

    /// Rejected before any shared state was touched
    pub fn reject(&mut self) {
        if matches!(
            self.phase,
            PublishPhase::Idle | PublishPhase::Authenticating | PublishPhase::Registering
        ) {
            self.enter(PublishPhase::Closed);
        }
    }

    /// Source ended or failed while streaming
    pub fn close(&mut self) {
        if self.phase == PublishPhase::Streaming {
            self.enter(PublishPhase::Closing);
        }
    }

    /// Teardown finished
    pub fn finish(&mut self) {
        if self.phase == PublishPhase::Closing {
            self.enter(PublishPhase::Closed);
        }
    }

    /// Count an appended packet
    pub fn record_packet(&mut self, size: usize) {
        self.packets += 1;
        self.bytes += size as u64;
    }

    /// How long the channel has been live
    pub fn live_for(&self) -> Duration {
        self.streaming_since
            .map(|since| since.elapsed())
            .unwrap_or_default()
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == PublishPhase::Streaming
    }
}

/// Viewer session state
#[derive(Debug)]
pub struct PlayState {
    /// Unique session ID
    pub id: u64,

    /// Current phase
    pub phase: PlayPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Packets written to the viewer
    pub packets: u64,

    /// Every phase entered, in order
    history: Vec<PlayPhase>,
}

impl PlayState {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            phase: PlayPhase::Idle,
            connected_at: Instant::now(),
            packets: 0,
            history: vec![PlayPhase::Idle],
        }
    }

    fn enter(&mut self, phase: PlayPhase) {
        tracing::trace!(session_id = self.id, from = ?self.phase, to = ?phase, "Play phase");
        self.phase = phase;
        self.history.push(phase);
    }

    /// Phases entered so far, starting with `Idle`
    pub fn history(&self) -> &[PlayPhase] {
        &self.history
    }

    /// Begin resolving the channel
    pub fn start_locate(&mut self) {
        if self.phase == PlayPhase::Idle {
            self.enter(PlayPhase::Locating);
        }
    }

    /// Channel found, viewer counted
    pub fn start_streaming(&mut self) {
        if self.phase == PlayPhase::Locating {
            self.enter(PlayPhase::Streaming);
        }
    }

    /// Terminal from any phase
    pub fn close(&mut self) {
        if self.phase != PlayPhase::Closed {
            self.enter(PlayPhase::Closed);
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == PlayPhase::Streaming
    }
}
