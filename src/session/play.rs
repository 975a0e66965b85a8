//! Viewing session
//!
//! Resolves a channel, counts the viewer, then copies packets from a
//! private cursor into the viewer's sink until either side goes away.

use std::sync::Arc;
use std::time::Duration;

use crate::account::AccountGateway;
use crate::error::Result;
use crate::media::Packet;
use crate::queue::{Cursor, QueueError};
use crate::registry::{Channel, ChannelRegistry, StreamKey};

use super::io::PacketSink;
use super::state::{PlayPhase, PlayState};
use super::target::account_for;

/// How a viewer's stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayEnd {
    /// Publisher closed the channel and everything was delivered
    PublisherEnded,
    /// Viewer disconnected
    ViewerLeft,
    /// Writing to the viewer failed
    SinkFailed(String),
    /// No sync point arrived within the wait window
    NoSyncPoint,
}

/// Summary of a completed viewing session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayReport {
    pub key: StreamKey,
    pub packets: u64,
    pub skipped: u64,
    pub end: PlayEnd,
}

/// One viewer's session
pub struct PlaySession<G> {
    state: PlayState,
    registry: Arc<ChannelRegistry>,
    gateway: Arc<G>,
    sync_wait: Duration,
}

enum Step {
    Packet(Packet),
    End(PlayEnd),
}

impl<G: AccountGateway> PlaySession<G> {
    pub fn new(id: u64, registry: Arc<ChannelRegistry>, gateway: Arc<G>) -> Self {
        let sync_wait = registry.queue_config().sync_wait;
        Self {
            state: PlayState::new(id),
            registry,
            gateway,
            sync_wait,
        }
    }

    /// How long to wait for a first sync point on a fresh channel
    pub fn with_sync_wait(mut self, wait: Duration) -> Self {
        self.sync_wait = wait;
        self
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn phase(&self) -> PlayPhase {
        self.state.phase
    }

    /// Resolve the channel for a request path
    ///
    /// Fails with `MalformedIdentifier` when the last segment is not an
    /// account id and with `NotFound` when nothing is live there. Either
    /// way the session is closed and no counter was touched.
    pub fn locate(&mut self, path: &str) -> Result<Arc<Channel>> {
        self.state.start_locate();
        let key = StreamKey::new(path);

        let located = account_for(&key)
            .and_then(|_| self.registry.lookup(&key).map_err(Into::into));

        if let Err(ref e) = located {
            tracing::debug!(
                session_id = self.id(),
                stream = %key,
                error = %e,
                "Viewer rejected"
            );
            self.state.close();
        }
        located
    }

    /// Deliver `channel` to `sink` until the stream ends
    ///
    /// The viewer counter is incremented once on entry and decremented once
    /// on exit, whatever ends the stream.
    pub async fn stream<K: PacketSink>(
        &mut self,
        channel: Arc<Channel>,
        mut sink: K,
    ) -> PlayReport {
        self.state.start_streaming();
        let account = &channel.account;

        let Some(attached) = channel.attach_viewer() else {
            tracing::debug!(
                session_id = self.id(),
                stream = %channel.key,
                "Channel closed before viewer attached"
            );
            self.state.close();
            return PlayReport {
                key: channel.key.clone(),
                packets: 0,
                skipped: 0,
                end: PlayEnd::PublisherEnded,
            };
        };

        if let Err(e) = self.gateway.add_viewers(account, 1).await {
            tracing::warn!(account = %account, error = %e, "Failed to count viewer");
        }
        tracing::info!(session_id = self.id(), stream = %channel.key, "+1 view to {account}");

        let mut skipped = 0;
        let end = match self.open(&channel, &sink).await {
            Ok(mut cursor) => {
                let end = self.deliver(&mut cursor, &mut sink).await;
                skipped = cursor.skipped();
                end
            }
            Err(end) => end,
        };

        if let Err(e) = self.gateway.add_viewers(account, -1).await {
            tracing::warn!(account = %account, error = %e, "Failed to uncount viewer");
        }
        tracing::info!(
            session_id = self.id(),
            stream = %channel.key,
            packets = self.state.packets,
            skipped,
            end = ?end,
            watched_secs = self.state.connected_at.elapsed().as_secs(),
            "-1 view to {account}"
        );
        drop(attached);
        self.state.close();

        PlayReport {
            key: channel.key.clone(),
            packets: self.state.packets,
            skipped,
            end,
        }
    }

    async fn open<K: PacketSink>(
        &self,
        channel: &Arc<Channel>,
        sink: &K,
    ) -> std::result::Result<Cursor, PlayEnd> {
        tokio::select! {
            opened = channel.queue.open_cursor_within(self.sync_wait) => match opened {
                Ok(cursor) => Ok(cursor),
                Err(QueueError::Closed) => Err(PlayEnd::PublisherEnded),
                Err(_) => Err(PlayEnd::NoSyncPoint),
            },
            _ = sink.closed() => Err(PlayEnd::ViewerLeft),
        }
    }

    async fn deliver<K: PacketSink>(&mut self, cursor: &mut Cursor, sink: &mut K) -> PlayEnd {
        if let Err(e) = sink.write_header(cursor.header()).await {
            return PlayEnd::SinkFailed(e.to_string());
        }

        loop {
            let step = tokio::select! {
                biased;
                _ = sink.closed() => Step::End(PlayEnd::ViewerLeft),
                next = cursor.next() => match next {
                    Some(packet) => Step::Packet(packet),
                    None => Step::End(PlayEnd::PublisherEnded),
                },
            };

            match step {
                Step::Packet(packet) => {
                    if let Err(e) = sink.write_packet(&packet).await {
                        return PlayEnd::SinkFailed(e.to_string());
                    }
                    self.state.packets += 1;
                }
                Step::End(end) => return end,
            }
        }
    }
}
