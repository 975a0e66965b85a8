//! Publishing session
//!
//! Drives one publisher from connection to teardown:
//! authenticate, claim the stream key, relay packets, release everything.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::account::{AccountGateway, AccountId};
use crate::error::{Error, Result};
use crate::queue::BroadcastQueue;
use crate::registry::{ChannelRegistry, StreamKey};

use super::io::PacketSource;
use super::state::{PublishPhase, PublishState};
use super::target::PublishTarget;

/// How long teardown waits for attached viewers to detach
pub const VIEWER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How a publisher's stream ended once it was live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishEnd {
    /// Source signalled end of stream
    Finished,
    /// Source failed, stalled or sent something unusable
    Failed(String),
}

/// Summary of a completed publish session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub key: StreamKey,
    pub account: AccountId,
    pub packets: u64,
    pub bytes: u64,
    pub end: PublishEnd,
}

/// One publisher's session
pub struct PublishSession<G> {
    state: PublishState,
    registry: Arc<ChannelRegistry>,
    gateway: Arc<G>,
    idle_timeout: Option<Duration>,
    viewer_drain: Duration,
}

impl<G: AccountGateway> PublishSession<G> {
    pub fn new(id: u64, registry: Arc<ChannelRegistry>, gateway: Arc<G>) -> Self {
        Self {
            state: PublishState::new(id),
            registry,
            gateway,
            idle_timeout: None,
            viewer_drain: VIEWER_DRAIN_TIMEOUT,
        }
    }

    /// End the stream if the source produces nothing for `timeout`
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Bound the wait for viewers to detach before the counter is reset
    pub fn with_viewer_drain(mut self, timeout: Duration) -> Self {
        self.viewer_drain = timeout;
        self
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn phase(&self) -> PublishPhase {
        self.state.phase
    }

    pub fn state(&self) -> &PublishState {
        &self.state
    }

    /// Run the session to completion
    ///
    /// Rejections (bad address, bad credentials, key already live, store
    /// unreachable) return an error and leave no trace in the registry.
    /// Once live, the session always tears down and returns a report.
    pub async fn run<S: PacketSource>(
        &mut self,
        path: &str,
        query: Option<&str>,
        mut source: S,
    ) -> Result<PublishReport> {
        self.state.start_auth();

        let target = match PublishTarget::from_parts(path, query) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(session_id = self.id(), path, error = %e, "Publisher rejected");
                self.state.reject();
                return Err(e);
            }
        };

        if let Err(e) = self.authenticate(&target).await {
            tracing::warn!(
                session_id = self.id(),
                account = %target.account,
                error = %e,
                "Publisher rejected"
            );
            self.state.reject();
            return Err(e);
        }
        self.state.authenticated();

        let handle = match self.registry.register_if_absent(
            &target.key,
            target.account.clone(),
            self.id(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.state.reject();
                return Err(e.into());
            }
        };
        self.state.registered();

        if let Err(e) = self.gateway.set_live(&target.account, true).await {
            tracing::warn!(account = %target.account, error = %e, "Failed to mark stream live");
        }
        tracing::info!(
            session_id = self.id(),
            stream = %target.key,
            "{} is streaming",
            target.account
        );

        let end = self.pump(handle.queue(), &mut source).await;
        if let PublishEnd::Failed(ref reason) = end {
            tracing::warn!(
                session_id = self.id(),
                stream = %target.key,
                reason = %reason,
                "Publisher stream failed"
            );
        }

        self.state.close();
        handle.queue().close();
        let channel = Arc::clone(handle.channel());
        handle.remove();

        if let Err(e) = self.gateway.set_live(&target.account, false).await {
            tracing::warn!(account = %target.account, error = %e, "Failed to mark stream offline");
        }
        // Viewers uncount themselves; resetting before they do would go negative
        if !channel.viewers_drained(self.viewer_drain).await {
            tracing::warn!(
                session_id = self.id(),
                stream = %target.key,
                remaining = channel.active_viewers(),
                "Viewers still attached at teardown"
            );
        }
        if let Err(e) = self.gateway.reset_viewers(&target.account).await {
            tracing::warn!(account = %target.account, error = %e, "Failed to reset viewer count");
        }
        tracing::info!(
            session_id = self.id(),
            packets = self.state.packets,
            bytes = self.state.bytes,
            live_secs = self.state.live_for().as_secs(),
            connected_secs = self.state.connected_at.elapsed().as_secs(),
            channel_age_secs = channel.age().as_secs(),
            "{} has finished the stream",
            target.account
        );
        self.state.finish();

        Ok(PublishReport {
            key: target.key,
            account: target.account,
            packets: self.state.packets,
            bytes: self.state.bytes,
            end,
        })
    }

    async fn authenticate(&self, target: &PublishTarget) -> Result<()> {
        if self
            .gateway
            .authenticate(&target.account, &target.token)
            .await?
        {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed)
        }
    }

    async fn pump<S: PacketSource>(&mut self, queue: &BroadcastQueue, source: &mut S) -> PublishEnd {
        let header = match idle_bounded(self.idle_timeout, source.stream_header()).await {
            Ok(header) => header,
            Err(e) => return PublishEnd::Failed(e.to_string()),
        };
        if let Err(e) = queue.set_header(header) {
            return PublishEnd::Failed(e.to_string());
        }

        loop {
            match idle_bounded(self.idle_timeout, source.read_packet()).await {
                Ok(Some(packet)) => {
                    let size = packet.size();
                    if let Err(e) = queue.append(packet) {
                        return PublishEnd::Failed(e.to_string());
                    }
                    self.state.record_packet(size);
                }
                Ok(None) => return PublishEnd::Finished,
                Err(e) => return PublishEnd::Failed(e.to_string()),
            }
        }
    }
}

async fn idle_bounded<T, F>(timeout: Option<Duration>, read: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| Error::SourceFailure(format!("no data for {limit:?}")))?,
        None => read.await,
    }
}
