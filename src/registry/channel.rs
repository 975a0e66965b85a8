//! Channel and stream key types

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::account::AccountId;
use crate::queue::BroadcastQueue;

/// Address shared by a publisher and its viewers
///
/// The full resource path with surrounding slashes trimmed, so
/// `/live/abc` and `live/abc/` name the same channel while `/other/abc`
/// is a different one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey(String);

impl StreamKey {
    /// Create a stream key from a resource path
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().trim_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment (the account id by convention)
    pub fn last_segment(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A live stream bound to its key for one publisher's session
#[derive(Debug)]
pub struct Channel {
    /// Channel address
    pub key: StreamKey,
    /// Account that owns the stream
    pub account: AccountId,
    /// Session ID of the owning publisher
    pub publisher_id: u64,
    /// Packet fan-out
    pub queue: Arc<BroadcastQueue>,
    /// When the channel was registered
    pub created_at: Instant,
    /// Viewers currently attached
    viewers: watch::Sender<usize>,
}

impl Channel {
    pub(super) fn new(
        key: StreamKey,
        account: AccountId,
        publisher_id: u64,
        queue: BroadcastQueue,
    ) -> Self {
        Self {
            key,
            account,
            publisher_id,
            queue: Arc::new(queue),
            created_at: Instant::now(),
            viewers: watch::Sender::new(0),
        }
    }

    /// Time since the channel was registered
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Attach a viewer for as long as the returned guard lives
    ///
    /// Returns `None` once the queue is closed. The closed check and the
    /// increment happen under the counter's lock, so a publisher that closes
    /// the queue and then waits in [`viewers_drained`](Self::viewers_drained)
    /// sees every viewer that got a guard.
    pub fn attach_viewer(self: &Arc<Self>) -> Option<ViewerGuard> {
        let attached = self.viewers.send_if_modified(|count| {
            if self.queue.is_closed() {
                return false;
            }
            *count += 1;
            true
        });

        attached.then(|| ViewerGuard {
            channel: Arc::clone(self),
        })
    }

    /// Number of attached viewers
    pub fn active_viewers(&self) -> usize {
        *self.viewers.borrow()
    }

    /// Wait until every attached viewer has detached
    ///
    /// Returns `false` if viewers were still attached after `timeout`.
    pub async fn viewers_drained(&self, timeout: Duration) -> bool {
        let mut viewers = self.viewers.subscribe();
        let drained = tokio::time::timeout(timeout, viewers.wait_for(|count| *count == 0))
            .await
            .is_ok_and(|waited| waited.is_ok());
        drained
    }
}

/// Keeps a viewer counted on its channel until dropped
#[derive(Debug)]
pub struct ViewerGuard {
    channel: Arc<Channel>,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.channel
            .viewers
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_key_trims_slashes() {
        assert_eq!(StreamKey::new("/live/abc/"), StreamKey::new("live/abc"));
        assert_ne!(StreamKey::new("/live/abc"), StreamKey::new("/other/abc"));
        assert_eq!(StreamKey::new("/live/abc").to_string(), "live/abc");
    }

    #[test]
    fn test_stream_key_last_segment() {
        assert_eq!(StreamKey::new("/a/b/c").last_segment(), "c");
        assert_eq!(StreamKey::new("solo").last_segment(), "solo");
        assert_eq!(StreamKey::new("/").last_segment(), "");
    }

    fn channel() -> Arc<Channel> {
        let queue = BroadcastQueue::new();
        Arc::new(Channel::new(
            StreamKey::new("live/507f1f77bcf86cd799439011"),
            AccountId::parse("507f1f77bcf86cd799439011").unwrap(),
            1,
            queue,
        ))
    }

    #[test]
    fn test_viewer_guard_counts() {
        let channel = channel();
        let first = channel.attach_viewer().unwrap();
        let second = channel.attach_viewer().unwrap();
        assert_eq!(channel.active_viewers(), 2);

        drop(first);
        assert_eq!(channel.active_viewers(), 1);
        drop(second);
        assert_eq!(channel.active_viewers(), 0);
    }

    #[test]
    fn test_no_viewer_attaches_after_close() {
        let channel = channel();
        channel.queue.close();
        assert!(channel.attach_viewer().is_none());
        assert_eq!(channel.active_viewers(), 0);
    }

    #[tokio::test]
    async fn test_viewers_drained_waits_for_guards() {
        let channel = channel();
        assert!(channel.viewers_drained(Duration::from_millis(10)).await);

        let guard = channel.attach_viewer().unwrap();
        assert!(!channel.viewers_drained(Duration::from_millis(20)).await);

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        assert!(channel.viewers_drained(Duration::from_secs(5)).await);
        release.await.unwrap();
    }

    #[test]
    fn test_age_advances() {
        let channel = channel();
        std::thread::sleep(Duration::from_millis(5));
        assert!(channel.age() >= Duration::from_millis(5));
    }
}
