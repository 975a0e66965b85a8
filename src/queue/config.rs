//! Broadcast queue configuration

use std::time::Duration;

/// Retention and wait bounds for a broadcast queue
///
/// A queue keeps at most `max_packets` packets, and never more than
/// `max_duration` of media between its oldest and newest packet. Cursors that
/// fall outside that window are re-anchored to a retained sync point.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum retained packets
    pub max_packets: usize,

    /// Maximum timestamp span of retained packets
    pub max_duration: Duration,

    /// How long a new viewer waits for the first sync point
    pub sync_wait: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_packets: 1024,
            max_duration: Duration::from_secs(10),
            sync_wait: Duration::from_secs(5),
        }
    }
}

impl QueueConfig {
    /// Set the retained packet bound (at least one packet is always kept)
    pub fn max_packets(mut self, max: usize) -> Self {
        self.max_packets = max.max(1);
        self
    }

    /// Set the retained duration bound
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    /// Set the first-sync-point wait
    pub fn sync_wait(mut self, wait: Duration) -> Self {
        self.sync_wait = wait;
        self
    }

    pub(crate) fn max_duration_ms(&self) -> u32 {
        self.max_duration.as_millis().min(u32::MAX as u128) as u32
    }
}
