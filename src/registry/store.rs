//! Channel registry implementation
//!
//! Maps stream keys to live channels and enforces a single publisher per key.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::account::AccountId;
use crate::queue::{BroadcastQueue, QueueConfig};

use super::channel::{Channel, StreamKey};
use super::error::RegistryError;

/// Central registry for all live channels
///
/// Writes (publisher start/stop) take the exclusive lock, lookups (viewer
/// connect) the shared one. The lock is never held across an await.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<StreamKey, Arc<Channel>>>,

    /// Retention settings for new channel queues
    queue_config: QueueConfig,
}

impl ChannelRegistry {
    /// Create a new registry with default queue configuration
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a new registry with custom queue configuration
    pub fn with_config(queue_config: QueueConfig) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            queue_config,
        }
    }

    /// Get the queue configuration used for new channels
    pub fn queue_config(&self) -> &QueueConfig {
        &self.queue_config
    }

    /// Create the channel for `key` unless one is already live
    ///
    /// The check and the insert happen under one exclusive lock, so racing
    /// publishers get exactly one handle and the rest `Conflict`.
    pub fn register_if_absent(
        self: &Arc<Self>,
        key: &StreamKey,
        account: AccountId,
        publisher_id: u64,
    ) -> Result<ChannelHandle, RegistryError> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);

        let slot = match channels.entry(key.clone()) {
            Entry::Occupied(existing) => {
                tracing::warn!(
                    stream = %key,
                    session_id = publisher_id,
                    owner = existing.get().publisher_id,
                    "Publisher rejected, stream already live"
                );
                return Err(RegistryError::Conflict(key.clone()));
            }
            Entry::Vacant(slot) => slot,
        };

        let queue = BroadcastQueue::with_config(self.queue_config.clone());
        let channel = Arc::new(Channel::new(key.clone(), account, publisher_id, queue));
        slot.insert(Arc::clone(&channel));

        tracing::info!(
            stream = %key,
            session_id = publisher_id,
            channels = channels.len(),
            "Publisher registered"
        );

        Ok(ChannelHandle {
            registry: Arc::clone(self),
            channel,
            removed: false,
        })
    }

    /// Look up the live channel for `key`
    pub fn lookup(&self, key: &StreamKey) -> Result<Arc<Channel>, RegistryError> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);

        channels
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(key.clone()))
    }

    /// Check if a channel is live for `key`
    pub fn contains(&self, key: &StreamKey) -> bool {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Get total number of live channels
    pub fn channel_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remove `channel` if it is still the one registered under its key
    fn remove_owned(&self, channel: &Arc<Channel>) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);

        match channels.get(&channel.key) {
            Some(current) if Arc::ptr_eq(current, channel) => {
                channels.remove(&channel.key);
                true
            }
            current => {
                tracing::warn!(
                    stream = %channel.key,
                    expected = channel.publisher_id,
                    actual = ?current.map(|c| c.publisher_id),
                    "Channel removal mismatch"
                );
                false
            }
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive ownership of a registered channel
///
/// Held by the publishing session. [`remove`](Self::remove) consumes the
/// handle, so a channel is deregistered at most once; dropping the handle
/// without removing it deregisters it as well.
pub struct ChannelHandle {
    registry: Arc<ChannelRegistry>,
    channel: Arc<Channel>,
    removed: bool,
}

impl ChannelHandle {
    /// The owned channel
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// The channel's stream key
    pub fn key(&self) -> &StreamKey {
        &self.channel.key
    }

    /// The channel's broadcast queue
    pub fn queue(&self) -> &Arc<BroadcastQueue> {
        &self.channel.queue
    }

    /// Deregister the channel
    pub fn remove(mut self) {
        self.removed = true;
        if self.registry.remove_owned(&self.channel) {
            tracing::info!(
                stream = %self.channel.key,
                session_id = self.channel.publisher_id,
                "Publisher unregistered"
            );
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        self.channel.queue.close();
        if self.registry.remove_owned(&self.channel) {
            tracing::warn!(
                stream = %self.channel.key,
                session_id = self.channel.publisher_id,
                "Channel handle dropped without removal, unregistered"
            );
        }
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("key", &self.channel.key)
            .field("publisher_id", &self.channel.publisher_id)
            .field("removed", &self.removed)
            .finish()
    }
}
