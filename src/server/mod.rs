//! HTTP surfaces
//!
//! Two listeners share one [`ServerState`]: the ingest port accepts
//! HTTP-FLV pushes from publishers, the web port serves HTTP-FLV to viewers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::account::AccountGateway;
use crate::registry::ChannelRegistry;

pub mod config;
pub mod ingest;
pub mod listener;
pub mod playback;

pub use config::ServerConfig;
pub use listener::MondayServer;

/// State shared by every request handler
pub struct ServerState<G> {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<ChannelRegistry>,
    pub gateway: Arc<G>,
    next_session_id: Arc<AtomicU64>,
    publisher_slots: Option<Arc<Semaphore>>,
}

impl<G: AccountGateway> ServerState<G> {
    pub fn new(config: ServerConfig, gateway: Arc<G>) -> Self {
        let publisher_slots = if config.max_publishers > 0 {
            Some(Arc::new(Semaphore::new(config.max_publishers)))
        } else {
            None
        };

        Self {
            registry: Arc::new(ChannelRegistry::with_config(config.queue.clone())),
            config: Arc::new(config),
            gateway,
            next_session_id: Arc::new(AtomicU64::new(1)),
            publisher_slots,
        }
    }

    /// Allocate a session ID, unique across both listeners
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve a publisher slot; `None` when publishers are unlimited
    pub fn acquire_publisher_slot(
        &self,
    ) -> Result<Option<OwnedSemaphorePermit>, TryAcquireError> {
        self.publisher_slots
            .as_ref()
            .map(|slots| Arc::clone(slots).try_acquire_owned())
            .transpose()
    }
}

impl<G> Clone for ServerState<G> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            gateway: Arc::clone(&self.gateway),
            next_session_id: Arc::clone(&self.next_session_id),
            publisher_slots: self.publisher_slots.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::MemoryAccountStore;

    #[test]
    fn test_session_ids_are_shared_between_clones() {
        let state = ServerState::new(ServerConfig::default(), Arc::new(MemoryAccountStore::new()));
        let clone = state.clone();

        assert_eq!(state.next_session_id(), 1);
        assert_eq!(clone.next_session_id(), 2);
        assert_eq!(state.next_session_id(), 3);
    }

    #[test]
    fn test_publisher_slots() {
        let unlimited =
            ServerState::new(ServerConfig::default(), Arc::new(MemoryAccountStore::new()));
        assert!(unlimited.acquire_publisher_slot().unwrap().is_none());

        let capped = ServerState::new(
            ServerConfig::default().max_publishers(1),
            Arc::new(MemoryAccountStore::new()),
        );
        let slot = capped.acquire_publisher_slot().unwrap();
        assert!(slot.is_some());
        assert!(capped.acquire_publisher_slot().is_err());

        drop(slot);
        assert!(capped.acquire_publisher_slot().unwrap().is_some());
    }
}
