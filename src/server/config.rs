//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::queue::QueueConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Playback (web) address
    pub web_addr: SocketAddr,

    /// Media ingest address
    pub ingest_addr: SocketAddr,

    /// Account store connection string
    pub mongo_uri: String,

    /// Account store database name
    pub mongo_db: String,

    /// Maximum concurrent publishers (0 = unlimited)
    pub max_publishers: usize,

    /// Idle timeout (end a publish if no data received)
    pub idle_timeout: Duration,

    /// FLV chunks buffered per viewer before writes back up
    pub viewer_buffer: usize,

    /// Per-channel retention and first-sync wait
    pub queue: QueueConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            web_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8082)),
            ingest_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 1935)),
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_db: "flowee".to_string(),
            max_publishers: 0, // Unlimited
            idle_timeout: Duration::from_secs(60),
            viewer_buffer: 256,
            queue: QueueConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup
    ///
    /// Unset, empty and blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(port) = parse::<u16, _>(&lookup, "MONDAY_PORT")? {
            config.web_addr.set_port(port);
        }
        if let Some(port) = parse::<u16, _>(&lookup, "MONDAY_RTMP_PORT")? {
            config.ingest_addr.set_port(port);
        }
        if let Some(uri) = lookup("MONGO_URI") {
            config.mongo_uri = uri;
        }
        if let Some(db) = lookup("MONGO_DB") {
            config.mongo_db = db;
        }
        if let Some(max) = parse(&lookup, "MONDAY_MAX_PUBLISHERS")? {
            config.max_publishers = max;
        }
        if let Some(secs) = parse(&lookup, "MONDAY_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(packets) = parse(&lookup, "MONDAY_QUEUE_PACKETS")? {
            config.queue = config.queue.max_packets(packets);
        }
        if let Some(secs) = parse(&lookup, "MONDAY_QUEUE_SECONDS")? {
            config.queue = config.queue.max_duration(Duration::from_secs(secs));
        }
        if let Some(ms) = parse(&lookup, "MONDAY_SYNC_WAIT_MS")? {
            config.queue = config.queue.sync_wait(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Set the playback address
    pub fn web_addr(mut self, addr: SocketAddr) -> Self {
        self.web_addr = addr;
        self
    }

    /// Set the ingest address
    pub fn ingest_addr(mut self, addr: SocketAddr) -> Self {
        self.ingest_addr = addr;
        self
    }

    /// Set maximum concurrent publishers
    pub fn max_publishers(mut self, max: usize) -> Self {
        self.max_publishers = max;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set per-viewer buffering
    pub fn viewer_buffer(mut self, chunks: usize) -> Self {
        self.viewer_buffer = chunks.max(1);
        self
    }

    /// Set queue retention
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }
}

fn parse<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?}: {e}"))),
    }
}
