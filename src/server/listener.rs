//! Server listeners
//!
//! Binds the ingest and playback ports and serves both routers until one
//! of them fails.

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::account::AccountGateway;
use crate::error::Result;
use crate::registry::ChannelRegistry;
use crate::server::config::ServerConfig;
use crate::server::{ingest, playback, ServerState};

/// Live relay server
pub struct MondayServer<G> {
    state: ServerState<G>,
}

impl<G: AccountGateway> MondayServer<G> {
    /// Create a new server with the given configuration and account gateway
    pub fn new(config: ServerConfig, gateway: G) -> Self {
        Self::with_gateway(config, Arc::new(gateway))
    }

    /// Create a new server sharing an existing gateway
    pub fn with_gateway(config: ServerConfig, gateway: Arc<G>) -> Self {
        Self {
            state: ServerState::new(config, gateway),
        }
    }

    /// Get a reference to the channel registry
    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.state.registry
    }

    /// Shared handler state
    pub fn state(&self) -> &ServerState<G> {
        &self.state
    }

    /// Router for publisher pushes
    pub fn ingest_router(&self) -> Router {
        ingest::router(self.state.clone())
    }

    /// Router for viewers
    pub fn playback_router(&self) -> Router {
        playback::router(self.state.clone())
    }

    /// Run the server
    ///
    /// This method blocks until a listener fails.
    pub async fn run(&self) -> Result<()> {
        let (ingest, web) = self.bind().await?;
        self.serve(ingest, web).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (ingest, web) = self.bind().await?;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(ingest, web) => result,
        }
    }

    async fn bind(&self) -> Result<(TcpListener, TcpListener)> {
        let ingest = TcpListener::bind(self.state.config.ingest_addr).await?;
        tracing::info!(addr = %self.state.config.ingest_addr, "Ingest listening");

        let web = TcpListener::bind(self.state.config.web_addr).await?;
        tracing::info!(addr = %self.state.config.web_addr, "Playback listening");

        Ok((ingest, web))
    }

    /// Serve both routers on already bound listeners
    pub async fn serve(&self, ingest: TcpListener, web: TcpListener) -> Result<()> {
        tokio::try_join!(
            axum::serve(ingest, self.ingest_router()).into_future(),
            axum::serve(web, self.playback_router()).into_future(),
        )?;
        Ok(())
    }

    /// Get the configured playback address
    pub fn web_addr(&self) -> SocketAddr {
        self.state.config.web_addr
    }

    /// Get the configured ingest address
    pub fn ingest_addr(&self) -> SocketAddr {
        self.state.config.ingest_addr
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::account::MemoryAccountStore;

    #[tokio::test]
    async fn test_serves_playback_over_tcp() {
        let server = Arc::new(MondayServer::new(
            ServerConfig::default(),
            MemoryAccountStore::new(),
        ));
        let ingest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let web = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let web_addr = web.local_addr().unwrap();

        let running = Arc::clone(&server);
        let task = tokio::spawn(async move { running.serve(ingest, web).await });

        let mut stream = TcpStream::connect(web_addr).await.unwrap();
        stream
            .write_all(b"GET /live/abc HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        let response = String::from_utf8_lossy(&response);

        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(response.to_ascii_lowercase().contains("access-control-allow-origin: *"));
        assert!(response.ends_with("wrong account ID"));

        task.abort();
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = MondayServer::new(
            ServerConfig::default().web_addr(addr).ingest_addr(addr),
            MemoryAccountStore::new(),
        );

        server.run_until(async {}).await.unwrap();
        assert_eq!(server.registry().channel_count(), 0);
    }
}
