//! Relay backed by an in-memory account store
//!
//! Run with: cargo run --example memory_relay [ACCOUNT_ID] [TOKEN]
//!
//! ## Publishing
//!
//! With ffmpeg (HTTP-FLV push to the ingest port):
//!   ffmpeg -re -i input.mp4 -c copy -f flv -method POST \
//!     "http://localhost:1935/live/507f1f77bcf86cd799439011?t=secret"
//!
//! ## Playing
//!
//! With ffplay:
//!   ffplay http://localhost:8082/live/507f1f77bcf86cd799439011

use std::sync::Arc;

use monday::{AccountId, MemoryAccountStore, MondayServer, ServerConfig, StreamRecord};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> monday::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("monday=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let account = AccountId::parse(
        &args
            .next()
            .unwrap_or_else(|| "507f1f77bcf86cd799439011".to_string()),
    )?;
    let token = args.next().unwrap_or_else(|| "secret".to_string());

    let store = Arc::new(MemoryAccountStore::new());
    store.insert(StreamRecord::new(account.clone(), token.clone()));

    let config = ServerConfig::from_env()?;
    println!("Publish: http://localhost:{}/live/{account}?t={token}", config.ingest_addr.port());
    println!("Play:    http://localhost:{}/live/{account}", config.web_addr.port());

    let server = MondayServer::with_gateway(config, Arc::clone(&store));
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(record) = store.get(&account) {
        println!("Final record: live={} viewers={}", record.is_live, record.viewers);
    }
    Ok(())
}
