use monday::{MondayServer, MongoAccountGateway, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> monday::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("monday=info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let gateway = match MongoAccountGateway::connect(&config.mongo_uri, &config.mongo_db).await {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(uri = %config.mongo_uri, error = %e, "Account store unreachable");
            return Err(e.into());
        }
    };

    MondayServer::new(config, gateway).run().await
}
