use tracing::info;

use cove::chat::config::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("cove — a small place to talk");

    let config = ServerConfig::from_env();
    info!(
        addr = %config.bind_addr(),
        max_clients = config.max_clients,
        "starting chat server"
    );

    cove::chat::server::run(config).await
}
