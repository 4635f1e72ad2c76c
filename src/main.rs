use control_stream_server::{ControlStreamServer, ServerConfig, CONTROL_SCHEMA_VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::default();
    info!("Starting Control Stream Server...");
    info!("  - Frame rate: {}Hz", config.frame_rate_hz());
    info!("  - Schema version: {}", CONTROL_SCHEMA_VERSION);

    let server = ControlStreamServer::bind(config).await?;
    info!("Control stream server running at ws://{}/ws", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
    }

    Ok(())
}
