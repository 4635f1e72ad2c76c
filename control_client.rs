use control_stream_server::client::{ClientConfig, ControlStreamClient, DEFAULT_URL};
use tracing::info;
use tracing_subscriber::EnvFilter;

// Usage: control_client [url] [frame_limit]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| DEFAULT_URL.to_string());
    let frame_limit = match args.next() {
        Some(raw) => Some(raw.parse::<u64>()?),
        None => None,
    };

    info!("Connecting to control stream at {}", url);
    let mut client = ControlStreamClient::new(ClientConfig::new(url));

    client
        .run(frame_limit, |state| {
            println!(
                "[{}] frame {:>5}  control_x: {:>6.3}  smoothed: {:>6.3}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                state.received_frames,
                state.last_control_x,
                state.smoothed_control_x
            );
        })
        .await?;

    info!(
        "Done - received {} frames",
        client.state().received_frames
    );
    Ok(())
}
