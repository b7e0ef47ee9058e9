use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use server::store::{spawn_recorder, JsonLinesStore};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected players
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Seconds of silence before a player is dropped
    #[arg(long, default_value = "5")]
    client_timeout_secs: u64,

    /// Seconds an unjoined game waits for an opponent
    #[arg(long, default_value = "120")]
    pending_timeout_secs: u64,

    /// File finished matches are appended to, one JSON object per line
    #[arg(short, long, default_value = "matches.jsonl")]
    records: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    let config = ServerConfig {
        tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
        max_clients: args.max_clients,
        client_timeout: Duration::from_secs(args.client_timeout_secs),
        pending_timeout: Duration::from_secs(args.pending_timeout_secs),
    };

    info!("Starting Pong server at {}Hz", tick_rate);
    info!("Recording matches to {}", args.records.display());

    let (recorder, recorder_handle) = spawn_recorder(JsonLinesStore::new(args.records));

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, recorder).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    // Dropping the server closes the recorder channel so pending writes flush
    drop(server);
    if let Err(e) = recorder_handle.await {
        error!("Recorder task failed: {}", e);
    }

    Ok(())
}
