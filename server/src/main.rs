use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// Potstop game session server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Maximum number of players in the lobby (at least 2)
    #[arg(short = 'l', long, default_value = "8")]
    player_limit: usize,

    /// Grace period after the first STOP before other players are notified
    #[arg(long, default_value = "500")]
    grace_ms: u64,

    /// How long the stopping player waits for everyone's answers
    #[arg(long, default_value = "5000")]
    collection_ms: u64,

    /// How long a late STOP waits for the round to be scored
    #[arg(long, default_value = "7500")]
    trailing_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig::default()
        .with_player_limit(args.player_limit)
        .with_timings(
            Duration::from_millis(args.grace_ms),
            Duration::from_millis(args.collection_ms),
            Duration::from_millis(args.trailing_ms),
        );
    info!(
        "Lobby holds up to {} players, {} category pools",
        config.player_limit,
        config.pools.len()
    );

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, config).await?;
    let shutdown = server.shutdown_handle();

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            shutdown.shutdown().await;
        }
    }

    Ok(())
}
