//! Parley server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port
//! parley-server
//!
//! # Custom address and a 32-byte length header
//! parley-server --bind 127.0.0.1:6000 --header-width 32
//! ```

use clap::Parser;
use parley_proto::{DEFAULT_HEADER_WIDTH, DEFAULT_MAX_PAYLOAD, FrameCodec};
use parley_server::{DEFAULT_PEER_QUEUE, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley chat relay server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Relays end-to-end encrypted chat rooms over TCP")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "PARLEY_BIND", default_value = "0.0.0.0:5190")]
    bind: String,

    /// Width of the ASCII length header, in bytes (must match clients)
    #[arg(long, default_value_t = DEFAULT_HEADER_WIDTH)]
    header_width: usize,

    /// Largest frame payload accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: usize,

    /// Outbound queue capacity per connection, in frames
    #[arg(long, default_value_t = DEFAULT_PEER_QUEUE)]
    peer_queue: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerConfig {
        bind_address: args.bind,
        codec: FrameCodec::new(args.header_width)?.with_max_payload(args.max_payload),
        peer_queue: args.peer_queue,
    };

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
