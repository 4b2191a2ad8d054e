//! Parley client binary.
//!
//! # Usage
//!
//! ```bash
//! # Prompt for everything
//! parley-client
//!
//! # Remote server, prompt only for the password
//! parley-client --server chat.example.net:5190 --username ana --room lobby
//! ```
//!
//! Chat output goes to stdout; logs go to stderr.

use std::{
    io::{self, Write},
    time::Duration,
};

use clap::Parser;
use parley_client::{
    ClientConfig, ClientError, ClientEvent, ClientSession, DEFAULT_DISCONNECT_COMMAND, Login,
};
use parley_crypto::KdfParams;
use parley_proto::{DEFAULT_HEADER_WIDTH, FrameCodec, JoinStatus};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley encrypted chat client
#[derive(Parser, Debug)]
#[command(name = "parley-client")]
#[command(about = "Join an end-to-end encrypted Parley chat room")]
#[command(version)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, env = "PARLEY_SERVER", default_value = "127.0.0.1:5190")]
    server: String,

    /// Display name (prompted if omitted)
    #[arg(short, long)]
    username: Option<String>,

    /// Room name (prompted if omitted)
    #[arg(short, long)]
    room: Option<String>,

    /// Width of the ASCII length header, in bytes (must match the server)
    #[arg(long, default_value_t = DEFAULT_HEADER_WIDTH)]
    header_width: usize,

    /// Line that leaves the room
    #[arg(long, default_value = DEFAULT_DISCONNECT_COMMAND)]
    disconnect_command: String,

    /// Seconds to wait for the TCP connection
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let mut input = BufReader::new(tokio::io::stdin());

    let username = match args.username {
        Some(username) => username,
        None => prompt(&mut input, "Username: ").await?,
    };
    let room = match args.room {
        Some(room) => room,
        None => prompt(&mut input, "Room: ").await?,
    };
    let password = prompt(&mut input, "Password: ").await?;
    let login = Login::new(username, room, password)?;

    let config = ClientConfig {
        server_address: args.server,
        codec: FrameCodec::new(args.header_width)?,
        disconnect_command: args.disconnect_command,
        connect_timeout: Duration::from_secs(args.connect_timeout_secs),
        kdf: KdfParams::default(),
    };
    let disconnect_command = config.disconnect_command.clone();
    let room_name = login.room_name().to_string();

    let session = ClientSession::new(config, login).connect().await?;
    let ack = session.ack();
    let verb = match ack.status {
        JoinStatus::Created => "Created",
        JoinStatus::Joined => "Joined",
    };
    {
        let mut out = io::stdout().lock();
        writeln!(
            out,
            "{verb} room '{room_name}' ({} here, {} online). Type {disconnect_command} to leave.",
            ack.participants, ack.total_online
        )?;
    }

    let (events, mut incoming) = mpsc::channel::<ClientEvent>(64);
    let render = tokio::spawn(async move {
        while let Some(event) = incoming.recv().await {
            if writeln!(io::stdout().lock(), "{event}").is_err() {
                break;
            }
        }
    });

    let end = session.run(input, events).await?;
    let _ = render.await;
    tracing::debug!("Exited: {:?}", end);

    Ok(())
}

/// Ask until a non-empty line is entered.
async fn prompt<R>(input: &mut R, label: &str) -> Result<String, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        {
            let mut out = io::stdout().lock();
            write!(out, "{label}")?;
            out.flush()?;
        }

        let mut line = String::new();
        if input.read_line(&mut line).await? == 0 {
            return Err(ClientError::InputClosed);
        }

        let value = line.trim();
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }
}
