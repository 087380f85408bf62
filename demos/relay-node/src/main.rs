//! `relay-node`: run a relay server, or talk to one from the command line.
//!
//! ```text
//! relay-node serve --port 5555 --log-dir logs
//! relay-node chat --log-dir logs "What is my balance?" "Thanks!"
//! relay-node broadcast "maintenance at noon"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use mcp_relay::prelude::*;
use mcp_relay::telemetry::{self, TelemetryError, CLIENT_OPS_LOG, SERVER_OPS_LOG};
use mcp_relay_client::{ClientError, RelayClient};
use mcp_relay_protocol::BROADCAST_COMMAND;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server until Ctrl-C.
    Serve(ServeArgs),
    /// Send chat messages and print what the server relays back.
    Chat(ChatArgs),
    /// Ask the server to relay a system message to every client.
    Broadcast(BroadcastArgs),
}

#[derive(Args, Debug, Clone)]
struct Endpoint {
    /// Server host.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Directory for chat_history.log, system.log and mcp_server.log.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Drop clients that send nothing for this many seconds.
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Do not send a chat back to the connection it came from.
    #[arg(long)]
    no_echo: bool,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Directory for client_messages.log and mcp_client.log.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Send as the assistant rather than the user.
    #[arg(long)]
    assistant: bool,

    /// Pause between messages, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Messages to send, in order.
    #[arg(required = true)]
    messages: Vec<String>,
}

#[derive(Args, Debug)]
struct BroadcastArgs {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Text of the system message.
    content: String,
}

#[derive(Debug, thiserror::Error)]
enum NodeError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), NodeError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => chat(args).await,
        Command::Broadcast(args) => broadcast(args).await,
    }
}

fn init_logging(log_dir: Option<&Path>, file_name: &str) -> Result<(), TelemetryError> {
    let path = log_dir.map(|dir| dir.join(file_name));
    telemetry::init(path.as_deref())
}

async fn serve(args: ServeArgs) -> Result<(), NodeError> {
    init_logging(args.log_dir.as_deref(), SERVER_OPS_LOG)?;

    let mut builder = RelayServer::builder()
        .bind(&format!("{}:{}", args.endpoint.host, args.endpoint.port))
        .echo_to_sender(!args.no_echo);
    if let Some(dir) = args.log_dir {
        builder = builder.log_dir(dir);
    }
    if let Some(secs) = args.idle_timeout_secs {
        builder = builder.idle_timeout(Duration::from_secs(secs));
    }

    let server = builder.start().await?;
    tracing::info!(addr = %server.local_addr(), "press Ctrl-C to stop");
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "ctrl-c handler failed");
            }
        })
        .await;
    Ok(())
}

async fn chat(args: ChatArgs) -> Result<(), NodeError> {
    init_logging(args.log_dir.as_deref(), CLIENT_OPS_LOG)?;

    let mut builder = RelayClient::builder()
        .host(args.endpoint.host)
        .port(args.endpoint.port);
    if let Some(dir) = args.log_dir {
        builder = builder.log_dir(dir);
    }
    let client = builder.build()?;
    client.connect().await?;

    let is_user = !args.assistant;
    for (i, content) in args.messages.iter().enumerate() {
        if i > 0 && args.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
        }
        client.send_chat(content.as_str(), is_user).await?;

        match client.next_message(Some(ECHO_TIMEOUT)).await {
            Some(message) => println!(
                "[{}] {}",
                message.sender.as_deref().unwrap_or("unknown"),
                message.content
            ),
            None => tracing::warn!(%content, "no broadcast received"),
        }
    }

    client.disconnect().await;
    Ok(())
}

async fn broadcast(args: BroadcastArgs) -> Result<(), NodeError> {
    init_logging(None, CLIENT_OPS_LOG)?;

    let client = RelayClient::connect_to(&args.endpoint.host, args.endpoint.port).await?;
    client
        .send_system(args.content, Some(BROADCAST_COMMAND))
        .await?;
    client.disconnect().await;
    Ok(())
}
