//! avrelay command-line entry point
//!
//! `avrelay server` runs the rendezvous relay; `avrelay client` connects one
//! participant using the synthetic camera and microphone. `avrelay listen`
//! waits for a client to call it directly, without a relay.

use std::net::IpAddr;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use avrelay::client::{synthetic_media, DirectListener};
use avrelay::protocol::constants::{DEFAULT_AUDIO_PORT, DEFAULT_VIDEO_PORT};
use avrelay::{ClientConfig, PeerClient, RelayServer, ServerConfig, SessionOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-party video/audio relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the rendezvous relay server
    Server(ServerArgs),
    /// Connect to a relay server as one participant
    Client(ClientArgs),
    /// Wait for one participant to connect directly
    Listen(ListenArgs),
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Address to listen on (IP or 'localhost')
    #[arg(long, default_value = "0.0.0.0", value_parser = parse_ip)]
    bind: IpAddr,

    /// Port accepting video connections
    #[arg(long, default_value_t = DEFAULT_VIDEO_PORT)]
    video_port: u16,

    /// Port accepting audio connections
    #[arg(long, default_value_t = DEFAULT_AUDIO_PORT)]
    audio_port: u16,
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// Relay server address (IP or 'localhost')
    #[arg(long, default_value = "127.0.0.1", value_parser = parse_ip)]
    server: IpAddr,

    /// Server video port
    #[arg(long, default_value_t = DEFAULT_VIDEO_PORT)]
    video_port: u16,

    /// Server audio port
    #[arg(long, default_value_t = DEFAULT_AUDIO_PORT)]
    audio_port: u16,

    /// Camera index
    #[arg(long, default_value_t = 0)]
    camera: u32,

    /// Microphone index
    #[arg(long, default_value_t = 0)]
    microphone: u32,

    /// Minimum milliseconds between two video frames
    #[arg(long, default_value_t = 500)]
    frame_interval_ms: u64,
}

#[derive(Args, Debug)]
struct ListenArgs {
    /// Address to listen on (IP or 'localhost')
    #[arg(long, default_value = "0.0.0.0", value_parser = parse_ip)]
    bind: IpAddr,

    /// Port accepting the video connection
    #[arg(long, default_value_t = DEFAULT_VIDEO_PORT)]
    video_port: u16,

    /// Port accepting the audio connection
    #[arg(long, default_value_t = DEFAULT_AUDIO_PORT)]
    audio_port: u16,

    /// Camera index
    #[arg(long, default_value_t = 0)]
    camera: u32,

    /// Microphone index
    #[arg(long, default_value_t = 0)]
    microphone: u32,

    /// Minimum milliseconds between two video frames
    #[arg(long, default_value_t = 500)]
    frame_interval_ms: u64,
}

fn parse_ip(arg: &str) -> Result<IpAddr, String> {
    // Replace "localhost" with "127.0.0.1"
    let normalized = arg.replace("localhost", "127.0.0.1");

    normalized.parse::<IpAddr>().map_err(|_| {
        format!(
            "Invalid address: '{}'. Expected format: IP or 'localhost'",
            arg
        )
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("Error: failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Server(args) => run_server(args).await,
        Command::Client(args) => run_client(args).await,
        Command::Listen(args) => run_listen(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("avrelay=debug".parse()?))
        .init();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let config = ServerConfig::with_ip(args.bind).ports(args.video_port, args.audio_port);

    let server = RelayServer::bind(config)
        .await
        .with_context(|| format!("failed to bind relay listeners on {}", args.bind))?;

    server.run_until(shutdown_signal()).await?;
    Ok(())
}

async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let config = ClientConfig::new(args.server)
        .ports(args.video_port, args.audio_port)
        .devices(args.camera, args.microphone)
        .frame_interval(Duration::from_millis(args.frame_interval_ms));

    let media = synthetic_media(&config).context("failed to open media devices")?;
    let client = PeerClient::connect(config, media)
        .await
        .with_context(|| format!("failed to connect to relay server at {}", args.server))?;

    run_session(client).await
}

async fn run_listen(args: ListenArgs) -> anyhow::Result<()> {
    let config = ClientConfig::new(args.bind)
        .ports(args.video_port, args.audio_port)
        .devices(args.camera, args.microphone)
        .frame_interval(Duration::from_millis(args.frame_interval_ms));

    let media = synthetic_media(&config).context("failed to open media devices")?;
    let listener = DirectListener::bind(config)
        .await
        .with_context(|| format!("failed to bind call listeners on {}", args.bind))?;

    let client = tokio::select! {
        accepted = listener.accept(media) => {
            accepted.context("failed to accept the other participant")?
        }
        _ = shutdown_signal() => return Ok(()),
    };

    run_session(client).await
}

/// Run a call until it ends or Ctrl+C, then report how it went
async fn run_session(mut client: PeerClient) -> anyhow::Result<()> {
    tokio::select! {
        _ = client.ended() => {}
        _ = shutdown_signal() => {}
    }

    let outcome = client.stop().await;
    let stats = client.stats();
    tracing::info!(
        outcome = ?outcome,
        video_frames_sent = stats.video.frames_sent,
        video_frames_received = stats.video.frames_received,
        audio_bytes_sent = stats.audio.bytes_sent,
        audio_bytes_received = stats.audio.bytes_received,
        "Session ended"
    );

    match outcome {
        SessionOutcome::Failed {
            kind,
            direction,
            error,
        } => Err(anyhow!("{kind} {direction} loop failed: {error}")),
        SessionOutcome::Completed | SessionOutcome::PeerClosed { .. } => Ok(()),
    }
}
