use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use stagecast_client::{
    ClientConfig, CloseReason, ConnectOptions, RetryPolicy, RtcMediaBackend, SessionEvent,
    SessionHandle, SessionState, WsConnector, connect_with_retry,
};
use stagecast_core::utils::DEFAULT_RELAY_URL;
use stagecast_core::{IceServerConfig, Role, RoomId};
use stagecast_relay::RelayConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stagecast")]
#[command(about = "Live-stream signaling relay and client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reference signaling relay.
    Relay {
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Join a room as a viewer and report what arrives.
    Watch {
        room: String,

        #[arg(long, env = "STAGECAST_SFU_URL", default_value = DEFAULT_RELAY_URL)]
        relay: String,

        /// Participant id to join with; generated when omitted.
        #[arg(long)]
        id: Option<String>,

        /// STUN/TURN urls; the public STUN servers are used when omitted.
        #[arg(long = "ice", env = "STAGECAST_ICE_SERVERS", value_delimiter = ',')]
        ice: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Commands::Relay { bind } => {
            println!("{}", "📡 Starting signaling relay...".green().bold());
            stagecast_relay::serve(&RelayConfig::new(bind)).await
        }

        Commands::Watch {
            room,
            relay,
            id,
            ice,
        } => watch(room, relay, id, ice).await,
    }
}

async fn watch(room: String, relay: String, id: Option<String>, ice: Vec<String>) -> Result<()> {
    let mut config = ClientConfig::new(relay);
    if !ice.is_empty() {
        config.ice_servers = ice.into_iter().map(IceServerConfig::stun).collect();
    }

    let mut options = ConnectOptions::new(RoomId::new(room), Role::Viewer);
    if let Some(id) = id {
        options = options.with_participant_id(id);
    }

    println!(
        "{} {}",
        "🔌 Connecting to".cyan(),
        config.endpoint().as_str().bold()
    );

    let session = connect_with_retry(
        &config,
        Arc::new(WsConnector),
        Arc::new(RtcMediaBackend),
        options,
        RetryPolicy::default(),
    )
    .await
    .context("Failed to join the room")?;

    println!(
        "{} room '{}' as {}",
        "✅ Joined".green().bold(),
        session.room(),
        session.participant_id()
    );

    let events = session
        .take_events()
        .context("Session events were already taken")?;

    tokio::select! {
        reason = report(events) => print_close(reason),
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "👋 Leaving...".yellow());
            disconnect(&session).await;
        }
    }

    Ok(())
}

async fn report(mut events: mpsc::UnboundedReceiver<SessionEvent>) -> Option<CloseReason> {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StateChanged(SessionState::Active) => {
                println!("{}", "🎬 Media path is live".green().bold());
            }
            SessionEvent::StateChanged(state) => {
                println!("{} {:?}", "➡️  State:".cyan(), state);
            }
            SessionEvent::RemoteTrack(track) => {
                println!(
                    "{} {:?} track {} (stream {})",
                    "📺 Receiving".green(),
                    track.kind,
                    track.id,
                    track.stream_id
                );
            }
            SessionEvent::Closed(reason) => return Some(reason),
        }
    }
    None
}

fn print_close(reason: Option<CloseReason>) {
    match reason {
        Some(CloseReason::RemoteLeave) => {
            println!("{}", "📴 Broadcast ended".yellow().bold());
        }
        Some(CloseReason::Failed(e)) => {
            println!("{} {}", "❌ Session failed:".red().bold(), e);
        }
        Some(CloseReason::LocalDisconnect) | None => {
            println!("{}", "📴 Disconnected".yellow());
        }
    }
}

async fn disconnect(session: &SessionHandle) {
    session.disconnect().await;
    println!("{}", "✨ Session closed".green());
}
