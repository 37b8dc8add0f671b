//! Telestream command line client
//!
//! ```bash
//! # Watch the live stream of a telescope until Ctrl-C
//! telestream watch scope-1
//!
//! # Inspect and clean up registry sessions
//! telestream --api-url http://localhost:8000 list
//! telestream delete 3f1c2a
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telestream_client::{
    ClientConfig, RegistryClient, RemoteStream, SessionEvent, SessionNegotiator,
    WebRtcPeerFactory,
};
use telestream_protocol::{SessionId, StreamKind};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Watch telescope video streams over WebRTC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to ./telestream.toml when present)
    #[arg(short, long, env = "TELESTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Signaling registry base URL
    #[arg(long)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Negotiate a session and receive video until Ctrl-C
    Watch {
        /// Telescope to watch
        telescope: String,

        /// Stream to request: live or stacked
        #[arg(short, long, default_value = "live")]
        stream: StreamKind,

        /// Seconds to wait for the first video track
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// List sessions known to the registry
    List,
    /// Show one session
    Show { session_id: String },
    /// Delete one session
    Delete { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telestream=debug,telestream_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }

    let registry = RegistryClient::new(&config.api_url);

    match args.command {
        Command::Watch {
            telescope,
            stream,
            timeout_secs,
        } => {
            if let Some(secs) = timeout_secs {
                config.startup_timeout_secs = secs;
            }
            watch(registry, &config, &telescope, stream).await
        }
        Command::List => {
            let sessions = registry.list_sessions().await?;
            if sessions.is_empty() {
                println!("No active sessions");
            }
            for session in sessions {
                println!(
                    "{}  {}  {}  {}",
                    session.session_id, session.telescope_name, session.stream_type, session.state
                );
            }
            Ok(())
        }
        Command::Show { session_id } => {
            match registry.get_session(&SessionId::from(session_id.clone())).await? {
                Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
                None => anyhow::bail!("Session {} not found", session_id),
            }
            Ok(())
        }
        Command::Delete { session_id } => {
            registry.delete_session(&SessionId::from(session_id.clone())).await?;
            println!("Deleted session {}", session_id);
            Ok(())
        }
    }
}

async fn watch(
    registry: RegistryClient,
    config: &ClientConfig,
    telescope: &str,
    stream_kind: StreamKind,
) -> Result<()> {
    tracing::info!("Connecting to {} via {}", telescope, registry.base_url());

    let negotiator = SessionNegotiator::with_startup_timeout(
        registry,
        Arc::new(WebRtcPeerFactory::new()),
        config.startup_timeout(),
    );

    let reporter = tokio::spawn(report_events(negotiator.subscribe()));

    let stream = tokio::select! {
        result = negotiator.create_session(telescope, stream_kind) => result?,
        _ = tokio::signal::ctrl_c() => {
            negotiator.disconnect().await;
            reporter.abort();
            return Ok(());
        }
    };

    if let Some(session_id) = negotiator.session_id().await {
        println!("Watching {} ({}) on session {}", telescope, stream_kind, session_id);
    }

    tokio::select! {
        _ = count_packets(stream) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, disconnecting");
        }
    }

    let stats = negotiator.candidate_stats().await;
    tracing::info!(
        "Candidates: {} local, {} remote",
        stats.local_generated,
        stats.remote_received
    );

    negotiator.disconnect().await;
    reporter.abort();
    Ok(())
}

async fn report_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Error(message)) => eprintln!("error: {}", message),
            Ok(SessionEvent::ConnectionStateChange(state)) => println!("connection: {}", state),
            Ok(SessionEvent::Disconnected) => println!("disconnected"),
            Ok(event) => tracing::debug!("Session event: {:?}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Dropped {} session events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read RTP from the first video track, reporting throughput every few seconds
async fn count_packets(stream: RemoteStream) {
    let Some(track) = stream.video_tracks().into_iter().next() else {
        return;
    };
    let Some(source) = track.rtp_source() else {
        return;
    };

    let mut packets: u64 = 0;
    let mut bytes: usize = 0;
    let mut report = tokio::time::interval(Duration::from_secs(5));
    report.tick().await;

    loop {
        tokio::select! {
            read = source.read_rtp() => match read {
                Ok((packet, _)) => {
                    packets += 1;
                    bytes += packet.payload.len();
                }
                Err(e) => {
                    tracing::warn!("Video track {} ended: {}", track.id(), e);
                    break;
                }
            },
            _ = report.tick() => {
                println!("{} RTP packets, {} payload bytes", packets, bytes);
            }
        }
    }
}
