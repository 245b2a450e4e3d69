//! Parlor game-server binary.
//!
//! Started by the lobby's supervisor, never by hand in production. The
//! room's context arrives in `PARLOR_HANDOFF`; reports go out as frames
//! on stdout, so logs go to stderr.
//!
//! ```bash
//! PARLOR_HANDOFF='{"room_id":1,...}' parlor-game --log-level debug
//! ```

use clap::Parser;
use parlor_gameserver::{forward_reports, serve};
use parlor_protocol::HandoffContext;
use parlor_transport::FrameConfig;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parlor per-room game server
#[derive(Parser, Debug)]
#[command(name = "parlor-game")]
#[command(about = "Authoritative game server for one Parlor room")]
#[command(version)]
struct Args {
    /// Handoff context as JSON; read from PARLOR_HANDOFF when omitted
    #[arg(long)]
    handoff: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let ctx = match args.handoff {
        Some(value) => HandoffContext::from_env_value(&value)?,
        None => HandoffContext::from_env()?,
    };
    tracing::info!(room_id = %ctx.room_id, game = %ctx.game_id, "game server starting");

    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(forward_reports(
        reports_rx,
        tokio::io::stdout(),
        FrameConfig::default(),
    ));

    // `serve` drops the sender when it returns, which ends the writer.
    let result = serve(ctx, reports_tx).await;
    if let Ok(Err(e)) = writer.await {
        tracing::error!(error = %e, "failed to write reports");
    }

    let report = result?;
    tracing::info!(
        status = %report.status,
        rounds = report.rounds_played,
        "game server exiting"
    );
    Ok(())
}
