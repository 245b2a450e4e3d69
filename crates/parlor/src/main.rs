//! Parlor lobby binary.
//!
//! # Usage
//!
//! ```bash
//! # Against the account/catalog store, starting game servers as processes
//! parlor-lobby --bind 0.0.0.0:7000 --store 127.0.0.1:7100 --game-binary ./parlor-game
//!
//! # Local run: in-memory catalog, game servers inside the lobby process
//! parlor-lobby --account ann:hash-a --account bob:hash-b
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parlor::{Catalog, GameInfo, LobbyConfig, LobbyServerBuilder, MemoryCatalog, StoreClient};
use parlor_supervisor::CommandLauncher;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parlor lobby server
#[derive(Parser, Debug)]
#[command(name = "parlor-lobby")]
#[command(about = "Lobby and room orchestration for Parlor games")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7000")]
    bind: String,

    /// Account/catalog store address; an in-memory catalog is used when
    /// omitted
    #[arg(long)]
    store: Option<String>,

    /// In-memory account as NAME:HASH (repeatable, ignored with --store)
    #[arg(long = "account")]
    accounts: Vec<String>,

    /// Game-server executable; game servers run in-process when omitted
    #[arg(long)]
    game_binary: Option<String>,

    /// Host game servers bind to
    #[arg(long, default_value = "127.0.0.1")]
    game_host: String,

    /// Seconds players get to act each round
    #[arg(long, default_value = "15")]
    round_deadline: u64,

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

    tracing::info!("Parlor lobby starting");
    tracing::info!("Binding to {}", args.bind);

    let config = LobbyConfig {
        game_host: args.game_host.clone(),
        round_deadline: Duration::from_secs(args.round_deadline),
        ..Default::default()
    };

    match args.store.clone() {
        Some(addr) => {
            tracing::info!(%addr, "using catalog store");
            run(&args, config, StoreClient::new(addr)).await
        }
        None => {
            tracing::warn!("No store given - using an in-memory catalog");
            let mut catalog = MemoryCatalog::new()
                .with_game(GameInfo::new("rps", 2, 8))
                .with_game(GameInfo::new("rpsls", 2, 8));
            for account in &args.accounts {
                let Some((name, hash)) = account.split_once(':') else {
                    return Err(format!("account must be NAME:HASH, got {account:?}").into());
                };
                catalog = catalog.with_account(name, hash);
            }
            run(&args, config, catalog).await
        }
    }
}

async fn run<C: Catalog>(
    args: &Args,
    config: LobbyConfig,
    catalog: C,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = LobbyServerBuilder::new().bind(&args.bind).config(config);
    if let Some(program) = &args.game_binary {
        let launcher = CommandLauncher::new(program);
        tracing::info!(program = %launcher.program().display(), "starting game servers as processes");
        builder = builder.launcher(Arc::new(launcher));
    }

    let server = builder.build(catalog).await?;
    tracing::info!("Lobby listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
