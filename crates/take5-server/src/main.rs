//! Take 5 server binary: configuration, logging and graceful shutdown.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use take5::prelude::*;
use tracing_subscriber::EnvFilter;

/// Take 5 ("6 nimmt!") multiplayer room server
#[derive(Parser, Debug)]
#[command(name = "take5-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "TAKE5_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// SQLite database file
    #[arg(long, env = "TAKE5_DB", default_value = "take5.db")]
    db: PathBuf,

    /// Use a throwaway in-memory database instead of `--db`
    #[arg(long)]
    memory: bool,

    /// Delay before "Game over!" is announced, in milliseconds
    #[arg(long, env = "TAKE5_REVEAL_MS", default_value_t = 2000)]
    reveal_ms: u64,

    /// Delay before the score summary, in milliseconds
    #[arg(long, env = "TAKE5_RESULTS_MS", default_value_t = 2000)]
    results_ms: u64,

    /// Seconds counted down before the next game starts
    #[arg(long, env = "TAKE5_COUNTDOWN", default_value_t = 5)]
    countdown: u32,
}

impl Args {
    fn pacing(&self) -> PacingConfig {
        PacingConfig {
            reveal_delay: Duration::from_millis(self.reveal_ms),
            results_delay: Duration::from_millis(self.results_ms),
            countdown: self.countdown,
            ..PacingConfig::default()
        }
    }

    fn open_store(&self) -> Result<Arc<dyn Store>, Take5Error> {
        if self.memory {
            tracing::warn!("using an in-memory database, rooms will not survive a restart");
            Ok(Arc::new(SqliteStore::open_in_memory()?))
        } else {
            Ok(Arc::new(SqliteStore::open(&self.db)?))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Take5Error> {
    let store = args.open_store()?;
    let server = Take5Server::builder()
        .bind(&args.bind)
        .game_config(GameConfig::default())
        .pacing(args.pacing())
        .build(store)
        .await?;

    let restored = server.restore_rooms().await?;
    tracing::info!(restored, "ready");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
