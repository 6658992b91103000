mod app;
mod commands;
mod config;
mod curriculum;
mod error;
mod identity;
mod model;
mod quiz;
mod session;
mod store;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "vocab-sync")]
#[command(about = "Vocabulary quizzes and grades with background record sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vocab-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Keep the guard alive so buffered log lines are written on exit
  let _log_guard = init_logging()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Initialize and run the app
  let mut app = app::App::new(config).await?;
  app.run(args.command).await?;

  Ok(())
}

/// Log to a file in the data directory; `RUST_LOG` overrides the level.
fn init_logging() -> Result<WorkerGuard> {
  let log_dir = config::Config::data_dir()?;
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::never(&log_dir, "vocab-sync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vocab_sync=info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
