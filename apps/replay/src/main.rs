//! playsense-replay: run a recorded playback event script through the
//! session, stall and background-playback trackers.
//!
//! Every telemetry record is printed to stdout as one JSON line; logs go to
//! stderr.

mod driver;
mod output;
mod script;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::driver::Replay;
use crate::output::JsonLinesSink;
use crate::script::{load_script, ReplayConfig};

#[derive(Parser)]
#[command(name = "playsense-replay")]
#[command(about = "Replay a playback event script through the playsense trackers")]
#[command(version)]
struct Cli {
    /// JSON-lines event script
    #[arg(value_name = "SCRIPT")]
    script: PathBuf,

    /// JSON file with `stall`, `guard` and `player` settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging for every crate
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info,playsense=debug" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => ReplayConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReplayConfig::default(),
    };
    let steps = load_script(&cli.script)
        .with_context(|| format!("loading script {}", cli.script.display()))?;

    tracing::info!(script = %cli.script.display(), ?config, "starting replay");

    let sink = Arc::new(JsonLinesSink::new(std::io::stdout()));
    let mut replay = Replay::new(config, sink);
    replay.run(steps).await;
    tracing::debug!(
        stage = %replay.session().stage(),
        player_paused = replay.player().is_paused(),
        ad_attached = replay.ad().is_some(),
        "script exhausted"
    );
    replay.finish();
    Ok(())
}
