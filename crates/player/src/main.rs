//! Media player demo - drives a page of players through a scripted session.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use player::{PlayerConfig, PlayerPage};
use player_media::SyncConfig;

/// Media player demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of players on the page
    #[arg(long)]
    players: Option<usize>,

    /// Viewport width
    #[arg(long)]
    width: Option<u32>,

    /// Viewport height
    #[arg(long)]
    height: Option<u32>,

    /// Use the mobile preset
    #[arg(long)]
    mobile: bool,

    /// Disable cross-instance synchronization
    #[arg(long)]
    no_sync: bool,

    /// Player query to track (repeatable)
    #[arg(short, long = "query")]
    queries: Vec<String>,

    /// Media duration in seconds
    #[arg(long, default_value = "120.0")]
    duration: f64,

    /// Print the final player states as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Resolve the configuration: file or preset first, then flags.
    fn config(&self) -> Result<PlayerConfig> {
        let mut config = match &self.config {
            Some(path) => PlayerConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None if self.mobile => PlayerConfig::mobile(),
            None => PlayerConfig::default(),
        };

        if let Some(players) = self.players {
            config.players = players;
        }
        if let Some(width) = self.width {
            config.viewport_width = width;
        }
        if let Some(height) = self.height {
            config.viewport_height = height;
        }
        if self.no_sync {
            config.sync = SyncConfig::default();
        }
        config.queries.extend(self.queries.iter().cloned());

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Media player v{}", player::VERSION);

    let config = args.config()?;
    let mut page = PlayerPage::new(config)?;

    // Controls fire before any engine is ready; the requests wait.
    let first = page.player(0).context("page has no players")?;
    first.remote().seek(12.0, None);
    first.remote().change_volume(0.6, None);
    first.click();
    info!(pending = ?first.controller().queue().pending_keys(), "requests queued");

    page.load_all(args.duration);
    page.tick(3.0);

    // Starting another player pauses the first when single playback is on.
    if let Some(second) = page.player(1) {
        second.click();
        second.remote().change_volume(0.25, None);
        page.settle();
    }
    page.tick(1.5);

    // Rotate the device.
    let (width, height) = (page.config().viewport_width, page.config().viewport_height);
    page.set_viewport(height, width);

    for player in page.players() {
        let state = player.state();
        info!(
            player = player.index(),
            paused = state.paused,
            time = state.current_time,
            volume = state.volume,
            "player state"
        );
        for (query, matches) in player.query_results() {
            info!(player = player.index(), %query, matches, "player query");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page.snapshot())?);
    }

    info!("Media player shutdown complete");
    Ok(())
}
