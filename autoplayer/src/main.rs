//! `autoplayer` - let a decision maker play an interactive fiction game.
//!
//! ```text
//! autoplayer games/zork1.z5 80 --verbose
//! autoplayer games/zork1.z5 --backend script --script walkthrough.txt --fresh
//! ```

use anyhow::{Context, Result};
use autoplayer::{build_decider, init_tracing, level_for, Backend, Orchestrator, PlayerConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "autoplayer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Autonomous interactive fiction player", long_about = None)]
struct Cli {
    /// Story file to play (e.g. zork1.z5)
    game: PathBuf,

    /// Maximum number of turns (default: 50)
    turns: Option<u32>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,

    /// Do not save the game during or after the run
    #[arg(long)]
    no_autosave: bool,

    /// Save file (default: <game dir>/saves/<game>_autosave.qzl)
    #[arg(long)]
    save_file: Option<PathBuf>,

    /// Start a new game even if a save file exists
    #[arg(long)]
    fresh: bool,

    /// TOML configuration file
    #[arg(short, long, env = "AUTOPLAYER_CONFIG")]
    config: Option<PathBuf>,

    /// Decision backend
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Model name for the anthropic backend
    #[arg(long)]
    model: Option<String>,

    /// Command file for the script backend
    #[arg(long)]
    script: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut PlayerConfig) {
        if let Some(turns) = self.turns {
            config.max_turns = turns;
        }
        if self.no_autosave {
            config.autosave = false;
        }
        if self.fresh {
            config.restore = false;
        }
        if let Some(save_file) = self.save_file {
            config.save_file = Some(save_file);
        }
        if let Some(backend) = self.backend {
            config.decision.backend = backend;
        }
        if let Some(model) = self.model {
            config.decision.model = model;
        }
        if let Some(script) = self.script {
            config.decision.script = Some(script);
            if self.backend.is_none() {
                config.decision.backend = Backend::Script;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, level_for(cli.verbose));

    let mut config = PlayerConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let game = cli.game.clone();
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let decider = build_decider(&config.decision)
        .await
        .context("Failed to set up the decision backend")?;

    info!(
        game = %game.display(),
        max_turns = config.max_turns,
        backend = decider.name(),
        autosave = config.autosave,
        "starting"
    );

    let orchestrator = Orchestrator::new(config, decider).context("Invalid configuration")?;
    orchestrator.listen_for_interrupt();

    match orchestrator.run(&game).await {
        Ok(summary) => {
            println!("{summary}");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "run failed");
            Err(e).context(format!("Playing {} failed", game.display()))
        }
    }
}
