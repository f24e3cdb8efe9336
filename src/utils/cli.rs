use crate::controller::TuneConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// SPSA tuning of a UCI engine's search parameters, Fishtest style: each
/// iteration plays θ+ directly against θ- and nudges the parameters towards
/// the winner.
#[derive(Parser, Debug, Clone)]
#[command(name = "spsa-tune", version = VERSION)]
pub struct Cli {
    /// Parameters to tune (all of them if none are given); the rest stay fixed
    pub params: Vec<String>,

    /// Path to the UCI engine binary
    #[arg(long, default_value = "../build/sleepmind")]
    pub engine: PathBuf,

    /// PGN file with opening lines
    #[arg(long, default_value = "openings.pgn")]
    pub book: PathBuf,

    /// Games per iteration (each opening is played twice with colors swapped)
    #[arg(long, default_value_t = 128)]
    pub games: u32,

    /// Time per move in milliseconds
    #[arg(long, default_value_t = 200)]
    pub move_time: u64,

    /// Number of completed iterations after which tuning stops
    #[arg(long, default_value_t = 300)]
    pub iterations: u32,

    /// Save state every N iterations
    #[arg(long, default_value_t = 5)]
    pub save_interval: u32,

    /// Maximum number of games played in parallel
    #[arg(long, default_value_t = 32)]
    pub concurrency: usize,

    /// Opening lines are cut to at most this many plies
    #[arg(long, default_value_t = 8)]
    pub max_opening_plies: usize,

    /// Directory for spsa_state.json, spsa_history.json and best_params.json
    #[arg(long, default_value = ".")]
    pub state_dir: PathBuf,

    /// TOML file replacing the built-in parameter table
    #[arg(long = "params")]
    pub params_file: Option<PathBuf>,

    /// Seed for directions and opening selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Extra time in milliseconds an engine gets past the move time before it
    /// is considered hung
    #[arg(long, default_value_t = 2000)]
    pub move_timeout_margin: u64,
}

impl Cli {
    pub fn tune_config(&self) -> TuneConfig {
        TuneConfig {
            games_per_iteration: self.games,
            iterations: self.iterations,
            save_interval: self.save_interval,
            seed: self.seed,
        }
    }

    pub fn move_time(&self) -> Duration {
        Duration::from_millis(self.move_time)
    }

    pub fn move_timeout_margin(&self) -> Duration {
        Duration::from_millis(self.move_timeout_margin)
    }
}
