use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};
use crate::preprocess::AverageMode;
use crate::prompt::parse_yes_no;

/// Predict the winner of an NBA matchup from historical game logs
#[derive(Parser, Debug, Clone)]
#[command(name = "hoops_predict", version, about)]
pub struct Config {
    /// Load game rows from this CSV instead of fetching them
    #[arg(long, env = "GAMES_CSV")]
    pub games_csv: Option<PathBuf>,

    /// Write the fetched game rows to this CSV
    #[arg(long, env = "SAVE_GAMES")]
    pub save_games: Option<PathBuf>,

    /// Stats provider base URL
    #[arg(long, env = "STATS_URL", default_value = "https://stats.nba.com/stats")]
    pub stats_url: String,

    /// Per-request timeout (seconds)
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Attempts per team before the fetch is abandoned
    #[arg(long, env = "MAX_ATTEMPTS", default_value = "3")]
    pub max_attempts: u32,

    /// Share of rows held out for evaluation
    #[arg(long, env = "TEST_FRACTION", default_value = "0.2")]
    pub test_fraction: f64,

    /// Seed for the split and the forest's bootstrap samples
    #[arg(long, env = "SEED", default_value = "42")]
    pub seed: u64,

    /// Trees in the forest
    #[arg(long, env = "N_TREES", default_value = "100")]
    pub n_trees: usize,

    /// Maximum tree depth (unbounded when omitted)
    #[arg(long, env = "MAX_DEPTH")]
    pub max_depth: Option<usize>,

    /// Neighbours consulted by the knn model
    #[arg(long, env = "KNN_K", default_value = "5")]
    pub k: usize,

    /// How the scoring-average feature is computed
    #[arg(long, env = "AVERAGE_MODE", value_enum, default_value_t = AverageMode::Season)]
    pub average_mode: AverageMode,

    /// Team abbreviation (prompted for when omitted)
    #[arg(long)]
    pub team: Option<String>,

    /// Opponent abbreviation (prompted for when omitted)
    #[arg(long)]
    pub opponent: Option<String>,

    /// Whether the team plays at home: yes/no (prompted for when omitted)
    #[arg(long)]
    pub home: Option<String>,

    /// Directory the PNG charts are written to
    #[arg(long, env = "PLOT_DIR", default_value = "plots")]
    pub plot_dir: PathBuf,

    /// Skip chart rendering
    #[arg(long)]
    pub no_plots: bool,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "test fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.n_trees == 0 {
            return Err(Error::InvalidConfig("n-trees must be at least 1".into()));
        }
        if self.k == 0 {
            return Err(Error::InvalidConfig("k must be at least 1".into()));
        }
        if self.max_depth == Some(0) {
            return Err(Error::InvalidConfig("max-depth must be at least 1".into()));
        }
        if let Some(home) = &self.home {
            if parse_yes_no(home).is_none() {
                return Err(Error::InvalidConfig(format!("--home expects yes or no, got '{}'", home)));
            }
        }
        Ok(())
    }
}
