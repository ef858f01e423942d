//! Fetch NBA game logs, engineer features, train the classifiers, report
//! held-out metrics and predict one user-chosen matchup.
use std::fs;
use std::io::{stdin, stdout};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod encoder;
mod error;
mod io;
mod metrics;
mod model;
mod plot;
mod predict;
mod preprocess;
mod prompt;
mod teams;
#[cfg(test)]
mod testutil;

use config::Config;
use encoder::LabelEncoder;
use error::{Error, Result};
use io::{fetch_all_games, load_games_csv, save_games_csv, validate_closed_world, GameRow, StatsClient};
use metrics::{evaluate, Evaluation};
use model::{encode_rows, fit_encoder, ranked_importances, to_matrix, train_models, train_test_split, Classifier, TrainParams};
use predict::{predict, PredictionRequest, PredictionResult};
use preprocess::{build_features, EngineeredRow};
use prompt::{parse_yes_no, prompt_home, prompt_team};
use teams::TeamRegistry;

/// Fitted state for one run: the shared encoder, every model, and its test-split scores.
pub struct Trained {
    pub encoder: LabelEncoder,
    pub models: Vec<Box<dyn Classifier>>,
    pub evaluations: Vec<Evaluation>,
}

/// Encode the table, split it, fit every model on the training side and score it on the rest.
/// input: the engineered table, the held-out share, and the model settings
/// output: the fitted encoder, every model, and one `Evaluation` per model
/// logic: fit the encoder over both id columns; encode every row; seeded split;
/// build train and test matrices; fit each model on train; score each on test
pub fn train_and_evaluate(table: &[EngineeredRow], test_fraction: f64, params: &TrainParams) -> Result<Trained> {
    let encoder = fit_encoder(table);
    if encoder.is_empty() {
        return Err(Error::EmptyDataset);
    }
    info!("Encoded {} distinct teams", encoder.len());
    let encoded = encode_rows(table, &encoder)?;
    let (train, test) = train_test_split(&encoded, test_fraction, params.seed)?;
    info!("Split {} rows into {} train / {} test", encoded.len(), train.len(), test.len());

    let (x_train, y_train) = to_matrix(&train);
    let (x_test, y_test) = to_matrix(&test);
    let models = train_models(&x_train, &y_train, params)?;
    let evaluations = models
        .iter()
        .map(|m| evaluate(m.as_ref(), &x_test, &y_test))
        .collect::<Result<Vec<_>>>()?;

    Ok(Trained { encoder, models, evaluations })
}

/// Game rows from the CSV cache when one is given, otherwise from the stats provider.
/// Fails on any team id outside the registry, and writes the cache when asked.
fn load_games(config: &Config, registry: &TeamRegistry) -> anyhow::Result<Vec<GameRow>> {
    let games = match &config.games_csv {
        Some(path) => {
            info!("Loading game rows from {}", path.display());
            load_games_csv(path).with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            let client = StatsClient::new(&config.stats_url, Duration::from_secs(config.request_timeout_secs))?;
            fetch_all_games(&client, registry.all_teams(), config.max_attempts)?
        }
    };
    validate_closed_world(&games, registry)?;

    if let Some(path) = &config.save_games {
        save_games_csv(path, &games).with_context(|| format!("writing {}", path.display()))?;
        info!("Saved {} game rows to {}", games.len(), path.display());
    }
    Ok(games)
}

/// Take the matchup from the command line where it is valid, prompting for the rest.
fn resolve_request(config: &Config, registry: &TeamRegistry) -> anyhow::Result<PredictionRequest> {
    let stdin = stdin();
    let mut input = stdin.lock();
    let mut output = stdout();

    let mut team_arg = |arg: &Option<String>, question: &str| -> anyhow::Result<String> {
        if let Some(code) = arg.as_ref().map(|c| c.trim().to_uppercase()) {
            if registry.lookup_abbreviation(&code).is_some() {
                return Ok(code);
            }
            warn!("Ignoring unknown team '{}'", code);
        }
        Ok(prompt_team(&mut input, &mut output, registry, question)?)
    };
    let team = team_arg(&config.team, "Enter the team abbreviation (e.g., BOS): ")?;
    let opponent = team_arg(&config.opponent, "Enter the opponent abbreviation (e.g., LAL): ")?;

    let is_home = match config.home.as_deref().and_then(parse_yes_no) {
        Some(home) => home,
        None => prompt_home(&mut input, &mut output, &format!("Is {} playing at home? (yes/no): ", team))?,
    };
    Ok(PredictionRequest { team, opponent, is_home })
}

/// Write the five charts under `--plot-dir`
/// input: importance ranking, fitted state, the matchup and its per-model predictions
/// output: none (PNG files: feature_importance, confusion_<model>, roc,
/// probability_distribution, head_to_head)
/// logic: create the directory, then draw each chart in turn
fn render_plots(
    config: &Config,
    ranked: &[(String, f64)],
    trained: &Trained,
    request: &PredictionRequest,
    results: &[PredictionResult],
) -> Result<()> {
    let dir = &config.plot_dir;
    fs::create_dir_all(dir)?;
    plot::plot_feature_importance(&dir.join("feature_importance.png"), ranked)?;
    for eval in &trained.evaluations {
        plot::plot_confusion_matrix(&dir.join(format!("confusion_{}.png", eval.model)), eval)?;
    }
    plot::plot_roc(&dir.join("roc.png"), &trained.evaluations)?;
    plot::plot_probability_distribution(&dir.join("probability_distribution.png"), &trained.evaluations)?;
    plot::plot_head_to_head(&dir.join("head_to_head.png"), &request.team, &request.opponent, results)?;
    Ok(())
}

/// fetch, engineer, train, evaluate, predict, and chart
/// input: command-line flags and environment (see `Config`), stdin for missing answers
/// output: classification reports, importance table and per-model predictions on stdout
/// logic: init tracing; validate config; load games; build features; call
/// "train_and_evaluate"; print reports and importances; resolve the matchup;
/// call "predict" per model; call "render_plots" unless disabled
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    config.validate()?;
    let registry = TeamRegistry::nba();

    // 1) Game logs and features
    let games = load_games(&config, &registry)?;
    info!("Loaded {} game rows", games.len());
    let table = build_features(&games, &registry, config.average_mode);

    // 2) Train and evaluate
    let params = TrainParams {
        n_trees: config.n_trees,
        max_depth: config.max_depth,
        k: config.k,
        seed: config.seed,
    };
    let trained = train_and_evaluate(&table, config.test_fraction, &params)?;
    for eval in &trained.evaluations {
        println!("{}", eval);
    }

    let ranked = trained
        .models
        .iter()
        .find_map(|m| m.feature_importances())
        .map(ranked_importances)
        .unwrap_or_default();
    println!("Feature importances:");
    for (name, imp) in &ranked {
        println!("{:<30} {:>8.4}", name, imp);
    }

    // 3) Predict the requested matchup with every model
    let request = resolve_request(&config, &registry)?;
    let mut results = Vec::with_capacity(trained.models.len());
    for model in &trained.models {
        let r = predict(model.as_ref(), &request, &registry, &table, &trained.encoder)
            .with_context(|| format!("predicting {} v {}", request.team, request.opponent))?;
        let winner_code = if r.label == 1 { &request.team } else { &request.opponent };
        let winner = registry
            .lookup_abbreviation(winner_code)
            .and_then(|id| registry.lookup_id(id))
            .map(|t| format!("{} ({})", t.full_name, t.abbreviation))
            .unwrap_or_else(|| winner_code.clone());
        println!(
            "\n[{}] Predicted winner: {}\n  {} win probability: {:.2}%\n  {} win probability: {:.2}%",
            r.model,
            winner,
            request.team,
            r.team_win_probability * 100.0,
            request.opponent,
            r.opponent_win_probability * 100.0
        );
        results.push(r);
    }

    // 4) Charts
    if !config.no_plots {
        render_plots(&config, &ranked, &trained, &request, &results)?;
        println!("\nWrote charts to {}", config.plot_dir.display());
    }

    Ok(())
}
