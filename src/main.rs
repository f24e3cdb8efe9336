use clap::Parser;
use spsa_tune::controller::{MatchRunner, RunOutcome, StateStore, TuneSubset, Tuner};
use spsa_tune::engine::{ParameterTable, UciLauncher};
use spsa_tune::game::{GameExecutor, OpeningBook};
use spsa_tune::utils::Cli;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let table = match &cli.params_file {
        Some(path) => ParameterTable::from_toml_file(path)
            .map_err(|e| format!("Failed to load {}: {}", path.display(), e))?,
        None => ParameterTable::default(),
    };

    if let Some(unknown) = cli.params.iter().find(|name| !table.contains(name)) {
        return Err(format!(
            "Unknown parameter '{}'\nAvailable parameters: {}",
            unknown,
            table.names().collect::<Vec<_>>().join(", ")
        ));
    }

    log::info!("SPSA tuning {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));
    if cli.params.is_empty() {
        log::info!("Tuning all parameters.");
    } else {
        log::info!("Tuning only: {}", cli.params.join(", "));
        log::info!("Other parameters fixed at their current values.");
    }
    log::info!("Games per iteration: {}", cli.games);
    log::info!("Time per move: {}ms", cli.move_time);
    log::info!("Max parallel games: {}", cli.concurrency);

    if !cli.engine.exists() {
        return Err(format!("Engine not found at {}", cli.engine.display()));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("Interrupted, finishing games in progress...");
        flag.store(true, Ordering::Relaxed);
    }) {
        log::warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let launcher = UciLauncher::new(&cli.engine, cli.move_timeout_margin());
    let executor = GameExecutor::new(launcher, cli.move_time());
    let runner = MatchRunner::new(executor, cli.concurrency, shutdown.clone())
        .map_err(|e| format!("Failed to start worker pool: {}", e))?;
    let book = OpeningBook::load(&cli.book).with_max_plies(cli.max_opening_plies);

    let mut tuner = Tuner::new(
        table,
        TuneSubset::from_names(cli.params.iter().cloned()),
        cli.tune_config(),
        runner,
        book,
        StateStore::new(&cli.state_dir),
        shutdown,
    )
    .map_err(|e| e.to_string())?;

    match tuner.run().map_err(|e| e.to_string())? {
        RunOutcome::Finished => log::info!("Finished after {} iterations.", tuner.iteration()),
        RunOutcome::Interrupted => log::info!("Interrupted after {} iterations.", tuner.iteration()),
    }

    Ok(())
}
