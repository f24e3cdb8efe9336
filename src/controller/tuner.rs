//! SPSA parameter tuner, Fishtest style.
//!
//! Every iteration draws a random ±1 direction Δ, plays θ+ = θ + c·Δ directly
//! against θ- = θ - c·Δ, and moves the parameters by
//!
//!   θ += r · (score - 0.5) · 2 · Δ
//!
//! so a θ+ win pulls towards θ+, a θ- win towards θ-, and an even match leaves
//! θ where it is. `c` and `r` are per parameter (see [`crate::engine::params`]).
//!
//! See <https://www.chessprogramming.org/SPSA>.

use super::match_runner::{Interrupted, MatchPlayer, MatchResult};
use super::state::{HistoryEntry, StateError, StateStore, TunerState};
use crate::engine::{CandidateSet, ParameterTable};
use crate::game::OpeningBook;
use fxhash::FxHashSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum_macros::Display;

/// θ+ must score above this for it to become the best set.
const BEST_PLUS_THRESHOLD: f64 = 0.53;
/// θ- becomes the best set when θ+ scores below this.
const BEST_MINUS_THRESHOLD: f64 = 0.47;
/// Parameter moves smaller than this are not worth a log line.
const REPORTED_STEP: f64 = 0.01;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct TuneConfig {
    /// Games per match; half as many openings are drawn, each played twice.
    pub games_per_iteration: u32,
    /// Total number of completed iterations after which tuning stops.
    pub iterations: u32,
    /// State is saved every this many completed iterations.
    pub save_interval: u32,
    pub seed: Option<u64>,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            games_per_iteration: 128,
            iterations: 300,
            save_interval: 5,
            seed: None,
        }
    }
}

/// Which parameters are perturbed; the rest stay fixed at their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TuneSubset {
    #[default]
    All,
    Only(FxHashSet<String>),
}

impl TuneSubset {
    /// An empty list means every parameter.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: FxHashSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            TuneSubset::All
        } else {
            TuneSubset::Only(names)
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        match self {
            TuneSubset::All => true,
            TuneSubset::Only(names) => names.contains(name),
        }
    }
}

// ============================================================================
// Parameter vector
// ============================================================================

/// Per-iteration perturbation signs, aligned with the parameter table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Direction(Vec<i8>);

impl Direction {
    /// Uniform ±1 for tuned parameters, 0 for fixed ones.
    pub fn generate<R: Rng + ?Sized>(table: &ParameterTable, subset: &TuneSubset, rng: &mut R) -> Self {
        Self(
            table
                .specs()
                .iter()
                .map(|spec| match subset.contains(&spec.name) {
                    true if rng.random_bool(0.5) => 1,
                    true => -1,
                    false => 0,
                })
                .collect(),
        )
    }

    pub fn from_signs(signs: Vec<i8>) -> Self {
        Self(signs.into_iter().map(i8::signum).collect())
    }

    pub fn get(&self, index: usize) -> i8 {
        self.0.get(index).copied().unwrap_or(0)
    }

    pub fn signs(&self) -> &[i8] {
        &self.0
    }
}

/// One parameter's move during an update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterStep {
    pub index: usize,
    pub old: f64,
    pub new: f64,
    /// Requested change, before clamping.
    pub delta: f64,
}

/// The tuner's floating-point parameter values, aligned with the table and
/// always within each parameter's bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterVector {
    values: Vec<f64>,
}

impl ParameterVector {
    pub fn defaults(table: &ParameterTable) -> Self {
        Self {
            values: table.specs().iter().map(|spec| spec.default as f64).collect(),
        }
    }

    /// Missing or non-finite entries fall back to the default; names not in
    /// the table are dropped.
    pub fn from_snapshot(table: &ParameterTable, snapshot: &BTreeMap<String, f64>) -> Self {
        for name in snapshot.keys().filter(|name| !table.contains(name)) {
            log::warn!("Ignoring saved value of unknown parameter {}", name);
        }

        Self {
            values: table
                .specs()
                .iter()
                .map(|spec| match snapshot.get(&spec.name) {
                    Some(&value) if value.is_finite() => spec.clamp_f64(value),
                    _ => spec.default as f64,
                })
                .collect(),
        }
    }

    pub fn to_snapshot(&self, table: &ParameterTable) -> BTreeMap<String, f64> {
        table
            .names()
            .zip(&self.values)
            .map(|(name, &value)| (name.to_string(), value))
            .collect()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Integer values as sent to an engine.
    pub fn rounded(&self, table: &ParameterTable) -> CandidateSet {
        table
            .specs()
            .iter()
            .zip(&self.values)
            .map(|(spec, &value)| (spec.name.clone(), spec.clamp(value.round() as i64)))
            .collect()
    }

    /// (θ+, θ-): the rounded current values shifted by ±c in the given direction.
    pub fn build_candidates(&self, table: &ParameterTable, direction: &Direction) -> (CandidateSet, CandidateSet) {
        let mut plus = CandidateSet::new();
        let mut minus = CandidateSet::new();

        for (index, (spec, &value)) in table.specs().iter().zip(&self.values).enumerate() {
            let base = value.round() as i64;
            let shift = spec.c * direction.get(index) as i64;
            plus.insert(&spec.name, spec.clamp(base + shift));
            minus.insert(&spec.name, spec.clamp(base - shift));
        }

        (plus, minus)
    }

    /// Applies θ += r·(score - 0.5)·2·Δ, returning the moves of the tuned parameters.
    pub fn update(&mut self, table: &ParameterTable, score: f64, direction: &Direction) -> Vec<ParameterStep> {
        let gradient = (score - 0.5) * 2.0;

        table
            .specs()
            .iter()
            .enumerate()
            .filter(|&(index, _)| direction.get(index) != 0)
            .map(|(index, spec)| {
                let delta = spec.r * gradient * direction.get(index) as f64;
                let old = self.values[index];
                let new = spec.clamp_f64(old + delta);
                self.values[index] = new;
                ParameterStep {
                    index,
                    old,
                    new,
                    delta,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BestSide {
    #[strum(serialize = "θ+")]
    Plus,
    #[strum(serialize = "θ-")]
    Minus,
}

/// Replaces `best` with the clear winner of the match, if there is one.
pub fn record_best(
    best: &mut CandidateSet,
    plus: &CandidateSet,
    minus: &CandidateSet,
    score: f64,
) -> Option<BestSide> {
    if score > BEST_PLUS_THRESHOLD {
        *best = plus.clone();
        Some(BestSide::Plus)
    } else if score < BEST_MINUS_THRESHOLD {
        *best = minus.clone();
        Some(BestSide::Minus)
    } else {
        None
    }
}

/// Logistic rating difference implied by a score; undefined for 0 and 1.
pub fn elo_difference(score: f64) -> Option<f64> {
    (score > 0.0 && score < 1.0).then(|| -400.0 * (1.0 / score - 1.0).log10())
}

// ============================================================================
// Tuner
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TunerPhase {
    Idle,
    PerturbGenerated,
    MatchInProgress,
    Updated,
    Saved,
}

#[derive(Debug)]
pub enum TuneError {
    UnknownParameter(String),
    State(StateError),
}

impl From<StateError> for TuneError {
    fn from(error: StateError) -> Self {
        TuneError::State(error)
    }
}

impl fmt::Display for TuneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuneError::UnknownParameter(name) => write!(f, "unknown parameter '{}'", name),
            TuneError::State(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for TuneError {}

#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    Completed(HistoryEntry),
    /// The match was cut short; nothing was updated.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Interrupted,
}

pub struct Tuner<M> {
    table: ParameterTable,
    subset: TuneSubset,
    config: TuneConfig,
    player: M,
    book: OpeningBook,
    store: StateStore,
    shutdown: Arc<AtomicBool>,
    rng: StdRng,

    values: ParameterVector,
    best: CandidateSet,
    iteration: u32,
    history: Vec<HistoryEntry>,
    phase: TunerPhase,
}

impl<M: MatchPlayer> Tuner<M> {
    /// Resumes from the state in `store` if there is one.
    pub fn new(
        table: ParameterTable,
        subset: TuneSubset,
        config: TuneConfig,
        player: M,
        book: OpeningBook,
        store: StateStore,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, TuneError> {
        if let TuneSubset::Only(names) = &subset {
            if let Some(name) = names.iter().find(|name| !table.contains(name)) {
                return Err(TuneError::UnknownParameter(name.clone()));
            }
        }

        let (values, best, iteration) = match store.load_state()? {
            Some(state) => {
                log::info!("Resumed from iteration {}", state.iteration);
                let values = ParameterVector::from_snapshot(&table, &state.params);
                let best = match state.best_params.is_empty() {
                    true => values.rounded(&table),
                    false => state.best_params,
                };
                (values, best, state.iteration)
            }
            None => {
                let values = ParameterVector::defaults(&table);
                let best = values.rounded(&table);
                (values, best, 0)
            }
        };
        let history = store.load_history()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        Ok(Self {
            table,
            subset,
            config,
            player,
            book,
            store,
            shutdown,
            rng,
            values,
            best,
            iteration,
            history,
            phase: TunerPhase::Idle,
        })
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn values(&self) -> &ParameterVector {
        &self.values
    }

    pub fn best(&self) -> &CandidateSet {
        &self.best
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn phase(&self) -> TunerPhase {
        self.phase
    }

    /// Runs iterations until the configured count is reached or a shutdown is
    /// requested, then saves the state and the best parameters.
    pub fn run(&mut self) -> Result<RunOutcome, TuneError> {
        let mut outcome = RunOutcome::Finished;

        while self.iteration < self.config.iterations {
            if self.shutdown.load(Ordering::Relaxed) {
                outcome = RunOutcome::Interrupted;
                break;
            }
            if self.run_iteration()? == IterationOutcome::Interrupted {
                outcome = RunOutcome::Interrupted;
                break;
            }
        }

        self.save()?;
        let best_path = self.store.save_best(&self.best)?;
        self.log_best();
        log::info!("Saved to {}", best_path.display());

        Ok(outcome)
    }

    pub fn run_iteration(&mut self) -> Result<IterationOutcome, TuneError> {
        self.phase = TunerPhase::Idle;
        let iteration = self.iteration + 1;
        log::info!("Iteration {}/{}", iteration, self.config.iterations);

        let direction = Direction::generate(&self.table, &self.subset, &mut self.rng);
        let (plus, minus) = self.values.build_candidates(&self.table, &direction);
        self.phase = TunerPhase::PerturbGenerated;
        self.log_candidates(&plus, &minus);

        let openings = self
            .book
            .get_openings((self.config.games_per_iteration / 2) as usize, &mut self.rng);

        self.phase = TunerPhase::MatchInProgress;
        log::info!("Playing {} games (θ+ vs θ-)...", openings.len() * 2);
        let result = match self.player.play_match(&plus, &minus, &openings) {
            Ok(result) => result,
            Err(Interrupted) => {
                log::info!("Iteration {} interrupted, discarding it", iteration);
                self.phase = TunerPhase::Idle;
                return Ok(IterationOutcome::Interrupted);
            }
        };
        let score = result.score();
        log_result(&result);

        let steps = self.values.update(&self.table, score, &direction);
        log::info!("Updating parameters (gradient: {:+.3}):", (score - 0.5) * 2.0);
        for step in steps.iter().filter(|step| step.delta.abs() > REPORTED_STEP) {
            log::info!(
                "  {}: {:.2} -> {:.2} ({:+.2})",
                self.table.specs()[step.index].name,
                step.old,
                step.new,
                step.delta
            );
        }

        let elo = elo_difference(score);
        let entry = HistoryEntry {
            iteration,
            score,
            elo_diff: elo.map(|elo| (elo * 10.0).round() / 10.0).unwrap_or(0.0),
            params: self.values.rounded(&self.table),
        };
        self.history.push(entry.clone());
        self.iteration = iteration;

        match record_best(&mut self.best, &plus, &minus, score) {
            Some(BestSide::Plus) => log::info!("*** New best: θ+ won with {:.1}% ***", score * 100.0),
            Some(BestSide::Minus) => log::info!("*** New best: θ- won with {:.1}% ***", (1.0 - score) * 100.0),
            None => {}
        }
        self.phase = TunerPhase::Updated;

        self.log_values();
        match elo {
            Some(elo) => log::info!("θ+ vs θ- Elo: {:+.1}", elo),
            None => log::info!("θ+ vs θ- Elo: N/A"),
        }

        if self.config.save_interval > 0 && self.iteration % self.config.save_interval == 0 {
            self.save()?;
        }

        Ok(IterationOutcome::Completed(entry))
    }

    pub fn save(&mut self) -> Result<(), TuneError> {
        let state = TunerState {
            params: self.values.to_snapshot(&self.table),
            best_params: self.best.clone(),
            iteration: self.iteration,
        };
        self.store.save(&state, &self.history)?;
        self.phase = TunerPhase::Saved;

        log::info!("State saved (iteration {})", self.iteration);
        Ok(())
    }

    fn log_candidates(&self, plus: &CandidateSet, minus: &CandidateSet) {
        log::info!("Testing θ+ vs θ-:");
        for (spec, &value) in self.table.specs().iter().zip(self.values.values()) {
            log::info!(
                "  {}: {} vs {}  (current: {})",
                spec.name,
                minus.get(&spec.name).unwrap_or(spec.default),
                plus.get(&spec.name).unwrap_or(spec.default),
                value.round() as i64
            );
        }
    }

    fn log_values(&self) {
        log::info!("Current parameters:");
        let rounded = self.values.rounded(&self.table);
        for (spec, &value) in self.table.specs().iter().zip(self.values.values()) {
            let current = rounded.get(&spec.name).unwrap_or(spec.default);
            log::info!(
                "  {}: {} (float: {:.2}, {:+} from default)",
                spec.name,
                current,
                value,
                current - spec.default
            );
        }
    }

    fn log_best(&self) {
        log::info!("Best parameters:");
        for spec in self.table.specs() {
            let value = self.best.get(&spec.name).unwrap_or(spec.default);
            log::info!("  {}: {} ({:+})", spec.name, value, value - spec.default);
        }
    }
}

fn log_result(result: &MatchResult) {
    log::info!("Result: {} | θ+ score: {:.3}", result, result.score());
    if result.failed > 0 {
        log::warn!("{} games failed and were scored as draws", result.failed);
    }
}
