//! Head-to-head matches between two parameter sets.
//!
//! Every opening is played twice with colors swapped, on a bounded pool of
//! worker threads. Results are tallied in completion order.

use crate::engine::CandidateSet;
use crate::game::{GameError, GameOutcome, GamePlayer, Opening};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

/// Win/draw/loss counts from side A's perspective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub wins_a: u32,
    pub wins_b: u32,
    pub draws: u32,
    /// Games that produced no result; already included in `draws`.
    pub failed: u32,
}

impl MatchResult {
    pub fn total_games(&self) -> u32 {
        self.wins_a + self.wins_b + self.draws
    }

    /// Score for side A in [0, 1]; an empty match is even.
    pub fn score(&self) -> f64 {
        let total = self.total_games();
        if total == 0 {
            return 0.5;
        }
        (self.wins_a as f64 + 0.5 * self.draws as f64) / total as f64
    }

    pub fn record(&mut self, outcome: GameOutcome, a_is_white: bool) {
        match (outcome, a_is_white) {
            (GameOutcome::WhiteWin, true) | (GameOutcome::BlackWin, false) => self.wins_a += 1,
            (GameOutcome::WhiteWin, false) | (GameOutcome::BlackWin, true) => self.wins_b += 1,
            (GameOutcome::Draw, _) => self.draws += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.draws += 1;
        self.failed += 1;
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{} ={}", self.wins_a, self.wins_b, self.draws)
    }
}

/// The match was cut short by a shutdown request; its games do not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Plays θ+ against θ- and reports the aggregate.
pub trait MatchPlayer {
    fn play_match(
        &self,
        params_a: &CandidateSet,
        params_b: &CandidateSet,
        openings: &[Opening],
    ) -> Result<MatchResult, Interrupted>;
}

#[derive(Debug)]
pub enum GameReport {
    Finished(GameOutcome),
    Failed(GameError),
    Panicked,
    Skipped,
}

#[derive(Debug, Clone, Copy)]
struct GameTicket<'a> {
    game_num: usize,
    opening: &'a [chess::ChessMove],
    a_is_white: bool,
}

pub struct MatchRunner<G> {
    player: G,
    pool: rayon::ThreadPool,
    shutdown: Arc<AtomicBool>,
}

impl<G: GamePlayer> MatchRunner<G> {
    pub fn new(
        player: G,
        concurrency: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("game-{}", i))
            .build()?;

        Ok(Self {
            player,
            pool,
            shutdown,
        })
    }

    pub fn run(
        &self,
        params_a: &CandidateSet,
        params_b: &CandidateSet,
        openings: &[Opening],
    ) -> Result<MatchResult, Interrupted> {
        // Each opening played twice (color swap)
        let tickets: Vec<GameTicket> = openings
            .iter()
            .enumerate()
            .flat_map(|(i, opening)| {
                [true, false].map(|a_is_white| GameTicket {
                    game_num: i * 2 + usize::from(!a_is_white),
                    opening,
                    a_is_white,
                })
            })
            .collect();
        let total = tickets.len();

        let (sender, receiver) = mpsc::channel::<(GameTicket, GameReport)>();
        let mut result = MatchResult::default();
        let mut skipped = 0usize;

        thread::scope(|scope| {
            scope.spawn(move || {
                self.pool.install(|| {
                    tickets.into_par_iter().for_each_with(sender, |tx, ticket| {
                        let report = self.play_ticket(params_a, params_b, &ticket);
                        let _ = tx.send((ticket, report));
                    });
                });
            });

            let mut completed = 0usize;
            for (ticket, report) in receiver {
                match report {
                    GameReport::Finished(outcome) => result.record(outcome, ticket.a_is_white),
                    GameReport::Failed(error) => {
                        log::warn!("Game {} failed, scoring it as a draw: {}", ticket.game_num + 1, error);
                        result.record_failure();
                    }
                    GameReport::Panicked => {
                        log::warn!("Game {} panicked, scoring it as a draw", ticket.game_num + 1);
                        result.record_failure();
                    }
                    GameReport::Skipped => skipped += 1,
                }

                completed += 1;
                if completed % 10 == 0 {
                    log::debug!("Completed {}/{} games ({})", completed, total, result);
                }
            }
        });

        if skipped > 0 {
            log::info!("Match interrupted, {} of {} games not played", skipped, total);
            return Err(Interrupted);
        }

        // Games in flight during a shutdown may have lost their engines to the signal
        if self.shutdown.load(Ordering::Relaxed) {
            log::info!("Match interrupted after all {} games started", total);
            return Err(Interrupted);
        }

        Ok(result)
    }

    fn play_ticket(&self, params_a: &CandidateSet, params_b: &CandidateSet, ticket: &GameTicket) -> GameReport {
        if self.shutdown.load(Ordering::Relaxed) {
            return GameReport::Skipped;
        }

        let (white, black) = if ticket.a_is_white {
            (params_a, params_b)
        } else {
            (params_b, params_a)
        };

        match panic::catch_unwind(AssertUnwindSafe(|| self.player.play(white, black, ticket.opening))) {
            Ok(Ok(outcome)) => GameReport::Finished(outcome),
            Ok(Err(error)) => GameReport::Failed(error),
            Err(_) => GameReport::Panicked,
        }
    }
}

impl<G: GamePlayer> MatchPlayer for MatchRunner<G> {
    fn play_match(
        &self,
        params_a: &CandidateSet,
        params_b: &CandidateSet,
        openings: &[Opening],
    ) -> Result<MatchResult, Interrupted> {
        self.run(params_a, params_b, openings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use chess::{ChessMove, Square};
    use std::sync::{Barrier, Mutex};
    use std::sync::atomic::AtomicUsize;

    /// Decides each game from the parameter sets: the larger `Strength` wins,
    /// `Crash` makes the game fail.
    struct ByStrength {
        played: AtomicUsize,
        pairings: Mutex<Vec<(i64, i64)>>,
    }

    impl ByStrength {
        fn new() -> Self {
            Self {
                played: AtomicUsize::new(0),
                pairings: Mutex::new(Vec::new()),
            }
        }
    }

    impl GamePlayer for ByStrength {
        fn play(
            &self,
            white: &CandidateSet,
            black: &CandidateSet,
            _opening: &[ChessMove],
        ) -> Result<GameOutcome, GameError> {
            self.played.fetch_add(1, Ordering::SeqCst);
            let (w, b) = (white.get("Strength").unwrap_or(0), black.get("Strength").unwrap_or(0));
            self.pairings.lock().unwrap().push((w, b));

            if white.get("Crash").is_some() || black.get("Crash").is_some() {
                return Err(GameError::Launch(EngineError::Exited));
            }
            if white.get("Panic").is_some() {
                panic!("engine wrapper bug");
            }

            Ok(match w.cmp(&b) {
                std::cmp::Ordering::Greater => GameOutcome::WhiteWin,
                std::cmp::Ordering::Less => GameOutcome::BlackWin,
                std::cmp::Ordering::Equal => GameOutcome::Draw,
            })
        }
    }

    fn strength(value: i64) -> CandidateSet {
        [("Strength".to_string(), value)].into_iter().collect()
    }

    fn runner<G: GamePlayer>(player: G) -> MatchRunner<G> {
        MatchRunner::new(player, 4, Arc::new(AtomicBool::new(false))).unwrap()
    }

    #[test]
    fn test_score_formula() {
        let result = MatchResult {
            wins_a: 12,
            wins_b: 5,
            draws: 3,
            failed: 0,
        };
        assert_eq!(result.total_games(), 20);
        assert!((result.score() - 0.675).abs() < 1e-12);
        assert_eq!(result.to_string(), "+12 -5 =3");
        assert_eq!(MatchResult::default().score(), 0.5);
    }

    #[test]
    fn test_outcomes_map_back_through_colors() {
        let mut result = MatchResult::default();
        result.record(GameOutcome::WhiteWin, true);
        result.record(GameOutcome::BlackWin, false);
        result.record(GameOutcome::WhiteWin, false);
        result.record(GameOutcome::Draw, true);

        assert_eq!((result.wins_a, result.wins_b, result.draws), (2, 1, 1));
    }

    #[test]
    fn test_plays_both_colors_per_opening() {
        let runner = runner(ByStrength::new());
        let openings = vec![Vec::new(); 10];

        let result = runner.run(&strength(2), &strength(1), &openings).unwrap();

        assert_eq!(result.total_games(), 20);
        assert_eq!(result.wins_a, 20);
        assert_eq!(result.score(), 1.0);

        let pairings = runner.player.pairings.lock().unwrap();
        assert_eq!(pairings.iter().filter(|&&(w, _)| w == 2).count(), 10);
        assert_eq!(pairings.iter().filter(|&&(w, _)| w == 1).count(), 10);
    }

    #[test]
    fn test_failed_game_counts_as_one_draw() {
        let runner = runner(ByStrength::new());
        let mut crashing = strength(2);
        crashing.insert("Crash", 1);

        let result = runner.run(&crashing, &strength(1), &[Vec::new()]).unwrap();

        assert_eq!(result.total_games(), 2);
        assert_eq!(result.draws, 2);
        assert_eq!(result.failed, 2);
        assert_eq!((result.wins_a, result.wins_b), (0, 0));
        assert_eq!(result.score(), 0.5);
    }

    #[test]
    fn test_panicking_game_counts_as_one_draw() {
        let runner = runner(ByStrength::new());
        let mut panicking = strength(2);
        panicking.insert("Panic", 1);

        // Only the game where the panicking side is White blows up
        let result = runner.run(&panicking, &strength(1), &[Vec::new()]).unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(result.draws, 1);
        assert_eq!(result.wins_a, 1);
    }

    #[test]
    fn test_shutdown_skips_games() {
        let shutdown = Arc::new(AtomicBool::new(true));
        let runner = MatchRunner::new(ByStrength::new(), 2, shutdown).unwrap();

        let result = runner.run(&strength(1), &strength(1), &vec![Vec::new(); 3]);

        assert_eq!(result, Err(Interrupted));
        assert_eq!(runner.player.played.load(Ordering::SeqCst), 0);
    }

    /// Decides games by opening length from A's point of view; A carries `Id` = 1.
    struct Scripted;

    impl GamePlayer for Scripted {
        fn play(
            &self,
            white: &CandidateSet,
            _black: &CandidateSet,
            opening: &[ChessMove],
        ) -> Result<GameOutcome, GameError> {
            let a_is_white = white.get("Id") == Some(1);
            let a_wins = match (opening.len(), a_is_white) {
                (0..=5, _) => Some(true),
                (6..=8, true) | (6..=7, false) => Some(false),
                _ => None,
            };

            Ok(match a_wins {
                Some(a_wins) if a_wins == a_is_white => GameOutcome::WhiteWin,
                Some(_) => GameOutcome::BlackWin,
                None => GameOutcome::Draw,
            })
        }
    }

    #[test]
    fn test_aggregates_paired_games() {
        let runner = runner(Scripted);
        let filler = ChessMove::new(Square::A2, Square::A3, None);
        let openings: Vec<Opening> = (0..10).map(|plies| vec![filler; plies]).collect();
        let a: CandidateSet = [("Id".to_string(), 1)].into_iter().collect();
        let b: CandidateSet = [("Id".to_string(), 2)].into_iter().collect();

        let result = runner.run(&a, &b, &openings).unwrap();

        assert_eq!((result.wins_a, result.wins_b, result.draws), (12, 5, 3));
        assert!((result.score() - 0.675).abs() < 1e-12);
    }

    /// Both games get past the shutdown check, then the flag is raised while
    /// they are still running.
    struct ShutdownMidGame {
        started: Barrier,
        shutdown: Arc<AtomicBool>,
    }

    impl GamePlayer for ShutdownMidGame {
        fn play(
            &self,
            _white: &CandidateSet,
            _black: &CandidateSet,
            _opening: &[ChessMove],
        ) -> Result<GameOutcome, GameError> {
            self.started.wait();
            self.shutdown.store(true, Ordering::SeqCst);
            Err(GameError::Launch(EngineError::Exited))
        }
    }

    #[test]
    fn test_shutdown_during_last_games_interrupts_match() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let player = ShutdownMidGame {
            started: Barrier::new(2),
            shutdown: shutdown.clone(),
        };
        let runner = MatchRunner::new(player, 2, shutdown.clone()).unwrap();

        let result = runner.run(&strength(1), &strength(2), &[Vec::new()]);

        assert!(shutdown.load(Ordering::SeqCst));
        assert_eq!(result, Err(Interrupted));
    }

    #[test]
    fn test_no_openings_no_games() {
        let runner = runner(ByStrength::new());
        let result = runner.run(&strength(1), &strength(2), &[]).unwrap();
        assert_eq!(result.total_games(), 0);
    }
}
