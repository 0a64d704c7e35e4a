//! Self-play data generation.
//!
//! Games are played by the search against itself. Every position reached
//! before a move is recorded with the visit distribution of the search and the
//! player to move; once the game is over, each position is labeled with the
//! final result from the perspective of its player.
//!
//! [`play_game`] plays one game with one evaluator call per leaf, while
//! [`SelfPlayBatch`] advances many games in lock-step so that all their pending
//! leaves are evaluated with a single [`GameEvaluator::evaluate_batch`] call.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{Game, GameEvaluator, Mcts, MctsError, SelfPlayConfig};

/// Errors of the self-play driver.
#[derive(Debug, Error)]
pub enum SelfPlayError {
    #[error(transparent)]
    Search(#[from] MctsError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration file: {0}")]
    Config(#[from] toml::de::Error),
}

/// One recorded position of a self-play game.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrajectoryStep<S, P> {
    /// Evaluator input of the position.
    pub state: S,
    /// Normalized visit counts of the search run from this position.
    pub policy: Vec<f64>,
    /// Player to move in this position.
    pub player: P,
}

/// A labeled training sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample<S> {
    /// Evaluator input of the position.
    pub state: S,
    /// Search policy target: normalized root visit counts over all `N` actions.
    pub policy: Vec<f64>,
    /// Final result of the game for the player to move: `1` win, `0` draw, `-1` loss.
    pub value: f64,
}

/// A finished self-play game.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameRecord<S, P> {
    /// Recorded positions, in play order.
    pub steps: Vec<TrajectoryStep<S, P>>,
    /// One sample per step, in the same order.
    pub samples: Vec<TrainingSample<S>>,
    /// Result for the player who moved first, `None` when the game was truncated.
    pub outcome: Option<f64>,
    /// Number of moves played.
    pub plies: usize,
    /// The game was stopped at `max_moves` before reaching a terminal position.
    pub truncated: bool,
}

/// Flattens the samples of several games, in game order.
pub fn collect_samples<S: Clone, P>(records: &[GameRecord<S, P>]) -> Vec<TrainingSample<S>> {
    records.iter().flat_map(|record| record.samples.iter().cloned()).collect()
}

/// A game in progress: its search tree and the positions recorded so far.
struct SelfPlayGame<T: Game<N>, const N: usize> {
    mcts: Mcts<T, N>,
    steps: Vec<TrajectoryStep<T::State, T::Player>>,
}

impl<T: Game<N>, const N: usize> SelfPlayGame<T, N> {
    fn new(game: T, config: &SelfPlayConfig, seed: Option<u64>) -> Result<Self, MctsError> {
        if game.is_finish() {
            return Err(MctsError::PreconditionViolation(
                "cannot start self-play from a finished position".to_string(),
            ));
        }

        let mcts = Mcts::from_game_with_config(game, &config.mcts_config::<N>(seed));
        Ok(SelfPlayGame { mcts, steps: Vec::new() })
    }

    #[inline]
    fn is_over(&self, config: &SelfPlayConfig) -> bool {
        self.mcts.is_finish() || self.steps.len() >= config.max_moves
    }

    /// Records the root position and plays the move picked by the search.
    fn commit_move(&mut self, config: &SelfPlayConfig) -> Result<(), MctsError> {
        let ply = self.steps.len();
        let game = self.mcts.get_game();

        self.steps.push(TrajectoryStep {
            state: game.get_state(),
            policy: self.mcts.get_statistics().to_vec(),
            player: game.current_player(),
        });

        let action = self.mcts.choose_action(config.temperature_at(ply))?;
        self.mcts.play(action)?;
        if !config.reuse_tree {
            self.mcts.clear_tree()?;
        }

        debug!(ply, action, "move committed");
        Ok(())
    }

    /// Labels the recorded positions with the final result.
    fn into_record(self) -> GameRecord<T::State, T::Player> {
        let plies = self.steps.len();
        let final_game = self.mcts.get_game();
        let truncated = !final_game.is_finish();

        let label = |player: T::Player| {
            if truncated { 0.0 } else { final_game.get_result(player).unwrap_or(0.0) }
        };

        let samples = self
            .steps
            .iter()
            .map(|step| TrainingSample {
                state: step.state.clone(),
                policy: step.policy.clone(),
                value: label(step.player),
            })
            .collect();

        let outcome =
            if truncated { None } else { self.steps.first().map(|step| label(step.player)) };

        if truncated {
            warn!(plies, "self-play game truncated, scored as a draw");
        } else {
            info!(plies, outcome = outcome.unwrap_or(0.0), "self-play game finished");
        }

        GameRecord { steps: self.steps, samples, outcome, plies, truncated }
    }
}

/// Plays one complete self-play game from `game`.
///
/// Before each move, `config.simulations` simulations are run from the current
/// position. The move is sampled at `config.temperature` for the first
/// `config.temperature_moves` plies and is the most visited action afterwards.
/// The game stops at a terminal position or after `config.max_moves` plies.
///
/// # Parameters
/// - `game`: The starting position, which must not be finished.
/// - `evaluator`: The policy/value evaluator.
/// - `config`: The self-play settings.
/// - `seed`: Seed of the move sampling and of the root noise, `None` for OS entropy.
///
/// # Examples
/// ```rust
/// use quoridor_zero::{play_game, Game, SelfPlayConfig, SelfPlayError, UniformEvaluator};
/// use quoridor_zero::test_utils::GameTest;
///
/// fn main() -> Result<(), SelfPlayError> {
///     let config = SelfPlayConfig { simulations: 16, ..SelfPlayConfig::default() };
///     let record = play_game::<GameTest, 4>(GameTest::new(), &UniformEvaluator, &config, Some(1))?;
///
///     assert_eq!(record.plies, 4);
///     assert_eq!(record.samples.len(), 4);
///     Ok(())
/// }
/// ```
pub fn play_game<T: Game<N>, const N: usize>(
    game: T,
    evaluator: &dyn GameEvaluator<T, N>,
    config: &SelfPlayConfig,
    seed: Option<u64>,
) -> Result<GameRecord<T::State, T::Player>, SelfPlayError> {
    config.validate()?;
    let mut current = SelfPlayGame::new(game, config, seed)?;

    while !current.is_over(config) {
        current.mcts.simulate(evaluator, config.simulations)?;
        current.commit_move(config)?;
    }

    Ok(current.into_record())
}

/// Manages a set of self-play games advanced in lock-step.
///
/// Each call to [`SelfPlayBatch::step`] selects at most one leaf per unfinished
/// game, evaluates all of them with one `evaluate_batch` call, and commits a
/// move in every game whose search budget is spent.
///
/// # Type Parameters
/// - `T`: The type of game being played.
/// - `N`: The number of possible actions in the game.
pub struct SelfPlayBatch<T: Game<N>, const N: usize> {
    games: Vec<SelfPlayGame<T, N>>,
    config: SelfPlayConfig,
    /// Number of games added so far, used to derive per-game seeds.
    added: u64,
}

impl<T: Game<N>, const N: usize> SelfPlayBatch<T, N> {
    /// Creates an empty batch.
    ///
    /// # Returns
    /// `Err(SelfPlayError::Search(MctsError::InvalidConfiguration(_)))` if the
    /// settings are invalid.
    pub fn new(config: SelfPlayConfig) -> Result<Self, SelfPlayError> {
        config.validate()?;
        Ok(SelfPlayBatch { games: Vec::new(), config, added: 0 })
    }

    /// Number of games still in progress.
    #[inline]
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Returns `true` once every game of the batch has ended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// The settings shared by every game of the batch.
    #[inline]
    pub fn config(&self) -> &SelfPlayConfig {
        &self.config
    }

    /// Seed of the `index`-th game added to the batch.
    #[inline]
    fn game_seed(&self, index: u64) -> Option<u64> {
        self.config.seed.map(|seed| seed.wrapping_add(index))
    }

    /// Adds a game starting from `game`.
    ///
    /// The `i`-th added game is seeded with `config.seed + i`, so a batch
    /// replays exactly the games [`play_game`] produces with the same seeds.
    ///
    /// # Returns
    /// `Err(MctsError::PreconditionViolation(_))` if the position is already finished.
    pub fn add_game(&mut self, game: T) -> Result<(), SelfPlayError> {
        let seed = self.game_seed(self.added);
        self.games.push(SelfPlayGame::new(game, &self.config, seed)?);
        self.added += 1;
        Ok(())
    }

    /// Adds `count` games starting from `T::new()`.
    pub fn populate(&mut self, count: usize) -> Result<(), SelfPlayError> {
        for _ in 0..count {
            self.add_game(T::new())?;
        }
        Ok(())
    }

    /// Starts one iteration in every game whose budget is not spent.
    ///
    /// # Returns
    /// The indices of the games waiting for an evaluation and their states.
    fn select_leaves(
        &mut self,
        budget: usize,
    ) -> Result<(Vec<usize>, Vec<T::State>), MctsError> {
        let mut pending = Vec::with_capacity(self.games.len());
        let mut states = Vec::with_capacity(self.games.len());

        for (index, current) in self.games.iter_mut().enumerate() {
            // terminal leaves are backed up without an evaluation
            while current.mcts.simulations() < budget {
                if let Some(state) = current.mcts.start_iteration()? {
                    pending.push(index);
                    states.push(state);
                    break;
                }
            }
        }

        Ok((pending, states))
    }

    fn cancel_pending(&mut self) {
        for current in &mut self.games {
            current.mcts.cancel_iteration();
        }
    }

    /// Advances every game by at most one evaluated simulation.
    ///
    /// # Returns
    /// The records of the games that ended during this step. They are removed
    /// from the batch.
    /// `Err(SelfPlayError::Search(MctsError::InvalidEvaluationCount(expected, received)))`
    /// if the evaluator returns a wrong number of evaluations,
    /// `Err(SelfPlayError::Search(MctsError::EvaluatorFailure(_)))` if it fails.
    /// In both cases the pending iterations are cancelled and the batch can be
    /// stepped again.
    pub fn step(
        &mut self,
        evaluator: &dyn GameEvaluator<T, N>,
    ) -> Result<Vec<GameRecord<T::State, T::Player>>, SelfPlayError> {
        let budget = self.config.simulations;
        let (pending, states) = match self.select_leaves(budget) {
            Ok(selected) => selected,
            Err(e) => {
                self.cancel_pending();
                return Err(e.into());
            }
        };

        if !states.is_empty() {
            let evaluations = match evaluator.evaluate_batch(states) {
                Ok(evaluations) => evaluations,
                Err(e) => {
                    self.cancel_pending();
                    return Err(MctsError::from(e).into());
                }
            };

            if evaluations.len() != pending.len() {
                self.cancel_pending();
                let error = MctsError::InvalidEvaluationCount(pending.len(), evaluations.len());
                return Err(error.into());
            }

            for (index, evaluation) in pending.into_iter().zip(evaluations) {
                if let Err(e) = self.games[index].mcts.apply_simulation(evaluation) {
                    self.cancel_pending();
                    return Err(e.into());
                }
            }
        }

        for current in &mut self.games {
            if current.mcts.simulations() >= budget {
                current.commit_move(&self.config)?;
            }
        }

        let (over, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.games)
            .into_iter()
            .partition(|current| current.is_over(&self.config));
        self.games = running;

        Ok(over.into_iter().map(SelfPlayGame::into_record).collect())
    }

    /// Steps until every game of the batch is over.
    ///
    /// # Returns
    /// The records in the order the games ended.
    pub fn run(
        &mut self,
        evaluator: &dyn GameEvaluator<T, N>,
    ) -> Result<Vec<GameRecord<T::State, T::Player>>, SelfPlayError> {
        let mut records = Vec::new();

        while !self.games.is_empty() {
            records.extend(self.step(evaluator)?);
        }

        Ok(records)
    }
}

/// Plays `config.num_games` games from `T::new()` in one batch.
pub fn generate_games<T: Game<N>, const N: usize>(
    evaluator: &dyn GameEvaluator<T, N>,
    config: &SelfPlayConfig,
) -> Result<Vec<GameRecord<T::State, T::Player>>, SelfPlayError> {
    let mut batch = SelfPlayBatch::<T, N>::new(config.clone())?;
    batch.populate(config.num_games)?;

    let records = batch.run(evaluator)?;
    let samples: usize = records.iter().map(|r| r.samples.len()).sum();
    info!(games = records.len(), samples, "self-play done");
    Ok(records)
}

/// Writes samples as newline-delimited JSON, one object per line.
///
/// # Returns
/// The number of written lines.
pub fn write_samples_ndjson<W: Write, S: Serialize>(
    mut writer: W,
    samples: &[TrainingSample<S>],
) -> Result<usize, SelfPlayError> {
    for sample in samples {
        serde_json::to_writer(&mut writer, sample)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(samples.len())
}

/// Creates (or truncates) `path` and writes the samples to it as NDJSON.
pub fn save_samples_ndjson<S: Serialize>(
    path: impl AsRef<Path>,
    samples: &[TrainingSample<S>],
) -> Result<usize, SelfPlayError> {
    let file = File::create(path.as_ref())?;
    let written = write_samples_ndjson(BufWriter::new(file), samples)?;

    info!(path = %path.as_ref().display(), samples = written, "samples saved");
    Ok(written)
}
