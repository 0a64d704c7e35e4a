//! Implementation of the network-guided Monte Carlo Tree Search.
//!
//! This module provides the core MCTS logic: selection with a confidence-bound
//! score, expansion of a leaf through a [`GameEvaluator`], backup of the value
//! along the visited path, and extraction of a move and of the visit
//! distribution used as a training target. It is generic over game types and
//! evaluation strategies.

use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Gamma};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    config::validate_temperature, utils, validate_evaluation, EvaluatorError, Game, GameEvaluator,
    MctsConfig, NodeId, Tree,
};

/// A very large floating-point number used to represent infinity in score calculations.
///
/// Using `1e300` instead of `f64::INFINITY` keeps the arithmetic well defined
/// when the score is scaled by a prior.
const INFINITY: f64 = 1e300;

/// Data stored in each node of the MCTS tree.
struct MctsNodeData<T> {
    /// Position reached by this node.
    game: T,
    /// Renormalized evaluator prior of the action leading to this node.
    prior: f64,
    /// Sum of the backed-up values, from the perspective of the player to move here.
    score: f64,
    /// The number of simulations that went through this node.
    n: usize,
    /// Children were created from an evaluation.
    expanded: bool,
    /// Outcome from the perspective of the player to move, when the position is terminal.
    outcome: Option<f64>,
}

impl<T> MctsNodeData<T> {
    fn new<const N: usize>(game: T, prior: f64) -> Self
    where
        T: Game<N>,
    {
        let outcome = if game.is_finish() {
            Some(game.get_result(game.current_player()).unwrap_or(EQUALITY_SCORE))
        } else {
            None
        };

        MctsNodeData { game, prior, score: 0.0, n: 0, expanded: false, outcome }
    }

    /// Mean backed-up value, `0.0` for an unvisited node.
    #[inline]
    fn get_value(&self) -> f64 {
        if self.n != 0 { self.score / self.n as f64 } else { 0.0 }
    }

    #[inline]
    fn is_finish(&self) -> bool {
        self.outcome.is_some()
    }

    #[inline]
    fn add_score(&mut self, score: f64) {
        self.score += score;
        self.n += 1;
    }
}

/// Score of a draw.
const EQUALITY_SCORE: f64 = 0.0;

/// Controls the flow of the two-phase iteration API and prevents invalid sequential calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MctsState {
    /// The MCTS instance is ready; all operations can be performed.
    Usable,
    /// A leaf was selected by `start_iteration` and waits for its evaluation.
    /// Only `apply_simulation` or `cancel_iteration` can be called in this state.
    AwaitingSimulation,
}

/// Errors that can occur during MCTS operations.
#[derive(Debug, Error)]
pub enum MctsError {
    /// A parameter of the search is unusable (simulation budget, temperature,
    /// exploration constant, noise). Raised before any simulation runs.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The search was asked to work on a position it cannot handle: a
    /// finished root, or a position without legal actions that is not finished.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// The evaluator failed or returned a malformed evaluation.
    #[error("evaluator failure: {0}")]
    EvaluatorFailure(#[from] EvaluatorError),

    /// A node was about to be expanded a second time.
    #[error("node {0} is already expanded")]
    ExpansionConflict(NodeId),

    /// An operation was attempted while the instance was not in the required state.
    #[error("operation not allowed in state {0:?}")]
    InvalidState(MctsState),

    /// The number of evaluations does not match the number of pending leaves.
    /// Contains (expected_count, received_count).
    #[error("expected {0} evaluations, received {1}")]
    InvalidEvaluationCount(usize, usize),

    /// An action index is outside `[0, N)`.
    /// Contains the (attempted_action_index, action_count).
    #[error("action {0} is out of range (the game has {1} actions)")]
    ActionOutOfRange(usize, usize),

    /// The action is not legal in the root position.
    #[error("action {0} is not legal in the current position")]
    InvalidAction(usize),
}

/// Type alias for a function pointer used to determine a child's selection score.
///
/// This function takes the following parameters:
/// - `value`: The mean value of the child, from the parent's perspective (`0` if unvisited).
/// - `policy`: The prior probability of the action leading to the child.
/// - `n_visits`: The number of times the child has been visited.
/// - `parent_n_visits`: The number of times the parent node has been visited.
/// - `exploration_coef`: The exploration coefficient from `MctsConfig`.
///
/// It returns an `f64` score; the child with the highest score is selected.
pub type SelectionFunction<const N: usize> =
    fn(value: f64, policy: f64, n_visits: f64, parent_n_visits: f64, exploration_coef: f64) -> f64;

/// The PUCT selection score used by AlphaZero.
///
/// `value + exploration_coef * policy * sqrt(parent_n_visits) / (1 + n_visits)`
pub fn default_selection_score<const N: usize>(
    value: f64,
    policy: f64,
    n_visits: f64,
    parent_n_visits: f64,
    exploration_coef: f64,
) -> f64 {
    value + exploration_coef * policy * parent_n_visits.sqrt() / (1. + n_visits)
}

/// The Upper Confidence Bound 1 (UCB1) selection function, weighted by the prior.
///
/// Unvisited children get a score of infinity ponderated by their prior, so they
/// are all tried once, in prior order, before any of them is revisited.
pub fn ucb1<const N: usize>(
    value: f64,
    policy: f64,
    n_visits: f64,
    parent_n_visits: f64,
    exploration_coef: f64,
) -> f64 {
    if n_visits == 0. {
        return INFINITY * (1. + policy);
    }
    value + exploration_coef * policy * (parent_n_visits.max(1.).ln() / n_visits).sqrt()
}

/// Outcome of a complete search from one root position.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult<const N: usize> {
    /// The action chosen with the configured temperature.
    pub action: usize,
    /// Visit counts of the root's children, normalized. Actions without a
    /// child get `0`.
    pub policy: [f64; N],
    /// Mean value of the root after the search, from the perspective of the
    /// player to move at the root.
    pub value: f64,
    /// Number of simulations performed by this search.
    pub simulations: usize,
}

/// The Monte Carlo Tree Search algorithm implementation.
///
/// This struct manages the MCTS tree for a single game instance, allowing
/// for iterative search, game progression (with reuse of the subtree of the
/// played move), and result retrieval.
///
/// # Type Parameters
/// - `T`: The game type that implements the `Game` trait.
/// - `N`: The number of possible actions in the game, a constant generic.
pub struct Mcts<T: Game<N>, const N: usize> {
    tree: Tree<MctsNodeData<T>>,
    config: MctsConfig<N>,
    state: MctsState,
    /// Leaf selected by `start_iteration`, waiting for `apply_simulation`.
    latent: Option<NodeId>,
    rng: StdRng,
    /// Simulations completed since the current root was set.
    simulations: usize,
    /// Root priors already received their Dirichlet noise.
    noised: bool,
}

impl<T: Game<N>, const N: usize> Mcts<T, N> {
    /// Creates a new MCTS instance on a new game, with the default configuration.
    #[inline]
    pub fn new() -> Self {
        Self::from_config(&MctsConfig::DEFAULT)
    }

    /// Creates a new MCTS instance on a new game, with a specified configuration.
    #[inline]
    pub fn from_config(config: &MctsConfig<N>) -> Self {
        Self::from_game_with_config(T::new(), config)
    }

    /// Creates a new MCTS instance rooted at an existing position, with the default configuration.
    #[inline]
    pub fn from_game(game: T) -> Self {
        Self::from_game_with_config(game, &MctsConfig::DEFAULT)
    }

    /// Creates a new MCTS instance rooted at an existing position, with a custom configuration.
    ///
    /// The configuration is checked when the search runs, before any simulation.
    ///
    /// # Parameters
    /// - `game`: The root position. The tree owns it.
    /// - `config`: The `MctsConfig` to use for this instance.
    pub fn from_game_with_config(game: T, config: &MctsConfig<N>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Mcts {
            tree: Tree::new(MctsNodeData::new::<N>(game, 1.0)),
            config: *config,
            state: MctsState::Usable,
            latent: None,
            rng,
            simulations: 0,
            noised: false,
        }
    }

    /// Gets an immutable reference to the position at the root.
    pub fn get_game(&self) -> &T {
        &self.tree.get(self.tree.root()).get().game
    }

    /// Returns the current operational state of the MCTS instance.
    #[inline]
    pub fn get_state(&self) -> MctsState {
        self.state
    }

    /// The configuration of this instance.
    #[inline]
    pub fn config(&self) -> &MctsConfig<N> {
        &self.config
    }

    /// Number of simulations completed since the current root was set.
    #[inline]
    pub fn simulations(&self) -> usize {
        self.simulations
    }

    /// Number of nodes currently held by the tree.
    #[inline]
    pub fn tree_size(&self) -> usize {
        self.tree.len()
    }

    /// Determines if the position at the root is finished.
    #[inline]
    pub fn is_finish(&self) -> bool {
        self.tree.get(self.tree.root()).get().is_finish()
    }

    /// Visit count of the root node.
    #[inline]
    pub fn count_visit(&self) -> usize {
        self.tree.get(self.tree.root()).get().n
    }

    fn check_usable(&self) -> Result<(), MctsError> {
        if self.state != MctsState::Usable {
            return Err(MctsError::InvalidState(self.state));
        }
        Ok(())
    }

    fn check_root_playable(&self) -> Result<(), MctsError> {
        if self.is_finish() {
            return Err(MctsError::PreconditionViolation(
                "the root position is already finished".to_string(),
            ));
        }
        Ok(())
    }

    /// Calculates the selection score of `child` for a parent visited `parent_n` times.
    #[inline]
    fn get_selection_score(&self, parent_n: f64, child: NodeId) -> f64 {
        let data = self.tree.get(child).get();

        (self.config.selection_function)(
            -data.get_value(),
            data.prior,
            data.n as f64,
            parent_n,
            self.config.exploration_coef,
        )
    }

    /// Performs the selection phase of MCTS.
    ///
    /// Walks down from the root while the current node is expanded and not
    /// terminal, picking the child with the highest selection score. Ties go to
    /// the first child in action order.
    ///
    /// The parent count of a fresh root is `0`, so the PUCT exploration term is
    /// `0` for every child on the first simulation and the lowest legal action
    /// is selected whatever its prior. The priors take effect from the second
    /// simulation on.
    ///
    /// # Returns
    /// The path of visited nodes, from the root to the selected leaf.
    fn selection(&self) -> Vec<NodeId> {
        let mut current = self.tree.root();
        let mut path = vec![current];

        loop {
            let node = self.tree.get(current);
            let data = node.get();

            if !data.expanded || data.is_finish() {
                return path;
            }

            let parent_n = data.n as f64;
            let mut best: Option<(NodeId, f64)> = None;

            for &(_, child) in node.children() {
                let score = self.get_selection_score(parent_n, child);
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((child, score));
                }
            }

            match best {
                Some((child, _)) => {
                    path.push(child);
                    current = child;
                }
                None => return path,
            }
        }
    }

    /// Performs the expansion phase of MCTS.
    ///
    /// Creates one child per legal action of `id`, each owning a copy of the
    /// position with the action applied and the evaluator prior restricted and
    /// renormalized to the legal actions.
    ///
    /// # Returns
    /// - `Err(MctsError::ExpansionConflict(_))` if the node is already expanded.
    /// - `Err(MctsError::EvaluatorFailure(_))` if the evaluation is malformed.
    /// - `Err(MctsError::PreconditionViolation(_))` if the node is terminal, or
    ///   has no legal action without being terminal.
    fn expand(&mut self, id: NodeId, evaluation: &(f64, [f64; N])) -> Result<(), MctsError> {
        let data = self.tree.get(id).get();

        if data.expanded {
            return Err(MctsError::ExpansionConflict(id));
        }
        if data.is_finish() {
            return Err(MctsError::PreconditionViolation(format!(
                "node {id} is terminal and cannot be expanded"
            )));
        }

        validate_evaluation(evaluation)?;

        let mask = data.game.get_actions();
        if !mask.iter().any(|&legal| legal) {
            return Err(MctsError::PreconditionViolation(format!(
                "node {id} has no legal action but its position is not finished"
            )));
        }

        let (priors, fallback) = self.config.prior_normalization.normalize(&evaluation.1, &mask);
        if fallback {
            warn!(node = %id, "no prior mass on legal actions, using uniform priors");
        }

        let parent_game = data.game.clone();
        for action in (0..N).filter(|&action| mask[action]) {
            let mut game = parent_game.clone();
            game.play(action);
            self.tree.add_child(id, action, MctsNodeData::new::<N>(game, priors[action]));
        }

        self.tree.get_mut(id).get_mut().expanded = true;
        Ok(())
    }

    /// Performs the backup phase of MCTS.
    ///
    /// `value` is the leaf value from the perspective of the player to move at
    /// the leaf. The node `k` plies above the leaf receives `value` when `k` is
    /// even and `-value` when `k` is odd.
    fn backup(&mut self, path: &[NodeId], value: f64) {
        let mut value = value;

        for &id in path.iter().rev() {
            self.tree.get_mut(id).get_mut().add_score(value);
            value = -value;
        }
    }

    /// Mixes Dirichlet noise into the priors of the root's children, once per root.
    fn apply_root_noise(&mut self) -> Result<(), MctsError> {
        let Some(noise) = self.config.dirichlet else {
            return Ok(());
        };
        if self.noised {
            return Ok(());
        }

        let root = self.tree.root();
        let children: Vec<NodeId> =
            self.tree.get(root).children().iter().map(|(_, id)| *id).collect();
        if children.is_empty() {
            return Ok(());
        }

        let gamma = Gamma::new(noise.alpha, 1.0).map_err(|e| {
            MctsError::InvalidConfiguration(format!("dirichlet alpha {}: {e}", noise.alpha))
        })?;
        let samples: Vec<f64> = children.iter().map(|_| gamma.sample(&mut self.rng)).collect();
        let total: f64 = samples.iter().sum();

        if total > 0.0 {
            for (child, sample) in children.into_iter().zip(samples) {
                let data = self.tree.get_mut(child).get_mut();
                data.prior = (1.0 - noise.epsilon) * data.prior + noise.epsilon * sample / total;
            }
        }

        self.noised = true;
        Ok(())
    }

    /// Performs one full simulation (selection, expansion or terminal handling, backup).
    ///
    /// On a root that was never expanded, the root is first evaluated and
    /// expanded; that evaluation is not counted as a simulation.
    ///
    /// # Returns
    /// - `Ok(())` once one more simulation has been backed up.
    /// - `Err(MctsError::InvalidState(_))` if an iteration is already pending.
    /// - `Err(MctsError::PreconditionViolation(_))` if the root position is finished.
    /// - Errors of the evaluator, propagated as `MctsError::EvaluatorFailure`.
    pub fn iterate(&mut self, evaluator: &dyn GameEvaluator<T, N>) -> Result<(), MctsError> {
        let target = self.simulations + 1;

        while self.simulations < target {
            if let Some(state) = self.start_iteration()? {
                let evaluation = match evaluator.evaluate(state) {
                    Ok(evaluation) => evaluation,
                    Err(e) => {
                        self.cancel_iteration();
                        return Err(e.into());
                    }
                };
                self.apply_simulation(evaluation)?;
            }
        }

        Ok(())
    }

    /// Performs the selection phase and returns the position that needs an
    /// external evaluation.
    ///
    /// This method transitions the MCTS instance from `Usable` to
    /// `AwaitingSimulation` when an evaluation is needed.
    ///
    /// # Returns
    /// - `Ok(Some(state))` with the evaluator input of the selected leaf (or of
    ///   the root, when it was never expanded).
    /// - `Ok(None)` when the selected leaf is terminal: its outcome was backed
    ///   up directly and the simulation is complete.
    /// - `Err(MctsError::InvalidState(_))` if the instance is not `Usable`.
    /// - `Err(MctsError::PreconditionViolation(_))` if the root position is finished.
    pub fn start_iteration(&mut self) -> Result<Option<T::State>, MctsError> {
        self.check_usable()?;
        self.config.validate()?;
        self.check_root_playable()?;

        let root = self.tree.root();
        let leaf = if self.tree.get(root).get().expanded {
            // a root inherited from `play` is already expanded
            self.apply_root_noise()?;

            let path = self.selection();
            let leaf = path[path.len() - 1];

            if let Some(outcome) = self.tree.get(leaf).get().outcome {
                self.backup(&path, outcome);
                self.simulations += 1;
                trace!(leaf = %leaf, depth = path.len(), value = outcome, "terminal backed up");
                return Ok(None);
            }
            leaf
        } else {
            root
        };

        let state = self.tree.get(leaf).get().game.get_state();
        self.latent = Some(leaf);
        self.state = MctsState::AwaitingSimulation;

        Ok(Some(state))
    }

    /// Completes a pending iteration with the evaluation of the selected leaf:
    /// expands the leaf and backs up the evaluated value.
    ///
    /// This method transitions the MCTS instance from `AwaitingSimulation`
    /// back to `Usable`, even when the evaluation is rejected; a rejected
    /// evaluation abandons the pending simulation.
    ///
    /// # Parameters
    /// - `evaluation`: The value and the action priors of the pending leaf.
    ///
    /// # Returns
    /// - `Ok(())` if the evaluation was applied.
    /// - `Err(MctsError::InvalidState(_))` if no iteration is pending.
    /// - `Err(MctsError::EvaluatorFailure(_))` if the evaluation is malformed.
    pub fn apply_simulation(&mut self, evaluation: (f64, [f64; N])) -> Result<(), MctsError> {
        if self.state != MctsState::AwaitingSimulation {
            return Err(MctsError::InvalidState(self.state));
        }
        let leaf = self.latent.take().ok_or(MctsError::InvalidState(self.state))?;
        self.state = MctsState::Usable;

        self.expand(leaf, &evaluation)?;

        if leaf == self.tree.root() {
            return self.apply_root_noise();
        }

        let path = self.tree.path_from_root(leaf);
        self.backup(&path, evaluation.0);
        self.simulations += 1;

        trace!(leaf = %leaf, depth = path.len(), value = evaluation.0, "simulation backed up");
        Ok(())
    }

    /// Drops a pending iteration, returning to the `Usable` state.
    pub fn cancel_iteration(&mut self) {
        self.latent = None;
        self.state = MctsState::Usable;
    }

    /// Runs `simulation_budget` more simulations from the root, without picking a move.
    ///
    /// # Returns
    /// The same errors as [`Mcts::search`].
    pub fn simulate(
        &mut self,
        evaluator: &dyn GameEvaluator<T, N>,
        simulation_budget: usize,
    ) -> Result<(), MctsError> {
        if simulation_budget < 1 {
            return Err(MctsError::InvalidConfiguration(format!(
                "simulation budget must be at least 1, got {simulation_budget}"
            )));
        }
        self.check_usable()?;
        self.config.validate()?;
        self.check_root_playable()?;

        for _ in 0..simulation_budget {
            self.iterate(evaluator)?;
        }

        Ok(())
    }

    /// Runs `simulation_budget` simulations from the root and picks a move.
    ///
    /// # Parameters
    /// - `evaluator`: The policy/value evaluator to use.
    /// - `simulation_budget`: The number of simulations, at least `1`.
    ///
    /// # Returns
    /// - `Ok(SearchResult)` with the chosen action (using the configured
    ///   temperature), the normalized visit distribution and the root value.
    /// - `Err(MctsError::InvalidConfiguration(_))` if the budget is `0` or the
    ///   configuration is invalid.
    /// - `Err(MctsError::PreconditionViolation(_))` if the root position is finished
    ///   or has no legal action.
    /// - `Err(MctsError::EvaluatorFailure(_))` if the evaluator fails.
    pub fn search(
        &mut self,
        evaluator: &dyn GameEvaluator<T, N>,
        simulation_budget: usize,
    ) -> Result<SearchResult<N>, MctsError> {
        self.simulate(evaluator, simulation_budget)?;

        let action = self.choose_action(self.config.temperature)?;
        let (value, policy) = self.get_result();

        debug!(
            simulations = simulation_budget,
            tree_size = self.tree.len(),
            root_value = value,
            action,
            "search complete"
        );

        Ok(SearchResult { action, policy, value, simulations: simulation_budget })
    }

    /// Visit counts of the root's children, indexed by action.
    pub fn get_visits(&self) -> [usize; N] {
        let mut visits = [0; N];
        let root = self.tree.get(self.tree.root());

        for &(action, child) in root.children() {
            visits[action] = self.tree.get(child).get().n;
        }

        visits
    }

    /// Gets the visit distribution of the root's children.
    ///
    /// # Returns
    /// Normalized visit counts indexed by action; all zeros before the first simulation.
    pub fn get_statistics(&self) -> [f64; N] {
        let visits = self.get_visits();
        let total: usize = visits.iter().sum();

        if total == 0 {
            return [0.0; N];
        }
        visits.map(|v| v as f64 / total as f64)
    }

    /// The most visited action at the root, the first one in action order on ties.
    pub fn best_action(&self) -> Option<usize> {
        let visits = self.get_visits();
        let max = visits.iter().copied().max().filter(|&max| max > 0)?;
        visits.iter().position(|&v| v == max)
    }

    /// Chooses an action from the root's visit counts.
    ///
    /// # Parameters
    /// - `temperature`: `0` for the most visited action, otherwise sampling
    ///   proportionally to `visits^(1/temperature)`.
    ///
    /// # Returns
    /// - `Err(MctsError::InvalidConfiguration(_))` for a negative or non-finite temperature.
    /// - `Err(MctsError::PreconditionViolation(_))` if no simulation reached a child.
    pub fn choose_action(&mut self, temperature: f64) -> Result<usize, MctsError> {
        validate_temperature(temperature)?;

        let best = self.best_action().ok_or_else(|| {
            MctsError::PreconditionViolation(
                "no simulation has reached a child of the root".to_string(),
            )
        })?;

        if temperature == 0.0 {
            return Ok(best);
        }

        let distribution = utils::temperature_distribution(&self.get_visits(), temperature);
        Ok(utils::sample(&distribution, &mut self.rng))
    }

    /// Gets the mean value of the root, from the perspective of the player to move there.
    #[inline]
    pub fn get_score(&self) -> f64 {
        self.tree.get(self.tree.root()).get().get_value()
    }

    /// Returns the root value and the visit distribution.
    #[inline]
    pub fn get_result(&self) -> (f64, [f64; N]) {
        (self.get_score(), self.get_statistics())
    }

    /// Commits `action`: the root moves to the corresponding child.
    ///
    /// The subtree of the child is kept with its statistics; every other branch
    /// is discarded. When the child was never created, the tree restarts from
    /// the new position.
    ///
    /// # Returns
    /// - `Err(MctsError::InvalidState(_))` if an iteration is pending.
    /// - `Err(MctsError::ActionOutOfRange(action, N))` if `action >= N`.
    /// - `Err(MctsError::InvalidAction(_))` if the action is not legal at the root.
    pub fn play(&mut self, action: usize) -> Result<(), MctsError> {
        self.check_usable()?;

        if action >= N {
            return Err(MctsError::ActionOutOfRange(action, N));
        }

        let root = self.tree.get(self.tree.root());
        if !root.get().game.get_actions()[action] {
            return Err(MctsError::InvalidAction(action));
        }

        match root.get_child(action) {
            Some(child) => self.tree.reroot(child),
            None => {
                let mut game = root.get().game.clone();
                game.play(action);
                self.tree = Tree::new(MctsNodeData::new::<N>(game, 1.0));
            }
        }

        self.simulations = 0;
        self.noised = false;
        Ok(())
    }

    /// Drops the whole tree and restarts from the root position.
    pub fn clear_tree(&mut self) -> Result<(), MctsError> {
        self.check_usable()?;

        let game = self.get_game().clone();
        self.tree = Tree::new(MctsNodeData::new::<N>(game, 1.0));
        self.simulations = 0;
        self.noised = false;
        Ok(())
    }
}

impl<T: Game<N>, const N: usize> Default for Mcts<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a complete search from `root` with the default configuration.
///
/// # Parameters
/// - `root`: The position to search from. It is cloned, never modified.
/// - `evaluator`: The policy/value evaluator.
/// - `simulation_budget`: The number of simulations, at least `1`.
/// - `temperature`: The move selection temperature, `0` for arg-max.
///
/// # Examples
/// ```rust
/// use quoridor_zero::{search, Game, MctsError};
/// use quoridor_zero::test_utils::{DuelGame, GameTest, GameEvaluatorTest2};
/// use quoridor_zero::UniformEvaluator;
///
/// fn main() -> Result<(), MctsError> {
///     let result = search::<DuelGame, 2>(&DuelGame::new(), &UniformEvaluator, 20, 0.0)?;
///     assert_eq!(result.action, DuelGame::WIN);
///
///     let result = search::<GameTest, 4>(&GameTest::new(), &GameEvaluatorTest2::new(), 100, 0.0)?;
///     assert!((result.policy.iter().sum::<f64>() - 1.0).abs() < 1e-9);
///     Ok(())
/// }
/// ```
pub fn search<T: Game<N>, const N: usize>(
    root: &T,
    evaluator: &dyn GameEvaluator<T, N>,
    simulation_budget: usize,
    temperature: f64,
) -> Result<SearchResult<N>, MctsError> {
    let config = MctsConfig::DEFAULT.with_temperature(temperature);
    Mcts::from_game_with_config(root.clone(), &config).search(evaluator, simulation_budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        approx_eq, compare_array, BrokenEvaluator, CountingEvaluator, DuelGame, GameEvaluatorTest,
        GameEvaluatorTest2, GameTest, StuckGame,
    };
    use crate::{PriorNormalization, UniformEvaluator};

    fn children_visits<T: Game<N>, const N: usize>(mcts: &Mcts<T, N>) -> usize {
        mcts.get_visits().iter().sum()
    }

    #[test]
    fn test_selection_on_fresh_root() {
        let mcts = Mcts::<GameTest, 4>::new();
        assert_eq!(mcts.selection(), vec![mcts.tree.root()]);
    }

    #[test]
    fn test_expansion_masks_and_renormalizes() -> Result<(), MctsError> {
        let mut game = GameTest::new();
        game.play(1);

        let mut mcts = Mcts::<GameTest, 4>::from_game(game);
        let evaluation = GameEvaluatorTest::new().evaluate(mcts.get_game().get_state())?;
        let root = mcts.tree.root();
        mcts.expand(root, &evaluation)?;

        let node = mcts.tree.get(root);
        assert!(node.get().expanded);
        assert!(node.get_child(1).is_none());

        let priors: [f64; 4] = std::array::from_fn(|a| {
            node.get_child(a).map_or(0.0, |child| mcts.tree.get(child).get().prior)
        });
        assert!(compare_array(&priors, &[0.09 / 0.89, 0.0, 0.41 / 0.89, 0.39 / 0.89]));

        let child = node.get_child(2).unwrap();
        assert_eq!(mcts.tree.get(child).get().game.get_state(), [1, 2, -1, -1]);
        assert_eq!(mcts.tree.get(child).get_action(), Some(2));
        Ok(())
    }

    #[test]
    fn test_additive_renormalization_in_expansion() -> Result<(), MctsError> {
        let mut game = GameTest::new();
        game.play(1);

        let config = MctsConfig::DEFAULT.with_prior_normalization(PriorNormalization::Additive);
        let mut mcts = Mcts::<GameTest, 4>::from_game_with_config(game, &config);
        let root = mcts.tree.root();
        mcts.expand(root, &(0.0, [0.09, 0.11, 0.41, 0.39]))?;

        let child = mcts.tree.get(root).get_child(0).unwrap();
        assert!(approx_eq(mcts.tree.get(child).get().prior, 0.09 + 0.11 / 3.0));
        Ok(())
    }

    #[test]
    fn test_double_expansion_is_rejected() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let root = mcts.tree.root();
        let evaluation = (0.0, [0.25; 4]);

        mcts.expand(root, &evaluation)?;
        let size = mcts.tree_size();

        assert!(matches!(
            mcts.expand(root, &evaluation),
            Err(MctsError::ExpansionConflict(id)) if id == root
        ));
        assert_eq!(mcts.tree_size(), size);
        Ok(())
    }

    #[test]
    fn test_terminal_children_cache_their_outcome() -> Result<(), MctsError> {
        let mut mcts = Mcts::<DuelGame, 2>::new();
        let root = mcts.tree.root();
        mcts.expand(root, &(0.0, [0.5, 0.5]))?;

        let win = mcts.tree.get(root).get_child(DuelGame::WIN).unwrap();
        let lose = mcts.tree.get(root).get_child(DuelGame::LOSE).unwrap();

        // the player to move in a finished position is the one who did not move
        assert_eq!(mcts.tree.get(win).get().outcome, Some(-1.0));
        assert_eq!(mcts.tree.get(lose).get().outcome, Some(1.0));
        Ok(())
    }

    #[test]
    fn test_backup_alternates_sign() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let root = mcts.tree.root();
        mcts.expand(root, &(0.0, [0.25; 4]))?;
        let child = mcts.tree.get(root).get_child(0).unwrap();
        mcts.expand(child, &(0.0, [0.25; 4]))?;
        let grandchild = mcts.tree.get(child).get_child(1).unwrap();

        mcts.backup(&[root, child, grandchild], 0.3);

        assert!(approx_eq(mcts.tree.get(grandchild).get().score, 0.3));
        assert!(approx_eq(mcts.tree.get(child).get().score, -0.3));
        assert!(approx_eq(mcts.tree.get(root).get().score, 0.3));
        for id in [root, child, grandchild] {
            assert_eq!(mcts.tree.get(id).get().n, 1);
        }
        Ok(())
    }

    #[test]
    fn test_first_iteration_expands_root() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let evaluator = CountingEvaluator::new(GameEvaluatorTest::new());

        mcts.iterate(&evaluator)?;

        // one evaluation for the root, one for the selected child
        assert_eq!(evaluator.calls(), 2);
        assert_eq!(mcts.simulations(), 1);
        assert_eq!(mcts.count_visit(), 1);
        assert_eq!(children_visits(&mcts), 1);
        assert!(!mcts.is_finish());
        Ok(())
    }

    #[test]
    fn test_visit_conservation() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let result = mcts.search(&GameEvaluatorTest::new(), 50)?;

        assert_eq!(result.simulations, 50);
        assert_eq!(children_visits(&mcts), 50);
        assert_eq!(mcts.count_visit(), 50);

        // an expanded non-root node also counts the visit that expanded it
        let root = mcts.tree.get(mcts.tree.root());
        for &(_, child) in root.children() {
            let node = mcts.tree.get(child);
            if node.get().expanded {
                let below: usize =
                    node.children().iter().map(|(_, id)| mcts.tree.get(*id).get().n).sum();
                assert_eq!(node.get().n, below + 1);
            }
        }
        Ok(())
    }

    #[test]
    fn test_every_child_tried_before_revisits() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        mcts.search(&UniformEvaluator, 5)?;

        assert!(mcts.get_visits().iter().all(|&v| v >= 1));
        Ok(())
    }

    #[test]
    fn test_distribution_validity() -> Result<(), MctsError> {
        let mut game = GameTest::new();
        game.play(2);

        let result = search::<GameTest, 4>(&game, &GameEvaluatorTest2::new(), 40, 0.0)?;

        assert!(approx_eq(result.policy.iter().sum::<f64>(), 1.0));
        assert_eq!(result.policy[2], 0.0);
        assert!(result.policy.iter().all(|&p| p >= 0.0));
        Ok(())
    }

    #[test]
    fn test_determinism() -> Result<(), MctsError> {
        let first = search::<GameTest, 4>(&GameTest::new(), &GameEvaluatorTest::new(), 37, 0.0)?;
        let second = search::<GameTest, 4>(&GameTest::new(), &GameEvaluatorTest::new(), 37, 0.0)?;

        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_temperature_zero_picks_most_visited() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let result = mcts.search(&GameEvaluatorTest2::new(), 30)?;

        let visits = mcts.get_visits();
        let max = *visits.iter().max().unwrap();
        assert_eq!(visits[result.action], max);
        assert_eq!(visits.iter().position(|&v| v == max), Some(result.action));
        assert_eq!(mcts.best_action(), Some(result.action));
        Ok(())
    }

    #[test]
    fn test_terminal_short_circuit() -> Result<(), MctsError> {
        let evaluator = CountingEvaluator::new(UniformEvaluator);
        let mut mcts = Mcts::<DuelGame, 2>::new();

        mcts.search(&evaluator, 20)?;

        // only the root is ever evaluated, both children are terminal
        assert_eq!(evaluator.calls(), 1);
        assert_eq!(children_visits(&mcts), 20);
        Ok(())
    }

    #[test]
    fn test_winning_move_is_found() -> Result<(), MctsError> {
        for exploration_coef in [0.1, 1.0, 5.0] {
            let config = MctsConfig::DEFAULT.with_exploration_coef(exploration_coef);
            let mut mcts = Mcts::<DuelGame, 2>::from_game_with_config(DuelGame::new(), &config);

            let result = mcts.search(&UniformEvaluator, 20)?;

            assert_eq!(result.action, DuelGame::WIN);
            assert!(result.policy[DuelGame::WIN] > result.policy[DuelGame::LOSE]);
            assert!(result.value > 0.0);
        }
        Ok(())
    }

    #[test]
    fn test_terminal_values_are_ground_truth() -> Result<(), MctsError> {
        // the evaluator claims every position is lost for the mover, the outcome says otherwise
        struct Pessimist;
        impl GameEvaluator<DuelGame, 2> for Pessimist {
            fn evaluate(&self, _state: Option<usize>) -> Result<(f64, [f64; 2]), EvaluatorError> {
                Ok((-1.0, [0.01, 0.99]))
            }
        }

        let mut mcts = Mcts::<DuelGame, 2>::new();
        mcts.search(&Pessimist, 10)?;

        let root = mcts.tree.get(mcts.tree.root());
        let win = mcts.tree.get(root.get_child(DuelGame::WIN).unwrap()).get();
        assert!(win.n > 0);
        assert!(approx_eq(win.get_value(), -1.0));
        Ok(())
    }

    #[test]
    fn test_first_simulation_ignores_priors() -> Result<(), MctsError> {
        struct Skewed;
        impl GameEvaluator<GameTest, 4> for Skewed {
            fn evaluate(&self, _state: [i32; 4]) -> Result<(f64, [f64; 4]), EvaluatorError> {
                Ok((0.0, [0.001, 0.001, 0.001, 0.997]))
            }
        }

        // the root has no visit yet, every exploration term is zero
        let mut mcts = Mcts::<GameTest, 4>::new();
        mcts.simulate(&Skewed, 1)?;
        assert_eq!(mcts.get_visits(), [1, 0, 0, 0]);

        mcts.simulate(&Skewed, 1)?;
        assert_eq!(mcts.get_visits(), [1, 0, 0, 1]);
        Ok(())
    }

    #[test]
    fn test_rerooting_preserves_statistics() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let evaluator = GameEvaluatorTest2::new();
        let result = mcts.search(&evaluator, 40)?;

        let root = mcts.tree.get(mcts.tree.root());
        let child = mcts.tree.get(root.get_child(result.action).unwrap()).get();
        let (n, score) = (child.n, child.score);
        let grandchildren = mcts.tree.get(root.get_child(result.action).unwrap()).children().len();

        mcts.play(result.action)?;

        let new_root = mcts.tree.get(mcts.tree.root());
        assert!(new_root.is_root());
        assert_eq!(new_root.get().n, n);
        assert_eq!(new_root.get().score, score);
        assert_eq!(new_root.children().len(), grandchildren);
        assert_eq!(mcts.count_visit(), n);
        assert_eq!(mcts.simulations(), 0);
        assert_eq!(mcts.get_game().get_state()[0], result.action as i32);

        let before = children_visits(&mcts);
        mcts.search(&evaluator, 10)?;
        assert_eq!(children_visits(&mcts), before + 10);
        Ok(())
    }

    #[test]
    fn test_play_unexplored_action() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        mcts.play(3)?;

        assert_eq!(mcts.get_game().get_state(), [3, -1, -1, -1]);
        assert_eq!(mcts.count_visit(), 0);
        assert_eq!(mcts.tree_size(), 1);
        Ok(())
    }

    #[test]
    fn test_play_invalid_actions() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();

        assert!(matches!(mcts.play(4), Err(MctsError::ActionOutOfRange(4, 4))));
        mcts.play(0)?;
        assert!(matches!(mcts.play(0), Err(MctsError::InvalidAction(0))));
        Ok(())
    }

    #[test]
    fn test_two_phase_matches_iterate() -> Result<(), MctsError> {
        let evaluator = GameEvaluatorTest2::new();

        let mut direct = Mcts::<GameTest, 4>::new();
        for _ in 0..18 {
            direct.iterate(&evaluator)?;
        }

        let mut split = Mcts::<GameTest, 4>::new();
        while split.simulations() < 18 {
            if let Some(state) = split.start_iteration()? {
                assert_eq!(split.get_state(), MctsState::AwaitingSimulation);
                split.apply_simulation(evaluator.evaluate(state)?)?;
            }
        }

        assert_eq!(direct.get_visits(), split.get_visits());
        assert!(approx_eq(direct.get_score(), split.get_score()));
        Ok(())
    }

    #[test]
    fn test_two_phase_state_checks() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();

        assert!(matches!(
            mcts.apply_simulation((0.0, [0.25; 4])),
            Err(MctsError::InvalidState(MctsState::Usable))
        ));

        mcts.start_iteration()?;
        let awaiting = MctsState::AwaitingSimulation;
        assert!(matches!(mcts.start_iteration(), Err(MctsError::InvalidState(s)) if s == awaiting));
        assert!(matches!(mcts.play(0), Err(MctsError::InvalidState(s)) if s == awaiting));

        mcts.cancel_iteration();
        assert_eq!(mcts.get_state(), MctsState::Usable);
        Ok(())
    }

    #[test]
    fn test_invalid_budget() {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let result = mcts.search(&UniformEvaluator, 0);
        assert!(matches!(result, Err(MctsError::InvalidConfiguration(_))));
        assert_eq!(mcts.tree_size(), 1);
    }

    #[test]
    fn test_invalid_temperature() {
        let result = search::<GameTest, 4>(&GameTest::new(), &UniformEvaluator, 10, -1.0);
        assert!(matches!(result, Err(MctsError::InvalidConfiguration(_))));

        let result = search::<GameTest, 4>(&GameTest::new(), &UniformEvaluator, 10, f64::NAN);
        assert!(matches!(result, Err(MctsError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_terminal_root_is_rejected() {
        let mut game = DuelGame::new();
        game.play(DuelGame::WIN);

        let evaluator = CountingEvaluator::new(UniformEvaluator);
        let result = search::<DuelGame, 2>(&game, &evaluator, 10, 0.0);

        assert!(matches!(result, Err(MctsError::PreconditionViolation(_))));
        assert_eq!(evaluator.calls(), 0);
    }

    #[test]
    fn test_stuck_position_is_rejected() {
        let result = search::<StuckGame, 2>(&StuckGame, &UniformEvaluator, 10, 0.0);
        assert!(matches!(result, Err(MctsError::PreconditionViolation(_))));
    }

    #[test]
    fn test_malformed_evaluation_is_propagated() {
        let mut mcts = Mcts::<GameTest, 4>::new();
        let result = mcts.search(&BrokenEvaluator, 10);

        assert!(matches!(result, Err(MctsError::EvaluatorFailure(EvaluatorError::Malformed(_)))));
        assert_eq!(mcts.get_state(), MctsState::Usable);
        assert_eq!(mcts.tree_size(), 1);
    }

    #[test]
    fn test_failing_evaluator_is_propagated() {
        struct Offline;
        impl GameEvaluator<GameTest, 4> for Offline {
            fn evaluate(&self, _state: [i32; 4]) -> Result<(f64, [f64; 4]), EvaluatorError> {
                Err(EvaluatorError::Failed("offline".to_string()))
            }
        }

        let mut mcts = Mcts::<GameTest, 4>::new();
        let result = mcts.iterate(&Offline);
        assert!(matches!(result, Err(MctsError::EvaluatorFailure(EvaluatorError::Failed(_)))));
        assert_eq!(mcts.get_state(), MctsState::Usable);
    }

    #[test]
    fn test_temperature_sampling_is_seeded() -> Result<(), MctsError> {
        let config = MctsConfig::DEFAULT.with_temperature(1.0).with_seed(5);

        let actions: Vec<usize> = (0..2)
            .map(|_| {
                Mcts::<GameTest, 4>::from_game_with_config(GameTest::new(), &config)
                    .search(&GameEvaluatorTest::new(), 30)
                    .map(|result| result.action)
            })
            .collect::<Result<_, _>>()?;

        assert_eq!(actions[0], actions[1]);
        assert!(actions[0] < 4);
        Ok(())
    }

    #[test]
    fn test_dirichlet_noise_keeps_priors_normalized() -> Result<(), MctsError> {
        let config = MctsConfig::DEFAULT.with_dirichlet(0.3, 0.25).with_seed(9);
        let mut mcts = Mcts::<GameTest, 4>::from_game_with_config(GameTest::new(), &config);

        mcts.iterate(&GameEvaluatorTest::new())?;

        let root = mcts.tree.get(mcts.tree.root());
        let priors: Vec<f64> =
            root.children().iter().map(|(_, id)| mcts.tree.get(*id).get().prior).collect();
        assert!((priors.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        let noisy = [priors[0], priors[1], priors[2], priors[3]];
        assert!(!compare_array(&noisy, &[0.2, 0.7, 0.06, 0.04]));
        Ok(())
    }

    #[test]
    fn test_dirichlet_noise_after_rerooting() -> Result<(), MctsError> {
        let config = MctsConfig::DEFAULT.with_dirichlet(0.3, 0.25).with_seed(2);
        let mut mcts = Mcts::<GameTest, 4>::from_game_with_config(GameTest::new(), &config);
        let evaluator = GameEvaluatorTest::new();

        let result = mcts.search(&evaluator, 30)?;
        mcts.play(result.action)?;
        assert!(!mcts.noised);

        mcts.iterate(&evaluator)?;
        assert!(mcts.noised);

        let root = mcts.tree.get(mcts.tree.root());
        let total: f64 = root.children().iter().map(|(_, id)| mcts.tree.get(*id).get().prior).sum();
        assert!((total - 1.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_ucb1_selection() -> Result<(), MctsError> {
        let config = MctsConfig::DEFAULT.with_selection_function(ucb1::<4>);
        let mut mcts = Mcts::<GameTest, 4>::from_game_with_config(GameTest::new(), &config);

        mcts.search(&GameEvaluatorTest2::new(), 30)?;
        assert_eq!(children_visits(&mcts), 30);
        assert!(mcts.get_visits().iter().all(|&v| v >= 1));
        Ok(())
    }

    #[test]
    fn test_clear_tree() -> Result<(), MctsError> {
        let mut mcts = Mcts::<GameTest, 4>::new();
        mcts.search(&GameEvaluatorTest::new(), 10)?;

        mcts.clear_tree()?;
        assert_eq!(mcts.tree_size(), 1);
        assert_eq!(mcts.count_visit(), 0);
        assert_eq!(mcts.get_statistics(), [0.0; 4]);
        Ok(())
    }
}
