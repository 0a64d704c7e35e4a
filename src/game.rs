//! Module defining traits for games and game evaluators used in MCTS.

use std::fmt::Debug;

use thiserror::Error;

/// Tolerance accepted around the `[-1, 1]` value range of an evaluation.
const VALUE_TOLERANCE: f64 = 1e-6;

/// Trait defining the interface for a two-player, perfect-information,
/// zero-sum game that can be searched with MCTS.
///
/// Actions are identified by their index in a fixed action space of `N`
/// entries. The game is a value type: the search clones it once per tree edge,
/// so implementations should keep it cheap to copy.
///
/// # Type Parameters
/// - `N`: The number of possible actions in the game. This is a constant generic
///        parameter, meaning the action space is fixed at compile time.
pub trait Game<const N: usize>: Clone {
    /// The representation of the position handed to a [`GameEvaluator`]
    /// (typically the input planes of a neural network). Self-play keeps a
    /// copy of it for every recorded position.
    ///
    /// The value an evaluator returns is read from the perspective of the
    /// player to move, so the state should let it tell who that is. States
    /// that leave it out, like [`crate::quoridor::Quoridor::features`], put
    /// that burden on the evaluator.
    type State: Clone;

    /// Identity of the player who acts in a position.
    type Player: Copy + PartialEq + Debug;

    /// Creates a new instance of the game in its initial position.
    ///
    /// # Examples
    /// ```rust
    /// use quoridor_zero::Game;
    /// use quoridor_zero::test_utils::GameTest;
    /// let game = GameTest::new();
    /// assert!(!game.is_finish());
    /// ```
    fn new() -> Self;

    /// Returns a mask of the actions playable from the current position.
    ///
    /// `true` at index `i` means action `i` is legal. The legal-action
    /// enumeration order used by the search is ascending index.
    ///
    /// # Examples
    /// ```rust
    /// use quoridor_zero::Game;
    /// use quoridor_zero::test_utils::GameTest;
    /// let game = GameTest::new();
    /// assert_eq!(game.get_actions(), [true, true, true, true]);
    /// ```
    fn get_actions(&self) -> [bool; N];

    /// Determines if the game has reached a terminal position.
    fn is_finish(&self) -> bool;

    /// Applies a legal action, handing the move to the other player.
    ///
    /// # Panics
    /// The action is assumed to be legal according to `get_actions`. Playing an
    /// illegal action is implementation-defined and may panic.
    fn play(&mut self, action: usize);

    /// Returns the evaluator-facing representation of the current position.
    fn get_state(&self) -> Self::State;

    /// Returns the player to move.
    fn current_player(&self) -> Self::Player;

    /// Returns the definitive outcome of a finished game from `player`'s
    /// perspective.
    ///
    /// - `1.0`: `player` won.
    /// - `0.0`: Draw.
    /// - `-1.0`: `player` lost.
    ///
    /// # Returns
    /// `None` while the game is not finished.
    fn get_result(&self, player: Self::Player) -> Option<f64>;
}

/// Errors raised by an evaluator, or detected while checking its output.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// The evaluator produced values outside of its contract
    /// (non-finite numbers, negative priors, value outside `[-1, 1]`).
    #[error("malformed evaluation: {0}")]
    Malformed(String),

    /// The policy head produced a vector of the wrong size.
    #[error("policy has {actual} entries, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The evaluator itself failed (inference backend error, ...).
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Trait for evaluating game states and providing priors over actions.
///
/// At inference time this is backed by the policy-value network; the search
/// only sees this function, which keeps it independent of network internals.
///
/// # Type Parameters
/// - `T`: The game type that this evaluator is designed for.
/// - `N`: The number of possible actions in the game.
pub trait GameEvaluator<T: Game<N>, const N: usize> {
    /// Evaluates a game state.
    ///
    /// # Returns
    /// A tuple containing:
    /// - `f64`: The value of the state in `[-1.0, 1.0]`, from the perspective
    ///   of the player to move.
    /// - `[f64; N]`: Prior probabilities over the whole action space. The
    ///   search restricts and renormalizes them to the legal actions.
    ///
    /// # Examples
    /// ```rust
    /// use quoridor_zero::{test_utils::{GameTest, GameEvaluatorTest2}, Game, GameEvaluator};
    /// let evaluator = GameEvaluatorTest2::new();
    /// let game = GameTest::new();
    /// let (value, policy) = evaluator.evaluate(game.get_state()).unwrap();
    /// assert_eq!(value, 0.0);
    /// assert_eq!(policy.len(), 4);
    /// ```
    fn evaluate(&self, state: T::State) -> Result<(f64, [f64; N]), EvaluatorError>;

    /// Evaluates several states at once.
    ///
    /// The default implementation calls [`GameEvaluator::evaluate`] in a loop;
    /// network-backed evaluators override it to run a single forward pass.
    fn evaluate_batch(
        &self,
        states: Vec<T::State>,
    ) -> Result<Vec<(f64, [f64; N])>, EvaluatorError> {
        states.into_iter().map(|state| self.evaluate(state)).collect()
    }
}

/// Checks that an evaluation respects the evaluator contract.
///
/// The value must be finite and lie in `[-1, 1]`, every prior must be finite
/// and non-negative.
pub fn validate_evaluation<const N: usize>(
    evaluation: &(f64, [f64; N]),
) -> Result<(), EvaluatorError> {
    let (value, policy) = evaluation;

    if !value.is_finite() || value.abs() > 1.0 + VALUE_TOLERANCE {
        return Err(EvaluatorError::Malformed(format!("value {value} is outside [-1, 1]")));
    }

    let invalid = policy.iter().enumerate().find(|(_, p)| !p.is_finite() || **p < 0.0);
    if let Some((index, prior)) = invalid {
        return Err(EvaluatorError::Malformed(format!("prior {prior} for action {index}")));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_regular_evaluation() {
        assert!(validate_evaluation(&(0.5, [0.25, 0.25, 0.5, 0.0])).is_ok());
        assert!(validate_evaluation(&(-1.0, [0.0; 3])).is_ok());
        assert!(validate_evaluation(&(1.0, [1.0, 0.0])).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_value() {
        let malformed = |value: f64| {
            matches!(validate_evaluation(&(value, [0.5, 0.5])), Err(EvaluatorError::Malformed(_)))
        };
        assert!(malformed(f64::NAN));
        assert!(malformed(1.5));
        assert!(malformed(f64::NEG_INFINITY));
    }

    #[test]
    fn test_validate_rejects_bad_prior() {
        let malformed = |policy: [f64; 2]| {
            matches!(validate_evaluation(&(0.0, policy)), Err(EvaluatorError::Malformed(_)))
        };
        assert!(malformed([0.5, f64::NAN]));
        assert!(malformed([-0.1, 1.1]));
    }
}
