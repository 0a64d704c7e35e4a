//! Evaluator adapters.
//!
//! The search consumes a [`GameEvaluator`]. These adapters turn the usual
//! shapes of evaluators into one: a neutral uniform prior, and the raw output
//! of a policy-value network.

use std::marker::PhantomData;

use crate::{EvaluatorError, Game, GameEvaluator};

/// Uniform evaluator that assigns the same prior to every action.
/// Value is always `0.0`. Useful to search without a model.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    /// Creates the evaluator. It has no state, `UniformEvaluator` itself works too.
    pub fn new() -> Self {
        UniformEvaluator
    }
}

impl<T: Game<N>, const N: usize> GameEvaluator<T, N> for UniformEvaluator {
    fn evaluate(&self, _state: T::State) -> Result<(f64, [f64; N]), EvaluatorError> {
        Ok((0.0, [1.0 / N as f64; N]))
    }
}

/// Raw output of a policy-value network for one position.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOutput {
    /// Policy head, one entry per action of the action space.
    pub policy: Vec<f32>,
    /// Value head, from the perspective of the player to move.
    pub value: f32,
}

/// What the policy head of a network produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyFormat {
    /// Already a probability distribution.
    #[default]
    Probabilities,
    /// Unnormalized logits, turned into probabilities with a softmax.
    Logits,
}

/// Adapts an inference function to the [`GameEvaluator`] interface.
///
/// The wrapped function receives the evaluator input of a position and returns
/// the raw network output. The adapter checks the policy dimension and converts
/// the heads to the representation used by the search.
///
/// # Examples
/// ```rust
/// use quoridor_zero::{GameEvaluator, NetworkEvaluator, NetworkOutput, PolicyFormat, Game};
/// use quoridor_zero::test_utils::GameTest;
///
/// let evaluator = NetworkEvaluator::<GameTest, _, 4>::new(
///     |_state: &[i32; 4]| Ok(NetworkOutput { policy: vec![0.0, 0.0, 0.0, 0.0], value: 0.5 }),
///     PolicyFormat::Logits,
/// );
///
/// let (value, policy) = evaluator.evaluate(GameTest::new().get_state()).unwrap();
/// assert_eq!(value, 0.5);
/// assert_eq!(policy, [0.25; 4]);
/// ```
pub struct NetworkEvaluator<T, F, const N: usize> {
    inference: F,
    format: PolicyFormat,
    _game: PhantomData<fn() -> T>,
}

impl<T, F, const N: usize> NetworkEvaluator<T, F, N>
where
    T: Game<N>,
    F: Fn(&T::State) -> Result<NetworkOutput, EvaluatorError>,
{
    /// Wraps an inference function.
    ///
    /// # Parameters
    /// - `inference`: Runs the network on one state.
    /// - `format`: Whether the network policy head outputs probabilities or logits.
    pub fn new(inference: F, format: PolicyFormat) -> Self {
        NetworkEvaluator { inference, format, _game: PhantomData }
    }

    fn convert(&self, output: NetworkOutput) -> Result<(f64, [f64; N]), EvaluatorError> {
        if output.policy.len() != N {
            let actual = output.policy.len();
            return Err(EvaluatorError::DimensionMismatch { expected: N, actual });
        }

        let mut policy: [f64; N] = std::array::from_fn(|i| output.policy[i] as f64);
        if self.format == PolicyFormat::Logits {
            policy = softmax(&policy)?;
        }

        Ok((output.value as f64, policy))
    }
}

impl<T, F, const N: usize> GameEvaluator<T, N> for NetworkEvaluator<T, F, N>
where
    T: Game<N>,
    F: Fn(&T::State) -> Result<NetworkOutput, EvaluatorError>,
{
    fn evaluate(&self, state: T::State) -> Result<(f64, [f64; N]), EvaluatorError> {
        let output = (self.inference)(&state)?;
        self.convert(output)
    }
}

/// Numerically stable softmax.
fn softmax<const N: usize>(logits: &[f64; N]) -> Result<[f64; N], EvaluatorError> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(EvaluatorError::Malformed(format!("logits are not finite (max {max})")));
    }

    let exp = logits.map(|l| (l - max).exp());
    let total: f64 = exp.iter().sum();
    Ok(exp.map(|e| e / total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{compare_array, GameTest};

    #[test]
    fn test_uniform_evaluator() -> Result<(), EvaluatorError> {
        let evaluator = UniformEvaluator::new();
        let state = GameTest::new().get_state();
        let (value, policy) = GameEvaluator::<GameTest, 4>::evaluate(&evaluator, state)?;

        assert_eq!(value, 0.0);
        assert!(compare_array(&policy, &[0.25; 4]));
        Ok(())
    }

    #[test]
    fn test_network_probabilities_pass_through() -> Result<(), EvaluatorError> {
        let evaluator = NetworkEvaluator::<GameTest, _, 4>::new(
            |_: &[i32; 4]| Ok(NetworkOutput { policy: vec![0.1, 0.2, 0.3, 0.4], value: -0.25 }),
            PolicyFormat::Probabilities,
        );

        let (value, policy) = evaluator.evaluate(GameTest::new().get_state())?;
        assert_eq!(value, -0.25);
        assert!((policy[3] - 0.4).abs() < 1e-6);
        assert!((policy[0] - 0.1).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_network_logits_are_softmaxed() -> Result<(), EvaluatorError> {
        let evaluator = NetworkEvaluator::<GameTest, _, 4>::new(
            |_: &[i32; 4]| Ok(NetworkOutput { policy: vec![1000.0, 1000.0, 0.0, 0.0], value: 0.0 }),
            PolicyFormat::Logits,
        );

        let (_, policy) = evaluator.evaluate(GameTest::new().get_state())?;
        assert!(compare_array(&policy, &[0.5, 0.5, 0.0, 0.0]));
        Ok(())
    }

    #[test]
    fn test_network_dimension_mismatch() {
        let evaluator = NetworkEvaluator::<GameTest, _, 4>::new(
            |_: &[i32; 4]| Ok(NetworkOutput { policy: vec![0.5, 0.5], value: 0.0 }),
            PolicyFormat::Probabilities,
        );

        let result = evaluator.evaluate(GameTest::new().get_state());
        assert!(matches!(
            result,
            Err(EvaluatorError::DimensionMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_network_failure_is_propagated() {
        let evaluator = NetworkEvaluator::<GameTest, _, 4>::new(
            |_: &[i32; 4]| Err(EvaluatorError::Failed("backend unavailable".to_string())),
            PolicyFormat::Probabilities,
        );

        let result = evaluator.evaluate(GameTest::new().get_state());
        assert!(matches!(result, Err(EvaluatorError::Failed(_))));
    }

    #[test]
    fn test_batch_defaults_to_loop() -> Result<(), EvaluatorError> {
        let evaluator = UniformEvaluator::new();
        let states = vec![GameTest::new().get_state(); 3];
        let evaluations = GameEvaluator::<GameTest, 4>::evaluate_batch(&evaluator, states)?;
        assert_eq!(evaluations.len(), 3);
        Ok(())
    }
}
