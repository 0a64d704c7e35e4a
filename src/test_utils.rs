//! Test utilities for MCTS implementation

use std::cell::Cell;

use crate::{EvaluatorError, Game, GameEvaluator};

/// A simple test game implementation
///
/// Two players alternately pick one of four numbers, each number once. Player
/// `0` scores the first and third picks, player `1` the second and fourth; the
/// higher total wins.
#[derive(Clone, Debug)]
pub struct GameTest {
    state: Vec<i32>,
}

impl Game<4> for GameTest {
    type State = [i32; 4];
    type Player = usize;

    fn new() -> Self {
        GameTest { state: Vec::<i32>::new() }
    }

    fn get_actions(&self) -> [bool; 4] {
        if self.is_finish() {
            return [false; 4];
        }
        std::array::from_fn(|index| !self.state.contains(&(index as i32)))
    }

    fn is_finish(&self) -> bool {
        self.state.len() == 4
    }

    fn play(&mut self, action: usize) {
        self.state.push(action as i32);
    }

    fn get_state(&self) -> Self::State {
        std::array::from_fn(|index| if index < self.state.len() { self.state[index] } else { -1 })
    }

    fn current_player(&self) -> usize {
        self.state.len() % 2
    }

    fn get_result(&self, player: usize) -> Option<f64> {
        if self.state.len() != 4 {
            return None;
        }

        let rel = (self.state[0] + self.state[2]) - (self.state[1] + self.state[3]);
        let first = match rel.signum() {
            0 => 0.0,
            1 => 1.0,
            _ => -1.0,
        };

        Some(if player == 0 { first } else { -first })
    }
}

/// A simple test evaluator implementation
pub struct GameEvaluatorTest;

impl GameEvaluatorTest {
    #[allow(dead_code)]
    pub fn new() -> Self {
        GameEvaluatorTest {}
    }
}

impl GameEvaluator<GameTest, 4> for GameEvaluatorTest {
    fn evaluate(
        &self,
        state: <GameTest as Game<4>>::State,
    ) -> Result<(f64, [f64; 4]), EvaluatorError> {
        let last = state.into_iter().filter(|i| *i != -1).last();

        Ok(match last {
            Some(0) => (-0.2, [0.41, 0.39, 0.09, 0.11]),
            Some(1) => (0.2, [0.09, 0.11, 0.41, 0.39]),
            Some(2) => (-0.9, [0.1, 0.12, 0.13, 0.65]),
            Some(3) => (0.9, [0.13, 0.65, 0.1, 0.12]),
            Some(_) => (0.0, [0.25, 0.25, 0.25, 0.25]),
            None => (0.0, [0.2, 0.7, 0.06, 0.04]),
        })
    }
}

/// Another test evaluator implementation with different behavior
pub struct GameEvaluatorTest2;

impl GameEvaluatorTest2 {
    #[allow(dead_code)]
    pub fn new() -> Self {
        GameEvaluatorTest2 {}
    }
}

impl GameEvaluator<GameTest, 4> for GameEvaluatorTest2 {
    fn evaluate(
        &self,
        state: <GameTest as Game<4>>::State,
    ) -> Result<(f64, [f64; 4]), EvaluatorError> {
        let last = state.into_iter().filter(|i| *i != -1).last();

        Ok(match last {
            Some(0) => (0.5, [0.1, 0.15, 0.25, 0.5]),
            Some(1) => (0.25, [0.1, 0.15, 0.25, 0.5]),
            Some(2) => (-0.25, [0.1, 0.15, 0.25, 0.5]),
            Some(3) => (-0.5, [0.1, 0.15, 0.25, 0.5]),
            Some(_) => (0.0, [0.25, 0.25, 0.25, 0.25]),
            None => (0.0, [0.1, 0.15, 0.25, 0.5]),
        })
    }
}

/// One-move game: action `0` wins immediately for the mover, action `1` loses
/// immediately.
#[derive(Clone, Debug, Default)]
pub struct DuelGame {
    played: Option<usize>,
}

impl DuelGame {
    pub const WIN: usize = 0;
    pub const LOSE: usize = 1;
}

impl Game<2> for DuelGame {
    type State = Option<usize>;
    type Player = usize;

    fn new() -> Self {
        DuelGame { played: None }
    }

    fn get_actions(&self) -> [bool; 2] {
        if self.played.is_some() { [false, false] } else { [true, true] }
    }

    fn is_finish(&self) -> bool {
        self.played.is_some()
    }

    fn play(&mut self, action: usize) {
        self.played = Some(action);
    }

    fn get_state(&self) -> Self::State {
        self.played
    }

    fn current_player(&self) -> usize {
        if self.played.is_some() { 1 } else { 0 }
    }

    fn get_result(&self, player: usize) -> Option<f64> {
        let mover_wins = self.played? == Self::WIN;
        Some(if mover_wins == (player == 0) { 1.0 } else { -1.0 })
    }
}

/// A broken game that reports no legal action while not being finished.
#[derive(Clone, Debug, Default)]
pub struct StuckGame;

impl Game<2> for StuckGame {
    type State = ();
    type Player = usize;

    fn new() -> Self {
        StuckGame
    }

    fn get_actions(&self) -> [bool; 2] {
        [false, false]
    }

    fn is_finish(&self) -> bool {
        false
    }

    fn play(&mut self, _action: usize) {}

    fn get_state(&self) -> Self::State {}

    fn current_player(&self) -> usize {
        0
    }

    fn get_result(&self, _player: usize) -> Option<f64> {
        None
    }
}

/// Wraps an evaluator and counts how many positions it was asked to evaluate.
pub struct CountingEvaluator<E> {
    inner: E,
    calls: Cell<usize>,
}

impl<E> CountingEvaluator<E> {
    pub fn new(inner: E) -> Self {
        CountingEvaluator { inner, calls: Cell::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl<T: Game<N>, E: GameEvaluator<T, N>, const N: usize> GameEvaluator<T, N>
    for CountingEvaluator<E>
{
    fn evaluate(&self, state: T::State) -> Result<(f64, [f64; N]), EvaluatorError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.evaluate(state)
    }
}

/// Evaluator returning a non-finite value.
pub struct BrokenEvaluator;

impl<T: Game<N>, const N: usize> GameEvaluator<T, N> for BrokenEvaluator {
    fn evaluate(&self, _state: T::State) -> Result<(f64, [f64; N]), EvaluatorError> {
        Ok((f64::NAN, [1.0 / N as f64; N]))
    }
}

/// Utility function to compare float arrays with tolerance
///
/// # Parameters
/// - `a`: First array
/// - `b`: Second array
///
/// # Returns
/// `true` if all elements are approximately equal
#[allow(dead_code)]
pub fn compare_array<const N: usize>(a: &[f64; N], b: &[f64; N]) -> bool {
    (0..N).all(|index| approx_eq(a[index], b[index]))
}

/// Compares two floats with a `1e-8` tolerance.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-8
}
