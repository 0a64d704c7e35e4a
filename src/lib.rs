//! AlphaZero-style Monte Carlo Tree Search for self-play on Quoridor.
//!
//! The search is generic over any two-player, zero-sum, perfect-information
//! game exposing a fixed action space of `N` indices, and over any evaluator
//! producing a value and action priors for a position. A Quoridor rules
//! engine is provided as the concrete game.
//!
//! # Modules
//! - `game`: Defines traits for game logic and position evaluation.
//! - `tree`: Arena tree addressed by node ids, with re-rooting.
//! - `mcts`: The search engine: selection, expansion, backup, move choice.
//! - `config`: Search and self-play settings.
//! - `evaluator`: Ready-made evaluators and the network output adapter.
//! - `self_play`: Self-play game generation and training sample export.
//! - `quoridor`: The Quoridor rules.
//! - `utils`: Sampling helpers.
//! - `test_utils`: Provides toy games and evaluators for tests.
//!
//! # Examples
//! ```rust
//! use quoridor_zero::{Mcts, test_utils::{GameTest, GameEvaluatorTest2}, MctsError};
//!
//! fn main() -> Result<(), MctsError> {
//!     let mut mcts = Mcts::<GameTest, 4>::new();
//!     let evaluator = GameEvaluatorTest2::new();
//!
//!     // 100 simulations, then the most visited action
//!     let result = mcts.search(&evaluator, 100)?;
//!     println!("value: {}, policy: {:?}", result.value, result.policy);
//!
//!     // Keep the subtree of the played action for the next search
//!     mcts.play(result.action)?;
//!     mcts.search(&evaluator, 100)?;
//!     Ok(())
//! }
//! ```

mod config;
mod evaluator;
mod game;
mod mcts;
mod self_play;
mod tree;
pub mod quoridor;
pub mod utils;

#[doc(hidden)]
pub mod test_utils;

pub use config::*;
pub use evaluator::*;
pub use game::*;
pub use mcts::*;
pub use self_play::*;
pub use tree::{Node, NodeId, Tree};
