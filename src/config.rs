//! Configuration of the search engine and of the self-play driver.

use std::path::Path;

use serde::Deserialize;

use crate::{default_selection_score, MctsError, SelectionFunction, SelfPlayError};

/// How the evaluator priors are renormalized once illegal actions are masked out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorNormalization {
    /// Legal priors are divided by their total mass.
    #[default]
    Multiplicative,
    /// The mass lost on illegal actions is shared equally between legal actions.
    Additive,
}

impl PriorNormalization {
    /// Restricts `policy` to the actions allowed by `mask` and renormalizes it.
    ///
    /// Illegal actions always get `0.0`. When the legal actions carry no mass at
    /// all, the result is uniform over the legal actions.
    ///
    /// # Returns
    /// The renormalized priors and `true` if the uniform fallback was used.
    pub fn normalize<const N: usize>(
        &self,
        policy: &[f64; N],
        mask: &[bool; N],
    ) -> ([f64; N], bool) {
        let legal = mask.iter().filter(|&&m| m).count();
        if legal == 0 {
            return ([0.0; N], false);
        }

        let mass: f64 = (0..N).filter(|&i| mask[i]).map(|i| policy[i]).sum();
        if mass <= 0.0 {
            let uniform = 1.0 / legal as f64;
            return (std::array::from_fn(|i| if mask[i] { uniform } else { 0.0 }), true);
        }

        let priors = match self {
            PriorNormalization::Multiplicative => {
                std::array::from_fn(|i| if mask[i] { policy[i] / mass } else { 0.0 })
            }
            PriorNormalization::Additive => {
                let share = (1.0 - mass) / legal as f64;
                let shifted: [f64; N] = std::array::from_fn(|i| {
                    if mask[i] { (policy[i] + share).max(0.0) } else { 0.0 }
                });
                let total: f64 = shifted.iter().sum();
                shifted.map(|p| p / total)
            }
        };

        (priors, false)
    }
}

/// Dirichlet noise mixed into the root priors to diversify self-play games.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirichletNoise {
    /// Concentration parameter of the symmetric Dirichlet distribution.
    pub alpha: f64,
    /// Weight of the noise: `prior = (1 - epsilon) * prior + epsilon * noise`.
    pub epsilon: f64,
}

/// Configuration parameters for a single Monte Carlo Tree Search (MCTS) instance.
///
/// # Type Parameters
/// - `N`: The number of possible actions in the game.
#[derive(Clone, Copy, Debug)]
pub struct MctsConfig<const N: usize> {
    /// The exploration coefficient (c_puct) used in the selection phase.
    ///
    /// A higher value encourages more exploration of less-visited nodes, while a lower value
    /// prioritizes exploitation of known good paths.
    pub exploration_coef: f64,
    /// The function used to calculate the selection score for a child node during MCTS traversal.
    pub selection_function: SelectionFunction<N>,
    /// How priors are renormalized after masking illegal actions.
    pub prior_normalization: PriorNormalization,
    /// Move selection temperature: `0` picks the most visited action, `t > 0`
    /// samples proportionally to `visits^(1/t)`.
    pub temperature: f64,
    /// Optional root noise, disabled by default.
    pub dirichlet: Option<DirichletNoise>,
    /// Seed of the random generator used for sampling. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl<const N: usize> MctsConfig<N> {
    /// The default MCTS configuration.
    ///
    /// - `exploration_coef`: `1.0`.
    /// - `selection_function`: `default_selection_score`, the PUCT formula.
    /// - `prior_normalization`: `Multiplicative`.
    /// - `temperature`: `0.0`, deterministic arg-max.
    /// - no Dirichlet noise, no fixed seed.
    pub const DEFAULT: MctsConfig<N> = MctsConfig {
        exploration_coef: 1.0,
        selection_function: default_selection_score::<N>,
        prior_normalization: PriorNormalization::Multiplicative,
        temperature: 0.0,
        dirichlet: None,
        seed: None,
    };

    /// Sets the exploration constant `c` of the selection score.
    pub fn with_exploration_coef(mut self, exploration_coef: f64) -> Self {
        self.exploration_coef = exploration_coef;
        self
    }

    /// Replaces the selection score, `default_selection_score` (PUCT) by default.
    pub fn with_selection_function(mut self, selection_function: SelectionFunction<N>) -> Self {
        self.selection_function = selection_function;
        self
    }

    /// Sets how priors are renormalized after masking illegal actions.
    pub fn with_prior_normalization(mut self, prior_normalization: PriorNormalization) -> Self {
        self.prior_normalization = prior_normalization;
        self
    }

    /// Sets the temperature used by `choose_action`.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enables root Dirichlet noise.
    ///
    /// # Parameters
    /// - `alpha`: Concentration of the symmetric Dirichlet distribution.
    /// - `epsilon`: Weight of the noise in the mixed root priors.
    pub fn with_dirichlet(mut self, alpha: f64, epsilon: f64) -> Self {
        self.dirichlet = Some(DirichletNoise { alpha, epsilon });
        self
    }

    /// Fixes the seed of the search random generator.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Rejects configurations the search cannot run with.
    ///
    /// # Returns
    /// `Err(MctsError::InvalidConfiguration(_))` for a negative or non-finite
    /// exploration coefficient, an invalid temperature, or Dirichlet parameters
    /// outside of `alpha > 0`, `0 <= epsilon <= 1`.
    pub fn validate(&self) -> Result<(), MctsError> {
        if !self.exploration_coef.is_finite() || self.exploration_coef < 0.0 {
            return Err(MctsError::InvalidConfiguration(format!(
                "exploration coefficient must be finite and non-negative, got {}",
                self.exploration_coef
            )));
        }

        validate_temperature(self.temperature)?;

        if let Some(noise) = &self.dirichlet {
            let alpha_ok = noise.alpha.is_finite() && noise.alpha > 0.0;
            if !alpha_ok || !(0.0..=1.0).contains(&noise.epsilon) {
                return Err(MctsError::InvalidConfiguration(format!(
                    "invalid dirichlet noise (alpha {}, epsilon {})",
                    noise.alpha, noise.epsilon
                )));
            }
        }

        Ok(())
    }
}

impl<const N: usize> Default for MctsConfig<N> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Checks that a temperature is finite and non-negative.
pub fn validate_temperature(temperature: f64) -> Result<(), MctsError> {
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(MctsError::InvalidConfiguration(format!(
            "temperature must be finite and non-negative, got {temperature}"
        )));
    }
    Ok(())
}

/// Parameters of a self-play session.
///
/// Every field has a default, so a TOML file only needs to list what it changes:
///
/// ```toml
/// num_games = 50
/// simulations = 200
/// dirichlet_alpha = 0.3
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelfPlayConfig {
    /// Number of games to generate.
    pub num_games: usize,
    /// Simulations run before each move.
    pub simulations: usize,
    /// Plies after which a game is stopped and scored as a draw.
    pub max_moves: usize,
    /// Exploration constant `c` of the selection score.
    pub exploration_coef: f64,
    /// Renormalization of the priors after masking.
    pub prior_normalization: PriorNormalization,
    /// Temperature used for the first `temperature_moves` plies.
    pub temperature: f64,
    /// Number of opening plies sampled at `temperature`; later moves are arg-max.
    pub temperature_moves: usize,
    /// Keep the subtree of the played move between two searches.
    pub reuse_tree: bool,
    /// Root noise concentration, `0` disables the noise.
    pub dirichlet_alpha: f64,
    /// Weight of the root noise in the mixed priors.
    pub dirichlet_epsilon: f64,
    /// Base seed; game `i` of a session is seeded with `seed + i`.
    pub seed: Option<u64>,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        SelfPlayConfig {
            num_games: 500,
            simulations: 1000,
            max_moves: 200,
            exploration_coef: 1.0,
            prior_normalization: PriorNormalization::Multiplicative,
            temperature: 1.0,
            temperature_moves: 30,
            reuse_tree: true,
            dirichlet_alpha: 0.0,
            dirichlet_epsilon: 0.25,
            seed: None,
        }
    }
}

impl SelfPlayConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SelfPlayError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SelfPlayError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Temperature to use at ply `ply` (0-based).
    #[inline]
    pub fn temperature_at(&self, ply: usize) -> f64 {
        if ply < self.temperature_moves { self.temperature } else { 0.0 }
    }

    /// Search configuration derived from these settings.
    ///
    /// `seed` is the seed given to the search of one particular game.
    pub fn mcts_config<const N: usize>(&self, seed: Option<u64>) -> MctsConfig<N> {
        MctsConfig {
            exploration_coef: self.exploration_coef,
            selection_function: default_selection_score::<N>,
            prior_normalization: self.prior_normalization,
            temperature: self.temperature,
            dirichlet: (self.dirichlet_alpha > 0.0).then_some(DirichletNoise {
                alpha: self.dirichlet_alpha,
                epsilon: self.dirichlet_epsilon,
            }),
            seed,
        }
    }

    /// Rejects settings that cannot produce a game.
    pub fn validate(&self) -> Result<(), MctsError> {
        if self.simulations < 1 {
            return Err(MctsError::InvalidConfiguration(
                "simulations must be at least 1".to_string(),
            ));
        }
        if self.max_moves < 1 {
            return Err(MctsError::InvalidConfiguration("max_moves must be at least 1".to_string()));
        }
        self.mcts_config::<1>(None).validate()
    }
}
