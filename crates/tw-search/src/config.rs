//! Study configuration, loadable from YAML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tw_schema::{DatasetConfig, ValidationPolicy};
use tw_types::{Direction, TwResult};

use crate::space::SearchSpace;
use crate::strategy::{BayesianSearch, GridSearch, RandomSearch, Strategy, StrategyKind};

/// Top-level configuration for a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,

    /// The hyperparameter search space.
    pub search_space: SearchSpace,

    /// Which sweep strategy to use.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Maximum number of trials to run.
    #[serde(default = "default_max_trials")]
    pub max_trials: usize,

    /// How many trials to evaluate in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Direction of optimization.
    #[serde(default)]
    pub direction: Direction,

    /// What to do when dataset rows violate the schema.
    #[serde(default)]
    pub policy: ValidationPolicy,

    /// Dataset location, schema, and feature/target layout.
    #[serde(default)]
    pub dataset: Option<DatasetConfig>,

    /// Exploration weight for Bayesian search (ignored for grid/random).
    #[serde(default = "default_exploration_weight")]
    pub exploration_weight: f64,

    /// Number of steps per continuous dimension for grid search.
    #[serde(default = "default_grid_steps")]
    pub grid_steps: usize,

    /// RNG seed; a fixed seed replays the study exactly.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Per-trial wall-clock budget in milliseconds.
    #[serde(default)]
    pub trial_timeout_ms: Option<u64>,
}

fn default_max_trials() -> usize {
    100
}

fn default_concurrency() -> usize {
    4
}

fn default_exploration_weight() -> f64 {
    0.3
}

fn default_grid_steps() -> usize {
    5
}

impl StudyConfig {
    pub fn new(name: impl Into<String>, search_space: SearchSpace) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            search_space,
            strategy: StrategyKind::default(),
            max_trials: default_max_trials(),
            concurrency: default_concurrency(),
            direction: Direction::default(),
            policy: ValidationPolicy::default(),
            dataset: None,
            exploration_weight: default_exploration_weight(),
            grid_steps: default_grid_steps(),
            seed: None,
            trial_timeout_ms: None,
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_trials(mut self, n: usize) -> Self {
        self.max_trials = n;
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetConfig) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_trial_timeout_ms(mut self, ms: u64) -> Self {
        self.trial_timeout_ms = Some(ms);
        self
    }

    /// Load a study configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> TwResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> TwResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Build the configured strategy. The effective seed is the configured
    /// one, or a fresh random seed when unset.
    pub fn build_strategy(&self) -> Box<dyn Strategy> {
        let seed = self.seed.unwrap_or_else(rand::random);
        match self.strategy {
            StrategyKind::Grid => Box::new(GridSearch::new(&self.search_space, self.grid_steps)),
            StrategyKind::Random => Box::new(RandomSearch::new(self.search_space.clone(), seed)),
            StrategyKind::Bayesian => Box::new(BayesianSearch::new(
                self.search_space.clone(),
                self.direction,
                self.exploration_weight,
                seed,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
name: premium_model_tuning
search_space:
  parameters:
    - name: l2
      kind: { type: log_uniform, low: 1.0e-6, high: 10.0 }
    - name: fit_intercept
      kind: { type: flag }
strategy: bayesian
max_trials: 25
direction: maximize
policy: drop_invalid_rows
seed: 42
dataset:
  target: premium
  split_column: train_set
  cv_folds: 3
  schema:
    columns:
      - { name: age, dtype: int, min: 0.0 }
      - { name: premium, dtype: float, min: 0.0 }
      - { name: train_set, dtype: int }
"#;

    #[test]
    fn yaml_round_trip() {
        let config = StudyConfig::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(config.name, "premium_model_tuning");
        assert_eq!(config.max_trials, 25);
        assert_eq!(config.strategy, StrategyKind::Bayesian);
        assert_eq!(config.policy, ValidationPolicy::DropInvalidRows);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.search_space.parameters.len(), 2);

        let dataset = config.dataset.as_ref().unwrap();
        assert_eq!(dataset.target, "premium");
        assert_eq!(dataset.cv_folds, 3);
        assert_eq!(dataset.schema.columns.len(), 3);
        // Defaults fill in what the file omits.
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.grid_steps, 5);
        assert!(config.trial_timeout_ms.is_none());
    }

    #[test]
    fn builder_chain() {
        let config = StudyConfig::new("test", SearchSpace::new().add_int("depth", 1, 4))
            .with_strategy(StrategyKind::Grid)
            .with_max_trials(10)
            .with_concurrency(1)
            .with_seed(7);
        assert_eq!(config.max_trials, 10);
        assert_eq!(config.build_strategy().name(), "grid");
    }

    #[test]
    fn malformed_yaml_is_config_file_error() {
        let err = StudyConfig::from_yaml_str("name: [unclosed").unwrap_err();
        assert!(matches!(err, tw_types::TwError::ConfigFile(_)));
    }
}
