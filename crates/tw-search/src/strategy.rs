//! Parameter sweep strategies: grid, random, and Bayesian search.
//!
//! All randomized strategies take an explicit seed so a study replays
//! identically: same seed, same suggestions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tw_types::{Direction, ParamValue, RawConfig};

use crate::space::{ParamKind, SearchSpace};

/// Which search strategy a study should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Grid,
    Random,
    #[default]
    Bayesian,
}

/// Common trait for all search strategies.
pub trait Strategy: Send {
    /// Generate the next batch of raw configurations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<RawConfig>;

    /// Report a completed trial so adaptive strategies can learn.
    fn observe(&mut self, _params: &RawConfig, _score: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &'static str;
}

// ---- Grid search ----

/// Exhaustive sweep over discrete parameter combinations; continuous
/// dimensions are discretized into `float_steps` points.
#[derive(Debug, Clone)]
pub struct GridSearch {
    cursor: usize,
    combos: Vec<RawConfig>,
}

impl GridSearch {
    pub fn new(space: &SearchSpace, float_steps: usize) -> Self {
        Self {
            cursor: 0,
            combos: Self::build_grid(space, float_steps),
        }
    }

    fn build_grid(space: &SearchSpace, float_steps: usize) -> Vec<RawConfig> {
        let mut axes: Vec<Vec<(&str, ParamValue)>> = Vec::new();

        for param in &space.parameters {
            let values: Vec<ParamValue> = match &param.kind {
                ParamKind::FloatRange { low, high } => {
                    let steps = float_steps.max(2);
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParamValue::Float(low + t * (high - low))
                        })
                        .collect()
                }
                ParamKind::IntRange { low, high } => {
                    (*low..=*high).map(ParamValue::Int).collect()
                }
                ParamKind::LogUniform { low, high } => {
                    let steps = float_steps.max(2);
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (0..steps)
                        .map(|i| {
                            let t = i as f64 / (steps - 1) as f64;
                            ParamValue::Float((log_low + t * (log_high - log_low)).exp())
                        })
                        .collect()
                }
                ParamKind::Choice { choices } => choices
                    .iter()
                    .map(|c| ParamValue::Str(c.clone()))
                    .collect(),
                ParamKind::Flag => vec![ParamValue::Bool(false), ParamValue::Bool(true)],
            };
            axes.push(
                values
                    .into_iter()
                    .map(|v| (param.name.as_str(), v))
                    .collect(),
            );
        }

        // Cartesian product
        let mut result: Vec<RawConfig> = vec![RawConfig::new()];
        for axis in &axes {
            let mut next = Vec::with_capacity(result.len() * axis.len());
            for existing in &result {
                for (name, value) in axis {
                    let mut combo = existing.clone();
                    combo.insert(name.to_string(), value.clone());
                    next.push(combo);
                }
            }
            result = next;
        }
        result
    }
}

impl Strategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<RawConfig> {
        let end = (self.cursor + count).min(self.combos.len());
        let batch = self.combos[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    fn name(&self) -> &'static str {
        "grid"
    }
}

// ---- Random search ----

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample_one(&mut self) -> RawConfig {
        sample_uniform(&self.space, &mut self.rng)
    }
}

fn sample_uniform(space: &SearchSpace, rng: &mut StdRng) -> RawConfig {
    let mut params = RawConfig::new();
    for param in &space.parameters {
        let value = match &param.kind {
            ParamKind::FloatRange { low, high } => {
                ParamValue::Float(rng.random_range(*low..=*high))
            }
            ParamKind::IntRange { low, high } => ParamValue::Int(rng.random_range(*low..=*high)),
            ParamKind::LogUniform { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParamValue::Float(log_val.exp())
            }
            ParamKind::Choice { choices } => {
                let idx = rng.random_range(0..choices.len());
                ParamValue::Str(choices[idx].clone())
            }
            ParamKind::Flag => ParamValue::Bool(rng.random()),
        };
        params.insert(param.name.clone(), value);
    }
    params
}

impl Strategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<RawConfig> {
        (0..count).map(|_| self.sample_one()).collect()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

// ---- Bayesian search ----

/// Bayesian optimization with an explore/exploit heuristic.
///
/// Tracks observed (params, score) pairs and biases future sampling toward
/// the incumbent: with probability `exploration_weight` it samples
/// uniformly, otherwise it perturbs the best-known point. A full surrogate
/// backend can replace the heuristic behind the same `observe` interface.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: SearchSpace,
    direction: Direction,
    observations: Vec<(RawConfig, f64)>,
    exploration_weight: f64,
    rng: StdRng,
}

impl BayesianSearch {
    pub fn new(space: SearchSpace, direction: Direction, exploration_weight: f64, seed: u64) -> Self {
        Self {
            space,
            direction,
            observations: Vec::new(),
            exploration_weight,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn incumbent(&self) -> Option<&RawConfig> {
        let best = match self.direction {
            Direction::Maximize => self
                .observations
                .iter()
                .max_by(|a, b| a.1.total_cmp(&b.1)),
            Direction::Minimize => self
                .observations
                .iter()
                .min_by(|a, b| a.1.total_cmp(&b.1)),
        };
        best.map(|(params, _)| params)
    }

    /// Exploitation: perturb the best-known point within its domain.
    fn exploit(&mut self) -> RawConfig {
        let base = match self.incumbent() {
            Some(params) => params.clone(),
            None => return sample_uniform(&self.space, &mut self.rng),
        };

        let mut perturbed = RawConfig::new();
        for param in &self.space.parameters {
            let value = match (&param.kind, base.get(&param.name)) {
                (ParamKind::FloatRange { low, high }, Some(ParamValue::Float(v))) => {
                    let noise = self.rng.random_range(-0.1..0.1) * (high - low);
                    ParamValue::Float((v + noise).clamp(*low, *high))
                }
                (ParamKind::IntRange { low, high }, Some(ParamValue::Int(v))) => {
                    let delta: i64 = self.rng.random_range(-2..=2);
                    ParamValue::Int((v + delta).clamp(*low, *high))
                }
                (ParamKind::LogUniform { low, high }, Some(ParamValue::Float(v))) => {
                    let noise = self.rng.random_range(-0.1..0.1) * (high.ln() - low.ln());
                    ParamValue::Float((v.ln() + noise).exp().clamp(*low, *high))
                }
                (kind, _) => {
                    // Categorical and boolean dimensions have no
                    // neighborhood; resample them.
                    let single = SearchSpace {
                        parameters: vec![crate::space::ParamDef {
                            name: param.name.clone(),
                            kind: kind.clone(),
                        }],
                    };
                    let mut sampled = sample_uniform(&single, &mut self.rng);
                    sampled
                        .remove(&param.name)
                        .unwrap_or(ParamValue::Bool(false))
                }
            };
            perturbed.insert(param.name.clone(), value);
        }
        perturbed
    }
}

impl Strategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<RawConfig> {
        (0..count)
            .map(|_| {
                if self.observations.is_empty()
                    || self.rng.random::<f64>() < self.exploration_weight
                {
                    sample_uniform(&self.space, &mut self.rng)
                } else {
                    self.exploit()
                }
            })
            .collect()
    }

    fn observe(&mut self, params: &RawConfig, score: f64) {
        self.observations.push((params.clone(), score));
    }

    fn name(&self) -> &'static str {
        "bayesian"
    }
}
