//! Trial lifecycle tracking and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::params::RawConfig;

/// Unique study identifier.
pub type StudyId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Maximize,
    Minimize,
}

impl Direction {
    /// True if `candidate` improves on `incumbent` under this direction.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

/// Lifecycle phase of a single trial.
///
/// A trial moves `Proposed -> ConfigValidated -> DataValidated -> Evaluated`,
/// or to `Failed` from any non-terminal phase on the first unrecoverable
/// violation. `Evaluated` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialPhase {
    Proposed,
    ConfigValidated,
    DataValidated,
    Evaluated,
    Failed,
}

impl TrialPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Evaluated | Self::Failed)
    }
}

/// The outcome of one trial: a score or a failure reason, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrialOutcome {
    Scored(f64),
    Failed { reason: String },
}

impl TrialOutcome {
    pub fn score(&self) -> Option<f64> {
        match self {
            Self::Scored(v) => Some(*v),
            Self::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Scored(_) => None,
            Self::Failed { reason } => Some(reason),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of a single trial, consumed by the optimization driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: Uuid,
    pub outcome: TrialOutcome,
    pub parameters: RawConfig,
    pub metrics: HashMap<String, f64>,
    pub duration_ms: Option<u64>,
}

impl TrialResult {
    pub fn scored(trial_id: Uuid, parameters: RawConfig, score: f64, duration_ms: u64) -> Self {
        Self {
            trial_id,
            outcome: TrialOutcome::Scored(score),
            parameters,
            metrics: HashMap::new(),
            duration_ms: Some(duration_ms),
        }
    }

    pub fn failed(
        trial_id: Uuid,
        parameters: RawConfig,
        reason: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            trial_id,
            outcome: TrialOutcome::Failed {
                reason: reason.into(),
            },
            parameters,
            metrics: HashMap::new(),
            duration_ms: Some(duration_ms),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn score(&self) -> Option<f64> {
        self.outcome.score()
    }

    pub fn failure(&self) -> Option<&str> {
        self.outcome.failure()
    }
}

/// A single trial: one configuration evaluated against the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub study_id: StudyId,
    pub number: usize,
    pub phase: TrialPhase,
    pub result: Option<TrialResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub worker: Option<String>,
}

impl Trial {
    pub fn new(study_id: StudyId, number: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            study_id,
            number,
            phase: TrialPhase::Proposed,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            worker: None,
        }
    }

    pub fn mark_started(&mut self, worker: Option<String>) {
        self.started_at = Some(Utc::now());
        self.worker = worker;
    }

    pub fn mark_config_validated(&mut self) {
        debug_assert_eq!(self.phase, TrialPhase::Proposed);
        self.phase = TrialPhase::ConfigValidated;
    }

    pub fn mark_data_validated(&mut self) {
        debug_assert_eq!(self.phase, TrialPhase::ConfigValidated);
        self.phase = TrialPhase::DataValidated;
    }

    pub fn mark_evaluated(&mut self, result: TrialResult) {
        debug_assert!(!self.phase.is_terminal());
        self.phase = TrialPhase::Evaluated;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, result: TrialResult) {
        debug_assert!(!self.phase.is_terminal());
        debug_assert!(result.outcome.is_failed());
        self.phase = TrialPhase::Failed;
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
    }
}
