//! Study orchestration: drive a strategy through batches of validated trials.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tw_schema::{load_csv, Frame, Schema};
use tw_search::{Strategy, StudyConfig};
use tw_types::{RawConfig, StudyId, Trial, TrialResult, TwError, TwResult};
use uuid::Uuid;

use crate::objective::Objective;
use crate::runner::TrialRunner;

/// Lifecycle state of a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

/// A study runs many trials of one objective over one dataset.
///
/// The dataset is validated once up front; trials within a batch run in
/// parallel against the shared cleaned frame, and the strategy observes
/// completed scores between batches.
pub struct Study {
    pub id: StudyId,
    pub config: StudyConfig,
    pub state: StudyState,
    runner: TrialRunner,
    strategy: Box<dyn Strategy>,
}

/// Summary of a finished study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    pub id: StudyId,
    pub name: String,
    pub trials: Vec<Trial>,
    pub best: Option<TrialResult>,
    pub completed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StudyReport {
    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().and_then(|r| r.score())
    }

    pub fn best_parameters(&self) -> Option<&RawConfig> {
        self.best.as_ref().map(|r| &r.parameters)
    }

    pub fn to_json(&self) -> TwResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Study {
    pub fn new(config: StudyConfig) -> Self {
        let schema = config
            .dataset
            .as_ref()
            .map(|d| d.schema.clone())
            .unwrap_or_else(Schema::new);
        let mut runner = TrialRunner::new(config.search_space.clone(), schema)
            .with_policy(config.policy);
        if let Some(ms) = config.trial_timeout_ms {
            runner = runner.with_trial_budget(Duration::from_millis(ms));
        }
        let strategy = config.build_strategy();
        Self {
            id: Uuid::new_v4(),
            config,
            state: StudyState::default(),
            runner,
            strategy,
        }
    }

    pub fn runner(&self) -> &TrialRunner {
        &self.runner
    }

    /// Handle for abandoning the study's in-flight trials from another
    /// thread; cancelled trials resolve as failed at their next checkpoint.
    pub fn cancel_token(&self) -> crate::context::CancelToken {
        self.runner.cancel_token()
    }

    /// Load the study's dataset from the configured CSV path.
    pub fn load_frame(&self) -> TwResult<Frame> {
        let dataset = self
            .config
            .dataset
            .as_ref()
            .ok_or_else(|| TwError::Study("no dataset configured".to_string()))?;
        let path = dataset
            .path
            .as_ref()
            .ok_or_else(|| TwError::Study("dataset has no path".to_string()))?;
        load_csv(path, &dataset.schema)
    }

    /// Run the study to completion.
    ///
    /// The frame is validated once against the study's schema and policy; an
    /// invalid dataset aborts the study before any trial starts. After that,
    /// batches of up to `concurrency` trials run in parallel until
    /// `max_trials` trials have finished or the strategy is exhausted.
    pub fn run(&mut self, objective: &dyn Objective, frame: &Frame) -> TwResult<StudyReport> {
        let started_at = Utc::now();
        self.state = StudyState::Running;
        let validated = match self.runner.validate_frame(frame) {
            Ok(frame) => frame,
            Err(e) => {
                self.state = StudyState::Failed;
                return Err(e.into());
            }
        };
        info!(
            study = %self.config.name,
            strategy = self.strategy.name(),
            max_trials = self.config.max_trials,
            rows = validated.n_rows(),
            "starting study"
        );

        let mut trials: Vec<Trial> = Vec::with_capacity(self.config.max_trials);
        let mut best: Option<TrialResult> = None;
        let mut completed = 0usize;
        let mut failed = 0usize;

        while trials.len() < self.config.max_trials {
            let remaining = self.config.max_trials - trials.len();
            let batch_size = remaining.min(self.config.concurrency.max(1));
            let proposals = self.strategy.suggest(batch_size);
            if proposals.is_empty() {
                info!(evaluated = trials.len(), "strategy exhausted");
                break;
            }

            let next_number = trials.len();
            let mut batch: Vec<(Trial, RawConfig)> = proposals
                .into_iter()
                .enumerate()
                .map(|(i, raw)| (Trial::new(self.id, next_number + i), raw))
                .collect();

            let runner = &self.runner;
            let results: Vec<TrialResult> = if self.config.concurrency > 1 {
                batch
                    .par_iter_mut()
                    .map(|(trial, raw)| {
                        runner.run_prevalidated(trial, raw.clone(), &validated, objective)
                    })
                    .collect()
            } else {
                batch
                    .iter_mut()
                    .map(|(trial, raw)| {
                        runner.run_prevalidated(trial, raw.clone(), &validated, objective)
                    })
                    .collect()
            };

            for ((trial, _), result) in batch.into_iter().zip(results) {
                match result.score() {
                    Some(score) => {
                        completed += 1;
                        self.strategy.observe(&result.parameters, score);
                        let improved = match &best {
                            Some(incumbent) => incumbent
                                .score()
                                .map(|s| self.config.direction.improves(score, s))
                                .unwrap_or(true),
                            None => true,
                        };
                        if improved {
                            info!(trial = trial.number, score, "new best trial");
                            best = Some(result);
                        }
                    }
                    None => {
                        failed += 1;
                        warn!(
                            trial = trial.number,
                            reason = result.failure().unwrap_or("unknown"),
                            "trial failed"
                        );
                    }
                }
                trials.push(trial);
            }
        }

        let finished_at = Utc::now();
        self.state = StudyState::Completed;
        info!(
            study = %self.config.name,
            completed,
            failed,
            best = ?best.as_ref().and_then(|r| r.score()),
            "study finished"
        );
        Ok(StudyReport {
            id: self.id,
            name: self.config.name.clone(),
            trials,
            best,
            completed,
            failed,
            started_at,
            finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TrialContext;
    use crate::objective::FnObjective;
    use tw_schema::{Column, ColumnSpec};
    use tw_search::{SearchSpace, StrategyKind};
    use tw_types::{Configuration, Direction};

    fn frame() -> Frame {
        Frame::new()
            .with_column("x", Column::Float(vec![Some(1.0), Some(2.0), Some(3.0)]))
            .unwrap()
            .with_column("y", Column::Float(vec![Some(2.0), Some(4.0), Some(6.0)]))
            .unwrap()
    }

    fn space() -> SearchSpace {
        SearchSpace::new().add_float("l2", 0.0, 1.0)
    }

    fn config_with_schema(space: SearchSpace) -> StudyConfig {
        let dataset = tw_schema::DatasetConfig::new(
            Schema::new()
                .with(ColumnSpec::float("x"))
                .with(ColumnSpec::float("y")),
            "y",
        );
        StudyConfig::new("test_study", space).with_dataset(dataset)
    }

    fn quadratic() -> impl Objective {
        FnObjective::new(|config: &Configuration, _: &Frame, _: &TrialContext| {
            let l2 = config.get_f64("l2").unwrap_or(0.0);
            Ok(-(l2 - 0.4).powi(2))
        })
    }

    #[test]
    fn runs_configured_number_of_trials() {
        let config = config_with_schema(space())
            .with_strategy(StrategyKind::Random)
            .with_max_trials(8)
            .with_seed(11);
        let mut study = Study::new(config);
        let report = study.run(&quadratic(), &frame()).unwrap();

        assert_eq!(report.trials.len(), 8);
        assert_eq!(report.completed, 8);
        assert_eq!(report.failed, 0);
        assert!(report.best_score().is_some());
        assert_eq!(study.state, StudyState::Completed);
    }

    #[test]
    fn best_tracks_maximum_by_default() {
        let config = config_with_schema(space())
            .with_strategy(StrategyKind::Random)
            .with_max_trials(12)
            .with_seed(3);
        let mut study = Study::new(config);
        let report = study.run(&quadratic(), &frame()).unwrap();

        let best = report.best_score().unwrap();
        for trial in &report.trials {
            let score = trial.result.as_ref().unwrap().score().unwrap();
            assert!(best >= score);
        }
    }

    #[test]
    fn minimize_direction_tracks_minimum() {
        let objective = FnObjective::new(|config: &Configuration, _: &Frame, _: &TrialContext| {
            Ok(config.get_f64("l2").unwrap_or(0.0))
        });
        let config = config_with_schema(space())
            .with_strategy(StrategyKind::Random)
            .with_max_trials(10)
            .with_direction(Direction::Minimize)
            .with_seed(5);
        let mut study = Study::new(config);
        let report = study.run(&objective, &frame()).unwrap();

        let best = report.best_score().unwrap();
        for trial in &report.trials {
            let score = trial.result.as_ref().unwrap().score().unwrap();
            assert!(best <= score);
        }
    }

    #[test]
    fn grid_exhaustion_stops_early() {
        let space = SearchSpace::new().add_choice("model", &["ridge", "lasso"]);
        let config = config_with_schema(space)
            .with_strategy(StrategyKind::Grid)
            .with_max_trials(50);
        let mut study = Study::new(config);
        let objective = FnObjective::new(|_: &Configuration, _: &Frame, _: &TrialContext| Ok(1.0));
        let report = study.run(&objective, &frame()).unwrap();

        assert_eq!(report.trials.len(), 2);
    }

    #[test]
    fn invalid_dataset_aborts_study() {
        let config = config_with_schema(space());
        let mut study = Study::new(config);
        let empty = Frame::new();
        let err = study.run(&quadratic(), &empty).unwrap_err();
        assert!(matches!(err, TwError::Data(_)));
        assert_eq!(study.state, StudyState::Failed);
    }

    #[test]
    fn failed_trials_counted_not_fatal() {
        let objective = FnObjective::new(|config: &Configuration, _: &Frame, _: &TrialContext| {
            let l2 = config.get_f64("l2").unwrap_or(0.0);
            if l2 < 0.5 {
                Err(tw_types::EvalError::NonConvergence("diverged".into()))
            } else {
                Ok(l2)
            }
        });
        let config = config_with_schema(space())
            .with_strategy(StrategyKind::Random)
            .with_max_trials(20)
            .with_seed(9);
        let mut study = Study::new(config);
        let report = study.run(&objective, &frame()).unwrap();

        assert_eq!(report.completed + report.failed, 20);
        assert!(report.failed > 0, "some trials should fail below 0.5");
        assert!(report.completed > 0, "some trials should succeed");
        if let Some(best) = report.best_score() {
            assert!(best >= 0.5);
        }
    }

    #[test]
    fn cancelled_study_fails_its_trials() {
        let objective = FnObjective::new(|_: &Configuration, _: &Frame, ctx: &TrialContext| {
            ctx.checkpoint()?;
            Ok(1.0)
        });
        let config = config_with_schema(space())
            .with_strategy(StrategyKind::Random)
            .with_max_trials(4)
            .with_seed(2);
        let mut study = Study::new(config);
        study.cancel_token().cancel();

        let report = study.run(&objective, &frame()).unwrap();
        assert_eq!(report.failed, 4);
        assert_eq!(report.completed, 0);
        assert!(report
            .trials
            .iter()
            .all(|t| t.result.as_ref().unwrap().failure() == Some("timeout")));
    }

    #[test]
    fn report_serializes_to_json() {
        let config = config_with_schema(space())
            .with_strategy(StrategyKind::Random)
            .with_max_trials(2)
            .with_seed(1);
        let mut study = Study::new(config);
        let report = study.run(&quadratic(), &frame()).unwrap();

        let json = report.to_json().unwrap();
        assert!(json.contains("test_study"));
        assert!(json.contains("best"));
    }

    #[test]
    fn fixed_seed_replays_study() {
        let run = || {
            let config = config_with_schema(space())
                .with_strategy(StrategyKind::Random)
                .with_max_trials(6)
                .with_concurrency(1)
                .with_seed(42);
            Study::new(config).run(&quadratic(), &frame()).unwrap()
        };
        let first = run();
        let second = run();
        assert_eq!(first.best_score(), second.best_score());
    }
}
