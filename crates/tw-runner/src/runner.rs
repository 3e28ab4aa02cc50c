//! The validated trial runner.
//!
//! Guarantees that no invalid configuration and no malformed data ever
//! reach the model-fitting step, and that a failing fit produces a failed
//! trial result instead of tearing down the surrounding study.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use tw_schema::{DataValidationError, Frame, Schema, ValidationPolicy};
use tw_search::SearchSpace;
use tw_types::{Configuration, RawConfig, Trial, TrialResult};

use crate::context::{CancelToken, TrialContext};
use crate::objective::Objective;

/// Runs one trial at a time: validate configuration, validate dataset,
/// evaluate the objective.
///
/// The runner holds no mutable state, so one instance can serve any number
/// of concurrent trials.
#[derive(Debug, Clone)]
pub struct TrialRunner {
    space: SearchSpace,
    schema: Schema,
    policy: ValidationPolicy,
    trial_budget: Option<Duration>,
    cancel: CancelToken,
}

impl TrialRunner {
    pub fn new(space: SearchSpace, schema: Schema) -> Self {
        Self {
            space,
            schema,
            policy: ValidationPolicy::default(),
            trial_budget: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_trial_budget(mut self, budget: Duration) -> Self {
        self.trial_budget = Some(budget);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token shared by every trial this runner executes. Cancelling it
    /// abandons in-flight and future evaluations at their next checkpoint.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Validate a frame once so its cleaned copy can be shared across
    /// trials of the same study.
    pub fn validate_frame(&self, frame: &Frame) -> Result<Frame, DataValidationError> {
        self.schema.validate(frame, self.policy)
    }

    /// Run the full pipeline on raw inputs.
    ///
    /// Configuration checks run before dataset checks; the trial fails at
    /// the first stage with violations, reporting every violation of that
    /// stage in declaration order.
    pub fn run_trial(
        &self,
        trial: &mut Trial,
        raw: RawConfig,
        frame: &Frame,
        objective: &dyn Objective,
    ) -> TrialResult {
        let started = Instant::now();
        trial.mark_started(None);

        let config = match self.space.validate(&raw) {
            Ok(config) => {
                trial.mark_config_validated();
                config
            }
            Err(e) => {
                warn!(trial = trial.number, "configuration rejected: {e}");
                return fail(trial, raw, e.to_string(), started);
            }
        };

        let validated = match self.validate_frame(frame) {
            Ok(frame) => {
                trial.mark_data_validated();
                frame
            }
            Err(e) => {
                warn!(trial = trial.number, "dataset rejected: {e}");
                return fail(trial, raw, e.to_string(), started);
            }
        };

        self.evaluate(trial, &config, &validated, objective, started)
    }

    /// Like [`run_trial`](Self::run_trial) but for a frame that already
    /// passed [`validate_frame`](Self::validate_frame); the data stage is
    /// marked from the cached result instead of re-scanning the frame.
    pub fn run_prevalidated(
        &self,
        trial: &mut Trial,
        raw: RawConfig,
        frame: &Frame,
        objective: &dyn Objective,
    ) -> TrialResult {
        let started = Instant::now();
        trial.mark_started(None);

        let config = match self.space.validate(&raw) {
            Ok(config) => {
                trial.mark_config_validated();
                config
            }
            Err(e) => {
                warn!(trial = trial.number, "configuration rejected: {e}");
                return fail(trial, raw, e.to_string(), started);
            }
        };
        trial.mark_data_validated();

        self.evaluate(trial, &config, frame, objective, started)
    }

    fn evaluate(
        &self,
        trial: &mut Trial,
        config: &Configuration,
        frame: &Frame,
        objective: &dyn Objective,
        started: Instant,
    ) -> TrialResult {
        let ctx = TrialContext::new(self.cancel.clone(), self.trial_budget);

        let outcome = catch_unwind(AssertUnwindSafe(|| objective.evaluate(config, frame, &ctx)));
        let elapsed = started.elapsed().as_millis() as u64;
        let params = config.values().clone();

        match outcome {
            Ok(Ok(score)) if score.is_finite() => {
                debug!(trial = trial.number, score, "trial evaluated");
                let result = TrialResult::scored(trial.id, params, score, elapsed);
                trial.mark_evaluated(result.clone());
                result
            }
            Ok(Ok(score)) => {
                warn!(trial = trial.number, "objective returned {score}");
                let result = TrialResult::failed(
                    trial.id,
                    params,
                    format!("non-finite objective value: {score}"),
                    elapsed,
                );
                trial.mark_failed(result.clone());
                result
            }
            Ok(Err(e)) => {
                warn!(trial = trial.number, "evaluation failed: {e}");
                let result = TrialResult::failed(trial.id, params, e.to_string(), elapsed);
                trial.mark_failed(result.clone());
                result
            }
            Err(payload) => {
                let reason = panic_reason(payload.as_ref());
                warn!(trial = trial.number, "objective panicked: {reason}");
                let result = TrialResult::failed(
                    trial.id,
                    params,
                    format!("objective panicked: {reason}"),
                    elapsed,
                );
                trial.mark_failed(result.clone());
                result
            }
        }
    }
}

fn fail(trial: &mut Trial, params: RawConfig, reason: String, started: Instant) -> TrialResult {
    let elapsed = started.elapsed().as_millis() as u64;
    let result = TrialResult::failed(trial.id, params, reason, elapsed);
    trial.mark_failed(result.clone());
    result
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::FnObjective;
    use tw_schema::{Column, ColumnSpec};
    use tw_types::{EvalError, ParamValue, TrialPhase};
    use uuid::Uuid;

    fn space() -> SearchSpace {
        SearchSpace::new().add_float("learning_rate", 0.0, 1.0)
    }

    fn schema() -> Schema {
        Schema::new()
            .with(ColumnSpec::float("x"))
            .with(ColumnSpec::float("target"))
    }

    fn frame() -> Frame {
        Frame::new()
            .with_column("x", Column::Float(vec![Some(1.0), Some(2.0)]))
            .unwrap()
            .with_column("target", Column::Float(vec![Some(2.0), Some(4.0)]))
            .unwrap()
    }

    fn raw(lr: f64) -> RawConfig {
        let mut raw = RawConfig::new();
        raw.insert("learning_rate".into(), ParamValue::Float(lr));
        raw
    }

    fn constant(score: f64) -> impl Objective {
        FnObjective::new(move |_: &Configuration, _: &Frame, _: &TrialContext| Ok(score))
    }

    #[test]
    fn valid_trial_scores() {
        let runner = TrialRunner::new(space(), schema());
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(0.3), &frame(), &constant(0.873));

        assert_eq!(result.score(), Some(0.873));
        assert!(result.failure().is_none());
        assert_eq!(trial.phase, TrialPhase::Evaluated);
    }

    #[test]
    fn invalid_configuration_fails_before_data() {
        let runner = TrialRunner::new(space(), schema());
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(-0.1), &frame(), &constant(1.0));

        assert_eq!(result.failure(), Some("learning_rate must be >= 0"));
        assert_eq!(trial.phase, TrialPhase::Failed);
    }

    #[test]
    fn missing_column_fails_trial() {
        let bad_frame = Frame::new()
            .with_column("x", Column::Float(vec![Some(1.0)]))
            .unwrap();
        let runner = TrialRunner::new(space(), schema());
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(0.3), &bad_frame, &constant(1.0));

        assert_eq!(result.failure(), Some("missing column: target"));
        assert_eq!(trial.phase, TrialPhase::Failed);
    }

    #[test]
    fn eval_error_becomes_failed_result() {
        let objective = FnObjective::new(|_: &Configuration, _: &Frame, _: &TrialContext| {
            Err(EvalError::NonConvergence("gradient exploded".into()))
        });
        let runner = TrialRunner::new(space(), schema());
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(0.3), &frame(), &objective);

        assert_eq!(
            result.failure(),
            Some("model failed to converge: gradient exploded")
        );
        assert_eq!(trial.phase, TrialPhase::Failed);
    }

    #[test]
    fn panic_becomes_failed_result() {
        let objective = FnObjective::new(|_: &Configuration, _: &Frame, _: &TrialContext| {
            panic!("matrix blew up")
        });
        let runner = TrialRunner::new(space(), schema());
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(0.3), &frame(), &objective);

        assert_eq!(result.failure(), Some("objective panicked: matrix blew up"));
        assert_eq!(trial.phase, TrialPhase::Failed);
    }

    #[test]
    fn exhausted_budget_fails_with_timeout() {
        let objective = FnObjective::new(|_: &Configuration, _: &Frame, ctx: &TrialContext| {
            for _ in 0..1_000_000 {
                ctx.checkpoint()?;
            }
            Ok(1.0)
        });
        let runner =
            TrialRunner::new(space(), schema()).with_trial_budget(Duration::ZERO);
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(0.3), &frame(), &objective);

        assert_eq!(result.failure(), Some("timeout"));
        assert_eq!(trial.phase, TrialPhase::Failed);
    }

    #[test]
    fn cancelled_token_abandons_trial() {
        let token = CancelToken::new();
        let runner = TrialRunner::new(space(), schema()).with_cancel_token(token.clone());
        token.cancel();

        let objective = FnObjective::new(|_: &Configuration, _: &Frame, ctx: &TrialContext| {
            ctx.checkpoint()?;
            Ok(1.0)
        });
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(0.3), &frame(), &objective);

        assert_eq!(result.failure(), Some("timeout"));
        assert_eq!(trial.phase, TrialPhase::Failed);
    }

    #[test]
    fn validate_frame_surfaces_schema_errors() {
        let runner = TrialRunner::new(space(), schema());
        let err: tw_schema::DataValidationError =
            runner.validate_frame(&Frame::new()).unwrap_err();
        assert!(err.to_string().contains("missing column: x"));
    }

    #[test]
    fn non_finite_score_rejected() {
        let runner = TrialRunner::new(space(), schema());
        let mut trial = Trial::new(Uuid::new_v4(), 0);
        let result = runner.run_trial(&mut trial, raw(0.3), &frame(), &constant(f64::NAN));

        assert!(result.failure().unwrap().contains("non-finite"));
    }

    #[test]
    fn deterministic_given_fixed_inputs() {
        let objective = FnObjective::new(|config: &Configuration, _: &Frame, _: &TrialContext| {
            Ok(config.get_f64("learning_rate").unwrap_or(0.0) * 2.0)
        });
        let runner = TrialRunner::new(space(), schema());

        let mut first = Trial::new(Uuid::new_v4(), 0);
        let mut second = Trial::new(Uuid::new_v4(), 1);
        let a = runner.run_trial(&mut first, raw(0.4), &frame(), &objective);
        let b = runner.run_trial(&mut second, raw(0.4), &frame(), &objective);
        assert_eq!(a.score(), b.score());
    }
}
