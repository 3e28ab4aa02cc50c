//! Objective functions: fit a model on validated inputs, return a score.

use tracing::debug;
use tw_schema::{DatasetConfig, Frame};
use tw_types::{Configuration, EvalError};

use crate::context::TrialContext;

/// A model-fitting objective evaluated once per trial.
///
/// Implementations must be pure with respect to their inputs: given the
/// same configuration, frame, and seedable internals, they return the same
/// score. Recoverable fit failures are reported as [`EvalError`]; the trial
/// runner downgrades them to a failed trial result.
pub trait Objective: Send + Sync {
    fn evaluate(
        &self,
        config: &Configuration,
        frame: &Frame,
        ctx: &TrialContext,
    ) -> Result<f64, EvalError>;
}

/// Adapter so plain functions and closures can serve as objectives.
pub struct FnObjective<F>(F);

impl<F> FnObjective<F>
where
    F: Fn(&Configuration, &Frame, &TrialContext) -> Result<f64, EvalError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&Configuration, &Frame, &TrialContext) -> Result<f64, EvalError> + Send + Sync,
{
    fn evaluate(
        &self,
        config: &Configuration,
        frame: &Frame,
        ctx: &TrialContext,
    ) -> Result<f64, EvalError> {
        (self.0)(config, frame, ctx)
    }
}

/// Cross-validated ridge regression on the frame's numeric columns.
///
/// The target and feature layout come from the dataset config; the
/// regularization strength is the trial's `l2` hyperparameter (0 when
/// absent) and `fit_intercept` toggles the bias term (on by default). Folds
/// are assigned round-robin by row index, so scores are deterministic for a
/// fixed frame. The score is pooled out-of-fold R².
#[derive(Debug, Clone)]
pub struct CrossValidatedRegression {
    pub target: String,
    pub drop_features: Vec<String>,
    pub split_column: Option<String>,
    pub folds: usize,
}

impl CrossValidatedRegression {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            drop_features: Vec::new(),
            split_column: None,
            folds: 5,
        }
    }

    pub fn from_dataset(config: &DatasetConfig) -> Self {
        Self {
            target: config.target.clone(),
            drop_features: config.drop_features.clone(),
            split_column: config.split_column.clone(),
            folds: config.cv_folds,
        }
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn drop_features(mut self, names: &[&str]) -> Self {
        self.drop_features = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_split_column(mut self, name: impl Into<String>) -> Self {
        self.split_column = Some(name.into());
        self
    }

    fn fit_fold(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        train: &[usize],
        l2: f64,
        fit_intercept: bool,
    ) -> Result<Vec<f64>, EvalError> {
        let d = x[0].len() + usize::from(fit_intercept);
        let mut xtx = vec![vec![0.0; d]; d];
        let mut xty = vec![0.0; d];

        for &row in train {
            let features = design_row(&x[row], fit_intercept);
            for i in 0..d {
                xty[i] += features[i] * y[row];
                for j in 0..d {
                    xtx[i][j] += features[i] * features[j];
                }
            }
        }
        // Regularize the weights but never the intercept.
        let skip = usize::from(fit_intercept);
        for (i, row) in xtx.iter_mut().enumerate() {
            if i >= skip {
                row[i] += l2;
            }
        }
        solve(xtx, xty)
    }
}

fn design_row(features: &[f64], fit_intercept: bool) -> Vec<f64> {
    if fit_intercept {
        let mut row = Vec::with_capacity(features.len() + 1);
        row.push(1.0);
        row.extend_from_slice(features);
        row
    } else {
        features.to_vec()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, EvalError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(EvalError::Numerical("singular normal matrix".to_string()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut beta = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in (col + 1)..n {
            sum -= a[col][k] * beta[k];
        }
        beta[col] = sum / a[col][col];
        if !beta[col].is_finite() {
            return Err(EvalError::Numerical(
                "non-finite coefficient in solution".to_string(),
            ));
        }
    }
    Ok(beta)
}

impl Objective for CrossValidatedRegression {
    fn evaluate(
        &self,
        config: &Configuration,
        frame: &Frame,
        ctx: &TrialContext,
    ) -> Result<f64, EvalError> {
        let (x, y) = frame
            .features_and_target(&self.target, &self.drop_features, self.split_column.as_deref())
            .map_err(|e| EvalError::Other(e.to_string()))?;

        let n = x.len();
        let folds = self.folds.max(2);
        if n < folds {
            return Err(EvalError::Other(format!(
                "dataset has {n} usable rows but {folds}-fold cross validation needs at least {folds}"
            )));
        }
        if x[0].is_empty() {
            return Err(EvalError::Other("no usable feature columns".to_string()));
        }

        let l2 = config.get_f64("l2").unwrap_or(0.0);
        let fit_intercept = config.get_bool("fit_intercept").unwrap_or(true);
        debug!(n, folds, l2, fit_intercept, "fitting cross-validated regression");

        let mut predictions = Vec::with_capacity(n);
        for fold in 0..folds {
            ctx.checkpoint()?;
            let (train, test): (Vec<usize>, Vec<usize>) =
                (0..n).partition(|row| row % folds != fold);

            let beta = self.fit_fold(&x, &y, &train, l2, fit_intercept)?;
            for &row in &test {
                let features = design_row(&x[row], fit_intercept);
                let pred: f64 = features.iter().zip(&beta).map(|(f, b)| f * b).sum();
                if !pred.is_finite() {
                    return Err(EvalError::Numerical(
                        "non-finite prediction".to_string(),
                    ));
                }
                predictions.push((pred, y[row]));
            }
        }

        let mean = predictions.iter().map(|(_, actual)| actual).sum::<f64>()
            / predictions.len() as f64;
        let ss_tot: f64 = predictions
            .iter()
            .map(|(_, actual)| (actual - mean).powi(2))
            .sum();
        if ss_tot <= f64::EPSILON {
            return Err(EvalError::Numerical("target has zero variance".to_string()));
        }
        let ss_res: f64 = predictions
            .iter()
            .map(|(pred, actual)| (actual - pred).powi(2))
            .sum();
        Ok(1.0 - ss_res / ss_tot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tw_schema::Column;
    use tw_types::{ParamValue, RawConfig};

    /// y = 2*a + 3*b + 1, no noise.
    fn linear_frame(rows: usize) -> Frame {
        let a: Vec<Option<f64>> = (0..rows).map(|i| Some(i as f64)).collect();
        let b: Vec<Option<f64>> = (0..rows).map(|i| Some(((i * 7) % 13) as f64)).collect();
        let y: Vec<Option<f64>> = (0..rows)
            .map(|i| {
                let a = i as f64;
                let b = ((i * 7) % 13) as f64;
                Some(2.0 * a + 3.0 * b + 1.0)
            })
            .collect();
        Frame::new()
            .with_column("a", Column::Float(a))
            .unwrap()
            .with_column("b", Column::Float(b))
            .unwrap()
            .with_column("y", Column::Float(y))
            .unwrap()
    }

    fn config(l2: f64) -> Configuration {
        let mut raw = RawConfig::new();
        raw.insert("l2".into(), ParamValue::Float(l2));
        Configuration::new(raw)
    }

    #[test]
    fn recovers_linear_relationship() {
        let objective = CrossValidatedRegression::new("y").with_folds(4);
        let score = objective
            .evaluate(&config(0.0), &linear_frame(40), &TrialContext::unbounded())
            .unwrap();
        assert!(score > 0.999, "expected near-perfect R², got {score}");
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let objective = CrossValidatedRegression::new("y");
        let frame = linear_frame(30);
        let first = objective
            .evaluate(&config(0.5), &frame, &TrialContext::unbounded())
            .unwrap();
        let second = objective
            .evaluate(&config(0.5), &frame, &TrialContext::unbounded())
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn heavy_regularization_lowers_fit() {
        let objective = CrossValidatedRegression::new("y");
        let frame = linear_frame(30);
        let ctx = TrialContext::unbounded();
        let free = objective.evaluate(&config(0.0), &frame, &ctx).unwrap();
        let shrunk = objective.evaluate(&config(1e6), &frame, &ctx).unwrap();
        assert!(free > shrunk);
    }

    #[test]
    fn zero_variance_target_is_numerical_error() {
        let frame = Frame::new()
            .with_column("a", Column::Float((0..10).map(|i| Some(i as f64)).collect()))
            .unwrap()
            .with_column("y", Column::Float(vec![Some(5.0); 10]))
            .unwrap();
        let objective = CrossValidatedRegression::new("y");
        let err = objective
            .evaluate(&config(0.0), &frame, &TrialContext::unbounded())
            .unwrap_err();
        assert!(matches!(err, EvalError::Numerical(_)));
    }

    #[test]
    fn too_few_rows_reported() {
        let objective = CrossValidatedRegression::new("y").with_folds(5);
        let err = objective
            .evaluate(&config(0.0), &linear_frame(3), &TrialContext::unbounded())
            .unwrap_err();
        assert!(err.to_string().contains("needs at least 5"));
    }

    #[test]
    fn missing_target_is_eval_error() {
        let objective = CrossValidatedRegression::new("nope");
        let err = objective
            .evaluate(&config(0.0), &linear_frame(20), &TrialContext::unbounded())
            .unwrap_err();
        assert!(err.to_string().contains("missing column: nope"));
    }

    #[test]
    fn fn_objective_adapts_closures() {
        let objective = FnObjective::new(|config: &Configuration, _: &Frame, _: &TrialContext| {
            Ok(config.get_f64("l2").unwrap_or(0.0) * 2.0)
        });
        let score = objective
            .evaluate(&config(0.25), &linear_frame(5), &TrialContext::unbounded())
            .unwrap();
        assert_eq!(score, 0.5);
    }
}
