//! Declarative dataset schemas and validation.
//!
//! A [`Schema`] is an ordered list of [`ColumnSpec`]s. Validation checks
//! every column in declaration order and, within a column, presence, dtype,
//! nullability, numeric range, then categorical membership, collecting every
//! violation so a user can fix all problems in one pass.

use serde::{Deserialize, Serialize};
use tracing::warn;
use tw_types::{DataValidationError, DataViolation};

use crate::frame::{Column, Dtype, Frame};

/// What to do when row-scoped checks fail.
///
/// Structural violations (missing column, wrong dtype) always reject the
/// frame regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Any violation rejects the whole frame.
    #[default]
    Strict,
    /// Rows with nulls in non-nullable columns, out-of-range values, or
    /// disallowed categories are dropped and validation succeeds.
    DropInvalidRows,
}

/// Declared constraints for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: Dtype,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: false,
            min: None,
            max: None,
            allowed: None,
        }
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, Dtype::Float)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, Dtype::Int)
    }

    pub fn str(name: impl Into<String>) -> Self {
        Self::new(name, Dtype::Str)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, Dtype::Bool)
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn at_most(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn one_of(mut self, allowed: &[&str]) -> Self {
        self.allowed = Some(allowed.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// The full dataset schema: an ordered list of column specs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }

    pub fn spec(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|s| s.name == name)
    }

    /// Validate `frame` against this schema.
    ///
    /// Returns the frame ready for fitting: a plain copy under
    /// [`ValidationPolicy::Strict`], or a copy with offending rows removed
    /// under [`ValidationPolicy::DropInvalidRows`]. The error enumerates
    /// every violated check in declaration order.
    pub fn validate(
        &self,
        frame: &Frame,
        policy: ValidationPolicy,
    ) -> Result<Frame, DataValidationError> {
        let mut violations = Vec::new();
        let mut structural = false;
        let mut drop_mask = vec![false; frame.n_rows()];

        for spec in &self.columns {
            let column = match frame.column(&spec.name) {
                Some(c) => c,
                None => {
                    violations.push(DataViolation::MissingColumn {
                        name: spec.name.clone(),
                    });
                    structural = true;
                    continue;
                }
            };
            if column.dtype() != spec.dtype {
                violations.push(DataViolation::WrongDtype {
                    name: spec.name.clone(),
                    expected: spec.dtype.to_string(),
                    found: column.dtype().to_string(),
                });
                structural = true;
                continue;
            }
            check_rows(spec, column, &mut violations, &mut drop_mask);
        }

        match policy {
            _ if structural => Err(DataValidationError::new(violations)),
            ValidationPolicy::Strict => {
                if violations.is_empty() {
                    Ok(frame.clone())
                } else {
                    Err(DataValidationError::new(violations))
                }
            }
            ValidationPolicy::DropInvalidRows => {
                let dropped = drop_mask.iter().filter(|&&d| d).count();
                if dropped > 0 {
                    warn!(dropped, total = frame.n_rows(), "dropping invalid rows");
                    let keep: Vec<bool> = drop_mask.iter().map(|&d| !d).collect();
                    Ok(frame.filter_rows(&keep))
                } else {
                    Ok(frame.clone())
                }
            }
        }
    }

}

/// Row-scoped checks for one column: nullability, range, membership.
fn check_rows(
    spec: &ColumnSpec,
    column: &Column,
    violations: &mut Vec<DataViolation>,
    drop_mask: &mut [bool],
) {
    if !spec.nullable {
        let mut count = 0;
        for (row, flag) in drop_mask.iter_mut().enumerate() {
            if column.is_null(row) {
                count += 1;
                *flag = true;
            }
        }
        if count > 0 {
            violations.push(DataViolation::UnexpectedNulls {
                name: spec.name.clone(),
                count,
            });
        }
    }

    if let Some(min) = spec.min {
        let mut count = 0;
        for (row, flag) in drop_mask.iter_mut().enumerate() {
            if column.f64_at(row).is_some_and(|v| v < min) {
                count += 1;
                *flag = true;
            }
        }
        if count > 0 {
            violations.push(DataViolation::BelowMin {
                name: spec.name.clone(),
                min,
                count,
            });
        }
    }

    if let Some(max) = spec.max {
        let mut count = 0;
        for (row, flag) in drop_mask.iter_mut().enumerate() {
            if column.f64_at(row).is_some_and(|v| v > max) {
                count += 1;
                *flag = true;
            }
        }
        if count > 0 {
            violations.push(DataViolation::AboveMax {
                name: spec.name.clone(),
                max,
                count,
            });
        }
    }

    if let Some(allowed) = &spec.allowed {
        let mut count = 0;
        for (row, flag) in drop_mask.iter_mut().enumerate() {
            if column
                .str_at(row)
                .is_some_and(|v| !allowed.iter().any(|a| a == v))
            {
                count += 1;
                *flag = true;
            }
        }
        if count > 0 {
            violations.push(DataViolation::NotAllowed {
                name: spec.name.clone(),
                allowed: allowed.clone(),
                count,
            });
        }
    }
}
