//! In-memory tabular data: named, typed columns of equal length.

use serde::{Deserialize, Serialize};
use tw_types::{DataValidationError, DataViolation};

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    Float,
    Int,
    Str,
    Bool,
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float => write!(f, "float"),
            Self::Int => write!(f, "int"),
            Self::Str => write!(f, "str"),
            Self::Bool => write!(f, "bool"),
        }
    }
}

/// A single column. Missing values are `None`; a float `NaN` is treated as
/// missing by validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Str(Vec<Option<String>>),
    Bool(Vec<Option<bool>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Str(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Self::Float(_) => Dtype::Float,
            Self::Int(_) => Dtype::Int,
            Self::Str(_) => Dtype::Str,
            Self::Bool(_) => Dtype::Bool,
        }
    }

    /// True if the value at `row` is missing (or a float NaN).
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Self::Float(v) => v[row].map_or(true, f64::is_nan),
            Self::Int(v) => v[row].is_none(),
            Self::Str(v) => v[row].is_none(),
            Self::Bool(v) => v[row].is_none(),
        }
    }

    pub fn null_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    /// Numeric view of the value at `row`: floats as-is, ints widened,
    /// bools as 0/1, strings have no numeric view.
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Self::Float(v) => v[row].filter(|x| !x.is_nan()),
            Self::Int(v) => v[row].map(|x| x as f64),
            Self::Bool(v) => v[row].map(|x| if x { 1.0 } else { 0.0 }),
            Self::Str(_) => None,
        }
    }

    pub fn str_at(&self, row: usize) -> Option<&str> {
        match self {
            Self::Str(v) => v[row].as_deref(),
            _ => None,
        }
    }

    /// New column keeping only rows where `keep[i]` is true.
    fn filtered(&self, keep: &[bool]) -> Column {
        fn pick<T: Clone>(values: &[Option<T>], keep: &[bool]) -> Vec<Option<T>> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, &k)| k)
                .map(|(v, _)| v.clone())
                .collect()
        }
        match self {
            Self::Float(v) => Self::Float(pick(v, keep)),
            Self::Int(v) => Self::Int(pick(v, keep)),
            Self::Str(v) => Self::Str(pick(v, keep)),
            Self::Bool(v) => Self::Bool(pick(v, keep)),
        }
    }
}

/// An ordered collection of named columns, all the same length.
///
/// Frames are immutable during a trial; workers share them by reference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    columns: Vec<(String, Column)>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Fails if its length does not match the frame.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        column: Column,
    ) -> Result<Self, DataValidationError> {
        let name = name.into();
        let expected = self.n_rows();
        if !self.columns.is_empty() && column.len() != expected {
            return Err(DataValidationError::new(vec![DataViolation::LengthMismatch {
                name,
                expected,
                found: column.len(),
            }]));
        }
        self.columns.push((name, column));
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// New frame keeping only rows where `keep[i]` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> Frame {
        debug_assert_eq!(keep.len(), self.n_rows());
        Frame {
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.filtered(keep)))
                .collect(),
        }
    }

    /// Extract a numeric feature matrix and target vector.
    ///
    /// Rows are optionally restricted to those where `split_column` equals
    /// 1 (int) or true (bool). Features are every numeric or bool column
    /// except the target, the split column, and the columns listed in
    /// `drop`; string columns are skipped. Missing values in the selected
    /// rows are a violation, since feature extraction runs after schema
    /// validation and nullable columns should have been dropped or excluded.
    pub fn features_and_target(
        &self,
        target: &str,
        drop: &[String],
        split_column: Option<&str>,
    ) -> Result<(Vec<Vec<f64>>, Vec<f64>), DataValidationError> {
        let mut violations = Vec::new();

        let target_col = match self.column(target) {
            Some(c) if matches!(c.dtype(), Dtype::Float | Dtype::Int) => Some(c),
            Some(c) => {
                violations.push(DataViolation::WrongDtype {
                    name: target.to_string(),
                    expected: "float".to_string(),
                    found: c.dtype().to_string(),
                });
                None
            }
            None => {
                violations.push(DataViolation::MissingColumn {
                    name: target.to_string(),
                });
                None
            }
        };

        let keep: Vec<bool> = match split_column {
            Some(name) => match self.column(name) {
                Some(col) => (0..self.n_rows())
                    .map(|i| col.f64_at(i) == Some(1.0))
                    .collect(),
                None => {
                    violations.push(DataViolation::MissingColumn {
                        name: name.to_string(),
                    });
                    Vec::new()
                }
            },
            None => vec![true; self.n_rows()],
        };

        if !violations.is_empty() {
            return Err(DataValidationError::new(violations));
        }
        let target_col = target_col.expect("checked above");

        let feature_cols: Vec<(&str, &Column)> = self
            .columns
            .iter()
            .filter(|(name, col)| {
                name != target
                    && Some(name.as_str()) != split_column
                    && !drop.iter().any(|d| d == name)
                    && col.dtype() != Dtype::Str
            })
            .map(|(n, c)| (n.as_str(), c))
            .collect();

        // Nulls in the rows we are about to use make the matrix unbuildable;
        // report them per column before assembling anything.
        let kept_rows: Vec<usize> = (0..self.n_rows()).filter(|&i| keep[i]).collect();
        for (name, col) in std::iter::once((target, target_col)).chain(feature_cols.iter().copied())
        {
            let count = kept_rows
                .iter()
                .filter(|&&row| col.f64_at(row).is_none())
                .count();
            if count > 0 {
                violations.push(DataViolation::UnexpectedNulls {
                    name: name.to_string(),
                    count,
                });
            }
        }
        if !violations.is_empty() {
            return Err(DataValidationError::new(violations));
        }

        let mut x = Vec::with_capacity(kept_rows.len());
        let mut y = Vec::with_capacity(kept_rows.len());
        for &row in &kept_rows {
            y.push(target_col.f64_at(row).expect("nulls checked above"));
            x.push(
                feature_cols
                    .iter()
                    .map(|(_, col)| col.f64_at(row).expect("nulls checked above"))
                    .collect(),
            );
        }
        Ok((x, y))
    }
}
