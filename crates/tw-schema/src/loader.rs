//! Schema-driven CSV loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tw_types::{TwError, TwResult};

use crate::frame::{Column, Dtype, Frame};
use crate::schema::Schema;

/// Everything the runner needs to know about a dataset: where it lives,
/// what it must look like, and how to split it into features and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub schema: Schema,
    pub target: String,
    #[serde(default)]
    pub drop_features: Vec<String>,
    #[serde(default)]
    pub split_column: Option<String>,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
}

fn default_cv_folds() -> usize {
    5
}

impl DatasetConfig {
    pub fn new(schema: Schema, target: impl Into<String>) -> Self {
        Self {
            path: None,
            schema,
            target: target.into(),
            drop_features: Vec::new(),
            split_column: None,
            cv_folds: default_cv_folds(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_split_column(mut self, name: impl Into<String>) -> Self {
        self.split_column = Some(name.into());
        self
    }

    pub fn with_drop_features(mut self, names: &[&str]) -> Self {
        self.drop_features = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }
}

/// Load a CSV file into a [`Frame`], parsing each column according to the
/// schema's declared dtype (undeclared columns load as strings).
///
/// Cells that are empty or fail to parse become nulls; schema validation
/// decides whether those are acceptable. Columns the schema declares but the
/// file lacks are simply absent and will be reported by validation.
pub fn load_csv<P: AsRef<Path>>(path: P, schema: &Schema) -> TwResult<Frame> {
    let path = path.as_ref();
    info!("loading CSV data from: {}", path.display());

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| TwError::Loading(format!("failed to open {}: {e}", path.display())))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| TwError::Loading(format!("failed to read headers: {e}")))?
        .iter()
        .map(ToString::to_string)
        .collect();

    let dtypes: Vec<Dtype> = headers
        .iter()
        .map(|name| schema.spec(name).map_or(Dtype::Str, |s| s.dtype))
        .collect();

    let mut builders: Vec<ColumnBuilder> = dtypes.iter().map(|&d| ColumnBuilder::new(d)).collect();

    for (line, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| TwError::Loading(format!("failed to read row {line}: {e}")))?;
        for (idx, builder) in builders.iter_mut().enumerate() {
            builder.push(record.get(idx).unwrap_or(""));
        }
    }

    let mut frame = Frame::new();
    for (name, builder) in headers.into_iter().zip(builders) {
        frame = frame
            .with_column(name, builder.finish())
            .map_err(TwError::Data)?;
    }
    debug!(rows = frame.n_rows(), cols = frame.n_cols(), "CSV loaded");
    Ok(frame)
}

enum ColumnBuilder {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Str(Vec<Option<String>>),
    Bool(Vec<Option<bool>>),
}

impl ColumnBuilder {
    fn new(dtype: Dtype) -> Self {
        match dtype {
            Dtype::Float => Self::Float(Vec::new()),
            Dtype::Int => Self::Int(Vec::new()),
            Dtype::Str => Self::Str(Vec::new()),
            Dtype::Bool => Self::Bool(Vec::new()),
        }
    }

    fn push(&mut self, cell: &str) {
        if cell.is_empty() {
            match self {
                Self::Float(v) => v.push(None),
                Self::Int(v) => v.push(None),
                Self::Str(v) => v.push(None),
                Self::Bool(v) => v.push(None),
            }
            return;
        }
        match self {
            Self::Float(v) => v.push(cell.parse().ok()),
            Self::Int(v) => v.push(cell.parse().ok()),
            Self::Str(v) => v.push(Some(cell.to_string())),
            Self::Bool(v) => v.push(match cell {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            }),
        }
    }

    fn finish(self) -> Column {
        match self {
            Self::Float(v) => Column::Float(v),
            Self::Int(v) => Column::Int(v),
            Self::Str(v) => Column::Str(v),
            Self::Bool(v) => Column::Bool(v),
        }
    }
}
