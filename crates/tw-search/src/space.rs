//! Search space declarations and configuration validation.

use serde::{Deserialize, Serialize};
use tw_types::{Configuration, ConfigurationError, ConfigViolation, ParamValue, RawConfig};

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    /// Human-readable parameter name (e.g. "learning_rate").
    pub name: String,
    /// The kind of search range.
    pub kind: ParamKind,
}

/// Describes how a parameter is sampled and what values are admissible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
    /// Categorical choices.
    Choice { choices: Vec<String> },
    /// Boolean toggle.
    Flag,
}

/// The full search space: an ordered list of parameter definitions.
///
/// Declaration order is also reporting order: validation errors list
/// violations in the order parameters were added.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParamDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParamDef {
            name: name.into(),
            kind: ParamKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParamDef {
            name: name.into(),
            kind: ParamKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParamDef {
            name: name.into(),
            kind: ParamKind::LogUniform { low, high },
        });
        self
    }

    pub fn add_choice(mut self, name: impl Into<String>, choices: &[&str]) -> Self {
        self.parameters.push(ParamDef {
            name: name.into(),
            kind: ParamKind::Choice {
                choices: choices.iter().map(|s| s.to_string()).collect(),
            },
        });
        self
    }

    pub fn add_flag(mut self, name: impl Into<String>) -> Self {
        self.parameters.push(ParamDef {
            name: name.into(),
            kind: ParamKind::Flag,
        });
        self
    }

    /// Total number of grid points (returns `None` if any parameter is
    /// continuous without a natural grid).
    pub fn grid_size(&self) -> Option<usize> {
        let mut total: usize = 1;
        for param in &self.parameters {
            let dim_size = match &param.kind {
                ParamKind::IntRange { low, high } => (high - low + 1) as usize,
                ParamKind::Choice { choices } => choices.len(),
                ParamKind::Flag => 2,
                // Continuous dimensions need explicit step count.
                _ => return None,
            };
            total = total.checked_mul(dim_size)?;
        }
        Some(total)
    }

    /// Validate a raw proposed configuration against the declared space.
    ///
    /// Every declared parameter must be present, type-correct, and within
    /// its domain. All violations are collected (declaration order first,
    /// then unknown extras sorted by name) so the error is deterministic
    /// and complete. Valid input passes through unchanged, except that an
    /// integer offered for a float-valued parameter is widened.
    pub fn validate(&self, raw: &RawConfig) -> Result<Configuration, ConfigurationError> {
        let mut violations = Vec::new();
        let mut values = RawConfig::with_capacity(self.parameters.len());

        for param in &self.parameters {
            let name = &param.name;
            let Some(value) = raw.get(name) else {
                violations.push(ConfigViolation::Missing { name: name.clone() });
                continue;
            };
            match (&param.kind, value) {
                (ParamKind::FloatRange { low, high }, _) => {
                    match value.as_f64() {
                        Some(v) if v.is_nan() || v.is_infinite() => {
                            violations.push(ConfigViolation::NotFinite { name: name.clone() });
                        }
                        Some(v) if v < *low => {
                            violations.push(ConfigViolation::BelowMin {
                                name: name.clone(),
                                min: *low,
                            });
                        }
                        Some(v) if v > *high => {
                            violations.push(ConfigViolation::AboveMax {
                                name: name.clone(),
                                max: *high,
                            });
                        }
                        Some(v) => {
                            values.insert(name.clone(), ParamValue::Float(v));
                        }
                        None => {
                            violations.push(ConfigViolation::WrongType {
                                name: name.clone(),
                                expected: "float",
                                found: value.type_name(),
                            });
                        }
                    }
                }
                (ParamKind::IntRange { low, high }, ParamValue::Int(v)) => {
                    if v < low {
                        violations.push(ConfigViolation::BelowMin {
                            name: name.clone(),
                            min: *low as f64,
                        });
                    } else if v > high {
                        violations.push(ConfigViolation::AboveMax {
                            name: name.clone(),
                            max: *high as f64,
                        });
                    } else {
                        values.insert(name.clone(), ParamValue::Int(*v));
                    }
                }
                (ParamKind::IntRange { .. }, _) => {
                    violations.push(ConfigViolation::WrongType {
                        name: name.clone(),
                        expected: "int",
                        found: value.type_name(),
                    });
                }
                (ParamKind::LogUniform { low, high }, _) => match value.as_f64() {
                    Some(v) if !v.is_finite() => {
                        violations.push(ConfigViolation::NotFinite { name: name.clone() });
                    }
                    Some(v) if v <= 0.0 => {
                        violations.push(ConfigViolation::NotPositive { name: name.clone() });
                    }
                    Some(v) if v < *low => {
                        violations.push(ConfigViolation::BelowMin {
                            name: name.clone(),
                            min: *low,
                        });
                    }
                    Some(v) if v > *high => {
                        violations.push(ConfigViolation::AboveMax {
                            name: name.clone(),
                            max: *high,
                        });
                    }
                    Some(v) => {
                        values.insert(name.clone(), ParamValue::Float(v));
                    }
                    None => {
                        violations.push(ConfigViolation::WrongType {
                            name: name.clone(),
                            expected: "float",
                            found: value.type_name(),
                        });
                    }
                },
                (ParamKind::Choice { choices }, ParamValue::Str(v)) => {
                    if choices.iter().any(|c| c == v) {
                        values.insert(name.clone(), ParamValue::Str(v.clone()));
                    } else {
                        violations.push(ConfigViolation::NotAChoice {
                            name: name.clone(),
                            choices: choices.clone(),
                        });
                    }
                }
                (ParamKind::Choice { .. }, _) => {
                    violations.push(ConfigViolation::WrongType {
                        name: name.clone(),
                        expected: "string",
                        found: value.type_name(),
                    });
                }
                (ParamKind::Flag, ParamValue::Bool(v)) => {
                    values.insert(name.clone(), ParamValue::Bool(*v));
                }
                (ParamKind::Flag, _) => {
                    violations.push(ConfigViolation::WrongType {
                        name: name.clone(),
                        expected: "bool",
                        found: value.type_name(),
                    });
                }
            }
        }

        // Extras the space never declared, reported after the declared
        // parameters; sorted so the message is stable.
        let mut unknown: Vec<&String> = raw
            .keys()
            .filter(|k| !self.parameters.iter().any(|p| &p.name == *k))
            .collect();
        unknown.sort();
        for name in unknown {
            violations.push(ConfigViolation::Unknown { name: name.clone() });
        }

        if violations.is_empty() {
            Ok(Configuration::new(values))
        } else {
            Err(ConfigurationError::new(violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_float("learning_rate", 0.0, 1.0)
            .add_int("depth", 2, 8)
            .add_log_uniform("l2", 1e-6, 10.0)
            .add_choice("booster", &["gbtree", "dart"])
            .add_flag("fit_intercept")
    }

    fn valid_raw() -> RawConfig {
        let mut raw = RawConfig::new();
        raw.insert("learning_rate".into(), ParamValue::Float(0.3));
        raw.insert("depth".into(), ParamValue::Int(4));
        raw.insert("l2".into(), ParamValue::Float(0.01));
        raw.insert("booster".into(), ParamValue::Str("dart".into()));
        raw.insert("fit_intercept".into(), ParamValue::Bool(true));
        raw
    }

    #[test]
    fn valid_configuration_passes_through_unchanged() {
        let raw = valid_raw();
        let config = sample_space().validate(&raw).unwrap();
        assert_eq!(config.values(), &raw);
    }

    #[test]
    fn negative_learning_rate_names_the_bound() {
        let space = SearchSpace::new().add_float("learning_rate", 0.0, 1.0);
        let mut raw = RawConfig::new();
        raw.insert("learning_rate".into(), ParamValue::Float(-0.1));
        let err = space.validate(&raw).unwrap_err();
        assert_eq!(err.to_string(), "learning_rate must be >= 0");
    }

    #[test]
    fn every_violation_reported_in_declaration_order() {
        let mut raw = valid_raw();
        raw.insert("learning_rate".into(), ParamValue::Float(1.5));
        raw.remove("depth");
        raw.insert("booster".into(), ParamValue::Str("linear".into()));
        raw.insert("extra".into(), ParamValue::Int(1));

        let err = sample_space().validate(&raw).unwrap_err();
        assert_eq!(err.violations.len(), 4);
        assert!(matches!(
            err.violations[0],
            ConfigViolation::AboveMax { ref name, .. } if name == "learning_rate"
        ));
        assert!(matches!(
            err.violations[1],
            ConfigViolation::Missing { ref name } if name == "depth"
        ));
        assert!(matches!(
            err.violations[2],
            ConfigViolation::NotAChoice { ref name, .. } if name == "booster"
        ));
        assert!(matches!(
            err.violations[3],
            ConfigViolation::Unknown { ref name } if name == "extra"
        ));
    }

    #[test]
    fn int_widens_for_float_parameter() {
        let space = SearchSpace::new().add_float("learning_rate", 0.0, 10.0);
        let mut raw = RawConfig::new();
        raw.insert("learning_rate".into(), ParamValue::Int(1));
        let config = space.validate(&raw).unwrap();
        assert_eq!(config.get("learning_rate"), Some(&ParamValue::Float(1.0)));
    }

    #[test]
    fn wrong_type_reported() {
        let space = SearchSpace::new().add_int("depth", 1, 8);
        let mut raw = RawConfig::new();
        raw.insert("depth".into(), ParamValue::Str("four".into()));
        let err = space.validate(&raw).unwrap_err();
        assert_eq!(err.to_string(), "depth must be of type int, found string");
    }

    #[test]
    fn log_uniform_rejects_non_positive() {
        let space = SearchSpace::new().add_log_uniform("l2", 1e-6, 1.0);
        let mut raw = RawConfig::new();
        raw.insert("l2".into(), ParamValue::Float(0.0));
        let err = space.validate(&raw).unwrap_err();
        assert_eq!(err.to_string(), "l2 must be positive");
    }

    #[test]
    fn nan_rejected() {
        let space = SearchSpace::new().add_float("learning_rate", 0.0, 1.0);
        let mut raw = RawConfig::new();
        raw.insert("learning_rate".into(), ParamValue::Float(f64::NAN));
        let err = space.validate(&raw).unwrap_err();
        assert_eq!(err.to_string(), "learning_rate must be a finite number");
    }

    #[test]
    fn grid_size_counts_discrete_dimensions() {
        let space = SearchSpace::new()
            .add_int("a", 1, 3)
            .add_choice("b", &["x", "y"])
            .add_flag("c");
        assert_eq!(space.grid_size(), Some(12));

        let with_float = SearchSpace::new().add_float("x", 0.0, 1.0);
        assert_eq!(with_float.grid_size(), None);
    }
}
