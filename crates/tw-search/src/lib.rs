//! # tw-search
//!
//! Search space declarations, configuration validation, and parameter sweep
//! strategies (grid, random, Bayesian) for TuneWell.
//!
//! A [`SearchSpace`] doubles as the validator for proposed configurations:
//! strategies sample raw configurations from it, and
//! [`SearchSpace::validate`] checks any raw configuration against the
//! declared bounds before a trial may use it.

pub mod config;
pub mod space;
pub mod strategy;

pub use config::StudyConfig;
pub use space::{ParamDef, ParamKind, SearchSpace};
pub use strategy::{BayesianSearch, GridSearch, RandomSearch, Strategy, StrategyKind};
