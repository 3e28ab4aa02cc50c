//! # tw-runner
//!
//! Validated trial execution and study orchestration for TuneWell.
//!
//! The [`TrialRunner`] enforces the trial pipeline: validate the proposed
//! configuration against the search space, validate the dataset against the
//! schema, and only then hand both to the [`Objective`]. Evaluation failures
//! (errors, panics, exhausted budgets) become failed trial results rather
//! than propagating, so a bad configuration never takes down a sweep.
//! [`Study`] drives a strategy through batches of such trials and reports
//! the best result.

pub mod context;
pub mod objective;
pub mod runner;
pub mod study;

pub use context::{CancelToken, TrialContext};
pub use objective::{CrossValidatedRegression, FnObjective, Objective};
pub use runner::TrialRunner;
pub use study::{Study, StudyReport, StudyState};
