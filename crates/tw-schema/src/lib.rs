//! # tw-schema
//!
//! Tabular data model and schema validation for TuneWell.
//!
//! A [`Frame`] holds named, typed columns; a [`Schema`] declares what a
//! valid frame looks like (column presence, dtypes, nullability, value
//! ranges, categorical membership) and validates frames under a strict or
//! lenient [`ValidationPolicy`].

pub mod frame;
pub mod loader;
pub mod schema;

pub use frame::*;
pub use loader::*;
pub use schema::*;
pub use tw_types::{DataValidationError, DataViolation};
