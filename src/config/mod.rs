//! Configuration
//!
//! Coordinator runtime settings and scenario files: loading, schema, and
//! validation.

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod validation;

pub use loader::{LoadResult, LoadWarning, LoaderOptions, ScenarioLimits, ScenarioLoader};
pub use runtime::CoordinatorConfig;
pub use schema::*;
pub use validation::{ValidationResult, Validator};
