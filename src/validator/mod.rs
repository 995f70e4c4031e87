//! Validation subsystem
//!
//! - `engine`: the [`Validator`] façade and message traversal
//! - `cache`: compile-once cache of rule sets
//! - `violation`: violations, faults, field paths and results

mod cache;
mod engine;
mod violation;

pub use cache::{CacheEntry, Lookup, RuleCache};
pub use engine::{ValidateError, Validator, ValidatorState};
pub use violation::{EvaluationFault, FieldPath, PathElement, ValidationResult, Violation};
