//! protoguard - declarative constraint validation for schema-annotated messages
//!
//! Rules live in the schema next to the fields they constrain. Each message
//! type's rules are compiled once into an immutable rule set; validating an
//! instance walks it depth-first and reports every violation with its field
//! path and a stable constraint id.
//!
//! ```ignore
//! use protoguard::{MessageValue, SchemaSet, Validator};
//!
//! let schema = SchemaSet::from_json(descriptor_json)?;
//! let validator = Validator::new(schema);
//! let result = validator.validate(&MessageValue::new("acme.v1.User").with("email", "x"))?;
//! for violation in result.iter() {
//!     println!("{}: {}", violation.field_path, violation.message);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod expr;
pub mod formats;
pub mod observability;
pub mod rules;
pub mod schema;
pub mod validator;
pub mod value;

pub use config::{FaultPolicy, ValidatorConfig};
pub use schema::{decode_message, DecodeError, SchemaError, SchemaLoader, SchemaResult, SchemaSet};
pub use validator::{
    EvaluationFault, FieldPath, PathElement, ValidateError, ValidationResult, Validator,
    ValidatorState, Violation,
};
pub use value::{MapKey, MessageValue, Value};
