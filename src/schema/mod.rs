//! Schema subsystem
//!
//! Message and enum descriptors carry the declarative rules that the rule
//! registry compiles. Descriptors are loaded once, then shared read-only.
//!
//! # Design Principles
//!
//! - Descriptors are immutable after load
//! - Every type reference resolves, or the load fails
//! - Instances are typed values; JSON is decoded strictly against a descriptor
//! - Deterministic: files and types are processed in name order

mod errors;
mod json;
mod loader;
mod types;

pub use errors::{SchemaError, SchemaResult};
pub use json::{decode_message, DecodeError};
pub(crate) use json::decode_base64;
pub use loader::SchemaLoader;
pub use types::{
    Cardinality, EnumDescriptor, EnumValueDescriptor, FieldDescriptor, FieldKind, MapKeyKind,
    MessageDescriptor, SchemaFile, SchemaSet,
};
