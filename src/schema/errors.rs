//! Schema error types
//!
//! Every schema error is detected before validation starts and is fatal for
//! the affected message type. Each variant carries a stable code:
//! - PROTOGUARD_UNKNOWN_MESSAGE
//! - PROTOGUARD_UNKNOWN_ENUM
//! - PROTOGUARD_DUPLICATE_TYPE
//! - PROTOGUARD_MALFORMED_DESCRIPTOR
//! - PROTOGUARD_RULE_KIND_MISMATCH
//! - PROTOGUARD_INVALID_PARAMETER
//! - PROTOGUARD_CONFLICTING_PARAMETERS
//! - PROTOGUARD_DUPLICATE_RULE_ID
//! - PROTOGUARD_EMPTY_RULE_ID
//! - PROTOGUARD_UNKNOWN_FIELD
//! - PROTOGUARD_EXPRESSION
//! - PROTOGUARD_SCHEMA_IO

use thiserror::Error;

use crate::expr::ExpressionError;

/// Schema error with the attachment point it was found at.
///
/// `target` names a message (`acme.v1.User`) or a field
/// (`acme.v1.User.email`, `acme.v1.User.tags[]` for element rules).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("unknown message type '{0}'")]
    UnknownMessage(String),

    #[error("unknown enum type '{0}'")]
    UnknownEnum(String),

    #[error("type '{0}' is defined more than once")]
    DuplicateType(String),

    #[error("malformed descriptor '{origin}': {reason}")]
    MalformedDescriptor { origin: String, reason: String },

    #[error("{target}: '{rules}' rules cannot apply to a {kind} field")]
    RuleKindMismatch {
        target: String,
        rules: String,
        kind: String,
    },

    #[error("{target}: invalid '{rule}' parameter: {reason}")]
    InvalidParameter {
        target: String,
        rule: String,
        reason: String,
    },

    #[error("{target}: conflicting parameters: {reason}")]
    ConflictingParameters { target: String, reason: String },

    #[error("{target}: rule id '{id}' is used more than once")]
    DuplicateRuleId { target: String, id: String },

    #[error("{target}: rule id must not be empty")]
    EmptyRuleId { target: String },

    #[error("{target}: unknown field '{field}'")]
    UnknownField { target: String, field: String },

    #[error("{target}: rule '{id}': {source}")]
    Expression {
        target: String,
        id: String,
        #[source]
        source: ExpressionError,
    },

    #[error("schema file '{path}': {reason}")]
    Io { path: String, reason: String },
}

impl SchemaError {
    pub fn malformed(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::MalformedDescriptor {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameter(
        target: impl Into<String>,
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SchemaError::InvalidParameter {
            target: target.into(),
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    pub fn conflicting(target: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::ConflictingParameters {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SchemaError::Io {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaError::UnknownMessage(_) => "PROTOGUARD_UNKNOWN_MESSAGE",
            SchemaError::UnknownEnum(_) => "PROTOGUARD_UNKNOWN_ENUM",
            SchemaError::DuplicateType(_) => "PROTOGUARD_DUPLICATE_TYPE",
            SchemaError::MalformedDescriptor { .. } => "PROTOGUARD_MALFORMED_DESCRIPTOR",
            SchemaError::RuleKindMismatch { .. } => "PROTOGUARD_RULE_KIND_MISMATCH",
            SchemaError::InvalidParameter { .. } => "PROTOGUARD_INVALID_PARAMETER",
            SchemaError::ConflictingParameters { .. } => "PROTOGUARD_CONFLICTING_PARAMETERS",
            SchemaError::DuplicateRuleId { .. } => "PROTOGUARD_DUPLICATE_RULE_ID",
            SchemaError::EmptyRuleId { .. } => "PROTOGUARD_EMPTY_RULE_ID",
            SchemaError::UnknownField { .. } => "PROTOGUARD_UNKNOWN_FIELD",
            SchemaError::Expression { .. } => "PROTOGUARD_EXPRESSION",
            SchemaError::Io { .. } => "PROTOGUARD_SCHEMA_IO",
        }
    }
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
