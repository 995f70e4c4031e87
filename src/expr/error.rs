//! Expression errors
//!
//! `ExpressionError` is raised while compiling an expression and always means
//! the rule itself is broken. `EvalError` is raised while evaluating a
//! compiled expression against a value.

use thiserror::Error;

/// Compile-time expression failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("undeclared reference to '{0}'")]
    UnboundIdentifier(String),

    #[error("undefined field '{field}' on type '{type_name}'")]
    UndefinedField { type_name: String, field: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("found no matching overload for '{function}' applied to ({args})")]
    NoMatchingOverload { function: String, args: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("expression must evaluate to bool or string, found {0}")]
    InvalidResultType(String),
}

impl ExpressionError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ExpressionError::Syntax { .. } => "PROTOGUARD_EXPR_SYNTAX",
            ExpressionError::UnboundIdentifier(_) => "PROTOGUARD_EXPR_UNBOUND_IDENTIFIER",
            ExpressionError::UndefinedField { .. } => "PROTOGUARD_EXPR_UNDEFINED_FIELD",
            ExpressionError::UnknownFunction(_) => "PROTOGUARD_EXPR_UNKNOWN_FUNCTION",
            ExpressionError::NoMatchingOverload { .. } => "PROTOGUARD_EXPR_NO_OVERLOAD",
            ExpressionError::TypeMismatch(_) => "PROTOGUARD_EXPR_TYPE_MISMATCH",
            ExpressionError::InvalidPattern { .. } => "PROTOGUARD_EXPR_INVALID_PATTERN",
            ExpressionError::InvalidResultType(_) => "PROTOGUARD_EXPR_RESULT_TYPE",
        }
    }
}

/// Runtime evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn no_overload(function: &str, args: &[&str]) -> Self {
        Self::new(format!(
            "no such overload: {}({})",
            function,
            args.join(", ")
        ))
    }

    pub(crate) fn overflow(operation: &str) -> Self {
        Self::new(format!("{} overflow", operation))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type for evaluation
pub type EvalResult<T> = Result<T, EvalError>;
