//! CLI-specific error types
//!
//! All CLI errors are fatal: the process prints the error and exits non-zero.
//! Per-instance failures of `validate` are responses, not errors.

use std::io;

use thiserror::Error;

use crate::schema::SchemaError;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdin/stdout)
    IoError,
    /// Configuration file already exists
    AlreadyInitialized,
    /// Schema failed to load or compile
    SchemaError,
    /// An input line is not JSON
    InvalidJson,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PROTOGUARD_CLI_CONFIG_ERROR",
            Self::IoError => "PROTOGUARD_CLI_IO_ERROR",
            Self::AlreadyInitialized => "PROTOGUARD_CLI_ALREADY_INITIALIZED",
            Self::SchemaError => "PROTOGUARD_CLI_SCHEMA_ERROR",
            Self::InvalidJson => "PROTOGUARD_CLI_INVALID_JSON",
        }
    }
}

/// CLI error
#[derive(Debug, Error)]
#[error("{}: {message}", .code.code())]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Already initialized
    pub fn already_initialized(path: &std::path::Path) -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            format!("{} already exists", path.display()),
        )
    }

    /// Get the error code
    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        Self::new(CliErrorCode::SchemaError, format!("{}: {}", e.code(), e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CliError::config_error("schema_dir must not be empty");
        assert_eq!(
            err.to_string(),
            "PROTOGUARD_CLI_CONFIG_ERROR: schema_dir must not be empty"
        );
    }

    #[test]
    fn test_from_schema_error() {
        let err = CliError::from(SchemaError::UnknownMessage("a.B".into()));
        assert_eq!(err.code(), CliErrorCode::SchemaError);
        assert!(err.message().starts_with("PROTOGUARD_UNKNOWN_MESSAGE"));
    }
}
