//! Observable events
//!
//! Events are explicit and typed; each maps to the `event` key of a log line.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Configuration file loaded
    ConfigLoaded,
    /// Descriptor files loaded from disk
    SchemaLoaded,
    /// Rules of a message type compiled
    TypeCompiled,
    /// Rules of a message type failed to compile
    TypeCompileFailed,
    /// A validation call finished
    ValidationComplete,
    /// An expression could not be evaluated
    EvaluationFault,
    /// The CLI validate loop reached end of input
    ValidateFinished,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemaLoaded => "SCHEMA_LOADED",
            Event::TypeCompiled => "TYPE_COMPILED",
            Event::TypeCompileFailed => "TYPE_COMPILE_FAILED",
            Event::ValidationComplete => "VALIDATION_COMPLETE",
            Event::EvaluationFault => "EVALUATION_FAULT",
            Event::ValidateFinished => "VALIDATE_FINISHED",
        }
    }

    /// Severity the event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::ValidationComplete => Severity::Trace,
            Event::TypeCompileFailed => Severity::Error,
            Event::EvaluationFault => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::SchemaLoaded.as_str(), "SCHEMA_LOADED");
        assert_eq!(Event::TypeCompileFailed.to_string(), "TYPE_COMPILE_FAILED");
        assert_eq!(Event::ValidateFinished.as_str(), "VALIDATE_FINISHED");
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(Event::TypeCompiled.severity(), Severity::Info);
        assert_eq!(Event::EvaluationFault.severity(), Severity::Warn);
        assert_eq!(Event::ValidationComplete.severity(), Severity::Trace);
        assert_eq!(Event::ValidateFinished.severity(), Severity::Info);
    }
}
