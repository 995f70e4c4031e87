//! Observability subsystem
//!
//! - Structured logging (JSON lines on stderr)
//! - Atomic counters per validator
//! - Typed events
//!
//! Observability is read-only: nothing here affects validation outcomes.
//!
//! ```ignore
//! use protoguard::observability::{log_event_with_fields, Event, Logger};
//!
//! Logger::info("SCHEMA_LOADED", &[("files", "3")]);
//! log_event_with_fields(Event::TypeCompiled, &[("type", "acme.v1.User")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a typed event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a typed event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // This just verifies no panic
        log_event(Event::ConfigLoaded);
        log_event_with_fields(Event::TypeCompiled, &[("type", "acme.User")]);
    }
}
