//! Validator configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a validation does when an expression cannot be evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Stop and return the fault as an error.
    #[default]
    Abort,
    /// Record the fault in the result and keep going.
    Report,
}

impl std::str::FromStr for FaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(FaultPolicy::Abort),
            "report" => Ok(FaultPolicy::Report),
            other => Err(format!(
                "invalid fault_policy '{}'. Must be 'abort' or 'report'.",
                other
            )),
        }
    }
}

/// Library-level settings of a [`Validator`](crate::Validator).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub fault_policy: FaultPolicy,
    /// Fixed evaluation time; the wall clock at each call when unset.
    pub now: Option<DateTime<Utc>>,
    /// Compile every schema type at construction.
    pub eager: bool,
}

impl ValidatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set the fault policy
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Builder pattern: pin the evaluation time
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Builder pattern: compile all types up front
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::default();
        assert_eq!(config.fault_policy, FaultPolicy::Abort);
        assert!(config.now.is_none());
        assert!(!config.eager);
    }

    #[test]
    fn test_fault_policy_parse() {
        assert_eq!("report".parse::<FaultPolicy>().unwrap(), FaultPolicy::Report);
        assert!("ignore".parse::<FaultPolicy>().is_err());
        let parsed: FaultPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(parsed, FaultPolicy::Abort);
    }
}
