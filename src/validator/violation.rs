//! Violations, faults and field paths
//!
//! Paths render as `a.b[2].c["key"]`: dot-separated field names, `[i]` for
//! list indexes and `[key]` for map keys (strings quoted).

use std::fmt;

use serde::{Serialize, Serializer};

use crate::value::MapKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Field(String),
    Index(usize),
    Key(MapKey),
}

/// Location of a value inside a message tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    elements: Vec<PathElement>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: PathElement) {
        self.elements.push(element);
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.elements.pop()
    }

    /// Returns a copy extended with a field name.
    pub fn child(&self, field: &str) -> FieldPath {
        let mut path = self.clone();
        path.push(PathElement::Field(field.to_string()));
        path
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            match element {
                PathElement::Field(name) if i == 0 => f.write_str(name)?,
                PathElement::Field(name) => write!(f, ".{}", name)?,
                PathElement::Index(index) => write!(f, "[{}]", index)?,
                PathElement::Key(key) => write!(f, "[{}]", key)?,
            }
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field_path: FieldPath,
    pub constraint_id: String,
    pub message: String,
    /// Raised against a map key rather than its value.
    pub for_key: bool,
}

/// A rule that could not be evaluated. Distinct from a violation: the
/// instance was neither accepted nor rejected by the rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationFault {
    pub field_path: FieldPath,
    /// The rule being evaluated; `None` when the value itself has the wrong
    /// shape for its field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_id: Option<String>,
    pub message: String,
}

impl fmt::Display for EvaluationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.field_path.is_root() {
            "<root>".to_string()
        } else {
            self.field_path.to_string()
        };
        match &self.constraint_id {
            Some(id) => write!(f, "{}: rule '{}': {}", path, id, self.message),
            None => write!(f, "{}: {}", path, self.message),
        }
    }
}

/// Outcome of one validation call, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub violations: Vec<Violation>,
    /// Filled only under the `report` fault policy.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<EvaluationFault>,
}

impl ValidationResult {
    /// No violations and no faults.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty() && self.faults.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    /// Constraint ids in order, for quick assertions.
    pub fn constraint_ids(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.constraint_id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_rendering() {
        let mut path = FieldPath::root();
        path.push(PathElement::Field("items".into()));
        path.push(PathElement::Index(1));
        path.push(PathElement::Field("sku".into()));
        assert_eq!(path.to_string(), "items[1].sku");

        let mut path = FieldPath::root().child("settings");
        path.push(PathElement::Key(MapKey::from("timeout")));
        path.push(PathElement::Field("value".into()));
        assert_eq!(path.to_string(), "settings[\"timeout\"].value");

        let mut path = FieldPath::root().child("flags");
        path.push(PathElement::Key(MapKey::Bool(true)));
        assert_eq!(path.to_string(), "flags[true]");

        assert_eq!(FieldPath::root().to_string(), "");
    }

    #[test]
    fn test_violation_serialization() {
        let violation = Violation {
            field_path: FieldPath::root().child("email"),
            constraint_id: "string.email".into(),
            message: "value must be a valid email address".into(),
            for_key: false,
        };
        let json = serde_json::to_value(&violation).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "field_path": "email",
                "constraint_id": "string.email",
                "message": "value must be a valid email address",
                "for_key": false
            })
        );
    }

    #[test]
    fn test_result_accessors() {
        let mut result = ValidationResult::default();
        assert!(result.is_valid());
        result.violations.push(Violation {
            field_path: FieldPath::root(),
            constraint_id: "message.oneof".into(),
            message: "only one of a, b can be set".into(),
            for_key: false,
        });
        assert!(!result.is_valid());
        assert_eq!(result.constraint_ids(), vec!["message.oneof"]);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_fault_display() {
        let fault = EvaluationFault {
            field_path: FieldPath::root().child("ratio"),
            constraint_id: Some("ratio_ok".into()),
            message: "division by zero".into(),
        };
        assert_eq!(fault.to_string(), "ratio: rule 'ratio_ok': division by zero");
    }
}
