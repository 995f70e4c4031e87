//! Schema descriptor types
//!
//! Descriptors arrive as JSON documents, one package per file:
//!
//! ```json
//! {"package": "acme.v1",
//!  "enums": [{"name": "Status", "values": [{"name": "ACTIVE", "number": 1}]}],
//!  "messages": [{"name": "User", "fields": [{"name": "email", "type": "string"}]}]}
//! ```
//!
//! Type names without a dot are qualified with the file's package.

use std::collections::{BTreeMap, HashSet};

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{SchemaError, SchemaResult};
use crate::expr::{Type, TypeProvider};
use crate::rules::{FieldRules, MessageRules};
use crate::value::{MessageValue, Value};

/// Kind of a single field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    String,
    Bytes,
    Enum {
        #[serde(rename = "enum")]
        enum_name: String,
    },
    Message {
        message: String,
    },
    Timestamp,
    Duration,
}

impl FieldKind {
    /// Returns the kind name, which is also the name of its rule slot
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Bool => "bool",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint32 => "uint32",
            FieldKind::Uint64 => "uint64",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::String => "string",
            FieldKind::Bytes => "bytes",
            FieldKind::Enum { .. } => "enum",
            FieldKind::Message { .. } => "message",
            FieldKind::Timestamp => "timestamp",
            FieldKind::Duration => "duration",
        }
    }

    /// Static expression type of a value of this kind.
    pub fn value_type(&self) -> Type {
        match self {
            FieldKind::Bool => Type::Bool,
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Enum { .. } => Type::Int,
            FieldKind::Uint32 | FieldKind::Uint64 => Type::UInt,
            FieldKind::Float | FieldKind::Double => Type::Double,
            FieldKind::String => Type::String,
            FieldKind::Bytes => Type::Bytes,
            FieldKind::Message { message } => Type::Message(message.clone()),
            FieldKind::Timestamp => Type::Timestamp,
            FieldKind::Duration => Type::Duration,
        }
    }

    /// Zero value of this kind.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Int32 | FieldKind::Int64 | FieldKind::Enum { .. } => Value::Int(0),
            FieldKind::Uint32 | FieldKind::Uint64 => Value::UInt(0),
            FieldKind::Float | FieldKind::Double => Value::Double(0.0),
            FieldKind::String => Value::String(String::new()),
            FieldKind::Bytes => Value::Bytes(Vec::new()),
            FieldKind::Message { message } => Value::Message(MessageValue::new(message.clone())),
            FieldKind::Timestamp => Utc
                .timestamp_opt(0, 0)
                .single()
                .map(Value::Timestamp)
                .unwrap_or(Value::Null),
            FieldKind::Duration => Value::Duration(chrono::Duration::zero()),
        }
    }

    /// Whether a runtime value has the shape this kind requires.
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldKind::Bool, Value::Bool(_)) => true,
            (FieldKind::Int32 | FieldKind::Enum { .. }, Value::Int(i)) => i32::try_from(*i).is_ok(),
            (FieldKind::Int64, Value::Int(_)) => true,
            (FieldKind::Uint32, Value::UInt(u)) => u32::try_from(*u).is_ok(),
            (FieldKind::Uint64, Value::UInt(_)) => true,
            (FieldKind::Float | FieldKind::Double, Value::Double(_)) => true,
            (FieldKind::String, Value::String(_)) => true,
            (FieldKind::Bytes, Value::Bytes(_)) => true,
            (FieldKind::Message { message }, Value::Message(m)) => m.type_name() == message,
            (FieldKind::Timestamp, Value::Timestamp(_)) => true,
            (FieldKind::Duration, Value::Duration(_)) => true,
            _ => false,
        }
    }

    fn qualify(&mut self, package: &str) {
        match self {
            FieldKind::Enum { enum_name: name } | FieldKind::Message { message: name } => {
                *name = qualify(package, name);
            }
            _ => {}
        }
    }
}

/// Kinds allowed as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKeyKind {
    Bool,
    Int32,
    Int64,
    Uint32,
    Uint64,
    String,
}

impl MapKeyKind {
    /// The equivalent field kind, used to apply key rules.
    pub fn field_kind(&self) -> FieldKind {
        match self {
            MapKeyKind::Bool => FieldKind::Bool,
            MapKeyKind::Int32 => FieldKind::Int32,
            MapKeyKind::Int64 => FieldKind::Int64,
            MapKeyKind::Uint32 => FieldKind::Uint32,
            MapKeyKind::Uint64 => FieldKind::Uint64,
            MapKeyKind::String => FieldKind::String,
        }
    }
}

/// How many values a field holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    Singular,
    Repeated,
    Map { key: MapKeyKind },
}

/// Field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Value kind (of the elements for repeated fields, of the values for maps)
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "is_singular")]
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "FieldRules::is_empty")]
    pub rules: FieldRules,
}

fn is_singular(c: &Cardinality) -> bool {
    *c == Cardinality::Singular
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cardinality: Cardinality::Singular,
            rules: FieldRules::default(),
        }
    }

    /// Builder pattern: mark as repeated
    pub fn repeated(mut self) -> Self {
        self.cardinality = Cardinality::Repeated;
        self
    }

    /// Builder pattern: mark as map with the given key kind
    pub fn map(mut self, key: MapKeyKind) -> Self {
        self.cardinality = Cardinality::Map { key };
        self
    }

    /// Builder pattern: attach rules
    pub fn with_rules(mut self, rules: FieldRules) -> Self {
        self.rules = rules;
        self
    }

    /// Static expression type of the whole field.
    pub fn field_type(&self) -> Type {
        let value = self.kind.value_type();
        match &self.cardinality {
            Cardinality::Singular => value,
            Cardinality::Repeated => Type::list(value),
            Cardinality::Map { key } => Type::map(key.field_kind().value_type(), value),
        }
    }

    /// Value observed when the field is unset.
    pub fn default_value(&self) -> Value {
        match &self.cardinality {
            Cardinality::Singular => self.kind.zero_value(),
            Cardinality::Repeated => Value::List(Vec::new()),
            Cardinality::Map { .. } => Value::Map(BTreeMap::new()),
        }
    }
}

/// Message type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "is_default_rules")]
    pub rules: MessageRules,
}

fn is_default_rules(rules: &MessageRules) -> bool {
    *rules == MessageRules::default()
}

impl MessageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            rules: MessageRules::default(),
        }
    }

    /// Builder pattern: add a field
    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Builder pattern: attach message rules
    pub fn with_rules(mut self, rules: MessageRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates the descriptor structure itself (not an instance)
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("message name must not be empty".into());
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(format!("message '{}' has a field without a name", self.name));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(format!(
                    "message '{}' declares field '{}' more than once",
                    self.name, field.name
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValueDescriptor {
    pub name: String,
    pub number: i32,
}

/// Enum type definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDescriptor {
    pub name: String,
    #[serde(default)]
    pub values: Vec<EnumValueDescriptor>,
}

impl EnumDescriptor {
    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.values.iter().find(|v| v.name == name).map(|v| v.number)
    }

    pub fn is_defined(&self, number: i32) -> bool {
        self.values.iter().any(|v| v.number == number)
    }

    /// Validates the descriptor structure itself
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("enum name must not be empty".into());
        }
        let mut seen = HashSet::new();
        for value in &self.values {
            if !seen.insert(value.name.as_str()) {
                return Err(format!(
                    "enum '{}' declares value '{}' more than once",
                    self.name, value.name
                ));
            }
        }
        Ok(())
    }
}

/// One descriptor document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaFile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enums: Vec<EnumDescriptor>,
    #[serde(default)]
    pub messages: Vec<MessageDescriptor>,
}

impl SchemaFile {
    /// Qualifies every type name and type reference with the package.
    fn qualified(mut self) -> Self {
        let package = self.package.clone();
        for descriptor in &mut self.enums {
            descriptor.name = qualify(&package, &descriptor.name);
        }
        for message in &mut self.messages {
            message.name = qualify(&package, &message.name);
            for field in &mut message.fields {
                field.kind.qualify(&package);
            }
        }
        self
    }
}

fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() || name.contains('.') {
        name.to_string()
    } else {
        format!("{}.{}", package, name)
    }
}

/// All known message and enum types, keyed by full name.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    messages: BTreeMap<String, MessageDescriptor>,
    enums: BTreeMap<String, EnumDescriptor>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a single descriptor document and checks its references.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let file: SchemaFile = serde_json::from_str(json)
            .map_err(|e| SchemaError::malformed("<inline>", format!("invalid JSON: {}", e)))?;
        let mut set = SchemaSet::new();
        set.add_file(file)?;
        set.check_references()?;
        Ok(set)
    }

    /// Adds every type of a descriptor document.
    ///
    /// References to other types are not resolved here; call
    /// [`SchemaSet::check_references`] once all files are added.
    pub fn add_file(&mut self, file: SchemaFile) -> SchemaResult<()> {
        let file = file.qualified();
        for descriptor in file.enums {
            self.add_enum(descriptor)?;
        }
        for message in file.messages {
            self.add_message(message)?;
        }
        Ok(())
    }

    pub fn add_message(&mut self, message: MessageDescriptor) -> SchemaResult<()> {
        message
            .validate_structure()
            .map_err(|reason| SchemaError::malformed(message.name.clone(), reason))?;
        if self.is_defined(&message.name) {
            return Err(SchemaError::DuplicateType(message.name));
        }
        self.messages.insert(message.name.clone(), message);
        Ok(())
    }

    pub fn add_enum(&mut self, descriptor: EnumDescriptor) -> SchemaResult<()> {
        descriptor
            .validate_structure()
            .map_err(|reason| SchemaError::malformed(descriptor.name.clone(), reason))?;
        if self.is_defined(&descriptor.name) {
            return Err(SchemaError::DuplicateType(descriptor.name));
        }
        self.enums.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.messages.contains_key(name) || self.enums.contains_key(name)
    }

    /// Checks that every field refers to a known message or enum type.
    pub fn check_references(&self) -> SchemaResult<()> {
        for message in self.messages.values() {
            for field in &message.fields {
                match &field.kind {
                    FieldKind::Message { message } if !self.messages.contains_key(message) => {
                        return Err(SchemaError::UnknownMessage(message.clone()));
                    }
                    FieldKind::Enum { enum_name } if !self.enums.contains_key(enum_name) => {
                        return Err(SchemaError::UnknownEnum(enum_name.clone()));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub fn message(&self, name: &str) -> Option<&MessageDescriptor> {
        self.messages.get(name)
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name)
    }

    /// Message types in name order.
    pub fn messages(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.messages.values()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }
}

impl TypeProvider for SchemaSet {
    fn field_type(&self, message: &str, field: &str) -> Option<Type> {
        self.message(message)?.field(field).map(FieldDescriptor::field_type)
    }

    fn default_value(&self, message: &str, field: &str) -> Option<Value> {
        self.message(message)?
            .field(field)
            .map(FieldDescriptor::default_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS: &str = r#"{
        "package": "acme.v1",
        "enums": [{"name": "Status", "values": [{"name": "ACTIVE", "number": 1}]}],
        "messages": [
            {"name": "User", "fields": [
                {"name": "email", "type": "string", "rules": {"string": {"email": true}}},
                {"name": "status", "type": "enum", "enum": "Status"},
                {"name": "tags", "type": "string", "cardinality": "repeated"},
                {"name": "settings", "type": "message", "message": "Setting",
                 "cardinality": {"map": {"key": "string"}}}
            ]},
            {"name": "Setting", "fields": [{"name": "value", "type": "int64"}]}
        ]
    }"#;

    #[test]
    fn test_parse_and_qualify() {
        let set = SchemaSet::from_json(USERS).unwrap();
        assert_eq!(set.message_count(), 2);
        assert_eq!(set.enum_count(), 1);

        let user = set.message("acme.v1.User").unwrap();
        assert_eq!(
            user.field("status").unwrap().kind,
            FieldKind::Enum {
                enum_name: "acme.v1.Status".into()
            }
        );
        assert_eq!(
            user.field("settings").unwrap().cardinality,
            Cardinality::Map {
                key: MapKeyKind::String
            }
        );
        assert!(user.field("email").unwrap().rules.string.is_some());
    }

    #[test]
    fn test_field_types() {
        let set = SchemaSet::from_json(USERS).unwrap();
        assert_eq!(set.field_type("acme.v1.User", "status"), Some(Type::Int));
        assert_eq!(
            set.field_type("acme.v1.User", "tags"),
            Some(Type::list(Type::String))
        );
        assert_eq!(
            set.field_type("acme.v1.User", "settings"),
            Some(Type::map(
                Type::String,
                Type::Message("acme.v1.Setting".into())
            ))
        );
        assert_eq!(set.field_type("acme.v1.User", "missing"), None);
        assert_eq!(
            set.default_value("acme.v1.Setting", "value"),
            Some(Value::Int(0))
        );
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let json = r#"{"messages": [{"name": "A", "fields": [
            {"name": "b", "type": "message", "message": "B"}]}]}"#;
        assert_eq!(
            SchemaSet::from_json(json).unwrap_err(),
            SchemaError::UnknownMessage("B".into())
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut set = SchemaSet::new();
        set.add_message(MessageDescriptor::new("a.A")).unwrap();
        assert_eq!(
            set.add_message(MessageDescriptor::new("a.A")).unwrap_err(),
            SchemaError::DuplicateType("a.A".into())
        );

        let dup_field = MessageDescriptor::new("a.B")
            .with_field(FieldDescriptor::new("x", FieldKind::Bool))
            .with_field(FieldDescriptor::new("x", FieldKind::String));
        assert_eq!(
            set.add_message(dup_field).unwrap_err().code(),
            "PROTOGUARD_MALFORMED_DESCRIPTOR"
        );
    }

    #[test]
    fn test_admits() {
        assert!(FieldKind::Int32.admits(&Value::Int(5)));
        assert!(!FieldKind::Int32.admits(&Value::Int(i64::MAX)));
        assert!(!FieldKind::String.admits(&Value::Int(5)));
        let kind = FieldKind::Message {
            message: "a.A".into(),
        };
        assert!(kind.admits(&Value::Message(MessageValue::new("a.A"))));
        assert!(!kind.admits(&Value::Message(MessageValue::new("a.B"))));
    }

    #[test]
    fn test_serialization_round_trip_shape() {
        let field = FieldDescriptor::new("tags", FieldKind::String).repeated();
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "tags", "type": "string", "cardinality": "repeated"})
        );
    }
}
