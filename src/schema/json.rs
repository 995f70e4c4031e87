//! JSON instance decoding
//!
//! Turns a `serde_json::Value` into a typed [`MessageValue`] following the
//! proto3 JSON mapping:
//! - field names as declared or in lowerCamelCase
//! - `null` means unset
//! - 64-bit integers as numbers or decimal strings
//! - floats as numbers or `"NaN"`, `"Infinity"`, `"-Infinity"`
//! - bytes as base64 (standard or URL-safe, padding optional)
//! - enums by value name or number; unknown numbers are kept
//! - timestamps as RFC 3339, durations as `"1.5s"`
//! - map keys as strings
//!
//! Undeclared fields are rejected. No defaults are filled in.

use std::collections::BTreeMap;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value as Json;
use thiserror::Error;

use super::types::{Cardinality, FieldDescriptor, FieldKind, MapKeyKind, SchemaSet};
use crate::value::{parse_duration, parse_timestamp, MapKey, MessageValue, Value};

/// Instance decoding error. `path` addresses the offending value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown message type '{0}'")]
    UnknownMessage(String),

    #[error("{path}: unknown field '{field}'")]
    UnknownField { path: String, field: String },

    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("{path}: {reason}")]
    InvalidValue { path: String, reason: String },
}

impl DecodeError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::UnknownMessage(_) => "PROTOGUARD_DECODE_UNKNOWN_MESSAGE",
            DecodeError::UnknownField { .. } => "PROTOGUARD_DECODE_UNKNOWN_FIELD",
            DecodeError::TypeMismatch { .. } => "PROTOGUARD_DECODE_TYPE_MISMATCH",
            DecodeError::InvalidValue { .. } => "PROTOGUARD_DECODE_INVALID_VALUE",
        }
    }
}

type DecodeResult<T> = Result<T, DecodeError>;

/// Decodes a JSON object into an instance of `type_name`.
pub fn decode_message(schema: &SchemaSet, type_name: &str, json: &Json) -> DecodeResult<MessageValue> {
    Decoder { schema }.message(type_name, json, "")
}

struct Decoder<'a> {
    schema: &'a SchemaSet,
}

impl<'a> Decoder<'a> {
    fn message(&self, type_name: &str, json: &Json, path: &str) -> DecodeResult<MessageValue> {
        let descriptor = self
            .schema
            .message(type_name)
            .ok_or_else(|| DecodeError::UnknownMessage(type_name.to_string()))?;

        let obj = match json {
            Json::Object(obj) => obj,
            other => return Err(mismatch(path, "object", other)),
        };

        let mut message = MessageValue::new(type_name);
        for (key, value) in obj {
            let field = descriptor
                .fields
                .iter()
                .find(|f| f.name == *key || lower_camel(&f.name) == *key)
                .ok_or_else(|| DecodeError::UnknownField {
                    path: display_path(path),
                    field: key.clone(),
                })?;

            let field_path = make_path(path, &field.name);
            if message.get(&field.name).is_some() {
                return Err(invalid(&field_path, "field is given more than once"));
            }
            if value.is_null() {
                continue;
            }
            let decoded = self.field(field, value, &field_path)?;
            message.set(&field.name, decoded);
        }
        Ok(message)
    }

    fn field(&self, field: &FieldDescriptor, json: &Json, path: &str) -> DecodeResult<Value> {
        match &field.cardinality {
            Cardinality::Singular => self.single(&field.kind, json, path),
            Cardinality::Repeated => {
                let items = match json {
                    Json::Array(items) => items,
                    other => return Err(mismatch(path, "array", other)),
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.single(&field.kind, item, &format!("{}[{}]", path, i)))
                    .collect::<DecodeResult<Vec<_>>>()
                    .map(Value::List)
            }
            Cardinality::Map { key } => {
                let entries = match json {
                    Json::Object(entries) => entries,
                    other => return Err(mismatch(path, "object", other)),
                };
                let mut map = BTreeMap::new();
                for (raw_key, raw_value) in entries {
                    let key = map_key(*key, raw_key, path)?;
                    let entry_path = format!("{}[{}]", path, key);
                    let value = self.single(&field.kind, raw_value, &entry_path)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn single(&self, kind: &FieldKind, json: &Json, path: &str) -> DecodeResult<Value> {
        match kind {
            FieldKind::Bool => match json {
                Json::Bool(b) => Ok(Value::Bool(*b)),
                other => Err(mismatch(path, "bool", other)),
            },
            FieldKind::Int32 => {
                let i = signed(json, path)?;
                i32::try_from(i)
                    .map(|_| Value::Int(i))
                    .map_err(|_| invalid(path, "value out of range for int32"))
            }
            FieldKind::Int64 => signed(json, path).map(Value::Int),
            FieldKind::Uint32 => {
                let u = unsigned(json, path)?;
                u32::try_from(u)
                    .map(|_| Value::UInt(u))
                    .map_err(|_| invalid(path, "value out of range for uint32"))
            }
            FieldKind::Uint64 => unsigned(json, path).map(Value::UInt),
            FieldKind::Float | FieldKind::Double => float(json, path).map(Value::Double),
            FieldKind::String => match json {
                Json::String(s) => Ok(Value::String(s.clone())),
                other => Err(mismatch(path, "string", other)),
            },
            FieldKind::Bytes => match json {
                Json::String(s) => decode_base64(s)
                    .map(Value::Bytes)
                    .ok_or_else(|| invalid(path, "invalid base64")),
                other => Err(mismatch(path, "base64 string", other)),
            },
            FieldKind::Enum { enum_name } => self.enumeration(enum_name, json, path),
            FieldKind::Message { message } => {
                self.message(message, json, path).map(Value::Message)
            }
            FieldKind::Timestamp => match json {
                Json::String(s) => parse_timestamp(s)
                    .map(Value::Timestamp)
                    .ok_or_else(|| invalid(path, format!("invalid timestamp '{}'", s))),
                other => Err(mismatch(path, "RFC 3339 string", other)),
            },
            FieldKind::Duration => match json {
                Json::String(s) => parse_duration(s)
                    .map(Value::Duration)
                    .ok_or_else(|| invalid(path, format!("invalid duration '{}'", s))),
                other => Err(mismatch(path, "duration string", other)),
            },
        }
    }

    fn enumeration(&self, enum_name: &str, json: &Json, path: &str) -> DecodeResult<Value> {
        match json {
            Json::String(name) => {
                let descriptor = self.schema.enum_type(enum_name).ok_or_else(|| {
                    invalid(path, format!("unknown enum type '{}'", enum_name))
                })?;
                descriptor
                    .number_of(name)
                    .map(|n| Value::Int(i64::from(n)))
                    .ok_or_else(|| {
                        invalid(path, format!("'{}' is not a value of {}", name, enum_name))
                    })
            }
            Json::Number(_) => {
                let i = signed(json, path)?;
                i32::try_from(i)
                    .map(|_| Value::Int(i))
                    .map_err(|_| invalid(path, "enum number out of range"))
            }
            other => Err(mismatch(path, "enum name or number", other)),
        }
    }
}

fn signed(json: &Json, path: &str) -> DecodeResult<i64> {
    match json {
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0) {
                if f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Ok(f as i64)
                } else {
                    Err(invalid(path, "integer out of range"))
                }
            } else {
                Err(invalid(path, format!("'{}' is not an integer", n)))
            }
        }
        Json::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(path, format!("'{}' is not an integer", s))),
        other => Err(mismatch(path, "integer", other)),
    }
}

fn unsigned(json: &Json, path: &str) -> DecodeResult<u64> {
    match json {
        Json::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(u)
            } else if n.as_i64().is_some() {
                Err(invalid(path, "negative value for unsigned field"))
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0) {
                if f < u64::MAX as f64 {
                    Ok(f as u64)
                } else {
                    Err(invalid(path, "integer out of range"))
                }
            } else {
                Err(invalid(path, format!("'{}' is not an unsigned integer", n)))
            }
        }
        Json::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(path, format!("'{}' is not an unsigned integer", s))),
        other => Err(mismatch(path, "unsigned integer", other)),
    }
}

fn float(json: &Json, path: &str) -> DecodeResult<f64> {
    match json {
        Json::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(path, format!("'{}' is not a number", n))),
        Json::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .ok_or_else(|| invalid(path, format!("'{}' is not a number", other))),
        },
        other => Err(mismatch(path, "number", other)),
    }
}

fn map_key(kind: MapKeyKind, raw: &str, path: &str) -> DecodeResult<MapKey> {
    let bad_key = || invalid(path, format!("invalid {} map key '{}'", kind.field_kind().name(), raw));
    match kind {
        MapKeyKind::String => Ok(MapKey::String(raw.to_string())),
        MapKeyKind::Bool => match raw {
            "true" => Ok(MapKey::Bool(true)),
            "false" => Ok(MapKey::Bool(false)),
            _ => Err(bad_key()),
        },
        MapKeyKind::Int32 => raw
            .parse::<i32>()
            .map(|i| MapKey::Int(i64::from(i)))
            .map_err(|_| bad_key()),
        MapKeyKind::Int64 => raw.parse::<i64>().map(MapKey::Int).map_err(|_| bad_key()),
        MapKeyKind::Uint32 => raw
            .parse::<u32>()
            .map(|u| MapKey::UInt(u64::from(u)))
            .map_err(|_| bad_key()),
        MapKeyKind::Uint64 => raw.parse::<u64>().map(MapKey::UInt).map_err(|_| bad_key()),
    }
}

/// Decodes base64 in any of the accepted alphabets.
pub(crate) fn decode_base64(s: &str) -> Option<Vec<u8>> {
    STANDARD
        .decode(s)
        .or_else(|_| STANDARD_NO_PAD.decode(s))
        .or_else(|_| URL_SAFE.decode(s))
        .or_else(|_| URL_SAFE_NO_PAD.decode(s))
        .ok()
}

fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn mismatch(path: &str, expected: &str, found: &Json) -> DecodeError {
    DecodeError::TypeMismatch {
        path: display_path(path),
        expected: expected.to_string(),
        found: json_kind(found).to_string(),
    }
}

fn invalid(path: &str, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidValue {
        path: display_path(path),
        reason: reason.into(),
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

/// Creates a field path from prefix and field name.
fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &str = r#"{
        "package": "acme",
        "enums": [{"name": "Status", "values": [
            {"name": "UNKNOWN", "number": 0}, {"name": "ACTIVE", "number": 1}]}],
        "messages": [
            {"name": "User", "fields": [
                {"name": "display_name", "type": "string"},
                {"name": "age", "type": "int32"},
                {"name": "id", "type": "uint64"},
                {"name": "score", "type": "double"},
                {"name": "avatar", "type": "bytes"},
                {"name": "status", "type": "enum", "enum": "Status"},
                {"name": "created", "type": "timestamp"},
                {"name": "ttl", "type": "duration"},
                {"name": "tags", "type": "string", "cardinality": "repeated"},
                {"name": "limits", "type": "int64", "cardinality": {"map": {"key": "int32"}}},
                {"name": "settings", "type": "message", "message": "Setting",
                 "cardinality": {"map": {"key": "string"}}}
            ]},
            {"name": "Setting", "fields": [{"name": "value", "type": "int64"}]}
        ]
    }"#;

    fn schema() -> SchemaSet {
        SchemaSet::from_json(SCHEMA).unwrap()
    }

    #[test]
    fn test_decode_scalars() {
        let schema = schema();
        let msg = decode_message(
            &schema,
            "acme.User",
            &json!({
                "displayName": "Ada",
                "age": 36,
                "id": "18446744073709551615",
                "score": "NaN",
                "avatar": "aGk",
                "status": "ACTIVE",
                "created": "2024-01-01T00:00:00Z",
                "ttl": "1.5s"
            }),
        )
        .unwrap();

        assert_eq!(msg.get("display_name"), Some(&Value::from("Ada")));
        assert_eq!(msg.get("age"), Some(&Value::Int(36)));
        assert_eq!(msg.get("id"), Some(&Value::UInt(u64::MAX)));
        assert!(matches!(msg.get("score"), Some(Value::Double(d)) if d.is_nan()));
        assert_eq!(msg.get("avatar"), Some(&Value::Bytes(b"hi".to_vec())));
        assert_eq!(msg.get("status"), Some(&Value::Int(1)));
        assert_eq!(
            msg.get("ttl"),
            Some(&Value::Duration(chrono::Duration::milliseconds(1500)))
        );
    }

    #[test]
    fn test_decode_collections() {
        let schema = schema();
        let msg = decode_message(
            &schema,
            "acme.User",
            &json!({
                "tags": ["a", "b"],
                "limits": {"5": 10, "-1": "20"},
                "settings": {"timeout": {"value": 30}}
            }),
        )
        .unwrap();

        assert_eq!(msg.get("tags"), Some(&Value::list(vec!["a", "b"])));
        assert_eq!(
            msg.get("limits"),
            Some(&Value::map(vec![(5i64, 10i64), (-1, 20)]))
        );
        let setting = MessageValue::new("acme.Setting").with("value", 30i64);
        assert_eq!(
            msg.get("settings"),
            Some(&Value::map(vec![("timeout", setting)]))
        );
    }

    #[test]
    fn test_null_means_unset_and_open_enums() {
        let schema = schema();
        let msg = decode_message(
            &schema,
            "acme.User",
            &json!({"display_name": null, "status": 42}),
        )
        .unwrap();
        assert!(!msg.has("display_name"));
        assert_eq!(msg.get("status"), Some(&Value::Int(42)));
    }

    #[test]
    fn test_decode_errors_carry_paths() {
        let schema = schema();

        let err = decode_message(&schema, "acme.User", &json!({"nickname": "x"})).unwrap_err();
        assert_eq!(err.code(), "PROTOGUARD_DECODE_UNKNOWN_FIELD");

        let err = decode_message(&schema, "acme.User", &json!({"age": 3_000_000_000i64}))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidValue {
                path: "age".into(),
                reason: "value out of range for int32".into()
            }
        );

        let err = decode_message(
            &schema,
            "acme.User",
            &json!({"settings": {"timeout": {"value": true}}}),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::TypeMismatch {
                path: "settings[\"timeout\"].value".into(),
                expected: "integer".into(),
                found: "bool".into()
            }
        );

        let err = decode_message(&schema, "acme.User", &json!({"tags": ["a", 1]})).unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { ref path, .. } if path == "tags[1]"));

        let err = decode_message(&schema, "acme.User", &json!({"status": "GONE"})).unwrap_err();
        assert_eq!(err.code(), "PROTOGUARD_DECODE_INVALID_VALUE");

        let err = decode_message(&schema, "acme.Nope", &json!({})).unwrap_err();
        assert_eq!(err, DecodeError::UnknownMessage("acme.Nope".into()));
    }

    #[test]
    fn test_out_of_range_duration_is_invalid() {
        let schema = schema();
        for raw in ["9223372036854775808s", "18446744073709551621s"] {
            let err = decode_message(&schema, "acme.User", &json!({ "ttl": raw })).unwrap_err();
            assert_eq!(err.code(), "PROTOGUARD_DECODE_INVALID_VALUE");
        }
    }

    #[test]
    fn test_lower_camel() {
        assert_eq!(lower_camel("display_name"), "displayName");
        assert_eq!(lower_camel("a_b_c"), "aBC");
        assert_eq!(lower_camel("plain"), "plain");
    }
}
