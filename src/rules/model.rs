//! Declarative rule parameters as they appear in schema descriptors
//!
//! Field rules carry one optional slot per field kind; the registry checks
//! that only the slot matching the field's kind is used. Bytes parameters are
//! base64 encoded, timestamp and duration parameters are strings
//! (`2024-01-01T00:00:00Z`, `1.5s`).

use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

/// Rules attached to a field (or to the elements, keys or values of one).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldRules {
    /// Ignore the field entirely: no rules, no recursion.
    #[serde(skip_serializing_if = "is_false")]
    pub skip: bool,
    /// Skip the field's rules when it holds the zero value of its kind.
    #[serde(skip_serializing_if = "is_false")]
    pub ignore_empty: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cel: Vec<CustomRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bool: Option<BoolRules>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub int32: Option<NumericRules<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub int64: Option<NumericRules<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uint32: Option<NumericRules<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uint64: Option<NumericRules<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float: Option<NumericRules<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double: Option<NumericRules<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<StringRules>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<BytesRules>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_rules: Option<EnumRules>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeated: Option<RepeatedRules>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapRules>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampRules>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationRules>,
}

impl FieldRules {
    /// Names of the kind-specific slots that are set, in declaration order.
    pub fn kind_slots(&self) -> Vec<&'static str> {
        let slots = [
            ("bool", self.bool.is_some()),
            ("int32", self.int32.is_some()),
            ("int64", self.int64.is_some()),
            ("uint32", self.uint32.is_some()),
            ("uint64", self.uint64.is_some()),
            ("float", self.float.is_some()),
            ("double", self.double.is_some()),
            ("string", self.string.is_some()),
            ("bytes", self.bytes.is_some()),
            ("enum", self.enum_rules.is_some()),
            ("repeated", self.repeated.is_some()),
            ("map", self.map.is_some()),
            ("timestamp", self.timestamp.is_some()),
            ("duration", self.duration.is_some()),
        ];
        slots
            .iter()
            .filter(|(_, set)| *set)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Whether no rule or modifier is declared.
    pub fn is_empty(&self) -> bool {
        self == &FieldRules::default()
    }
}

/// Rules for the numeric kinds. Float and double share `f64` parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    default,
    deny_unknown_fields,
    bound(
        serialize = "T: Serialize",
        deserialize = "T: Deserialize<'de> + Default"
    )
)]
pub struct NumericRules<T> {
    #[serde(rename = "const")]
    pub const_value: Option<T>,
    pub lt: Option<T>,
    pub lte: Option<T>,
    pub gt: Option<T>,
    pub gte: Option<T>,
    #[serde(rename = "in")]
    pub in_set: Vec<T>,
    pub not_in: Vec<T>,
    /// Floating point kinds only: reject NaN and infinities.
    pub finite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoolRules {
    #[serde(rename = "const")]
    pub const_value: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StringRules {
    #[serde(rename = "const")]
    pub const_value: Option<String>,
    /// Exact length in characters.
    pub len: Option<u64>,
    pub min_len: Option<u64>,
    pub max_len: Option<u64>,
    /// Exact length in bytes.
    pub len_bytes: Option<u64>,
    pub min_bytes: Option<u64>,
    pub max_bytes: Option<u64>,
    pub pattern: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub contains: Option<String>,
    pub not_contains: Option<String>,
    #[serde(rename = "in")]
    pub in_set: Vec<String>,
    pub not_in: Vec<String>,
    pub email: bool,
    pub hostname: bool,
    pub ip: bool,
    pub ipv4: bool,
    pub ipv6: bool,
    pub uri: bool,
    pub uri_ref: bool,
    pub uuid: bool,
    pub address: bool,
}

impl StringRules {
    /// Well-known formats that are switched on.
    pub fn formats(&self) -> Vec<&'static str> {
        [
            ("email", self.email),
            ("hostname", self.hostname),
            ("ip", self.ip),
            ("ipv4", self.ipv4),
            ("ipv6", self.ipv6),
            ("uri", self.uri),
            ("uri_ref", self.uri_ref),
            ("uuid", self.uuid),
            ("address", self.address),
        ]
        .iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| *name)
        .collect()
    }
}

/// Bytes rules. All byte parameters are base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BytesRules {
    #[serde(rename = "const")]
    pub const_value: Option<String>,
    pub len: Option<u64>,
    pub min_len: Option<u64>,
    pub max_len: Option<u64>,
    pub pattern: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub contains: Option<String>,
    #[serde(rename = "in")]
    pub in_set: Vec<String>,
    pub not_in: Vec<String>,
    pub ip: bool,
    pub ipv4: bool,
    pub ipv6: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnumRules {
    #[serde(rename = "const")]
    pub const_value: Option<i32>,
    /// Reject numbers that are not declared values of the enum.
    pub defined_only: bool,
    #[serde(rename = "in")]
    pub in_set: Vec<i32>,
    pub not_in: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepeatedRules {
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub unique: bool,
    /// Rules applied to every element.
    pub items: Option<Box<FieldRules>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MapRules {
    pub min_pairs: Option<u64>,
    pub max_pairs: Option<u64>,
    pub keys: Option<Box<FieldRules>>,
    pub values: Option<Box<FieldRules>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimestampRules {
    #[serde(rename = "const")]
    pub const_value: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub gt: Option<String>,
    pub gte: Option<String>,
    /// Value must be before the evaluation time.
    pub lt_now: bool,
    /// Value must be after the evaluation time.
    pub gt_now: bool,
    /// Value must be within this duration of the evaluation time.
    pub within: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DurationRules {
    #[serde(rename = "const")]
    pub const_value: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub gt: Option<String>,
    pub gte: Option<String>,
    #[serde(rename = "in")]
    pub in_set: Vec<String>,
    pub not_in: Vec<String>,
}

/// An expression rule. The expression sees the target as `this` and the
/// evaluation time as `now`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomRule {
    pub id: String,
    pub expression: String,
    /// Violation message used when the expression returns `false`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Rules attached to a message type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessageRules {
    /// Fields that must be set.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub oneof: Vec<OneofRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cel: Vec<CustomRule>,
}

/// At most one of `fields` may be set; exactly one when `required`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OneofRule {
    pub fields: Vec<String>,
    #[serde(default)]
    pub required: bool,
}
