//! Typed value tree
//!
//! Message instances and expression results share one representation:
//! - Scalars: null, bool, int, uint, double, string, bytes
//! - Composites: list, map (ordered by key), message
//! - Well-known types: timestamp, duration
//!
//! Enum values are carried as `Int`. Maps are ordered by key so traversal and
//! rendering are deterministic.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Key of a map entry. Only integral, bool and string keys are allowed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(String),
}

impl MapKey {
    /// Converts a value into a map key, if the value kind can be a key.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::UInt(u) => Some(MapKey::UInt(*u)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }

    /// Returns the key as a value.
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::UInt(u) => Value::UInt(*u),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for MapKey {
    /// Renders the key the way it appears inside a field path subscript.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{}", b),
            MapKey::Int(i) => write!(f, "{}", i),
            MapKey::UInt(u) => write!(f, "{}", u),
            MapKey::String(s) => {
                let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
                f.write_str(&quoted)
            }
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(s.to_string())
    }
}

impl From<String> for MapKey {
    fn from(s: String) -> Self {
        MapKey::String(s)
    }
}

impl From<i64> for MapKey {
    fn from(i: i64) -> Self {
        MapKey::Int(i)
    }
}

impl From<bool> for MapKey {
    fn from(b: bool) -> Self {
        MapKey::Bool(b)
    }
}

/// A typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
    Message(MessageValue),
    Timestamp(DateTime<Utc>),
    Duration(Duration),
}

impl Value {
    /// Builds a list value.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Builds a map value.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<MapKey>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Returns the runtime type name used in messages and errors.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null_type",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Message(m) => m.type_name(),
            Value::Timestamp(_) => "google.protobuf.Timestamp",
            Value::Duration(_) => "google.protobuf.Duration",
        }
    }

    /// Whether the value is the zero value of its kind.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::UInt(u) => *u == 0,
            Value::Double(d) => *d == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Message(m) => m.is_empty(),
            Value::Timestamp(t) => t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0,
            Value::Duration(d) => d.is_zero(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u64::from(u))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<MessageValue> for Value {
    fn from(m: MessageValue) -> Self {
        Value::Message(m)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

/// A message instance: a type name plus the fields that are set.
///
/// A field absent from the map is unset. Repeated and map fields only count
/// as present when non-empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageValue {
    type_name: String,
    fields: BTreeMap<String, Value>,
}

impl MessageValue {
    /// Creates an empty instance of the given message type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder pattern: set a field
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field value
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Clear a field
    pub fn clear(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Get a field value, if set
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field presence
    pub fn has(&self, name: &str) -> bool {
        match self.fields.get(name) {
            Some(Value::List(items)) => !items.is_empty(),
            Some(Value::Map(entries)) => !entries.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Iterates over set fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether no field is present.
    pub fn is_empty(&self) -> bool {
        self.fields.keys().all(|name| !self.has(name))
    }
}

/// Key used to detect duplicates in `unique` checks.
#[derive(PartialEq, Eq, Hash)]
enum UniqueKey<'a> {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(u64),
    String(&'a str),
    Bytes(&'a [u8]),
    Timestamp(i64, u32),
    Duration(i64, i32),
}

/// Whether all scalar items are pairwise distinct.
///
/// NaN never equals anything, so NaN items are always unique. Items of a
/// kind that cannot be compared this way make the whole check fail.
pub fn all_unique(items: &[Value]) -> Option<bool> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let key = match item {
            Value::Bool(b) => UniqueKey::Bool(*b),
            Value::Int(i) => UniqueKey::Int(*i),
            Value::UInt(u) => UniqueKey::UInt(*u),
            Value::Double(d) if d.is_nan() => continue,
            Value::Double(d) => {
                let normalized = if *d == 0.0 { 0.0f64 } else { *d };
                UniqueKey::Double(normalized.to_bits())
            }
            Value::String(s) => UniqueKey::String(s),
            Value::Bytes(b) => UniqueKey::Bytes(b),
            Value::Timestamp(t) => UniqueKey::Timestamp(t.timestamp(), t.timestamp_subsec_nanos()),
            Value::Duration(d) => {
                let (secs, nanos) = split_duration(d);
                UniqueKey::Duration(secs, nanos)
            }
            _ => return None,
        };
        if !seen.insert(key) {
            return Some(false);
        }
    }
    Some(true)
}

/// Maximum duration magnitude accepted, in seconds (10,000 years).
pub const MAX_DURATION_SECONDS: i64 = 315_576_000_000;

fn split_duration(d: &Duration) -> (i64, i32) {
    let secs = d.num_seconds();
    let nanos = (*d - Duration::seconds(secs))
        .num_nanoseconds()
        .unwrap_or(0) as i32;
    (secs, nanos)
}

/// Parses a duration string such as `1.5s`, `300ms`, `2h45m` or `-10us`.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    let (negative, mut rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if rest == "0" {
        return Some(Duration::zero());
    }
    if rest.is_empty() {
        return None;
    }

    let mut total_nanos: i128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number = &rest[..number_len];
        rest = &rest[number_len..];

        let (unit_nanos, unit_len): (i128, usize) = if rest.starts_with("ns") {
            (1, 2)
        } else if rest.starts_with("us") {
            (1_000, 2)
        } else if rest.starts_with("µs") {
            (1_000, "µs".len())
        } else if rest.starts_with("ms") {
            (1_000_000, 2)
        } else if rest.starts_with('s') {
            (1_000_000_000, 1)
        } else if rest.starts_with('m') {
            (60_000_000_000, 1)
        } else if rest.starts_with('h') {
            (3_600_000_000_000, 1)
        } else {
            return None;
        };
        rest = &rest[unit_len..];

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        let whole: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut amount = whole.checked_mul(unit_nanos)?;
        if !frac.is_empty() {
            if frac.contains('.') {
                return None;
            }
            let digits = frac.len().min(18) as u32;
            let frac_value: i128 = frac[..digits as usize].parse().ok()?;
            let frac_nanos = frac_value.checked_mul(unit_nanos)? / 10i128.pow(digits);
            amount = amount.checked_add(frac_nanos)?;
        }
        total_nanos = total_nanos.checked_add(amount)?;
    }

    if negative {
        total_nanos = -total_nanos;
    }
    // Range check on the wide value before narrowing
    let secs = total_nanos / 1_000_000_000;
    if secs.abs() > i128::from(MAX_DURATION_SECONDS) {
        return None;
    }
    let secs = i64::try_from(secs).ok()?;
    let nanos = i64::try_from(total_nanos % 1_000_000_000).ok()?;
    Duration::try_seconds(secs)?.checked_add(&Duration::nanoseconds(nanos))
}

/// Formats a duration as seconds with a fractional part, e.g. `1.5s`.
pub fn format_duration(d: &Duration) -> String {
    let (secs, nanos) = split_duration(d);
    if nanos == 0 {
        return format!("{}s", secs);
    }
    let sign = if secs < 0 || nanos < 0 { "-" } else { "" };
    let frac = format!("{:09}", nanos.unsigned_abs());
    format!("{}{}.{}s", sign, secs.unsigned_abs(), frac.trim_end_matches('0'))
}

/// Parses an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Formats a timestamp as RFC 3339 with a `Z` suffix.
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_key_rendering() {
        assert_eq!(MapKey::from("timeout").to_string(), "\"timeout\"");
        assert_eq!(MapKey::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(MapKey::Int(-5).to_string(), "-5");
        assert_eq!(MapKey::Bool(true).to_string(), "true");
    }

    #[test]
    fn test_message_presence() {
        let msg = MessageValue::new("acme.User")
            .with("name", "alice")
            .with("tags", Value::List(vec![]))
            .with("nick", Value::Null);

        assert!(msg.has("name"));
        assert!(!msg.has("tags"));
        assert!(!msg.has("nick"));
        assert!(!msg.has("missing"));
        assert!(msg.get("tags").is_some());
    }

    #[test]
    fn test_zero_values() {
        assert!(Value::from("").is_zero());
        assert!(Value::from(0i64).is_zero());
        assert!(!Value::from(0.5).is_zero());
        assert!(Value::Message(MessageValue::new("x")).is_zero());
        assert!(Value::Duration(Duration::zero()).is_zero());
    }

    #[test]
    fn test_all_unique() {
        assert_eq!(all_unique(&[Value::from(1i64), Value::from(2i64)]), Some(true));
        assert_eq!(all_unique(&[Value::from("a"), Value::from("a")]), Some(false));
        assert_eq!(
            all_unique(&[Value::Double(f64::NAN), Value::Double(f64::NAN)]),
            Some(true)
        );
        assert_eq!(all_unique(&[Value::Double(0.0), Value::Double(-0.0)]), Some(false));
        assert_eq!(all_unique(&[Value::List(vec![])]), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1.5s"), Some(Duration::milliseconds(1500)));
        assert_eq!(parse_duration("2h45m"), Some(Duration::minutes(165)));
        assert_eq!(parse_duration("-300ms"), Some(Duration::milliseconds(-300)));
        assert_eq!(parse_duration("10us"), Some(Duration::microseconds(10)));
        assert_eq!(parse_duration("0"), Some(Duration::zero()));
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("1x"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        // Seconds beyond i64 must not wrap around
        assert_eq!(parse_duration("18446744073709551621s"), None);
        assert_eq!(parse_duration("9223372036854775808s"), None);
        assert_eq!(parse_duration("-9223372036854775808s"), None);
        assert_eq!(parse_duration("315576000001s"), None);
        assert_eq!(parse_duration("99999999999999999999h"), None);
        assert_eq!(parse_duration("1.99999999999999999999999h"), Some(Duration::nanoseconds(7_199_999_999_999)));
        assert_eq!(
            parse_duration("315576000000s"),
            Some(Duration::seconds(MAX_DURATION_SECONDS))
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&Duration::milliseconds(1500)), "1.5s");
        assert_eq!(format_duration(&Duration::seconds(60)), "60s");
        assert_eq!(format_duration(&Duration::milliseconds(-250)), "-0.25s");
        assert_eq!(format_duration(&Duration::zero()), "0s");
    }

    #[test]
    fn test_timestamp_round_trip_format() {
        let t = parse_timestamp("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(format_timestamp(&t), "2024-01-02T03:04:05Z");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
