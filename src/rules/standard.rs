//! Standard rule library
//!
//! Builds the catalog checks of one field kind from its declared
//! parameters. Parameters are validated here, so a bad bound or pattern is a
//! [`SchemaError`] at compile time and never a runtime surprise.
//!
//! Constraint ids are `<kind>.<rule>`. Bounds combine into a single range
//! rule (`int32.gte_lte`); when the lower bound is not below the upper one
//! the range is exclusive (`int32.gt_lt_exclusive`).
//!
//! Checks assume the value already has the field's kind. The engine verifies
//! that before any rule runs; a check handed another kind fails closed.

use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};

use super::compiled::StandardRule;
use super::model::{
    BoolRules, BytesRules, DurationRules, EnumRules, MapRules, NumericRules, RepeatedRules,
    StringRules, TimestampRules,
};
use crate::formats;
use crate::schema::{decode_base64, EnumDescriptor, SchemaError, SchemaResult};
use crate::value::{all_unique, format_duration, format_timestamp, parse_duration, parse_timestamp, Value};

/// A parameter type of the numeric kinds.
pub trait NumericParam: Copy + PartialOrd + Display + Send + Sync + 'static {
    /// Reads a value of this parameter's kind.
    fn extract(value: &Value) -> Option<Self>;

    fn is_finite(self) -> bool {
        true
    }
}

impl NumericParam for i32 {
    fn extract(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl NumericParam for i64 {
    fn extract(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl NumericParam for u32 {
    fn extract(value: &Value) -> Option<Self> {
        match value {
            Value::UInt(u) => u32::try_from(*u).ok(),
            _ => None,
        }
    }
}

impl NumericParam for u64 {
    fn extract(value: &Value) -> Option<Self> {
        match value {
            Value::UInt(u) => Some(*u),
            _ => None,
        }
    }
}

impl NumericParam for f64 {
    fn extract(value: &Value) -> Option<Self> {
        match value {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

/// Upper and lower bounds of an ordered kind.
struct Bounds<T> {
    lt: Option<T>,
    lte: Option<T>,
    gt: Option<T>,
    gte: Option<T>,
}

impl<T> Bounds<T> {
    fn is_empty(&self) -> bool {
        self.lt.is_none() && self.lte.is_none() && self.gt.is_none() && self.gte.is_none()
    }
}

/// Builds the single range rule of a set of bounds.
fn range_rule<T>(
    kind: &str,
    target: &str,
    bounds: Bounds<T>,
    extract: fn(&Value) -> Option<T>,
    render: fn(&T) -> String,
) -> SchemaResult<Option<StandardRule>>
where
    T: PartialOrd + Clone + Send + Sync + 'static,
{
    if bounds.lt.is_some() && bounds.lte.is_some() {
        return Err(SchemaError::conflicting(target, format!("{}: lt and lte are mutually exclusive", kind)));
    }
    if bounds.gt.is_some() && bounds.gte.is_some() {
        return Err(SchemaError::conflicting(target, format!("{}: gt and gte are mutually exclusive", kind)));
    }
    if bounds.is_empty() {
        return Ok(None);
    }

    let upper = match (bounds.lt, bounds.lte) {
        (Some(v), _) => Some((v, false)),
        (_, Some(v)) => Some((v, true)),
        _ => None,
    };
    let lower = match (bounds.gt, bounds.gte) {
        (Some(v), _) => Some((v, false)),
        (_, Some(v)) => Some((v, true)),
        _ => None,
    };

    let above = |v: &T, bound: &T, inclusive: bool| if inclusive { v >= bound } else { v > bound };
    let below = |v: &T, bound: &T, inclusive: bool| if inclusive { v <= bound } else { v < bound };

    let rule = match (lower, upper) {
        (None, Some((hi, inclusive))) => {
            let (name, phrase) = if inclusive { ("lte", "less than or equal to") } else { ("lt", "less than") };
            let message = format!("value must be {} {}", phrase, render(&hi));
            StandardRule::new(format!("{}.{}", kind, name), message, move |value, _| {
                extract(value).is_some_and(|v| below(&v, &hi, inclusive))
            })
        }
        (Some((lo, inclusive)), None) => {
            let (name, phrase) = if inclusive { ("gte", "greater than or equal to") } else { ("gt", "greater than") };
            let message = format!("value must be {} {}", phrase, render(&lo));
            StandardRule::new(format!("{}.{}", kind, name), message, move |value, _| {
                extract(value).is_some_and(|v| above(&v, &lo, inclusive))
            })
        }
        (Some((lo, lo_inclusive)), Some((hi, hi_inclusive))) => {
            let lo_name = if lo_inclusive { "gte" } else { "gt" };
            let hi_name = if hi_inclusive { "lte" } else { "lt" };
            let lo_phrase = if lo_inclusive { "greater than or equal to" } else { "greater than" };
            let hi_phrase = if hi_inclusive { "less than or equal to" } else { "less than" };
            let ordered = if lo_inclusive && hi_inclusive { lo <= hi } else { lo < hi };

            if ordered {
                let message = format!(
                    "value must be {} {} and {} {}",
                    lo_phrase, render(&lo), hi_phrase, render(&hi)
                );
                StandardRule::new(format!("{}.{}_{}", kind, lo_name, hi_name), message, move |value, _| {
                    extract(value).is_some_and(|v| {
                        above(&v, &lo, lo_inclusive) && below(&v, &hi, hi_inclusive)
                    })
                })
            } else {
                let message = format!(
                    "value must be {} {} or {} {}",
                    lo_phrase, render(&lo), hi_phrase, render(&hi)
                );
                StandardRule::new(
                    format!("{}.{}_{}_exclusive", kind, lo_name, hi_name),
                    message,
                    move |value, _| {
                        extract(value).is_some_and(|v| {
                            above(&v, &lo, lo_inclusive) || below(&v, &hi, hi_inclusive)
                        })
                    },
                )
            }
        }
        (None, None) => return Ok(None),
    };
    Ok(Some(rule))
}

fn render_list<T: Display>(items: &[T]) -> String {
    let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

fn render_display<T: Display>(value: &T) -> String {
    value.to_string()
}

fn min_max_conflict(
    target: &str,
    kind: &str,
    min_name: &str,
    min: Option<u64>,
    max_name: &str,
    max: Option<u64>,
) -> SchemaResult<()> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(SchemaError::conflicting(
                target,
                format!("{}: {} ({}) is greater than {} ({})", kind, min_name, min, max_name, max),
            ));
        }
    }
    Ok(())
}

/// Numeric rules: `const`, range, `in`, `not_in`, `finite`.
pub fn numeric_rules<T: NumericParam>(
    kind: &str,
    target: &str,
    rules: &NumericRules<T>,
    floating: bool,
) -> SchemaResult<Vec<StandardRule>> {
    if rules.finite && !floating {
        return Err(SchemaError::RuleKindMismatch {
            target: target.to_string(),
            rules: "finite".to_string(),
            kind: kind.to_string(),
        });
    }

    let mut out = Vec::new();

    if let Some(expected) = rules.const_value {
        out.push(StandardRule::new(
            format!("{}.const", kind),
            format!("value must equal {}", expected),
            move |value, _| T::extract(value).is_some_and(|v| v == expected),
        ));
    }

    let bounds = Bounds {
        lt: rules.lt,
        lte: rules.lte,
        gt: rules.gt,
        gte: rules.gte,
    };
    if let Some(rule) = range_rule(kind, target, bounds, T::extract, render_display::<T>)? {
        out.push(rule);
    }

    if !rules.in_set.is_empty() {
        let set = rules.in_set.clone();
        out.push(StandardRule::new(
            format!("{}.in", kind),
            format!("value must be in list {}", render_list(&set)),
            move |value, _| T::extract(value).is_some_and(|v| set.iter().any(|s| *s == v)),
        ));
    }

    if !rules.not_in.is_empty() {
        let set = rules.not_in.clone();
        out.push(StandardRule::new(
            format!("{}.not_in", kind),
            format!("value must not be in list {}", render_list(&set)),
            move |value, _| T::extract(value).is_some_and(|v| !set.iter().any(|s| *s == v)),
        ));
    }

    if rules.finite {
        out.push(StandardRule::new(
            format!("{}.finite", kind),
            "value must be finite",
            |value, _| T::extract(value).is_some_and(T::is_finite),
        ));
    }

    Ok(out)
}

pub fn bool_rules(rules: &BoolRules) -> Vec<StandardRule> {
    let mut out = Vec::new();
    if let Some(expected) = rules.const_value {
        out.push(StandardRule::new(
            "bool.const",
            format!("value must equal {}", expected),
            move |value, _| value.as_bool() == Some(expected),
        ));
    }
    out
}

fn string_of(value: &Value) -> Option<&str> {
    value.as_str()
}

fn string_rule<F>(name: &str, message: String, check: F) -> StandardRule
where
    F: Fn(&str) -> bool + Send + Sync + 'static,
{
    StandardRule::new(format!("string.{}", name), message, move |value, _| {
        string_of(value).is_some_and(|s| check(s))
    })
}

fn is_any_ip(s: &str) -> bool {
    formats::is_ip(s, 0)
}

fn is_ipv4(s: &str) -> bool {
    formats::is_ip(s, 4)
}

fn is_ipv6(s: &str) -> bool {
    formats::is_ip(s, 6)
}

/// Well-known string formats: message, predicate, and whether the empty
/// string gets its own `<format>_empty` rule.
fn string_format(name: &str) -> Option<(&'static str, fn(&str) -> bool, bool)> {
    let entry: (&'static str, fn(&str) -> bool, bool) = match name {
        "email" => ("value must be a valid email address", formats::is_email, true),
        "hostname" => ("value must be a valid hostname", formats::is_hostname, true),
        "ip" => ("value must be a valid IP address", is_any_ip, true),
        "ipv4" => ("value must be a valid IPv4 address", is_ipv4, true),
        "ipv6" => ("value must be a valid IPv6 address", is_ipv6, true),
        "uri" => ("value must be a valid URI", formats::is_uri, true),
        "uri_ref" => ("value must be a valid URI Reference", formats::is_uri_ref, false),
        "uuid" => ("value must be a valid UUID", formats::is_uuid, true),
        "address" => ("value must be a valid hostname, or ip address", formats::is_address, true),
        _ => return None,
    };
    Some(entry)
}

fn empty_format_message(name: &str) -> String {
    let what = match name {
        "email" => "an email address",
        "hostname" => "a hostname",
        "ip" => "an IP address",
        "ipv4" => "an IPv4 address",
        "ipv6" => "an IPv6 address",
        "uri" => "a URI",
        "uuid" => "a UUID",
        _ => "a hostname, or ip address",
    };
    format!("value is empty, which is not a valid {}", what)
}

/// String rules in catalog order.
pub fn string_rules(target: &str, rules: &StringRules) -> SchemaResult<Vec<StandardRule>> {
    min_max_conflict(target, "string", "min_len", rules.min_len, "max_len", rules.max_len)?;
    min_max_conflict(target, "string", "min_bytes", rules.min_bytes, "max_bytes", rules.max_bytes)?;

    let enabled_formats = rules.formats();
    if enabled_formats.len() > 1 {
        return Err(SchemaError::conflicting(
            target,
            format!("string: only one well-known format may be set, got {}", enabled_formats.join(", ")),
        ));
    }

    let mut out = Vec::new();

    if let Some(expected) = rules.const_value.clone() {
        out.push(string_rule("const", format!("value must equal `{}`", expected), move |s| s == expected));
    }
    if let Some(n) = rules.len {
        out.push(string_rule("len", format!("value length must be {} characters", n), move |s| {
            s.chars().count() as u64 == n
        }));
    }
    if let Some(n) = rules.min_len {
        out.push(string_rule("min_len", format!("value length must be at least {} characters", n), move |s| {
            s.chars().count() as u64 >= n
        }));
    }
    if let Some(n) = rules.max_len {
        out.push(string_rule("max_len", format!("value length must be at most {} characters", n), move |s| {
            s.chars().count() as u64 <= n
        }));
    }
    if let Some(n) = rules.len_bytes {
        out.push(string_rule("len_bytes", format!("value length must be {} bytes", n), move |s| {
            s.len() as u64 == n
        }));
    }
    if let Some(n) = rules.min_bytes {
        out.push(string_rule("min_bytes", format!("value length must be at least {} bytes", n), move |s| {
            s.len() as u64 >= n
        }));
    }
    if let Some(n) = rules.max_bytes {
        out.push(string_rule("max_bytes", format!("value length must be at most {} bytes", n), move |s| {
            s.len() as u64 <= n
        }));
    }
    if let Some(pattern) = &rules.pattern {
        let re = regex::Regex::new(pattern)
            .map_err(|e| SchemaError::invalid_parameter(target, "string.pattern", e.to_string()))?;
        out.push(string_rule(
            "pattern",
            format!("value does not match regex pattern `{}`", pattern),
            move |s| re.is_match(s),
        ));
    }
    if let Some(prefix) = rules.prefix.clone() {
        out.push(string_rule("prefix", format!("value does not have prefix `{}`", prefix), move |s| {
            s.starts_with(prefix.as_str())
        }));
    }
    if let Some(suffix) = rules.suffix.clone() {
        out.push(string_rule("suffix", format!("value does not have suffix `{}`", suffix), move |s| {
            s.ends_with(suffix.as_str())
        }));
    }
    if let Some(needle) = rules.contains.clone() {
        out.push(string_rule(
            "contains",
            format!("value does not contain substring `{}`", needle),
            move |s| s.contains(needle.as_str()),
        ));
    }
    if let Some(needle) = rules.not_contains.clone() {
        out.push(string_rule(
            "not_contains",
            format!("value contains substring `{}`", needle),
            move |s| !s.contains(needle.as_str()),
        ));
    }
    if !rules.in_set.is_empty() {
        let set = rules.in_set.clone();
        out.push(string_rule("in", format!("value must be in list {}", render_list(&set)), move |s| {
            set.iter().any(|x| x == s)
        }));
    }
    if !rules.not_in.is_empty() {
        let set = rules.not_in.clone();
        out.push(string_rule("not_in", format!("value must not be in list {}", render_list(&set)), move |s| {
            !set.iter().any(|x| x == s)
        }));
    }

    if let Some(name) = enabled_formats.first() {
        if let Some((message, check, rejects_empty)) = string_format(name) {
            if rejects_empty {
                out.push(string_rule(&format!("{}_empty", name), empty_format_message(name), |s| {
                    !s.is_empty()
                }));
                // The empty case is reported once, by the rule above.
                out.push(string_rule(name, message.to_string(), move |s| s.is_empty() || check(s)));
            } else {
                out.push(string_rule(name, message.to_string(), check));
            }
        }
    }

    Ok(out)
}

fn bytes_param(target: &str, rule: &str, encoded: &str) -> SchemaResult<Vec<u8>> {
    decode_base64(encoded)
        .ok_or_else(|| SchemaError::invalid_parameter(target, rule, format!("'{}' is not valid base64", encoded)))
}

fn bytes_rule<F>(name: &str, message: String, check: F) -> StandardRule
where
    F: Fn(&[u8]) -> bool + Send + Sync + 'static,
{
    StandardRule::new(format!("bytes.{}", name), message, move |value, _| match value {
        Value::Bytes(b) => check(b),
        _ => false,
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Bytes rules in catalog order. Parameters are base64 encoded.
pub fn bytes_rules(target: &str, rules: &BytesRules) -> SchemaResult<Vec<StandardRule>> {
    min_max_conflict(target, "bytes", "min_len", rules.min_len, "max_len", rules.max_len)?;
    let ip_flags = [rules.ip, rules.ipv4, rules.ipv6].iter().filter(|f| **f).count();
    if ip_flags > 1 {
        return Err(SchemaError::conflicting(target, "bytes: only one of ip, ipv4, ipv6 may be set"));
    }

    let mut out = Vec::new();

    if let Some(encoded) = &rules.const_value {
        let expected = bytes_param(target, "bytes.const", encoded)?;
        out.push(bytes_rule("const", format!("value must be {}", hex(&expected)), move |b| {
            b == expected.as_slice()
        }));
    }
    if let Some(n) = rules.len {
        out.push(bytes_rule("len", format!("value length must be {} bytes", n), move |b| b.len() as u64 == n));
    }
    if let Some(n) = rules.min_len {
        out.push(bytes_rule("min_len", format!("value length must be at least {} bytes", n), move |b| {
            b.len() as u64 >= n
        }));
    }
    if let Some(n) = rules.max_len {
        out.push(bytes_rule("max_len", format!("value must be at most {} bytes", n), move |b| {
            b.len() as u64 <= n
        }));
    }
    if let Some(pattern) = &rules.pattern {
        let re = regex::bytes::Regex::new(pattern)
            .map_err(|e| SchemaError::invalid_parameter(target, "bytes.pattern", e.to_string()))?;
        out.push(bytes_rule(
            "pattern",
            format!("value must match regex pattern `{}`", pattern),
            move |b| re.is_match(b),
        ));
    }
    if let Some(encoded) = &rules.prefix {
        let prefix = bytes_param(target, "bytes.prefix", encoded)?;
        out.push(bytes_rule("prefix", format!("value does not have prefix {}", hex(&prefix)), move |b| {
            b.starts_with(&prefix)
        }));
    }
    if let Some(encoded) = &rules.suffix {
        let suffix = bytes_param(target, "bytes.suffix", encoded)?;
        out.push(bytes_rule("suffix", format!("value does not have suffix {}", hex(&suffix)), move |b| {
            b.ends_with(&suffix)
        }));
    }
    if let Some(encoded) = &rules.contains {
        let needle = bytes_param(target, "bytes.contains", encoded)?;
        out.push(bytes_rule("contains", format!("value does not contain {}", hex(&needle)), move |b| {
            needle.is_empty() || b.windows(needle.len()).any(|w| w == needle.as_slice())
        }));
    }
    if !rules.in_set.is_empty() {
        let set = rules
            .in_set
            .iter()
            .map(|e| bytes_param(target, "bytes.in", e))
            .collect::<SchemaResult<Vec<_>>>()?;
        let rendered: Vec<String> = set.iter().map(|b| hex(b)).collect();
        out.push(bytes_rule("in", format!("value must be in list {}", render_list(&rendered)), move |b| {
            set.iter().any(|x| x.as_slice() == b)
        }));
    }
    if !rules.not_in.is_empty() {
        let set = rules
            .not_in
            .iter()
            .map(|e| bytes_param(target, "bytes.not_in", e))
            .collect::<SchemaResult<Vec<_>>>()?;
        let rendered: Vec<String> = set.iter().map(|b| hex(b)).collect();
        out.push(bytes_rule("not_in", format!("value must not be in list {}", render_list(&rendered)), move |b| {
            !set.iter().any(|x| x.as_slice() == b)
        }));
    }
    if rules.ip {
        out.push(bytes_rule("ip", "value must be a valid IP address".into(), |b| formats::is_ip_bytes(b, 0)));
    }
    if rules.ipv4 {
        out.push(bytes_rule("ipv4", "value must be a valid IPv4 address".into(), |b| formats::is_ip_bytes(b, 4)));
    }
    if rules.ipv6 {
        out.push(bytes_rule("ipv6", "value must be a valid IPv6 address".into(), |b| formats::is_ip_bytes(b, 6)));
    }

    Ok(out)
}

fn enum_number(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

/// Enum rules. `defined_only` closes the otherwise open set of numbers.
pub fn enum_rules(descriptor: &EnumDescriptor, rules: &EnumRules) -> Vec<StandardRule> {
    let mut out = Vec::new();
    if let Some(expected) = rules.const_value {
        out.push(StandardRule::new(
            "enum.const",
            format!("value must equal {}", expected),
            move |value, _| enum_number(value) == Some(i64::from(expected)),
        ));
    }
    if rules.defined_only {
        let defined: Vec<i64> = descriptor.values.iter().map(|v| i64::from(v.number)).collect();
        out.push(StandardRule::new(
            "enum.defined_only",
            "value must be one of the defined enum values",
            move |value, _| enum_number(value).is_some_and(|n| defined.contains(&n)),
        ));
    }
    if !rules.in_set.is_empty() {
        let set: Vec<i64> = rules.in_set.iter().map(|n| i64::from(*n)).collect();
        out.push(StandardRule::new(
            "enum.in",
            format!("value must be in list {}", render_list(&rules.in_set)),
            move |value, _| enum_number(value).is_some_and(|n| set.contains(&n)),
        ));
    }
    if !rules.not_in.is_empty() {
        let set: Vec<i64> = rules.not_in.iter().map(|n| i64::from(*n)).collect();
        out.push(StandardRule::new(
            "enum.not_in",
            format!("value must not be in list {}", render_list(&rules.not_in)),
            move |value, _| enum_number(value).is_some_and(|n| !set.contains(&n)),
        ));
    }
    out
}

fn plural(n: u64, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn entries(n: u64) -> String {
    if n == 1 {
        "1 entry".to_string()
    } else {
        format!("{} entries", n)
    }
}

/// Repeated rules on the list as a whole. Element rules are compiled
/// separately.
pub fn repeated_rules(target: &str, rules: &RepeatedRules, scalar_elements: bool) -> SchemaResult<Vec<StandardRule>> {
    min_max_conflict(target, "repeated", "min_items", rules.min_items, "max_items", rules.max_items)?;
    if rules.unique && !scalar_elements {
        return Err(SchemaError::invalid_parameter(
            target,
            "repeated.unique",
            "unique is only supported for scalar elements",
        ));
    }

    let len = |value: &Value| match value {
        Value::List(items) => Some(items.len() as u64),
        _ => None,
    };

    let mut out = Vec::new();
    if let Some(n) = rules.min_items {
        out.push(StandardRule::new(
            "repeated.min_items",
            format!("value must contain at least {}", plural(n, "item")),
            move |value, _| len(value).is_some_and(|l| l >= n),
        ));
    }
    if let Some(n) = rules.max_items {
        out.push(StandardRule::new(
            "repeated.max_items",
            format!("value must contain no more than {}", plural(n, "item")),
            move |value, _| len(value).is_some_and(|l| l <= n),
        ));
    }
    if rules.unique {
        out.push(StandardRule::new(
            "repeated.unique",
            "repeated value must contain unique items",
            |value, _| match value {
                Value::List(items) => all_unique(items).unwrap_or(false),
                _ => false,
            },
        ));
    }
    Ok(out)
}

/// Map rules on the map as a whole. Key and value rules are compiled
/// separately.
pub fn map_rules(target: &str, rules: &MapRules) -> SchemaResult<Vec<StandardRule>> {
    min_max_conflict(target, "map", "min_pairs", rules.min_pairs, "max_pairs", rules.max_pairs)?;

    let len = |value: &Value| match value {
        Value::Map(entries) => Some(entries.len() as u64),
        _ => None,
    };

    let mut out = Vec::new();
    if let Some(n) = rules.min_pairs {
        out.push(StandardRule::new(
            "map.min_pairs",
            format!("map must be at least {}", entries(n)),
            move |value, _| len(value).is_some_and(|l| l >= n),
        ));
    }
    if let Some(n) = rules.max_pairs {
        out.push(StandardRule::new(
            "map.max_pairs",
            format!("map must be at most {}", entries(n)),
            move |value, _| len(value).is_some_and(|l| l <= n),
        ));
    }
    Ok(out)
}

fn timestamp_param(target: &str, rule: &str, raw: &Option<String>) -> SchemaResult<Option<DateTime<Utc>>> {
    raw.as_deref()
        .map(|s| {
            parse_timestamp(s).ok_or_else(|| {
                SchemaError::invalid_parameter(target, rule, format!("'{}' is not an RFC 3339 timestamp", s))
            })
        })
        .transpose()
}

fn duration_param(target: &str, rule: &str, raw: &str) -> SchemaResult<Duration> {
    parse_duration(raw)
        .ok_or_else(|| SchemaError::invalid_parameter(target, rule, format!("'{}' is not a duration", raw)))
}

fn timestamp_of(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(t) => Some(*t),
        _ => None,
    }
}

fn duration_of(value: &Value) -> Option<Duration> {
    match value {
        Value::Duration(d) => Some(*d),
        _ => None,
    }
}

/// Timestamp rules: `const`, range, `lt_now`, `gt_now`, `within`.
pub fn timestamp_rules(target: &str, rules: &TimestampRules) -> SchemaResult<Vec<StandardRule>> {
    if rules.lt_now && rules.gt_now {
        return Err(SchemaError::conflicting(target, "timestamp: lt_now and gt_now are mutually exclusive"));
    }
    if rules.lt_now && (rules.lt.is_some() || rules.lte.is_some()) {
        return Err(SchemaError::conflicting(target, "timestamp: lt_now cannot be combined with lt or lte"));
    }
    if rules.gt_now && (rules.gt.is_some() || rules.gte.is_some()) {
        return Err(SchemaError::conflicting(target, "timestamp: gt_now cannot be combined with gt or gte"));
    }

    let mut out = Vec::new();

    if let Some(expected) = timestamp_param(target, "timestamp.const", &rules.const_value)? {
        out.push(StandardRule::new(
            "timestamp.const",
            format!("value must equal {}", format_timestamp(&expected)),
            move |value, _| timestamp_of(value) == Some(expected),
        ));
    }

    let bounds = Bounds {
        lt: timestamp_param(target, "timestamp.lt", &rules.lt)?,
        lte: timestamp_param(target, "timestamp.lte", &rules.lte)?,
        gt: timestamp_param(target, "timestamp.gt", &rules.gt)?,
        gte: timestamp_param(target, "timestamp.gte", &rules.gte)?,
    };
    if let Some(rule) = range_rule("timestamp", target, bounds, timestamp_of, format_timestamp)? {
        out.push(rule);
    }

    if rules.lt_now {
        out.push(StandardRule::new(
            "timestamp.lt_now",
            "value must be less than now",
            |value, ctx| timestamp_of(value).is_some_and(|t| t < ctx.now()),
        ));
    }
    if rules.gt_now {
        out.push(StandardRule::new(
            "timestamp.gt_now",
            "value must be greater than now",
            |value, ctx| timestamp_of(value).is_some_and(|t| t > ctx.now()),
        ));
    }
    if let Some(raw) = &rules.within {
        let window = duration_param(target, "timestamp.within", raw)?;
        if window <= Duration::zero() {
            return Err(SchemaError::invalid_parameter(
                target,
                "timestamp.within",
                "duration must be positive",
            ));
        }
        out.push(StandardRule::new(
            "timestamp.within",
            format!("value must be within {} of now", format_duration(&window)),
            move |value, ctx| {
                timestamp_of(value).is_some_and(|t| {
                    let distance = if t > ctx.now() { t - ctx.now() } else { ctx.now() - t };
                    distance <= window
                })
            },
        ));
    }

    Ok(out)
}

/// Duration rules: `const`, range, `in`, `not_in`.
pub fn duration_rules(target: &str, rules: &DurationRules) -> SchemaResult<Vec<StandardRule>> {
    let optional = |rule: &str, raw: &Option<String>| {
        raw.as_deref().map(|s| duration_param(target, rule, s)).transpose()
    };
    let mut out = Vec::new();

    if let Some(expected) = optional("duration.const", &rules.const_value)? {
        out.push(StandardRule::new(
            "duration.const",
            format!("value must equal {}", format_duration(&expected)),
            move |value, _| duration_of(value) == Some(expected),
        ));
    }

    let bounds = Bounds {
        lt: optional("duration.lt", &rules.lt)?,
        lte: optional("duration.lte", &rules.lte)?,
        gt: optional("duration.gt", &rules.gt)?,
        gte: optional("duration.gte", &rules.gte)?,
    };
    if let Some(rule) = range_rule("duration", target, bounds, duration_of, format_duration)? {
        out.push(rule);
    }

    if !rules.in_set.is_empty() {
        let set = rules
            .in_set
            .iter()
            .map(|s| duration_param(target, "duration.in", s))
            .collect::<SchemaResult<Vec<_>>>()?;
        let rendered: Vec<String> = set.iter().map(format_duration).collect();
        out.push(StandardRule::new(
            "duration.in",
            format!("value must be in list {}", render_list(&rendered)),
            move |value, _| duration_of(value).is_some_and(|d| set.contains(&d)),
        ));
    }
    if !rules.not_in.is_empty() {
        let set = rules
            .not_in
            .iter()
            .map(|s| duration_param(target, "duration.not_in", s))
            .collect::<SchemaResult<Vec<_>>>()?;
        let rendered: Vec<String> = set.iter().map(format_duration).collect();
        out.push(StandardRule::new(
            "duration.not_in",
            format!("value must not be in list {}", render_list(&rendered)),
            move |value, _| duration_of(value).is_some_and(|d| !set.contains(&d)),
        ));
    }

    Ok(out)
}
