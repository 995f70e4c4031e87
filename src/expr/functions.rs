//! Runtime operators, functions and conversions

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Timelike, Utc};
use regex::Regex;

use super::ast::{BinaryOp, UnaryOp};
use super::error::{EvalError, EvalResult};
use crate::formats;
use crate::value::{
    all_unique, format_duration, format_timestamp, parse_duration, parse_timestamp, MapKey,
    Value, MAX_DURATION_SECONDS,
};

pub(crate) fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("int negation")),
        (UnaryOp::Negate, Value::Double(d)) => Ok(Value::Double(-d)),
        (UnaryOp::Not, other) => Err(EvalError::no_overload("!_", &[other.type_name()])),
        (UnaryOp::Negate, other) => Err(EvalError::no_overload("-_", &[other.type_name()])),
    }
}

pub(crate) fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(lhs, rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(lhs, rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(lhs, rhs)
                .ok_or_else(|| EvalError::no_overload(op.name(), &[lhs.type_name(), rhs.type_name()]))?;
            // Unordered (NaN) comparisons are false
            let result = match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => contains(rhs, lhs).map(Value::Bool),
        BinaryOp::Add => add(lhs, rhs),
        BinaryOp::Sub => subtract(lhs, rhs),
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => arithmetic(op, lhs, rhs),
    }
}

/// Equality across numeric kinds; values of unrelated kinds are unequal.
pub fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equals(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map_or(false, |other| equals(v, other)))
        }
        (Value::Message(a), Value::Message(b)) => {
            if a.type_name() != b.type_name() {
                return false;
            }
            let present_a = a.fields().filter(|(name, _)| a.has(name));
            let present_b = b.fields().filter(|(name, _)| b.has(name)).count();
            let mut count = 0;
            for (name, value) in present_a {
                count += 1;
                match b.get(name) {
                    Some(other) if b.has(name) && equals(value, other) => {}
                    _ => return false,
                }
            }
            count == present_b
        }
        _ => match compare(lhs, rhs) {
            Some(ordering) => ordering == Some(Ordering::Equal),
            None => lhs == rhs,
        },
    }
}

/// Orders two values. Outer `None` means the kinds are not comparable, inner
/// `None` means the values are unordered (NaN).
pub fn compare(lhs: &Value, rhs: &Value) -> Option<Option<Ordering>> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(Some(a.cmp(b))),
        (Value::UInt(a), Value::UInt(b)) => Some(Some(a.cmp(b))),
        (Value::Double(a), Value::Double(b)) => Some(a.partial_cmp(b)),
        (Value::Int(a), Value::UInt(b)) => Some(Some(compare_int_uint(*a, *b))),
        (Value::UInt(a), Value::Int(b)) => Some(Some(compare_int_uint(*b, *a).reverse())),
        (Value::Int(a), Value::Double(b)) => Some(compare_int_double(*a, *b)),
        (Value::Double(a), Value::Int(b)) => Some(compare_int_double(*b, *a).map(Ordering::reverse)),
        (Value::UInt(a), Value::Double(b)) => Some(compare_uint_double(*a, *b)),
        (Value::Double(a), Value::UInt(b)) => {
            Some(compare_uint_double(*b, *a).map(Ordering::reverse))
        }
        (Value::Bool(a), Value::Bool(b)) => Some(Some(a.cmp(b))),
        (Value::String(a), Value::String(b)) => Some(Some(a.cmp(b))),
        (Value::Bytes(a), Value::Bytes(b)) => Some(Some(a.cmp(b))),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(Some(a.cmp(b))),
        (Value::Duration(a), Value::Duration(b)) => Some(Some(a.cmp(b))),
        _ => None,
    }
}

fn compare_int_uint(a: i64, b: u64) -> Ordering {
    if a < 0 {
        Ordering::Less
    } else {
        (a as u64).cmp(&b)
    }
}

fn compare_int_double(a: i64, b: f64) -> Option<Ordering> {
    if b.is_nan() {
        return None;
    }
    if b >= 9_223_372_036_854_775_808.0 {
        return Some(Ordering::Less);
    }
    if b < -9_223_372_036_854_775_808.0 {
        return Some(Ordering::Greater);
    }
    let truncated = b.trunc() as i64;
    match a.cmp(&truncated) {
        Ordering::Equal => 0.0f64.partial_cmp(&b.fract()),
        other => Some(other),
    }
}

fn compare_uint_double(a: u64, b: f64) -> Option<Ordering> {
    if b.is_nan() {
        return None;
    }
    if b < 0.0 {
        return Some(Ordering::Greater);
    }
    if b >= 18_446_744_073_709_551_616.0 {
        return Some(Ordering::Less);
    }
    let truncated = b.trunc() as u64;
    match a.cmp(&truncated) {
        Ordering::Equal => 0.0f64.partial_cmp(&b.fract()),
        other => Some(other),
    }
}

fn contains(container: &Value, needle: &Value) -> EvalResult<bool> {
    match container {
        Value::List(items) => Ok(items.iter().any(|item| equals(item, needle))),
        Value::Map(entries) => Ok(map_lookup(entries, needle).is_some()),
        other => Err(EvalError::no_overload(
            "@in",
            &[needle.type_name(), other.type_name()],
        )),
    }
}

/// Looks up a map entry, matching int and uint keys numerically.
pub(crate) fn map_lookup<'m>(
    entries: &'m std::collections::BTreeMap<MapKey, Value>,
    key: &Value,
) -> Option<&'m Value> {
    if let Some(found) = MapKey::from_value(key).and_then(|k| entries.get(&k)) {
        return Some(found);
    }
    let alternate = match key {
        Value::Int(i) => u64::try_from(*i).ok().map(MapKey::UInt),
        Value::UInt(u) => i64::try_from(*u).ok().map(MapKey::Int),
        Value::Double(d) if d.fract() == 0.0 && d.is_finite() => {
            let as_int = MapKey::Int(*d as i64);
            if entries.contains_key(&as_int) {
                Some(as_int)
            } else if *d >= 0.0 {
                Some(MapKey::UInt(*d as u64))
            } else {
                None
            }
        }
        _ => None,
    };
    alternate.and_then(|k| entries.get(&k))
}

fn add(lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("int addition")),
        (Value::UInt(a), Value::UInt(b)) => a
            .checked_add(*b)
            .map(Value::UInt)
            .ok_or_else(|| EvalError::overflow("uint addition")),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (Value::Bytes(a), Value::Bytes(b)) => {
            let mut joined = a.clone();
            joined.extend_from_slice(b);
            Ok(Value::Bytes(joined))
        }
        (Value::List(a), Value::List(b)) => {
            let mut joined = a.clone();
            joined.extend(b.iter().cloned());
            Ok(Value::List(joined))
        }
        (Value::Timestamp(t), Value::Duration(d)) | (Value::Duration(d), Value::Timestamp(t)) => {
            shift_timestamp(t, *d)
        }
        (Value::Duration(a), Value::Duration(b)) => a
            .checked_add(b)
            .and_then(checked_duration)
            .map(Value::Duration)
            .ok_or_else(|| EvalError::overflow("duration addition")),
        _ => Err(EvalError::no_overload(
            "_+_",
            &[lhs.type_name(), rhs.type_name()],
        )),
    }
}

fn subtract(lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_sub(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("int subtraction")),
        (Value::UInt(a), Value::UInt(b)) => a
            .checked_sub(*b)
            .map(Value::UInt)
            .ok_or_else(|| EvalError::overflow("uint subtraction")),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a - b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => checked_duration(a.signed_duration_since(*b))
            .map(Value::Duration)
            .ok_or_else(|| EvalError::overflow("timestamp subtraction")),
        (Value::Timestamp(t), Value::Duration(d)) => shift_timestamp(t, -*d),
        (Value::Duration(a), Value::Duration(b)) => a
            .checked_sub(b)
            .and_then(checked_duration)
            .map(Value::Duration)
            .ok_or_else(|| EvalError::overflow("duration subtraction")),
        _ => Err(EvalError::no_overload(
            "_-_",
            &[lhs.type_name(), rhs.type_name()],
        )),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match (op, lhs, rhs) {
        (BinaryOp::Div, Value::Int(_), Value::Int(0))
        | (BinaryOp::Div, Value::UInt(_), Value::UInt(0)) => Err(EvalError::new("division by zero")),
        (BinaryOp::Rem, Value::Int(_), Value::Int(0))
        | (BinaryOp::Rem, Value::UInt(_), Value::UInt(0)) => Err(EvalError::new("modulus by zero")),
        (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => a
            .checked_mul(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("int multiplication")),
        (BinaryOp::Div, Value::Int(a), Value::Int(b)) => a
            .checked_div(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("int division")),
        (BinaryOp::Rem, Value::Int(a), Value::Int(b)) => a
            .checked_rem(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("int modulus")),
        (BinaryOp::Mul, Value::UInt(a), Value::UInt(b)) => a
            .checked_mul(*b)
            .map(Value::UInt)
            .ok_or_else(|| EvalError::overflow("uint multiplication")),
        (BinaryOp::Div, Value::UInt(a), Value::UInt(b)) => Ok(Value::UInt(a / b)),
        (BinaryOp::Rem, Value::UInt(a), Value::UInt(b)) => Ok(Value::UInt(a % b)),
        (BinaryOp::Mul, Value::Double(a), Value::Double(b)) => Ok(Value::Double(a * b)),
        (BinaryOp::Div, Value::Double(a), Value::Double(b)) => Ok(Value::Double(a / b)),
        _ => Err(EvalError::no_overload(
            op.name(),
            &[lhs.type_name(), rhs.type_name()],
        )),
    }
}

fn checked_duration(d: Duration) -> Option<Duration> {
    if d.num_seconds().abs() > MAX_DURATION_SECONDS {
        None
    } else {
        Some(d)
    }
}

/// Timestamps are limited to years 1 through 9999.
fn checked_timestamp(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if (1..=9999).contains(&t.year()) {
        Some(t)
    } else {
        None
    }
}

fn shift_timestamp(t: &DateTime<Utc>, d: Duration) -> EvalResult<Value> {
    t.checked_add_signed(d)
        .and_then(checked_timestamp)
        .map(Value::Timestamp)
        .ok_or_else(|| EvalError::overflow("timestamp arithmetic"))
}

/// Calls a function. `receiver` is the member call target, or the first
/// argument of a global call.
pub(crate) fn call(
    function: &str,
    receiver: &Value,
    args: &[Value],
    patterns: &HashMap<String, Regex>,
) -> EvalResult<Value> {
    let fail = || {
        let mut types = vec![receiver.type_name()];
        types.extend(args.iter().map(Value::type_name));
        Err(EvalError::no_overload(function, &types))
    };

    match (function, receiver, args) {
        ("size", value, []) => size(value).map(Value::Int),
        ("dyn", value, []) => Ok(value.clone()),

        ("contains", Value::String(s), [Value::String(sub)]) => Ok(Value::Bool(s.contains(sub.as_str()))),
        ("startsWith", Value::String(s), [Value::String(p)]) => {
            Ok(Value::Bool(s.starts_with(p.as_str())))
        }
        ("endsWith", Value::String(s), [Value::String(p)]) => Ok(Value::Bool(s.ends_with(p.as_str()))),
        ("matches", Value::String(s), [Value::String(pattern)]) => {
            matches(s, pattern, patterns).map(Value::Bool)
        }
        ("lowerAscii", Value::String(s), []) => Ok(Value::String(s.to_ascii_lowercase())),
        ("upperAscii", Value::String(s), []) => Ok(Value::String(s.to_ascii_uppercase())),
        ("trim", Value::String(s), []) => Ok(Value::String(s.trim().to_string())),

        ("isEmail", Value::String(s), []) => Ok(Value::Bool(formats::is_email(s))),
        ("isHostname", Value::String(s), []) => Ok(Value::Bool(formats::is_hostname(s))),
        ("isIp", Value::String(s), []) => Ok(Value::Bool(formats::is_ip(s, 0))),
        ("isIp", Value::String(s), [Value::Int(version)]) => {
            let version = u8::try_from(*version).unwrap_or(u8::MAX);
            Ok(Value::Bool(formats::is_ip(s, version)))
        }
        ("isUri", Value::String(s), []) => Ok(Value::Bool(formats::is_uri(s))),
        ("isUriRef", Value::String(s), []) => Ok(Value::Bool(formats::is_uri_ref(s))),
        ("isUuid", Value::String(s), []) => Ok(Value::Bool(formats::is_uuid(s))),
        ("unique", Value::List(items), []) => all_unique(items)
            .map(Value::Bool)
            .ok_or_else(|| EvalError::new("unique() requires a list of scalars")),

        (name, Value::Timestamp(t), []) if is_time_accessor(name) => {
            timestamp_accessor(name, t, None)
        }
        (name, Value::Timestamp(t), [Value::String(zone)]) if is_time_accessor(name) => {
            timestamp_accessor(name, t, Some(zone.as_str()))
        }
        ("getHours", Value::Duration(d), []) => Ok(Value::Int(d.num_hours())),
        ("getMinutes", Value::Duration(d), []) => Ok(Value::Int(d.num_minutes())),
        ("getSeconds", Value::Duration(d), []) => Ok(Value::Int(d.num_seconds())),
        ("getMilliseconds", Value::Duration(d), []) => Ok(Value::Int(d.num_milliseconds())),

        ("int", value, []) => to_int(value),
        ("uint", value, []) => to_uint(value),
        ("double", value, []) => to_double(value),
        ("string", value, []) => to_string(value),
        ("bytes", Value::String(s), []) => Ok(Value::Bytes(s.as_bytes().to_vec())),
        ("bytes", Value::Bytes(b), []) => Ok(Value::Bytes(b.clone())),
        ("timestamp", Value::String(s), []) => parse_timestamp(s)
            .and_then(checked_timestamp)
            .map(Value::Timestamp)
            .ok_or_else(|| EvalError::new(format!("invalid timestamp '{}'", s))),
        ("timestamp", Value::Int(seconds), []) => Utc
            .timestamp_opt(*seconds, 0)
            .single()
            .and_then(checked_timestamp)
            .map(Value::Timestamp)
            .ok_or_else(|| EvalError::overflow("timestamp conversion")),
        ("timestamp", Value::Timestamp(t), []) => Ok(Value::Timestamp(*t)),
        ("duration", Value::String(s), []) => parse_duration(s)
            .map(Value::Duration)
            .ok_or_else(|| EvalError::new(format!("invalid duration '{}'", s))),
        ("duration", Value::Duration(d), []) => Ok(Value::Duration(*d)),

        _ => fail(),
    }
}

fn size(value: &Value) -> EvalResult<i64> {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => return Err(EvalError::no_overload("size", &[other.type_name()])),
    };
    i64::try_from(len).map_err(|_| EvalError::overflow("size"))
}

fn matches(s: &str, pattern: &str, patterns: &HashMap<String, Regex>) -> EvalResult<bool> {
    if let Some(regex) = patterns.get(pattern) {
        return Ok(regex.is_match(s));
    }
    let regex = Regex::new(pattern)
        .map_err(|e| EvalError::new(format!("invalid regular expression '{}': {}", pattern, e)))?;
    Ok(regex.is_match(s))
}

fn is_time_accessor(name: &str) -> bool {
    matches!(
        name,
        "getFullYear"
            | "getMonth"
            | "getDate"
            | "getDayOfMonth"
            | "getDayOfWeek"
            | "getDayOfYear"
            | "getHours"
            | "getMinutes"
            | "getSeconds"
            | "getMilliseconds"
    )
}

/// Parses `UTC`, `Z` or a fixed `+HH:MM` / `-HH:MM` offset.
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    if zone.eq_ignore_ascii_case("utc") || zone == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => (1, zone),
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn timestamp_accessor(name: &str, t: &DateTime<Utc>, zone: Option<&str>) -> EvalResult<Value> {
    let offset = match zone {
        Some(zone) => parse_offset(zone)
            .ok_or_else(|| EvalError::new(format!("unsupported time zone '{}'", zone)))?,
        None => FixedOffset::east_opt(0).ok_or_else(|| EvalError::new("invalid offset"))?,
    };
    let local = t.with_timezone(&offset);
    let value = match name {
        "getFullYear" => i64::from(local.year()),
        "getMonth" => i64::from(local.month0()),
        "getDate" => i64::from(local.day()),
        "getDayOfMonth" => i64::from(local.day0()),
        "getDayOfWeek" => i64::from(local.weekday().num_days_from_sunday()),
        "getDayOfYear" => i64::from(local.ordinal0()),
        "getHours" => i64::from(local.hour()),
        "getMinutes" => i64::from(local.minute()),
        "getSeconds" => i64::from(local.second()),
        _ => i64::from(local.timestamp_subsec_millis()),
    };
    Ok(Value::Int(value))
}

fn to_int(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::UInt(u) => i64::try_from(*u)
            .map(Value::Int)
            .map_err(|_| EvalError::new("int conversion out of range")),
        Value::Double(d) => {
            if d.is_finite() && *d > -9_223_372_036_854_775_809.0 && *d < 9_223_372_036_854_775_808.0 {
                Ok(Value::Int(d.trunc() as i64))
            } else {
                Err(EvalError::new("int conversion out of range"))
            }
        }
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::new(format!("cannot convert '{}' to int", s))),
        Value::Timestamp(t) => Ok(Value::Int(t.timestamp())),
        other => Err(EvalError::no_overload("int", &[other.type_name()])),
    }
}

fn to_uint(value: &Value) -> EvalResult<Value> {
    match value {
        Value::UInt(u) => Ok(Value::UInt(*u)),
        Value::Int(i) => u64::try_from(*i)
            .map(Value::UInt)
            .map_err(|_| EvalError::new("uint conversion out of range")),
        Value::Double(d) => {
            if d.is_finite() && *d > -1.0 && *d < 18_446_744_073_709_551_616.0 {
                Ok(Value::UInt(d.trunc() as u64))
            } else {
                Err(EvalError::new("uint conversion out of range"))
            }
        }
        Value::String(s) => s
            .parse::<u64>()
            .map(Value::UInt)
            .map_err(|_| EvalError::new(format!("cannot convert '{}' to uint", s))),
        other => Err(EvalError::no_overload("uint", &[other.type_name()])),
    }
}

fn to_double(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Double(d) => Ok(Value::Double(*d)),
        Value::Int(i) => Ok(Value::Double(*i as f64)),
        Value::UInt(u) => Ok(Value::Double(*u as f64)),
        Value::String(s) => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::new(format!("cannot convert '{}' to double", s))),
        other => Err(EvalError::no_overload("double", &[other.type_name()])),
    }
}

fn to_string(value: &Value) -> EvalResult<Value> {
    let s = match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Bytes(b) => String::from_utf8(b.clone())
            .map_err(|_| EvalError::new("bytes are not valid UTF-8"))?,
        Value::Timestamp(t) => format_timestamp(t),
        Value::Duration(d) => format_duration(d),
        other => return Err(EvalError::no_overload("string", &[other.type_name()])),
    };
    Ok(Value::String(s))
}
