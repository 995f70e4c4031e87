//! Expression Rule Tests
//!
//! Custom rules attached to fields and messages:
//! - `this` is the field value or the whole message
//! - `now` is the evaluation time
//! - bool results fail on false, string results fail when non-empty
//! - broken expressions are schema errors, runtime failures are faults

use protoguard::expr::ExpressionError;
use protoguard::value::parse_timestamp;
use protoguard::{
    FaultPolicy, MessageValue, SchemaError, SchemaSet, ValidateError, Validator, ValidatorConfig,
    Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

const EVENT_SCHEMA: &str = r#"{
    "package": "cal",
    "messages": [
        {
            "name": "Event",
            "fields": [
                {"name": "title", "type": "string", "rules": {"cel": [
                    {"id": "title.trimmed", "expression": "this == this.trim()", "message": "title must not have surrounding spaces"},
                    {"id": "title.words", "expression": "this.size() < 40 ? '' : 'title is too long'"}
                ]}},
                {"name": "start", "type": "timestamp"},
                {"name": "end", "type": "timestamp"},
                {"name": "attendees", "type": "string", "cardinality": "repeated", "rules": {"cel": [
                    {"id": "attendees.emails", "expression": "this.all(a, a.isEmail())"}
                ]}},
                {"name": "capacity", "type": "int64"},
                {"name": "seats", "type": "int64"}
            ],
            "rules": {"cel": [
                {"id": "event.window", "expression": "!has(this.start) || !has(this.end) || this.start < this.end",
                 "message": "start must be before end"},
                {"id": "event.future", "expression": "!has(this.start) || this.start > now",
                 "message": "event must start in the future"},
                {"id": "event.ratio", "expression": "!has(this.seats) || this.capacity / this.seats >= 1"}
            ]}
        }
    ]
}"#;

fn ts(s: &str) -> Value {
    Value::Timestamp(parse_timestamp(s).unwrap())
}

fn validator(policy: FaultPolicy) -> Validator {
    let config = ValidatorConfig::new()
        .with_fault_policy(policy)
        .with_now(parse_timestamp("2024-01-01T00:00:00Z").unwrap());
    Validator::with_config(SchemaSet::from_json(EVENT_SCHEMA).unwrap(), config).unwrap()
}

fn event() -> MessageValue {
    MessageValue::new("cal.Event")
        .with("title", "Launch")
        .with("start", ts("2024-02-01T10:00:00Z"))
        .with("end", ts("2024-02-01T11:00:00Z"))
        .with("attendees", Value::list(vec!["a@example.com"]))
}

fn compile_error(schema: &str, type_name: &str) -> SchemaError {
    let validator = Validator::new(SchemaSet::from_json(schema).unwrap());
    validator.compiled(type_name).unwrap_err()
}

// =============================================================================
// Evaluation Tests
// =============================================================================

#[test]
fn test_valid_event() {
    let result = validator(FaultPolicy::Abort).validate(&event()).unwrap();
    assert!(result.is_valid(), "unexpected violations: {:?}", result.violations);
}

#[test]
fn test_bool_rule_uses_configured_message() {
    let result = validator(FaultPolicy::Abort)
        .validate(&event().with("title", " Launch "))
        .unwrap();
    assert_eq!(result.constraint_ids(), vec!["title.trimmed"]);
    assert_eq!(result.violations[0].message, "title must not have surrounding spaces");
    assert_eq!(result.violations[0].field_path.to_string(), "title");
}

#[test]
fn test_string_rule_is_its_own_message() {
    let long = "x".repeat(50);
    let result = validator(FaultPolicy::Abort)
        .validate(&event().with("title", long.as_str()))
        .unwrap();
    assert_eq!(result.constraint_ids(), vec!["title.words"]);
    assert_eq!(result.violations[0].message, "title is too long");
}

#[test]
fn test_message_rule_sees_whole_message() {
    let msg = event().with("end", ts("2024-02-01T09:00:00Z"));
    let result = validator(FaultPolicy::Abort).validate(&msg).unwrap();
    assert_eq!(result.constraint_ids(), vec!["event.window"]);
    assert!(result.violations[0].field_path.is_root());
}

#[test]
fn test_now_is_the_configured_time() {
    let msg = event().with("start", ts("2023-12-31T10:00:00Z"));
    let v = validator(FaultPolicy::Abort);
    assert_eq!(v.validate(&msg).unwrap().constraint_ids(), vec!["event.future"]);

    let earlier = parse_timestamp("2023-01-01T00:00:00Z").unwrap();
    assert!(v.validate_at(&msg, earlier).unwrap().is_valid());
}

#[test]
fn test_list_rule_without_message_uses_source() {
    let msg = event().with("attendees", Value::list(vec!["a@example.com", "nobody"]));
    let result = validator(FaultPolicy::Abort).validate(&msg).unwrap();
    assert_eq!(result.constraint_ids(), vec!["attendees.emails"]);
    assert_eq!(
        result.violations[0].message,
        "\"this.all(a, a.isEmail())\" returned false"
    );
}

// =============================================================================
// Fault Tests
// =============================================================================

#[test]
fn test_division_by_zero_aborts() {
    let msg = event().with("capacity", 10i64).with("seats", 0i64);
    match validator(FaultPolicy::Abort).validate(&msg) {
        Err(ValidateError::Fault(fault)) => {
            assert_eq!(fault.constraint_id.as_deref(), Some("event.ratio"));
            assert!(fault.field_path.is_root());
        }
        other => panic!("expected a fault, got {:?}", other),
    }
}

#[test]
fn test_division_by_zero_reported() {
    let msg = event()
        .with("capacity", 10i64)
        .with("seats", 0i64)
        .with("title", " x");
    let result = validator(FaultPolicy::Report).validate(&msg).unwrap();
    assert_eq!(result.faults.len(), 1);
    // Traversal continues past the fault
    assert_eq!(result.constraint_ids(), vec!["title.trimmed"]);
}

// =============================================================================
// Compile Error Tests
// =============================================================================

#[test]
fn test_undefined_field_is_a_schema_error() {
    let schema = r#"{"messages": [{"name": "a.A", "fields": [{"name": "x", "type": "int64"}],
        "rules": {"cel": [{"id": "r", "expression": "this.y > 0"}]}}]}"#;
    match compile_error(schema, "a.A") {
        SchemaError::Expression { id, source, .. } => {
            assert_eq!(id, "r");
            assert!(matches!(source, ExpressionError::UndefinedField { .. }));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_syntax_error_is_a_schema_error() {
    let schema = r#"{"messages": [{"name": "a.A", "fields": [
        {"name": "x", "type": "int64", "rules": {"cel": [{"id": "r", "expression": "this >"}]}}]}]}"#;
    let err = compile_error(schema, "a.A");
    assert_eq!(err.code(), "PROTOGUARD_EXPRESSION");
}

#[test]
fn test_non_bool_result_is_rejected() {
    let schema = r#"{"messages": [{"name": "a.A", "fields": [
        {"name": "x", "type": "int64", "rules": {"cel": [{"id": "r", "expression": "this + 1"}]}}]}]}"#;
    match compile_error(schema, "a.A") {
        SchemaError::Expression { source, .. } => {
            assert!(matches!(source, ExpressionError::InvalidResultType(_)));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_duplicate_rule_ids() {
    let schema = r#"{"messages": [{"name": "a.A", "fields": [
        {"name": "x", "type": "int64", "rules": {"cel": [
            {"id": "r", "expression": "this > 0"},
            {"id": "r", "expression": "this < 10"}
        ]}}]}]}"#;
    assert!(matches!(
        compile_error(schema, "a.A"),
        SchemaError::DuplicateRuleId { .. }
    ));
}
