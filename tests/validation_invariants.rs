//! Validation Invariant Tests
//!
//! End-to-end checks of the validator over a small order schema:
//! - Valid messages produce no violations
//! - Violations carry a constraint id and a field path
//! - Paths reach into lists and maps
//! - Unset optional fields are skipped
//! - All violations are reported, in evaluation order
//! - Validation is deterministic

use protoguard::{decode_message, FieldPath, MapKey, MessageValue, SchemaSet, Validator, Value};
use serde_json::json;

// =============================================================================
// Helper Functions
// =============================================================================

const ORDER_SCHEMA: &str = r#"{
    "package": "shop",
    "enums": [
        {"name": "Status", "values": [
            {"name": "STATUS_UNSPECIFIED", "number": 0},
            {"name": "ACTIVE", "number": 1}
        ]}
    ],
    "messages": [
        {
            "name": "Order",
            "fields": [
                {"name": "id", "type": "string", "rules": {"string": {"uuid": true}}},
                {"name": "email", "type": "string", "rules": {"string": {"email": true}}},
                {"name": "status", "type": "enum", "enum": "Status", "rules": {"enum": {"defined_only": true}}},
                {"name": "items", "type": "message", "message": "Item", "cardinality": "repeated",
                 "rules": {"repeated": {"max_items": 3}}},
                {"name": "settings", "type": "message", "message": "Setting",
                 "cardinality": {"map": {"key": "string"}},
                 "rules": {"map": {"keys": {"string": {"min_len": 2}}}}},
                {"name": "tags", "type": "string", "cardinality": "repeated",
                 "rules": {"repeated": {"unique": true, "items": {"string": {"max_len": 8}}}}},
                {"name": "card", "type": "string"},
                {"name": "iban", "type": "string"}
            ],
            "rules": {
                "required": ["id"],
                "oneof": [{"fields": ["card", "iban"]}]
            }
        },
        {
            "name": "Item",
            "fields": [
                {"name": "sku", "type": "string", "rules": {"string": {"pattern": "^[A-Z]{3}-[0-9]+$"}}},
                {"name": "quantity", "type": "uint32", "rules": {"uint32": {"gt": 0}}}
            ]
        },
        {
            "name": "Setting",
            "fields": [
                {"name": "value", "type": "int64", "rules": {"int64": {"gte": 0, "lte": 3600}}}
            ]
        }
    ]
}"#;

fn validator() -> Validator {
    Validator::new(SchemaSet::from_json(ORDER_SCHEMA).unwrap())
}

fn item(sku: &str, quantity: u32) -> Value {
    Value::Message(
        MessageValue::new("shop.Item")
            .with("sku", sku)
            .with("quantity", quantity),
    )
}

fn setting(value: i64) -> Value {
    Value::Message(MessageValue::new("shop.Setting").with("value", value))
}

fn valid_order() -> MessageValue {
    MessageValue::new("shop.Order")
        .with("id", "0b7b3f4e-5a49-4d2e-9f1a-6c1d2f3e4a5b")
        .with("email", "buyer@example.com")
        .with("status", 1i64)
        .with("items", Value::list(vec![item("ABC-1", 1), item("XYZ-22", 4)]))
        .with("settings", Value::map(vec![("timeout", setting(30))]))
        .with("tags", Value::list(vec!["gift", "rush"]))
        .with("card", "4111")
}

fn rendered(result: &protoguard::ValidationResult) -> Vec<(String, String)> {
    result
        .iter()
        .map(|v| (v.field_path.to_string(), v.constraint_id.clone()))
        .collect()
}

// =============================================================================
// Basic Outcome Tests
// =============================================================================

/// A message satisfying every rule has no violations.
#[test]
fn test_valid_message_passes() {
    let result = validator().validate(&valid_order()).unwrap();
    assert!(result.is_valid(), "unexpected violations: {:?}", result.violations);
}

/// A single failing rule yields exactly one violation with id and path.
#[test]
fn test_single_violation_has_id_and_path() {
    let msg = valid_order().with("email", "not-an-email");
    let result = validator().validate(&msg).unwrap();

    assert_eq!(result.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.constraint_id, "string.email");
    assert_eq!(violation.field_path, FieldPath::root().child("email"));
    assert_eq!(violation.message, "value must be a valid email address");
    assert!(!violation.for_key);
}

// =============================================================================
// Path Tests
// =============================================================================

/// Violations inside repeated messages carry the element index.
#[test]
fn test_path_into_repeated_message() {
    let msg = valid_order().with("items", Value::list(vec![item("ABC-1", 1), item("abc", 1)]));
    let result = validator().validate(&msg).unwrap();
    assert_eq!(
        rendered(&result),
        vec![("items[1].sku".to_string(), "string.pattern".to_string())]
    );
}

/// Violations inside map values carry the quoted key.
#[test]
fn test_path_into_map_value() {
    let msg = valid_order().with("settings", Value::map(vec![("timeout", setting(7200))]));
    let result = validator().validate(&msg).unwrap();
    assert_eq!(
        rendered(&result),
        vec![("settings[\"timeout\"].value".to_string(), "int64.gte_lte".to_string())]
    );
}

/// Key rules report against the key.
#[test]
fn test_map_key_violation_is_marked() {
    let msg = valid_order().with("settings", Value::map(vec![("x", setting(1))]));
    let result = validator().validate(&msg).unwrap();

    assert_eq!(result.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.field_path.to_string(), "settings[\"x\"]");
    assert_eq!(violation.constraint_id, "string.min_len");
    assert!(violation.for_key);
}

/// Scalar element rules report against the element index.
#[test]
fn test_repeated_scalar_elements() {
    let msg = valid_order().with("tags", Value::list(vec!["ok", "waytoolongtag", "ok"]));
    let result = validator().validate(&msg).unwrap();
    assert_eq!(
        rendered(&result),
        vec![
            ("tags".to_string(), "repeated.unique".to_string()),
            ("tags[1]".to_string(), "string.max_len".to_string()),
        ]
    );
}

/// Map entries are visited in key order.
#[test]
fn test_map_entries_in_key_order() {
    let msg = valid_order().with(
        "settings",
        Value::map(vec![("zeta", setting(-1)), ("alpha", setting(-2))]),
    );
    let result = validator().validate(&msg).unwrap();
    let paths: Vec<String> = result.iter().map(|v| v.field_path.to_string()).collect();
    assert_eq!(
        paths,
        vec!["settings[\"alpha\"].value", "settings[\"zeta\"].value"]
    );
    assert_eq!(result.violations[0].field_path.elements()[1], protoguard::PathElement::Key(MapKey::from("alpha")));
}

// =============================================================================
// Presence Tests
// =============================================================================

/// Unset fields without presence rules are not checked.
#[test]
fn test_unset_optional_fields_are_skipped() {
    let msg = MessageValue::new("shop.Order")
        .with("id", "0b7b3f4e-5a49-4d2e-9f1a-6c1d2f3e4a5b")
        .with("iban", "DE89");
    let result = validator().validate(&msg).unwrap();
    assert!(result.is_valid(), "unexpected violations: {:?}", result.violations);
}

/// Both members of a oneof set is a message-level violation.
#[test]
fn test_oneof_conflict() {
    let msg = valid_order().with("iban", "DE89");
    let result = validator().validate(&msg).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.violations[0].constraint_id, "message.oneof");
    assert!(result.violations[0].field_path.is_root());
    assert_eq!(result.violations[0].message, "only one of card, iban can be set");
}

/// Open enums accept unknown numbers unless `defined_only` is set.
#[test]
fn test_enum_defined_only() {
    let msg = valid_order().with("status", 7i64);
    let result = validator().validate(&msg).unwrap();
    assert_eq!(result.constraint_ids(), vec!["enum.defined_only"]);
}

// =============================================================================
// Aggregation Tests
// =============================================================================

/// Every failing rule is reported, message rules first, then fields in
/// declaration order.
#[test]
fn test_simultaneous_violations_all_reported() {
    let mut msg = valid_order()
        .with("email", "nope")
        .with("items", Value::list(vec![item("bad", 0)]))
        .with("iban", "DE89");
    msg.clear("id");

    let result = validator().validate(&msg).unwrap();
    assert_eq!(
        rendered(&result),
        vec![
            ("id".to_string(), "required".to_string()),
            ("".to_string(), "message.oneof".to_string()),
            ("email".to_string(), "string.email".to_string()),
            ("items[0].sku".to_string(), "string.pattern".to_string()),
            ("items[0].quantity".to_string(), "uint32.gt".to_string()),
        ]
    );
}

/// The same instance validates the same way every time.
#[test]
fn test_validation_is_idempotent() {
    let validator = validator();
    let msg = valid_order().with("email", "nope").with("status", 9i64);

    let first = validator.validate(&msg).unwrap();
    for _ in 0..100 {
        assert_eq!(validator.validate(&msg).unwrap(), first);
    }
}

// =============================================================================
// JSON Input Tests
// =============================================================================

/// Instances decoded from JSON validate like hand-built ones.
#[test]
fn test_decoded_instance() {
    let validator = validator();
    let instance = json!({
        "id": "0b7b3f4e-5a49-4d2e-9f1a-6c1d2f3e4a5b",
        "email": "buyer@example.com",
        "status": "ACTIVE",
        "items": [{"sku": "ABC-1", "quantity": 0}],
        "settings": {"timeout": {"value": "30"}},
        "card": "4111"
    });
    let msg = decode_message(validator.schema(), "shop.Order", &instance).unwrap();
    let result = validator.validate(&msg).unwrap();
    assert_eq!(
        rendered(&result),
        vec![("items[0].quantity".to_string(), "uint32.gt".to_string())]
    );
}

/// Violations serialize as flat records.
#[test]
fn test_result_serialization() {
    let result = validator().validate(&valid_order().with("email", "nope")).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        json,
        json!({
            "violations": [{
                "field_path": "email",
                "constraint_id": "string.email",
                "message": "value must be a valid email address",
                "for_key": false
            }]
        })
    );
}
