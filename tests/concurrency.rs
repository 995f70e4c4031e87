//! Concurrency Tests
//!
//! A validator is shared across threads:
//! - Each type is compiled exactly once, however many callers race on it
//! - Concurrent results equal sequential results
//! - Counters account for every call

use std::sync::Arc;
use std::thread;

use protoguard::{MessageValue, SchemaSet, Validator, ValidatorState, Value};

const SCHEMA: &str = r#"{
    "package": "load",
    "messages": [
        {"name": "Batch", "fields": [
            {"name": "name", "type": "string", "rules": {"string": {"min_len": 1, "max_len": 16}}},
            {"name": "entries", "type": "message", "message": "Entry", "cardinality": "repeated"}
        ]},
        {"name": "Entry", "fields": [
            {"name": "score", "type": "double", "rules": {"double": {"gte": 0.0, "lte": 1.0, "finite": true}}}
        ], "rules": {"cel": [{"id": "entry.half", "expression": "this.score != 0.5"}]}}
    ]
}"#;

fn batch(i: usize) -> MessageValue {
    let entries: Vec<Value> = (0..4)
        .map(|j| {
            let score = ((i + j) % 5) as f64 / 4.0;
            Value::Message(MessageValue::new("load.Entry").with("score", score))
        })
        .collect();
    MessageValue::new("load.Batch")
        .with("name", format!("batch-{}", i))
        .with("entries", Value::List(entries))
}

#[test]
fn test_thousand_validations_compile_once() {
    let validator = Validator::new(SchemaSet::from_json(SCHEMA).unwrap());
    assert_eq!(validator.state(), ValidatorState::Uninitialized);

    for i in 0..1000 {
        validator.validate(&batch(i)).unwrap();
    }

    // One compilation per type: Batch and Entry
    assert_eq!(validator.metrics().compilations(), 2);
    assert_eq!(validator.metrics().validations(), 1000);
    assert_eq!(validator.state(), ValidatorState::Ready);
}

#[test]
fn test_concurrent_validations_match_sequential() {
    let validator = Arc::new(Validator::new(SchemaSet::from_json(SCHEMA).unwrap()));
    let expected: Vec<_> = (0..50)
        .map(|i| {
            let reference = Validator::new(SchemaSet::from_json(SCHEMA).unwrap());
            reference.validate(&batch(i)).unwrap()
        })
        .collect();
    let expected = Arc::new(expected);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let validator = Arc::clone(&validator);
            let expected = Arc::clone(&expected);
            thread::spawn(move || {
                for (i, want) in expected.iter().enumerate() {
                    let got = validator.validate(&batch(i)).unwrap();
                    assert_eq!(&got, want);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = validator.metrics().snapshot();
    assert_eq!(snapshot.compilations, 2);
    assert_eq!(snapshot.validations, 8 * 50);
    let per_round: u64 = expected.iter().map(|r| r.len() as u64).sum();
    assert_eq!(snapshot.violations, 8 * per_round);
}
