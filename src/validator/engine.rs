//! Validator façade
//!
//! Owns the schema, the compiled rule cache and the counters. Validation
//! walks a message tree depth-first and collects every violation:
//!
//! 1. message rules (`required`, `oneof`, expressions) in declaration order
//! 2. fields in declaration order; per field, standard rules, then field
//!    expressions, then elements (list order, map keys sorted), recursing
//!    into nested messages
//!
//! Nothing short-circuits except an evaluation fault under
//! [`FaultPolicy::Abort`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::cache::{Lookup, RuleCache};
use super::violation::{EvaluationFault, FieldPath, PathElement, ValidationResult, Violation};
use crate::config::{FaultPolicy, ValidatorConfig};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::rules::{
    CompiledField, CompiledMessage, CompiledRules, ExpressionRule, MessageRule, RuleContext,
    RuleRegistry, RuleSummary,
};
use crate::schema::{Cardinality, FieldKind, SchemaError, SchemaResult, SchemaSet};
use crate::value::{MessageValue, Value};

/// Why a validation call produced no result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidateError {
    /// The message type (or a nested one) failed to compile.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A rule could not be evaluated and the policy is `abort`.
    #[error("evaluation fault: {0}")]
    Fault(EvaluationFault),
}

impl ValidateError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ValidateError::Schema(e) => e.code(),
            ValidateError::Fault(_) => "PROTOGUARD_EVALUATION_FAULT",
        }
    }
}

/// Compilation progress of a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorState {
    /// No type compiled yet.
    Uninitialized,
    /// Some types compiled.
    Compiled,
    /// Every schema type compiled successfully.
    Ready,
}

/// Validates message instances against the rules of their schema.
///
/// `Validator` is `Send + Sync`; share it behind an `Arc`.
pub struct Validator {
    schema: Arc<SchemaSet>,
    registry: RuleRegistry,
    cache: RuleCache,
    config: ValidatorConfig,
    metrics: MetricsRegistry,
}

impl Validator {
    /// Creates a validator with the default configuration. Types compile
    /// lazily on first use.
    pub fn new(schema: impl Into<Arc<SchemaSet>>) -> Self {
        let schema = schema.into();
        Self {
            registry: RuleRegistry::new(Arc::clone(&schema)),
            schema,
            cache: RuleCache::new(),
            config: ValidatorConfig::default(),
            metrics: MetricsRegistry::new(),
        }
    }

    /// Creates a validator; with `eager` set every type is compiled now and
    /// the first compilation error is returned.
    pub fn with_config(schema: impl Into<Arc<SchemaSet>>, config: ValidatorConfig) -> SchemaResult<Self> {
        let mut validator = Self::new(schema);
        validator.config = config;
        if validator.config.eager {
            validator.compile_all()?;
        }
        Ok(validator)
    }

    pub fn schema(&self) -> &SchemaSet {
        &self.schema
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn state(&self) -> ValidatorState {
        let compiled = self.cache.compiled_count();
        if compiled == 0 {
            ValidatorState::Uninitialized
        } else if compiled == self.schema.message_count() {
            ValidatorState::Ready
        } else {
            ValidatorState::Compiled
        }
    }

    /// Returns the compiled rules of a type, compiling them once.
    pub fn compiled(&self, type_name: &str) -> SchemaResult<Arc<CompiledMessage>> {
        let (entry, lookup) = self.cache.get_or_compile(type_name, || {
            self.metrics.increment_compilations();
            match self.registry.compile_message(type_name) {
                Ok(compiled) => {
                    log_event_with_fields(
                        Event::TypeCompiled,
                        &[
                            ("type", type_name),
                            ("rules", &compiled.rule_count().to_string()),
                        ],
                    );
                    Ok(Arc::new(compiled))
                }
                Err(e) => {
                    self.metrics.increment_compile_failures();
                    log_event_with_fields(
                        Event::TypeCompileFailed,
                        &[("type", type_name), ("code", e.code()), ("error", &e.to_string())],
                    );
                    Err(e)
                }
            }
        });
        if lookup == Lookup::Hit {
            self.metrics.increment_cache_hits();
        }
        entry
    }

    /// Compiles every schema type. All types are attempted; the first
    /// failure in name order is returned.
    pub fn compile_all(&self) -> SchemaResult<()> {
        let mut first_error = None;
        for message in self.schema.messages() {
            if let Err(e) = self.compiled(&message.name) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Lists the rules of a type in evaluation order.
    pub fn explain(&self, type_name: &str) -> SchemaResult<Vec<RuleSummary>> {
        Ok(self.compiled(type_name)?.describe())
    }

    /// Validates an instance at the configured time (the wall clock unless
    /// pinned).
    pub fn validate(&self, message: &MessageValue) -> Result<ValidationResult, ValidateError> {
        let now = self.config.now.unwrap_or_else(Utc::now);
        self.validate_at(message, now)
    }

    /// Validates an instance with `now` bound to the given time.
    pub fn validate_at(&self, message: &MessageValue, now: DateTime<Utc>) -> Result<ValidationResult, ValidateError> {
        self.metrics.increment_validations();
        let compiled = self.compiled(message.type_name())?;

        let mut run = Run::new(self, RuleContext::new(now, self.schema.as_ref()));
        run.advance(Phase::Traversing);
        let outcome = run.message(&compiled, message, None, &mut FieldPath::root());
        run.advance(Phase::Collecting);

        let fault_count = match &outcome {
            Err(ValidateError::Fault(_)) => 1,
            _ => run.result.faults.len() as u64,
        };
        self.metrics.add_faults(fault_count);
        outcome?;

        let result = run.finish();
        self.metrics.add_violations(result.violations.len() as u64);
        log_event_with_fields(
            Event::ValidationComplete,
            &[
                ("type", message.type_name()),
                ("violations", &result.violations.len().to_string()),
                ("faults", &result.faults.len().to_string()),
            ],
        );
        Ok(result)
    }
}

/// Lifecycle of one validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Idle,
    Traversing,
    Collecting,
    Done,
}

type Step = Result<(), ValidateError>;

/// State of one validation call.
struct Run<'v> {
    validator: &'v Validator,
    ctx: RuleContext<'v>,
    phase: Phase,
    result: ValidationResult,
}

impl<'v> Run<'v> {
    fn new(validator: &'v Validator, ctx: RuleContext<'v>) -> Self {
        Self {
            validator,
            ctx,
            phase: Phase::Idle,
            result: ValidationResult::default(),
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(next > self.phase, "{:?} cannot follow {:?}", next, self.phase);
        self.phase = next;
    }

    fn finish(mut self) -> ValidationResult {
        self.advance(Phase::Done);
        self.result
    }

    /// Validates one message. `this` is the message as a value, when the
    /// caller already has one.
    fn message(
        &mut self,
        compiled: &CompiledMessage,
        message: &MessageValue,
        this: Option<&Value>,
        path: &mut FieldPath,
    ) -> Step {
        let owned;
        let this = match this {
            Some(value) => Some(value),
            None if compiled.has_expressions() => {
                owned = Value::Message(message.clone());
                Some(&owned)
            }
            None => None,
        };

        for rule in &compiled.message_rules {
            match rule {
                MessageRule::Required { field } => {
                    if !message.has(field) {
                        self.violation(path.child(field), "required", "value is required", false);
                    }
                }
                MessageRule::Oneof { fields, required } => {
                    let set = fields.iter().filter(|f| message.has(f)).count();
                    if set > 1 {
                        let text = format!("only one of {} can be set", fields.join(", "));
                        self.violation(path.clone(), "message.oneof", text, false);
                    } else if set == 0 && *required {
                        let text = format!("one of {} must be set", fields.join(", "));
                        self.violation(path.clone(), "message.oneof", text, false);
                    }
                }
                MessageRule::Expression(rule) => {
                    if let Some(this) = this {
                        self.expression(rule, this, path, false)?;
                    }
                }
            }
        }

        for field in &compiled.fields {
            if field.rules.skip {
                continue;
            }
            path.push(PathElement::Field(field.name.clone()));
            let step = self.field(field, message.get(&field.name), path);
            path.pop();
            step?;
        }
        Ok(())
    }

    fn field(&mut self, field: &CompiledField, value: Option<&Value>, path: &mut FieldPath) -> Step {
        let kind = &field.descriptor.kind;
        let value = value.filter(|v| !matches!(v, Value::Null));

        match &field.descriptor.cardinality {
            // Unset singular fields are skipped; presence is a message rule
            Cardinality::Singular => match value {
                Some(value) => self.single(kind, Some(&field.rules), value, path, false),
                None => Ok(()),
            },
            Cardinality::Repeated => {
                let empty = Value::List(Vec::new());
                let list = value.unwrap_or(&empty);
                let items = match list {
                    Value::List(items) => items,
                    other => {
                        let text = format!("expected list, found {}", other.type_name());
                        return self.fault(path, None, text);
                    }
                };
                if !self.apply(&field.rules, list, path, false)? {
                    return Ok(());
                }
                for (index, item) in items.iter().enumerate() {
                    path.push(PathElement::Index(index));
                    let step = self.single(kind, field.items.as_ref(), item, path, false);
                    path.pop();
                    step?;
                }
                Ok(())
            }
            Cardinality::Map { key } => {
                let empty = Value::Map(Default::default());
                let map = value.unwrap_or(&empty);
                let entries = match map {
                    Value::Map(entries) => entries,
                    other => {
                        let text = format!("expected map, found {}", other.type_name());
                        return self.fault(path, None, text);
                    }
                };
                if !self.apply(&field.rules, map, path, false)? {
                    return Ok(());
                }
                let key_kind = key.field_kind();
                for (map_key, item) in entries {
                    path.push(PathElement::Key(map_key.clone()));
                    let key_value = map_key.to_value();
                    let step = self
                        .single(&key_kind, field.keys.as_ref(), &key_value, path, true)
                        .and_then(|_| self.single(kind, field.values.as_ref(), item, path, false));
                    path.pop();
                    step?;
                }
                Ok(())
            }
        }
    }

    /// Checks one value of `kind`: its shape, its rules, then the nested
    /// message it holds.
    fn single(
        &mut self,
        kind: &FieldKind,
        rules: Option<&CompiledRules>,
        value: &Value,
        path: &mut FieldPath,
        for_key: bool,
    ) -> Step {
        if rules.is_some_and(|r| r.skip) {
            return Ok(());
        }
        if !kind.admits(value) {
            let text = format!("expected {} value, found {}", kind_label(kind), value.type_name());
            return self.fault(path, None, text);
        }
        if let Some(rules) = rules {
            if !self.apply(rules, value, path, for_key)? {
                return Ok(());
            }
        }
        if let (FieldKind::Message { message: type_name }, Value::Message(nested)) = (kind, value) {
            let compiled = self.validator.compiled(type_name)?;
            self.message(&compiled, nested, Some(value), path)?;
        }
        Ok(())
    }

    /// Runs standard then expression rules. Returns `false` when the rules
    /// were skipped because the value is empty.
    fn apply(&mut self, rules: &CompiledRules, value: &Value, path: &FieldPath, for_key: bool) -> Result<bool, ValidateError> {
        if rules.ignore_empty && value.is_zero() {
            return Ok(false);
        }
        for rule in &rules.standard {
            if !rule.passes(value, &self.ctx) {
                self.violation(path.clone(), rule.id(), rule.message(), for_key);
            }
        }
        for rule in &rules.expressions {
            self.expression(rule, value, path, for_key)?;
        }
        Ok(true)
    }

    fn expression(&mut self, rule: &ExpressionRule, this: &Value, path: &FieldPath, for_key: bool) -> Step {
        match rule.evaluate(this, &self.ctx) {
            Ok(None) => Ok(()),
            Ok(Some(text)) => {
                self.violation(path.clone(), &rule.id, text, for_key);
                Ok(())
            }
            Err(e) => self.fault(path, Some(&rule.id), e.message().to_string()),
        }
    }

    fn violation(&mut self, field_path: FieldPath, id: &str, message: impl Into<String>, for_key: bool) {
        self.result.violations.push(Violation {
            field_path,
            constraint_id: id.to_string(),
            message: message.into(),
            for_key,
        });
    }

    fn fault(&mut self, path: &FieldPath, rule: Option<&str>, message: String) -> Step {
        let fault = EvaluationFault {
            field_path: path.clone(),
            constraint_id: rule.map(str::to_string),
            message,
        };
        log_event_with_fields(
            Event::EvaluationFault,
            &[
                ("path", &fault.field_path.to_string()),
                ("rule", rule.unwrap_or("")),
                ("error", &fault.message),
            ],
        );
        match self.validator.config.fault_policy {
            FaultPolicy::Abort => Err(ValidateError::Fault(fault)),
            FaultPolicy::Report => {
                self.result.faults.push(fault);
                Ok(())
            }
        }
    }
}

fn kind_label(kind: &FieldKind) -> &str {
    match kind {
        FieldKind::Message { message } => message,
        FieldKind::Enum { enum_name } => enum_name,
        other => other.name(),
    }
}
