//! Compiled rule sets
//!
//! The registry turns descriptor rules into these structures once per type.
//! Standard rules are closures over their parameters; expression rules hold
//! a checked [`Program`]. Everything here is immutable and shared between
//! threads behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::expr::{EvalError, Program, TypeProvider};
use crate::schema::FieldDescriptor;
use crate::value::Value;

/// Inputs shared by every rule of one validation call.
pub struct RuleContext<'a> {
    now: DateTime<Utc>,
    now_value: Value,
    provider: &'a dyn TypeProvider,
}

impl<'a> RuleContext<'a> {
    pub fn new(now: DateTime<Utc>, provider: &'a dyn TypeProvider) -> Self {
        Self {
            now,
            now_value: Value::Timestamp(now),
            provider,
        }
    }

    /// Evaluation time.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Predicate of a standard rule. Returns `true` when the value passes.
pub type CheckFn = Arc<dyn Fn(&Value, &RuleContext<'_>) -> bool + Send + Sync>;

/// A built-in parameterized check.
#[derive(Clone)]
pub struct StandardRule {
    id: String,
    message: String,
    check: CheckFn,
}

impl StandardRule {
    pub fn new<F>(id: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value, &RuleContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            message: message.into(),
            check: Arc::new(check),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn passes(&self, value: &Value, ctx: &RuleContext<'_>) -> bool {
        (self.check)(value, ctx)
    }
}

impl fmt::Debug for StandardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardRule")
            .field("id", &self.id)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// A custom rule backed by an expression.
#[derive(Debug, Clone)]
pub struct ExpressionRule {
    pub id: String,
    pub message: String,
    pub program: Program,
}

impl ExpressionRule {
    /// Evaluates the rule against `this`.
    ///
    /// Returns the violation message when the rule fails, `None` when it
    /// passes. A `bool` result fails on `false`; a `string` result fails
    /// when non-empty and is itself the message.
    pub fn evaluate(&self, this: &Value, ctx: &RuleContext<'_>) -> Result<Option<String>, EvalError> {
        let result = self
            .program
            .evaluate(&[("this", this), ("now", &ctx.now_value)], ctx.provider)?;
        match result {
            Value::Bool(true) => Ok(None),
            Value::Bool(false) => Ok(Some(self.failure_message())),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(EvalError::new(format!(
                "rule must evaluate to bool or string, got {}",
                other.type_name()
            ))),
        }
    }

    fn failure_message(&self) -> String {
        if self.message.is_empty() {
            format!("\"{}\" returned false", self.program.source())
        } else {
            self.message.clone()
        }
    }
}

/// Rules of one attachment point: a field, or the elements, keys or values
/// of one.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    /// No rules and no recursion.
    pub skip: bool,
    /// Rules are skipped for the zero value.
    pub ignore_empty: bool,
    /// Standard rules in catalog order.
    pub standard: Vec<StandardRule>,
    /// Custom rules in declaration order.
    pub expressions: Vec<ExpressionRule>,
}

impl CompiledRules {
    pub fn skipped() -> Self {
        Self {
            skip: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.skip && self.standard.is_empty() && self.expressions.is_empty()
    }

    fn describe(&self, target: &str, out: &mut Vec<RuleSummary>) {
        for rule in &self.standard {
            out.push(RuleSummary {
                target: target.to_string(),
                id: rule.id.clone(),
                kind: RuleKind::Standard,
                detail: rule.message.clone(),
            });
        }
        for rule in &self.expressions {
            out.push(RuleSummary {
                target: target.to_string(),
                id: rule.id.clone(),
                kind: RuleKind::Expression,
                detail: rule.program.source().to_string(),
            });
        }
    }
}

/// Compiled rules of one field.
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub descriptor: FieldDescriptor,
    /// Rules on the field as a whole (the list or map for collections).
    pub rules: CompiledRules,
    /// Element rules of a repeated field.
    pub items: Option<CompiledRules>,
    /// Key rules of a map field.
    pub keys: Option<CompiledRules>,
    /// Value rules of a map field.
    pub values: Option<CompiledRules>,
}

/// A message-level rule.
#[derive(Debug, Clone)]
pub enum MessageRule {
    /// The field must be set.
    Required { field: String },
    /// At most one of the fields may be set; exactly one when `required`.
    Oneof { fields: Vec<String>, required: bool },
    Expression(ExpressionRule),
}

/// All rules of a message type, in evaluation order.
#[derive(Debug, Clone)]
pub struct CompiledMessage {
    pub type_name: String,
    pub message_rules: Vec<MessageRule>,
    pub fields: Vec<CompiledField>,
}

impl CompiledMessage {
    /// Whether any message rule needs the instance as an expression value.
    pub fn has_expressions(&self) -> bool {
        self.message_rules
            .iter()
            .any(|r| matches!(r, MessageRule::Expression(_)))
    }

    /// Lists every rule with its attachment point, in evaluation order.
    pub fn describe(&self) -> Vec<RuleSummary> {
        let mut out = Vec::new();
        for rule in &self.message_rules {
            out.push(match rule {
                MessageRule::Required { field } => RuleSummary {
                    target: field.clone(),
                    id: "required".to_string(),
                    kind: RuleKind::Presence,
                    detail: "value is required".to_string(),
                },
                MessageRule::Oneof { fields, required } => RuleSummary {
                    target: String::new(),
                    id: "message.oneof".to_string(),
                    kind: RuleKind::Presence,
                    detail: format!(
                        "{} of [{}]",
                        if *required { "exactly one" } else { "at most one" },
                        fields.join(", ")
                    ),
                },
                MessageRule::Expression(rule) => RuleSummary {
                    target: String::new(),
                    id: rule.id.clone(),
                    kind: RuleKind::Expression,
                    detail: rule.program.source().to_string(),
                },
            });
        }
        for field in &self.fields {
            if field.rules.skip {
                continue;
            }
            field.rules.describe(&field.name, &mut out);
            if let Some(items) = &field.items {
                items.describe(&format!("{}[]", field.name), &mut out);
            }
            if let Some(keys) = &field.keys {
                keys.describe(&format!("{}[key]", field.name), &mut out);
            }
            if let Some(values) = &field.values {
                values.describe(&format!("{}[value]", field.name), &mut out);
            }
        }
        out
    }

    /// Number of rules of every attachment point.
    pub fn rule_count(&self) -> usize {
        self.describe().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Presence,
    Standard,
    Expression,
}

/// One line of a rule listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    /// Field path relative to the message; empty for message rules
    pub target: String,
    pub id: String,
    pub kind: RuleKind,
    /// Violation message or expression source
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{compile_rule, Env, NoTypes, Type};

    fn ctx() -> RuleContext<'static> {
        RuleContext::new(Utc::now(), &NoTypes)
    }

    #[test]
    fn test_standard_rule() {
        let rule = StandardRule::new("int64.gt", "value must be greater than 5", |v, _| {
            matches!(v, Value::Int(i) if *i > 5)
        });
        assert!(rule.passes(&Value::Int(6), &ctx()));
        assert!(!rule.passes(&Value::Int(5), &ctx()));
        assert_eq!(rule.id(), "int64.gt");
        assert!(format!("{:?}", rule).contains("int64.gt"));
    }

    fn expression_rule(source: &str, message: &str) -> ExpressionRule {
        let env = Env::new(&NoTypes)
            .with_variable("this", Type::Int)
            .with_variable("now", Type::Timestamp);
        ExpressionRule {
            id: "check".into(),
            message: message.into(),
            program: compile_rule(source, &env).unwrap(),
        }
    }

    #[test]
    fn test_expression_rule_bool_result() {
        let rule = expression_rule("this > 1", "too small");
        assert_eq!(rule.evaluate(&Value::Int(2), &ctx()).unwrap(), None);
        assert_eq!(
            rule.evaluate(&Value::Int(1), &ctx()).unwrap(),
            Some("too small".to_string())
        );

        let unnamed = expression_rule("this > 1", "");
        assert_eq!(
            unnamed.evaluate(&Value::Int(0), &ctx()).unwrap(),
            Some("\"this > 1\" returned false".to_string())
        );
    }

    #[test]
    fn test_expression_rule_string_result() {
        let rule = expression_rule("this > 1 ? '' : 'need more than one'", "ignored");
        assert_eq!(rule.evaluate(&Value::Int(5), &ctx()).unwrap(), None);
        assert_eq!(
            rule.evaluate(&Value::Int(0), &ctx()).unwrap(),
            Some("need more than one".to_string())
        );
    }

    #[test]
    fn test_expression_rule_fault() {
        let rule = expression_rule("10 / this > 1", "");
        assert!(rule.evaluate(&Value::Int(0), &ctx()).is_err());
    }
}
