//! Rule registry
//!
//! Compiles the rules a schema attaches to a message type into a
//! [`CompiledMessage`]. Compilation checks everything that can be checked
//! statically: rule slots against field kinds, parameter values and
//! conflicts, rule ids, field references and expressions. Any failure is
//! fatal for the whole type.
//!
//! Nested message types are compiled separately, on their own, so recursive
//! types compile without looping.

use std::collections::HashSet;
use std::sync::Arc;

use super::compiled::{
    CompiledField, CompiledMessage, CompiledRules, ExpressionRule, MessageRule, StandardRule,
};
use super::model::{CustomRule, FieldRules, NumericRules};
use super::standard::{self, NumericParam};
use crate::expr::{compile_rule, Env, Type};
use crate::schema::{
    Cardinality, FieldDescriptor, FieldKind, MessageDescriptor, SchemaError, SchemaResult,
    SchemaSet,
};

/// Compiles rule metadata of a [`SchemaSet`].
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    schema: Arc<SchemaSet>,
}

impl RuleRegistry {
    pub fn new(schema: Arc<SchemaSet>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaSet {
        &self.schema
    }

    /// Compiles every rule of a message type.
    pub fn compile_message(&self, type_name: &str) -> SchemaResult<CompiledMessage> {
        let descriptor = self
            .schema
            .message(type_name)
            .ok_or_else(|| SchemaError::UnknownMessage(type_name.to_string()))?;

        let message_rules = self.compile_message_rules(descriptor)?;
        let fields = descriptor
            .fields
            .iter()
            .map(|field| self.compile_field(descriptor, field))
            .collect::<SchemaResult<Vec<_>>>()?;

        Ok(CompiledMessage {
            type_name: descriptor.name.clone(),
            message_rules,
            fields,
        })
    }

    fn compile_message_rules(&self, descriptor: &MessageDescriptor) -> SchemaResult<Vec<MessageRule>> {
        let target = descriptor.name.as_str();
        let rules = &descriptor.rules;
        let mut out = Vec::new();

        for field in &rules.required {
            self.check_field_exists(descriptor, field)?;
            out.push(MessageRule::Required { field: field.clone() });
        }

        for oneof in &rules.oneof {
            if oneof.fields.is_empty() {
                return Err(SchemaError::invalid_parameter(target, "oneof", "field list is empty"));
            }
            let mut seen = HashSet::new();
            for field in &oneof.fields {
                self.check_field_exists(descriptor, field)?;
                if !seen.insert(field.as_str()) {
                    return Err(SchemaError::invalid_parameter(
                        target,
                        "oneof",
                        format!("field '{}' is listed more than once", field),
                    ));
                }
            }
            out.push(MessageRule::Oneof {
                fields: oneof.fields.clone(),
                required: oneof.required,
            });
        }

        let this = Type::Message(descriptor.name.clone());
        for rule in self.compile_expressions(target, &rules.cel, this)? {
            out.push(MessageRule::Expression(rule));
        }

        Ok(out)
    }

    fn check_field_exists(&self, descriptor: &MessageDescriptor, field: &str) -> SchemaResult<()> {
        if descriptor.field(field).is_none() {
            return Err(SchemaError::UnknownField {
                target: descriptor.name.clone(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    fn compile_field(&self, message: &MessageDescriptor, field: &FieldDescriptor) -> SchemaResult<CompiledField> {
        let target = format!("{}.{}", message.name, field.name);
        let mut compiled = CompiledField {
            name: field.name.clone(),
            descriptor: field.clone(),
            rules: CompiledRules::default(),
            items: None,
            keys: None,
            values: None,
        };

        if field.rules.skip {
            compiled.rules = CompiledRules::skipped();
            return Ok(compiled);
        }

        match &field.cardinality {
            Cardinality::Singular => {
                compiled.rules = self.compile_rules(&target, &field.kind, &field.rules)?;
            }
            Cardinality::Repeated => {
                self.check_slots(&target, &field.rules, "repeated", "repeated")?;
                let mut whole = Vec::new();
                if let Some(repeated) = &field.rules.repeated {
                    whole = standard::repeated_rules(&target, repeated, is_scalar(&field.kind))?;
                    if let Some(items) = &repeated.items {
                        compiled.items =
                            Some(self.compile_rules(&format!("{}[]", target), &field.kind, items)?);
                    }
                }
                compiled.rules = CompiledRules {
                    skip: false,
                    ignore_empty: field.rules.ignore_empty,
                    standard: whole,
                    expressions: self.compile_expressions(&target, &field.rules.cel, field.field_type())?,
                };
            }
            Cardinality::Map { key } => {
                self.check_slots(&target, &field.rules, "map", "map")?;
                let mut whole = Vec::new();
                if let Some(map) = &field.rules.map {
                    whole = standard::map_rules(&target, map)?;
                    if let Some(keys) = &map.keys {
                        compiled.keys =
                            Some(self.compile_rules(&format!("{}[key]", target), &key.field_kind(), keys)?);
                    }
                    if let Some(values) = &map.values {
                        compiled.values =
                            Some(self.compile_rules(&format!("{}[value]", target), &field.kind, values)?);
                    }
                }
                compiled.rules = CompiledRules {
                    skip: false,
                    ignore_empty: field.rules.ignore_empty,
                    standard: whole,
                    expressions: self.compile_expressions(&target, &field.rules.cel, field.field_type())?,
                };
            }
        }

        Ok(compiled)
    }

    /// Compiles the rules of a single value of `kind`.
    fn compile_rules(&self, target: &str, kind: &FieldKind, rules: &FieldRules) -> SchemaResult<CompiledRules> {
        if rules.skip {
            return Ok(CompiledRules::skipped());
        }
        let slot = kind.name();
        self.check_slots(target, rules, slot, slot)?;

        let standard = match kind {
            FieldKind::Bool => rules.bool.as_ref().map(standard::bool_rules).unwrap_or_default(),
            FieldKind::Int32 => numeric(target, "int32", &rules.int32, false)?,
            FieldKind::Int64 => numeric(target, "int64", &rules.int64, false)?,
            FieldKind::Uint32 => numeric(target, "uint32", &rules.uint32, false)?,
            FieldKind::Uint64 => numeric(target, "uint64", &rules.uint64, false)?,
            FieldKind::Float => numeric(target, "float", &rules.float, true)?,
            FieldKind::Double => numeric(target, "double", &rules.double, true)?,
            FieldKind::String => match &rules.string {
                Some(r) => standard::string_rules(target, r)?,
                None => Vec::new(),
            },
            FieldKind::Bytes => match &rules.bytes {
                Some(r) => standard::bytes_rules(target, r)?,
                None => Vec::new(),
            },
            FieldKind::Enum { enum_name } => match &rules.enum_rules {
                Some(r) => {
                    let descriptor = self
                        .schema
                        .enum_type(enum_name)
                        .ok_or_else(|| SchemaError::UnknownEnum(enum_name.clone()))?;
                    standard::enum_rules(descriptor, r)
                }
                None => Vec::new(),
            },
            FieldKind::Message { message } => {
                if self.schema.message(message).is_none() {
                    return Err(SchemaError::UnknownMessage(message.clone()));
                }
                Vec::new()
            }
            FieldKind::Timestamp => match &rules.timestamp {
                Some(r) => standard::timestamp_rules(target, r)?,
                None => Vec::new(),
            },
            FieldKind::Duration => match &rules.duration {
                Some(r) => standard::duration_rules(target, r)?,
                None => Vec::new(),
            },
        };

        Ok(CompiledRules {
            skip: false,
            ignore_empty: rules.ignore_empty,
            standard,
            expressions: self.compile_expressions(target, &rules.cel, kind.value_type())?,
        })
    }

    /// Rejects every kind slot except `allowed`.
    fn check_slots(&self, target: &str, rules: &FieldRules, allowed: &str, kind: &str) -> SchemaResult<()> {
        match rules.kind_slots().into_iter().find(|slot| *slot != allowed) {
            Some(slot) => Err(SchemaError::RuleKindMismatch {
                target: target.to_string(),
                rules: slot.to_string(),
                kind: kind.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Compiles custom rules with `this` typed as `this_type`.
    fn compile_expressions(&self, target: &str, rules: &[CustomRule], this_type: Type) -> SchemaResult<Vec<ExpressionRule>> {
        let env = Env::new(self.schema.as_ref())
            .with_variable("this", this_type)
            .with_variable("now", Type::Timestamp);

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.id.trim().is_empty() {
                return Err(SchemaError::EmptyRuleId {
                    target: target.to_string(),
                });
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(SchemaError::DuplicateRuleId {
                    target: target.to_string(),
                    id: rule.id.clone(),
                });
            }
            let program = compile_rule(&rule.expression, &env).map_err(|source| SchemaError::Expression {
                target: target.to_string(),
                id: rule.id.clone(),
                source,
            })?;
            out.push(ExpressionRule {
                id: rule.id.clone(),
                message: rule.message.clone(),
                program,
            });
        }
        Ok(out)
    }
}

fn numeric<T: NumericParam>(
    target: &str,
    kind: &str,
    rules: &Option<NumericRules<T>>,
    floating: bool,
) -> SchemaResult<Vec<StandardRule>> {
    match rules {
        Some(r) => standard::numeric_rules(kind, target, r, floating),
        None => Ok(Vec::new()),
    }
}

/// Whether values of this kind can be checked for uniqueness.
fn is_scalar(kind: &FieldKind) -> bool {
    !matches!(kind, FieldKind::Message { .. })
}
