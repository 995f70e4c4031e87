//! Tree-walking evaluator
//!
//! Values reachable from the bindings through identifiers, field selections
//! and indexes are borrowed rather than cloned; only the leaf an operator
//! actually consumes is copied.

use std::collections::HashMap;

use regex::Regex;

use super::ast::{Expr, Literal, Macro};
use super::error::{EvalError, EvalResult};
use super::functions;
use super::types::TypeProvider;
use crate::value::{MapKey, Value};

/// Variable bindings visible to an expression.
pub(crate) enum Scope<'s> {
    Root(&'s [(&'s str, &'s Value)]),
    Local {
        name: &'s str,
        value: &'s Value,
        parent: &'s Scope<'s>,
    },
}

impl<'s> Scope<'s> {
    fn lookup(&self, name: &str) -> Option<&'s Value> {
        match *self {
            Scope::Root(bindings) => bindings
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, value)| *value),
            Scope::Local {
                name: local,
                value,
                parent,
            } => {
                if local == name {
                    Some(value)
                } else {
                    parent.lookup(name)
                }
            }
        }
    }
}

pub(crate) struct Evaluator<'p> {
    pub provider: &'p dyn TypeProvider,
    pub patterns: &'p HashMap<String, Regex>,
}

impl Evaluator<'_> {
    pub fn eval(&self, expr: &Expr, scope: &Scope<'_>) -> EvalResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Ident(name) => scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| EvalError::new(format!("no such attribute '{}'", name))),
            Expr::Select { operand, field } => {
                self.with_operand(operand, scope, |value| self.select(value, field))
            }
            Expr::Has { operand, field } => {
                self.with_operand(operand, scope, |value| has_field(value, field))
            }
            Expr::Index { operand, index } => {
                let index = self.eval(index, scope)?;
                self.with_operand(operand, scope, |value| index_value(value, &index).cloned())
            }
            Expr::Call {
                function,
                target,
                args,
            } => self.call(function, target.as_deref(), args, scope),
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand, scope)?;
                functions::unary(*op, &operand)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, scope)?;
                self.with_operand(rhs, scope, |rhs| functions::binary(*op, &lhs, rhs))
            }
            Expr::And(lhs, rhs) => self.logical(lhs, rhs, scope, false),
            Expr::Or(lhs, rhs) => self.logical(lhs, rhs, scope, true),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => match self.eval(condition, scope)? {
                Value::Bool(true) => self.eval(then, scope),
                Value::Bool(false) => self.eval(otherwise, scope),
                other => Err(EvalError::no_overload("_?_:_", &[other.type_name()])),
            },
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item, scope))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::List),
            Expr::Map(entries) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    let key = self.eval(key, scope)?;
                    let key = MapKey::from_value(&key).ok_or_else(|| {
                        EvalError::new(format!("unsupported map key type {}", key.type_name()))
                    })?;
                    let value = self.eval(value, scope)?;
                    if map.insert(key.clone(), value).is_some() {
                        return Err(EvalError::new(format!("duplicate map key {}", key)));
                    }
                }
                Ok(Value::Map(map))
            }
            Expr::Comprehension {
                kind,
                range,
                variable,
                body,
                filter,
            } => self.with_operand(range, scope, |range| {
                self.comprehension(*kind, range, variable, body, filter.as_deref(), scope)
            }),
        }
    }

    /// Runs `f` on the operand's value, borrowing it from the bindings when
    /// the operand is a plain reference path.
    fn with_operand<R>(
        &self,
        operand: &Expr,
        scope: &Scope<'_>,
        f: impl FnOnce(&Value) -> EvalResult<R>,
    ) -> EvalResult<R> {
        match self.resolve(operand, scope) {
            Some(value) => f(value),
            None => {
                let value = self.eval(operand, scope)?;
                f(&value)
            }
        }
    }

    /// Borrows the value at an identifier/select/index path, if it is set.
    fn resolve<'v>(&self, expr: &Expr, scope: &Scope<'v>) -> Option<&'v Value> {
        match expr {
            Expr::Ident(name) => scope.lookup(name),
            Expr::Select { operand, field } => match self.resolve(operand, scope)? {
                Value::Message(message) if message.has(field) => message.get(field),
                Value::Map(entries) => entries.get(&MapKey::String(field.clone())),
                _ => None,
            },
            Expr::Index { operand, index } => {
                let container = self.resolve(operand, scope)?;
                let index = self.eval(index, scope).ok()?;
                index_value(container, &index).ok()
            }
            _ => None,
        }
    }

    fn select(&self, value: &Value, field: &str) -> EvalResult<Value> {
        match value {
            Value::Message(message) => {
                if let Some(found) = message.get(field) {
                    if !matches!(found, Value::Null) {
                        return Ok(found.clone());
                    }
                }
                self.provider
                    .default_value(message.type_name(), field)
                    .ok_or_else(|| {
                        EvalError::new(format!(
                            "no such field '{}' on type '{}'",
                            field,
                            message.type_name()
                        ))
                    })
            }
            Value::Map(entries) => entries
                .get(&MapKey::String(field.to_string()))
                .cloned()
                .ok_or_else(|| EvalError::new(format!("no such key: \"{}\"", field))),
            other => Err(EvalError::new(format!(
                "type {} does not support field selection",
                other.type_name()
            ))),
        }
    }

    fn call(
        &self,
        function: &str,
        target: Option<&Expr>,
        args: &[Expr],
        scope: &Scope<'_>,
    ) -> EvalResult<Value> {
        let (receiver, rest) = match (target, args.split_first()) {
            (Some(target), _) => (target, args),
            (None, Some((first, rest))) => (first, rest),
            (None, None) => return Err(EvalError::no_overload(function, &[])),
        };
        let rest = rest
            .iter()
            .map(|arg| self.eval(arg, scope))
            .collect::<EvalResult<Vec<_>>>()?;
        self.with_operand(receiver, scope, |receiver| {
            functions::call(function, receiver, &rest, self.patterns)
        })
    }

    /// `&&` and `||`: a deciding operand wins over an error on the other side.
    fn logical(&self, lhs: &Expr, rhs: &Expr, scope: &Scope<'_>, decisive: bool) -> EvalResult<Value> {
        let function = if decisive { "_||_" } else { "_&&_" };
        let left = self.eval(lhs, scope);
        if let Ok(Value::Bool(b)) = left {
            if b == decisive {
                return Ok(Value::Bool(decisive));
            }
        }
        let right = self.eval(rhs, scope);
        if let Ok(Value::Bool(b)) = right {
            if b == decisive {
                return Ok(Value::Bool(decisive));
            }
        }
        match (left, right) {
            (Ok(Value::Bool(_)), Ok(Value::Bool(_))) => Ok(Value::Bool(!decisive)),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(l), Ok(r)) => Err(EvalError::no_overload(function, &[l.type_name(), r.type_name()])),
        }
    }

    fn comprehension(
        &self,
        kind: Macro,
        range: &Value,
        variable: &str,
        body: &Expr,
        filter: Option<&Expr>,
        scope: &Scope<'_>,
    ) -> EvalResult<Value> {
        let keys;
        let items: &[Value] = match range {
            Value::List(items) => items,
            Value::Map(entries) => {
                keys = entries.keys().map(MapKey::to_value).collect::<Vec<_>>();
                &keys
            }
            other => {
                return Err(EvalError::no_overload(kind.name(), &[other.type_name()]));
            }
        };

        let mut deferred: Option<EvalError> = None;
        let mut matched = 0usize;
        let mut collected = Vec::new();

        for item in items {
            let local = Scope::Local {
                name: variable,
                value: item,
                parent: scope,
            };
            match kind {
                Macro::All | Macro::Exists => {
                    let decisive = kind == Macro::Exists;
                    match self.eval(body, &local) {
                        Ok(Value::Bool(b)) if b == decisive => return Ok(Value::Bool(decisive)),
                        Ok(Value::Bool(_)) => {}
                        Ok(other) => {
                            deferred.get_or_insert(predicate_error(kind, &other));
                        }
                        Err(e) => {
                            deferred.get_or_insert(e);
                        }
                    }
                }
                Macro::ExistsOne => {
                    if self.predicate(kind, body, &local)? {
                        matched += 1;
                    }
                }
                Macro::Filter => {
                    if self.predicate(kind, body, &local)? {
                        collected.push(item.clone());
                    }
                }
                Macro::Map => {
                    let keep = match filter {
                        Some(filter) => self.predicate(kind, filter, &local)?,
                        None => true,
                    };
                    if keep {
                        collected.push(self.eval(body, &local)?);
                    }
                }
            }
        }

        match kind {
            Macro::All | Macro::Exists => match deferred {
                Some(e) => Err(e),
                None => Ok(Value::Bool(kind == Macro::All)),
            },
            Macro::ExistsOne => Ok(Value::Bool(matched == 1)),
            Macro::Filter | Macro::Map => Ok(Value::List(collected)),
        }
    }

    fn predicate(&self, kind: Macro, expr: &Expr, scope: &Scope<'_>) -> EvalResult<bool> {
        match self.eval(expr, scope)? {
            Value::Bool(b) => Ok(b),
            other => Err(predicate_error(kind, &other)),
        }
    }
}

fn predicate_error(kind: Macro, value: &Value) -> EvalError {
    EvalError::new(format!(
        "'{}' predicate returned {}, expected bool",
        kind.name(),
        value.type_name()
    ))
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::UInt(u) => Value::UInt(*u),
        Literal::Double(d) => Value::Double(*d),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Bytes(b) => Value::Bytes(b.clone()),
    }
}

fn has_field(value: &Value, field: &str) -> EvalResult<Value> {
    match value {
        Value::Message(message) => Ok(Value::Bool(message.has(field))),
        Value::Map(entries) => Ok(Value::Bool(
            entries.contains_key(&MapKey::String(field.to_string())),
        )),
        other => Err(EvalError::new(format!(
            "has() does not support type {}",
            other.type_name()
        ))),
    }
}

fn index_value<'v>(container: &'v Value, index: &Value) -> EvalResult<&'v Value> {
    match container {
        Value::List(items) => {
            let position = match index {
                Value::Int(i) => usize::try_from(*i).ok(),
                Value::UInt(u) => usize::try_from(*u).ok(),
                Value::Double(d) if d.fract() == 0.0 && *d >= 0.0 => Some(*d as usize),
                other => {
                    return Err(EvalError::no_overload(
                        "_[_]",
                        &[container.type_name(), other.type_name()],
                    ))
                }
            };
            position
                .and_then(|p| items.get(p))
                .ok_or_else(|| EvalError::new(format!("index out of range: {}", display_index(index))))
        }
        Value::Map(entries) => functions::map_lookup(entries, index).ok_or_else(|| {
            let key = MapKey::from_value(index)
                .map(|k| k.to_string())
                .unwrap_or_else(|| index.type_name().to_string());
            EvalError::new(format!("no such key: {}", key))
        }),
        other => Err(EvalError::no_overload(
            "_[_]",
            &[other.type_name(), index.type_name()],
        )),
    }
}

fn display_index(index: &Value) -> String {
    match index {
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Double(d) => d.to_string(),
        other => other.type_name().to_string(),
    }
}
