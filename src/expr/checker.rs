//! Static checker
//!
//! Resolves identifiers, field selections and function overloads before an
//! expression is ever evaluated, so a rule with a typo fails at compile time
//! instead of on the first message that reaches it.

use std::collections::HashMap;

use regex::Regex;

use super::ast::{BinaryOp, Expr, Literal, Macro, UnaryOp};
use super::error::ExpressionError;
use super::types::{Type, TypeProvider};

/// Parameter class of a function overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    Any,
    Bool,
    Int,
    UInt,
    Double,
    String,
    Bytes,
    List,
    Map,
    Timestamp,
    Duration,
}

impl Param {
    fn accepts(self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Dyn) | (Param::Any, _) => true,
            (Param::Bool, Type::Bool)
            | (Param::Int, Type::Int)
            | (Param::UInt, Type::UInt)
            | (Param::Double, Type::Double)
            | (Param::String, Type::String)
            | (Param::Bytes, Type::Bytes)
            | (Param::List, Type::List(_))
            | (Param::Map, Type::Map(..))
            | (Param::Timestamp, Type::Timestamp)
            | (Param::Duration, Type::Duration) => true,
            _ => false,
        }
    }

    fn to_type(self) -> Type {
        match self {
            Param::Any => Type::Dyn,
            Param::Bool => Type::Bool,
            Param::Int => Type::Int,
            Param::UInt => Type::UInt,
            Param::Double => Type::Double,
            Param::String => Type::String,
            Param::Bytes => Type::Bytes,
            Param::List => Type::list(Type::Dyn),
            Param::Map => Type::map(Type::Dyn, Type::Dyn),
            Param::Timestamp => Type::Timestamp,
            Param::Duration => Type::Duration,
        }
    }
}

/// One function signature. For member overloads `params[0]` is the receiver.
struct Overload {
    function: &'static str,
    member: bool,
    params: &'static [Param],
    result: Param,
}

const fn global(function: &'static str, params: &'static [Param], result: Param) -> Overload {
    Overload {
        function,
        member: false,
        params,
        result,
    }
}

const fn member(function: &'static str, params: &'static [Param], result: Param) -> Overload {
    Overload {
        function,
        member: true,
        params,
        result,
    }
}

use Param as P;

static OVERLOADS: &[Overload] = &[
    global("size", &[P::String], P::Int),
    global("size", &[P::Bytes], P::Int),
    global("size", &[P::List], P::Int),
    global("size", &[P::Map], P::Int),
    member("size", &[P::String], P::Int),
    member("size", &[P::Bytes], P::Int),
    member("size", &[P::List], P::Int),
    member("size", &[P::Map], P::Int),
    member("contains", &[P::String, P::String], P::Bool),
    member("startsWith", &[P::String, P::String], P::Bool),
    member("endsWith", &[P::String, P::String], P::Bool),
    member("matches", &[P::String, P::String], P::Bool),
    global("matches", &[P::String, P::String], P::Bool),
    member("lowerAscii", &[P::String], P::String),
    member("upperAscii", &[P::String], P::String),
    member("trim", &[P::String], P::String),
    member("isEmail", &[P::String], P::Bool),
    member("isHostname", &[P::String], P::Bool),
    member("isIp", &[P::String], P::Bool),
    member("isIp", &[P::String, P::Int], P::Bool),
    member("isUri", &[P::String], P::Bool),
    member("isUriRef", &[P::String], P::Bool),
    member("isUuid", &[P::String], P::Bool),
    member("unique", &[P::List], P::Bool),
    member("getFullYear", &[P::Timestamp], P::Int),
    member("getFullYear", &[P::Timestamp, P::String], P::Int),
    member("getMonth", &[P::Timestamp], P::Int),
    member("getMonth", &[P::Timestamp, P::String], P::Int),
    member("getDate", &[P::Timestamp], P::Int),
    member("getDate", &[P::Timestamp, P::String], P::Int),
    member("getDayOfMonth", &[P::Timestamp], P::Int),
    member("getDayOfMonth", &[P::Timestamp, P::String], P::Int),
    member("getDayOfWeek", &[P::Timestamp], P::Int),
    member("getDayOfWeek", &[P::Timestamp, P::String], P::Int),
    member("getDayOfYear", &[P::Timestamp], P::Int),
    member("getDayOfYear", &[P::Timestamp, P::String], P::Int),
    member("getHours", &[P::Timestamp], P::Int),
    member("getHours", &[P::Timestamp, P::String], P::Int),
    member("getMinutes", &[P::Timestamp], P::Int),
    member("getMinutes", &[P::Timestamp, P::String], P::Int),
    member("getSeconds", &[P::Timestamp], P::Int),
    member("getSeconds", &[P::Timestamp, P::String], P::Int),
    member("getMilliseconds", &[P::Timestamp], P::Int),
    member("getMilliseconds", &[P::Timestamp, P::String], P::Int),
    member("getHours", &[P::Duration], P::Int),
    member("getMinutes", &[P::Duration], P::Int),
    member("getSeconds", &[P::Duration], P::Int),
    member("getMilliseconds", &[P::Duration], P::Int),
    global("int", &[P::Int], P::Int),
    global("int", &[P::UInt], P::Int),
    global("int", &[P::Double], P::Int),
    global("int", &[P::String], P::Int),
    global("int", &[P::Timestamp], P::Int),
    global("uint", &[P::Int], P::UInt),
    global("uint", &[P::UInt], P::UInt),
    global("uint", &[P::Double], P::UInt),
    global("uint", &[P::String], P::UInt),
    global("double", &[P::Int], P::Double),
    global("double", &[P::UInt], P::Double),
    global("double", &[P::Double], P::Double),
    global("double", &[P::String], P::Double),
    global("string", &[P::Bool], P::String),
    global("string", &[P::Int], P::String),
    global("string", &[P::UInt], P::String),
    global("string", &[P::Double], P::String),
    global("string", &[P::String], P::String),
    global("string", &[P::Bytes], P::String),
    global("string", &[P::Timestamp], P::String),
    global("string", &[P::Duration], P::String),
    global("bytes", &[P::String], P::Bytes),
    global("bytes", &[P::Bytes], P::Bytes),
    global("timestamp", &[P::String], P::Timestamp),
    global("timestamp", &[P::Int], P::Timestamp),
    global("timestamp", &[P::Timestamp], P::Timestamp),
    global("duration", &[P::String], P::Duration),
    global("duration", &[P::Duration], P::Duration),
    global("dyn", &[P::Any], P::Any),
];

/// Checks `expr` and returns its static type.
///
/// Literal patterns given to `matches` are compiled into `patterns`.
pub(crate) fn check(
    expr: &Expr,
    provider: &dyn TypeProvider,
    variables: &[(String, Type)],
    patterns: &mut HashMap<String, Regex>,
) -> Result<Type, ExpressionError> {
    let mut checker = Checker {
        provider,
        scopes: variables.to_vec(),
        patterns,
    };
    checker.check(expr)
}

struct Checker<'a> {
    provider: &'a dyn TypeProvider,
    /// Innermost binding last.
    scopes: Vec<(String, Type)>,
    patterns: &'a mut HashMap<String, Regex>,
}

impl Checker<'_> {
    fn check(&mut self, expr: &Expr) -> Result<Type, ExpressionError> {
        match expr {
            Expr::Literal(literal) => Ok(literal_type(literal)),
            Expr::Ident(name) => self
                .scopes
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, ty)| ty.clone())
                .ok_or_else(|| ExpressionError::UnboundIdentifier(name.clone())),
            Expr::Select { operand, field } => {
                let operand = self.check(operand)?;
                self.select(&operand, field)
            }
            Expr::Has { operand, field } => {
                let operand = self.check(operand)?;
                self.select(&operand, field)?;
                Ok(Type::Bool)
            }
            Expr::Index { operand, index } => {
                let operand = self.check(operand)?;
                let index = self.check(index)?;
                index_type(&operand, &index)
            }
            Expr::Call {
                function,
                target,
                args,
            } => self.call(function, target.as_deref(), args),
            Expr::Unary { op, operand } => {
                let operand = self.check(operand)?;
                unary_type(*op, &operand)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.check(lhs)?;
                let rhs = self.check(rhs)?;
                binary_type(*op, &lhs, &rhs)
            }
            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                let function = if matches!(expr, Expr::And(..)) {
                    "_&&_"
                } else {
                    "_||_"
                };
                let lhs = self.check(lhs)?;
                let rhs = self.check(rhs)?;
                if Type::Bool.accepts(&lhs) && Type::Bool.accepts(&rhs) {
                    Ok(Type::Bool)
                } else {
                    Err(no_overload(function, &[lhs, rhs]))
                }
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.check(condition)?;
                if !Type::Bool.accepts(&condition) {
                    return Err(ExpressionError::TypeMismatch(format!(
                        "conditional requires a bool condition, found {}",
                        condition
                    )));
                }
                let then = self.check(then)?;
                let otherwise = self.check(otherwise)?;
                Ok(then.join(&otherwise))
            }
            Expr::List(items) => {
                let mut element: Option<Type> = None;
                for item in items {
                    let ty = self.check(item)?;
                    element = Some(match element {
                        Some(prev) => prev.join(&ty),
                        None => ty,
                    });
                }
                Ok(Type::list(element.unwrap_or(Type::Dyn)))
            }
            Expr::Map(entries) => {
                let mut key_type: Option<Type> = None;
                let mut value_type: Option<Type> = None;
                for (key, value) in entries {
                    let k = self.check(key)?;
                    if !matches!(
                        k,
                        Type::Dyn | Type::Bool | Type::Int | Type::UInt | Type::String
                    ) {
                        return Err(ExpressionError::TypeMismatch(format!(
                            "unsupported map key type {}",
                            k
                        )));
                    }
                    let v = self.check(value)?;
                    key_type = Some(key_type.map_or(k.clone(), |prev| prev.join(&k)));
                    value_type = Some(value_type.map_or(v.clone(), |prev| prev.join(&v)));
                }
                Ok(Type::map(
                    key_type.unwrap_or(Type::Dyn),
                    value_type.unwrap_or(Type::Dyn),
                ))
            }
            Expr::Comprehension {
                kind,
                range,
                variable,
                body,
                filter,
            } => {
                let range = self.check(range)?;
                let element = match &range {
                    Type::List(element) => (**element).clone(),
                    Type::Map(key, _) => (**key).clone(),
                    Type::Dyn => Type::Dyn,
                    other => {
                        return Err(ExpressionError::TypeMismatch(format!(
                            "'{}' requires a list or map, found {}",
                            kind.name(),
                            other
                        )))
                    }
                };

                self.scopes.push((variable.clone(), element.clone()));
                let result = self.comprehension(*kind, body, filter.as_deref(), element);
                self.scopes.pop();
                result
            }
        }
    }

    fn comprehension(
        &mut self,
        kind: Macro,
        body: &Expr,
        filter: Option<&Expr>,
        element: Type,
    ) -> Result<Type, ExpressionError> {
        if let Some(filter) = filter {
            self.expect_bool(kind, filter)?;
        }
        match kind {
            Macro::All | Macro::Exists | Macro::ExistsOne => {
                self.expect_bool(kind, body)?;
                Ok(Type::Bool)
            }
            Macro::Filter => {
                self.expect_bool(kind, body)?;
                Ok(Type::list(element))
            }
            Macro::Map => Ok(Type::list(self.check(body)?)),
        }
    }

    fn expect_bool(&mut self, kind: Macro, expr: &Expr) -> Result<(), ExpressionError> {
        let ty = self.check(expr)?;
        if Type::Bool.accepts(&ty) {
            Ok(())
        } else {
            Err(ExpressionError::TypeMismatch(format!(
                "'{}' predicate must be bool, found {}",
                kind.name(),
                ty
            )))
        }
    }

    fn select(&self, operand: &Type, field: &str) -> Result<Type, ExpressionError> {
        match operand {
            Type::Message(name) => self.provider.field_type(name, field).ok_or_else(|| {
                ExpressionError::UndefinedField {
                    type_name: name.clone(),
                    field: field.to_string(),
                }
            }),
            Type::Map(key, value) if key.accepts(&Type::String) => Ok((**value).clone()),
            Type::Dyn => Ok(Type::Dyn),
            other => Err(ExpressionError::TypeMismatch(format!(
                "type {} does not support field selection",
                other
            ))),
        }
    }

    fn call(
        &mut self,
        function: &str,
        target: Option<&Expr>,
        args: &[Expr],
    ) -> Result<Type, ExpressionError> {
        let mut types = Vec::with_capacity(args.len() + 1);
        if let Some(target) = target {
            types.push(self.check(target)?);
        }
        for arg in args {
            types.push(self.check(arg)?);
        }

        if function == "matches" {
            if let Some(Expr::Literal(Literal::String(pattern))) = args.last() {
                self.compile_pattern(pattern)?;
            }
        }

        let is_member = target.is_some();
        let mut known = false;
        for overload in OVERLOADS.iter().filter(|o| o.function == function) {
            known = true;
            if overload.member != is_member || overload.params.len() != types.len() {
                continue;
            }
            if overload
                .params
                .iter()
                .zip(&types)
                .all(|(param, ty)| param.accepts(ty))
            {
                return Ok(overload.result.to_type());
            }
        }

        if known {
            Err(no_overload(function, &types))
        } else {
            Err(ExpressionError::UnknownFunction(function.to_string()))
        }
    }

    fn compile_pattern(&mut self, pattern: &str) -> Result<(), ExpressionError> {
        if self.patterns.contains_key(pattern) {
            return Ok(());
        }
        let regex = Regex::new(pattern).map_err(|e| ExpressionError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.patterns.insert(pattern.to_string(), regex);
        Ok(())
    }
}

fn literal_type(literal: &Literal) -> Type {
    match literal {
        Literal::Null => Type::Null,
        Literal::Bool(_) => Type::Bool,
        Literal::Int(_) => Type::Int,
        Literal::UInt(_) => Type::UInt,
        Literal::Double(_) => Type::Double,
        Literal::String(_) => Type::String,
        Literal::Bytes(_) => Type::Bytes,
    }
}

fn index_type(operand: &Type, index: &Type) -> Result<Type, ExpressionError> {
    match operand {
        Type::List(element) => {
            if matches!(index, Type::Int | Type::UInt | Type::Dyn) {
                Ok((**element).clone())
            } else {
                Err(no_overload("_[_]", &[operand.clone(), index.clone()]))
            }
        }
        Type::Map(key, value) => {
            if key.accepts(index) || (key.is_numeric() && index.is_numeric()) {
                Ok((**value).clone())
            } else {
                Err(no_overload("_[_]", &[operand.clone(), index.clone()]))
            }
        }
        Type::Dyn => Ok(Type::Dyn),
        other => Err(ExpressionError::TypeMismatch(format!(
            "type {} does not support indexing",
            other
        ))),
    }
}

fn unary_type(op: UnaryOp, operand: &Type) -> Result<Type, ExpressionError> {
    match (op, operand) {
        (UnaryOp::Not, Type::Bool) => Ok(Type::Bool),
        (UnaryOp::Negate, Type::Int) => Ok(Type::Int),
        (UnaryOp::Negate, Type::Double) => Ok(Type::Double),
        (UnaryOp::Not, Type::Dyn) => Ok(Type::Bool),
        (UnaryOp::Negate, Type::Dyn) => Ok(Type::Dyn),
        (UnaryOp::Not, other) => Err(no_overload("!_", &[other.clone()])),
        (UnaryOp::Negate, other) => Err(no_overload("-_", &[other.clone()])),
    }
}

fn comparable(lhs: &Type, rhs: &Type) -> bool {
    if lhs.is_dyn() || rhs.is_dyn() {
        return true;
    }
    if lhs.is_numeric() && rhs.is_numeric() {
        return true;
    }
    matches!(
        (lhs, rhs),
        (Type::Bool, Type::Bool)
            | (Type::String, Type::String)
            | (Type::Bytes, Type::Bytes)
            | (Type::Timestamp, Type::Timestamp)
            | (Type::Duration, Type::Duration)
    )
}

fn binary_type(op: BinaryOp, lhs: &Type, rhs: &Type) -> Result<Type, ExpressionError> {
    let fail = || Err(no_overload(op.name(), &[lhs.clone(), rhs.clone()]));
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            if lhs.accepts(rhs)
                || (lhs.is_numeric() && rhs.is_numeric())
                || matches!(lhs, Type::Null)
                || matches!(rhs, Type::Null)
            {
                Ok(Type::Bool)
            } else {
                fail()
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if comparable(lhs, rhs) {
                Ok(Type::Bool)
            } else {
                fail()
            }
        }
        BinaryOp::In => match rhs {
            Type::List(element) if element.accepts(lhs) || (element.is_numeric() && lhs.is_numeric()) => {
                Ok(Type::Bool)
            }
            Type::Map(key, _) if key.accepts(lhs) || (key.is_numeric() && lhs.is_numeric()) => {
                Ok(Type::Bool)
            }
            Type::Dyn => Ok(Type::Bool),
            _ => fail(),
        },
        BinaryOp::Add => match (lhs, rhs) {
            (Type::Dyn, other) | (other, Type::Dyn) => Ok(match other {
                Type::Int | Type::UInt | Type::Double | Type::String | Type::Bytes => other.clone(),
                _ => Type::Dyn,
            }),
            (Type::Int, Type::Int) => Ok(Type::Int),
            (Type::UInt, Type::UInt) => Ok(Type::UInt),
            (Type::Double, Type::Double) => Ok(Type::Double),
            (Type::String, Type::String) => Ok(Type::String),
            (Type::Bytes, Type::Bytes) => Ok(Type::Bytes),
            (Type::List(a), Type::List(b)) => Ok(Type::list(a.join(b))),
            (Type::Timestamp, Type::Duration) | (Type::Duration, Type::Timestamp) => {
                Ok(Type::Timestamp)
            }
            (Type::Duration, Type::Duration) => Ok(Type::Duration),
            _ => fail(),
        },
        BinaryOp::Sub => match (lhs, rhs) {
            (Type::Dyn, _) | (_, Type::Dyn) => Ok(Type::Dyn),
            (Type::Int, Type::Int) => Ok(Type::Int),
            (Type::UInt, Type::UInt) => Ok(Type::UInt),
            (Type::Double, Type::Double) => Ok(Type::Double),
            (Type::Timestamp, Type::Timestamp) => Ok(Type::Duration),
            (Type::Timestamp, Type::Duration) => Ok(Type::Timestamp),
            (Type::Duration, Type::Duration) => Ok(Type::Duration),
            _ => fail(),
        },
        BinaryOp::Mul | BinaryOp::Div => match (lhs, rhs) {
            (Type::Dyn, other) | (other, Type::Dyn) if other.is_numeric() || other.is_dyn() => {
                Ok(other.clone())
            }
            (Type::Int, Type::Int) => Ok(Type::Int),
            (Type::UInt, Type::UInt) => Ok(Type::UInt),
            (Type::Double, Type::Double) => Ok(Type::Double),
            _ => fail(),
        },
        BinaryOp::Rem => match (lhs, rhs) {
            (Type::Dyn, other) | (other, Type::Dyn)
                if matches!(other, Type::Int | Type::UInt | Type::Dyn) =>
            {
                Ok(other.clone())
            }
            (Type::Int, Type::Int) => Ok(Type::Int),
            (Type::UInt, Type::UInt) => Ok(Type::UInt),
            _ => fail(),
        },
    }
}

fn no_overload(function: &str, args: &[Type]) -> ExpressionError {
    ExpressionError::NoMatchingOverload {
        function: function.to_string(),
        args: args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use crate::expr::types::NoTypes;
    use crate::value::Value;

    struct Users;

    impl TypeProvider for Users {
        fn field_type(&self, message: &str, field: &str) -> Option<Type> {
            match (message, field) {
                ("acme.User", "name") => Some(Type::String),
                ("acme.User", "age") => Some(Type::Int),
                ("acme.User", "tags") => Some(Type::list(Type::String)),
                ("acme.User", "settings") => Some(Type::map(Type::String, Type::Int)),
                ("acme.User", "created") => Some(Type::Timestamp),
                _ => None,
            }
        }

        fn default_value(&self, _message: &str, _field: &str) -> Option<Value> {
            None
        }
    }

    fn check_with(source: &str, provider: &dyn TypeProvider) -> Result<Type, ExpressionError> {
        let expr = parse(source)?;
        let vars = vec![
            ("this".to_string(), Type::Message("acme.User".into())),
            ("now".to_string(), Type::Timestamp),
        ];
        let mut patterns = HashMap::new();
        check(&expr, provider, &vars, &mut patterns)
    }

    fn check_user(source: &str) -> Result<Type, ExpressionError> {
        check_with(source, &Users)
    }

    #[test]
    fn test_field_types() {
        assert_eq!(check_user("this.name").unwrap(), Type::String);
        assert_eq!(check_user("this.age + 1").unwrap(), Type::Int);
        assert_eq!(check_user("this.tags[0]").unwrap(), Type::String);
        assert_eq!(check_user("this.settings['a']").unwrap(), Type::Int);
        assert_eq!(check_user("this.created < now").unwrap(), Type::Bool);
    }

    #[test]
    fn test_unbound_and_undefined() {
        assert_eq!(
            check_user("that.name"),
            Err(ExpressionError::UnboundIdentifier("that".into()))
        );
        assert_eq!(
            check_user("this.nmae == 'x'"),
            Err(ExpressionError::UndefinedField {
                type_name: "acme.User".into(),
                field: "nmae".into()
            })
        );
        assert!(matches!(
            check_with("this.name", &NoTypes),
            Err(ExpressionError::UndefinedField { .. })
        ));
    }

    #[test]
    fn test_overload_resolution() {
        assert_eq!(check_user("this.name.startsWith('a')").unwrap(), Type::Bool);
        assert_eq!(check_user("size(this.tags)").unwrap(), Type::Int);
        assert!(matches!(
            check_user("this.age.startsWith('a')"),
            Err(ExpressionError::NoMatchingOverload { .. })
        ));
        assert_eq!(
            check_user("this.name.frobnicate()"),
            Err(ExpressionError::UnknownFunction("frobnicate".into()))
        );
        assert!(check_user("this.name + 1").is_err());
        assert!(check_user("this.age > 1.5").is_ok());
    }

    #[test]
    fn test_comprehension_scoping() {
        assert_eq!(check_user("this.tags.all(t, size(t) > 0)").unwrap(), Type::Bool);
        assert_eq!(check_user("this.tags.map(t, size(t))").unwrap(), Type::list(Type::Int));
        assert_eq!(
            check_user("this.settings.filter(k, k.startsWith('x'))").unwrap(),
            Type::list(Type::String)
        );
        assert!(check_user("this.tags.all(t, t)").is_err());
        // The variable is not visible outside its macro
        assert!(check_user("this.tags.all(t, true) && t == ''").is_err());
    }

    #[test]
    fn test_literal_patterns_are_compiled() {
        let expr = parse("this.name.matches('^[a-z]+$')").unwrap();
        let vars = vec![("this".to_string(), Type::Message("acme.User".into()))];
        let mut patterns = HashMap::new();
        check(&expr, &Users, &vars, &mut patterns).unwrap();
        assert!(patterns.contains_key("^[a-z]+$"));

        assert!(matches!(
            check_user("this.name.matches('(')"),
            Err(ExpressionError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_dyn_defers_checks() {
        assert_eq!(check_user("dyn(this.age) + 1").unwrap(), Type::Int);
        assert_eq!(check_user("dyn(this).anything").unwrap(), Type::Dyn);
    }
}
