//! Static types of the expression language

use std::fmt;

use crate::value::Value;

/// Static type assigned by the checker.
///
/// `Dyn` is the type of values only known at runtime; every operation accepts
/// it and defers the check to evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Dyn,
    Null,
    Bool,
    Int,
    UInt,
    Double,
    String,
    Bytes,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Message(String),
    Timestamp,
    Duration,
}

impl Type {
    pub fn list(element: Type) -> Type {
        Type::List(Box::new(element))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn is_dyn(&self) -> bool {
        matches!(self, Type::Dyn)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::UInt | Type::Double)
    }

    /// Whether a value of type `other` can flow where `self` is expected.
    pub fn accepts(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Dyn, _) | (_, Type::Dyn) => true,
            (Type::List(a), Type::List(b)) => a.accepts(b),
            (Type::Map(ak, av), Type::Map(bk, bv)) => ak.accepts(bk) && av.accepts(bv),
            (Type::Null, Type::Message(_)) | (Type::Message(_), Type::Null) => true,
            _ => self == other,
        }
    }

    /// Least common type of two branches.
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Type::Null, t @ Type::Message(_)) | (t @ Type::Message(_), Type::Null) => t.clone(),
            (Type::List(a), Type::List(b)) => Type::list(a.join(b)),
            (Type::Map(ak, av), Type::Map(bk, bv)) => Type::map(ak.join(bk), av.join(bv)),
            _ => Type::Dyn,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dyn => f.write_str("dyn"),
            Type::Null => f.write_str("null_type"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::UInt => f.write_str("uint"),
            Type::Double => f.write_str("double"),
            Type::String => f.write_str("string"),
            Type::Bytes => f.write_str("bytes"),
            Type::List(element) => write!(f, "list({})", element),
            Type::Map(key, value) => write!(f, "map({}, {})", key, value),
            Type::Message(name) => f.write_str(name),
            Type::Timestamp => f.write_str("google.protobuf.Timestamp"),
            Type::Duration => f.write_str("google.protobuf.Duration"),
        }
    }
}

/// Message field information available to the checker and evaluator.
pub trait TypeProvider: Send + Sync {
    /// Static type of `field` on `message`, or `None` if undeclared.
    fn field_type(&self, message: &str, field: &str) -> Option<Type>;

    /// Value observed when selecting an unset `field` on `message`.
    fn default_value(&self, message: &str, field: &str) -> Option<Value>;
}

/// Provider with no message types.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTypes;

impl TypeProvider for NoTypes {
    fn field_type(&self, _message: &str, _field: &str) -> Option<Type> {
        None
    }

    fn default_value(&self, _message: &str, _field: &str) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Type::map(Type::String, Type::list(Type::Int)).to_string(), "map(string, list(int))");
        assert_eq!(Type::Message("acme.User".into()).to_string(), "acme.User");
    }

    #[test]
    fn test_accepts_and_join() {
        assert!(Type::Int.accepts(&Type::Dyn));
        assert!(!Type::Int.accepts(&Type::UInt));
        assert!(Type::list(Type::Dyn).accepts(&Type::list(Type::String)));
        assert_eq!(Type::Int.join(&Type::Int), Type::Int);
        assert_eq!(Type::Int.join(&Type::String), Type::Dyn);
        assert_eq!(
            Type::Null.join(&Type::Message("m".into())),
            Type::Message("m".into())
        );
    }
}
