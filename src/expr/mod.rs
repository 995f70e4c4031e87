//! Expression language
//!
//! A subset of CEL used by custom rules. Expressions are parsed and checked
//! once against the schema, then evaluated any number of times:
//!
//! ```text
//! source --lexer--> tokens --parser--> Expr --checker--> Program
//! Program + bindings {this, now} --evaluator--> Value
//! ```
//!
//! Evaluation is pure: no I/O, no clock, no mutation of the bindings.

mod ast;
mod checker;
mod error;
mod eval;
mod functions;
mod lexer;
mod parser;
mod types;

use std::collections::HashMap;

use regex::Regex;

pub use ast::{BinaryOp, Expr, Literal, Macro, UnaryOp};
pub use error::{EvalError, EvalResult, ExpressionError};
pub use functions::{compare, equals};
pub use parser::parse;
pub use types::{NoTypes, Type, TypeProvider};

use crate::value::Value;

/// Compilation environment: declared variables and message type information.
pub struct Env<'a> {
    provider: &'a dyn TypeProvider,
    variables: Vec<(String, Type)>,
}

impl<'a> Env<'a> {
    pub fn new(provider: &'a dyn TypeProvider) -> Self {
        Self {
            provider,
            variables: Vec::new(),
        }
    }

    /// Declares a variable. A later declaration shadows an earlier one.
    pub fn with_variable(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.variables.push((name.into(), ty));
        self
    }
}

/// A checked expression ready for evaluation.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    expr: Expr,
    result_type: Type,
    patterns: HashMap<String, Regex>,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Static result type.
    pub fn result_type(&self) -> &Type {
        &self.result_type
    }

    /// Evaluates the program with the given variable bindings.
    pub fn evaluate(
        &self,
        bindings: &[(&str, &Value)],
        provider: &dyn TypeProvider,
    ) -> EvalResult<Value> {
        let evaluator = eval::Evaluator {
            provider,
            patterns: &self.patterns,
        };
        evaluator.eval(&self.expr, &eval::Scope::Root(bindings))
    }
}

/// Parses and checks an expression.
pub fn compile(source: &str, env: &Env<'_>) -> Result<Program, ExpressionError> {
    let expr = parse(source)?;
    let mut patterns = HashMap::new();
    let result_type = checker::check(&expr, env.provider, &env.variables, &mut patterns)?;
    Ok(Program {
        source: source.to_string(),
        expr,
        result_type,
        patterns,
    })
}

/// Compiles a rule expression, which must produce a `bool` or a `string`.
pub fn compile_rule(source: &str, env: &Env<'_>) -> Result<Program, ExpressionError> {
    let program = compile(source, env)?;
    match program.result_type() {
        Type::Bool | Type::String | Type::Dyn => Ok(program),
        other => Err(ExpressionError::InvalidResultType(other.to_string())),
    }
}
