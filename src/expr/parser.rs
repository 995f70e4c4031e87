//! Recursive descent parser
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, relations (`< <= > >= == != in`),
//! `+ -`, `* / %`, unary `! -`, member access and calls.

use super::ast::{BinaryOp, Expr, Literal, Macro, UnaryOp};
use super::error::ExpressionError;
use super::lexer::{tokenize, Spanned, Token};

/// Nesting limit guarding the recursive descent against deep inputs.
const MAX_DEPTH: usize = 128;

/// Parses an expression.
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    if !parser.at(&Token::Eof) {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExpressionError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(ExpressionError::syntax(
                self.offset(),
                format!("expected {}, found {}", token.describe(), self.peek().describe()),
            ))
        }
    }

    fn unexpected(&self) -> ExpressionError {
        ExpressionError::syntax(
            self.offset(),
            format!("unexpected {}", self.peek().describe()),
        )
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::syntax(
                self.offset(),
                "expression nests too deeply",
            ));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let condition = self.or()?;
        let result = if self.eat(&Token::Question) {
            let then = self.or()?;
            self.expect(Token::Colon)?;
            let otherwise = self.expr()?;
            Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            condition
        };
        self.depth -= 1;
        Ok(result)
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.relation()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.relation()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.addition()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::EqEq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::In => BinaryOp::In,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.addition()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn addition(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.multiplication()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplication()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplication(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Token::Bang => {
                self.advance();
                self.enter()?;
                let operand = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                let offset = self.offset();
                self.advance();
                // Fold negative literals so i64::MIN is expressible
                if let Token::Int(magnitude) = *self.peek() {
                    if !self.next_is_member_access() {
                        self.advance();
                        return negative_int(magnitude, offset).map(Expr::Literal);
                    }
                }
                self.enter()?;
                let operand = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(operand),
                })
            }
            _ => self.member(),
        }
    }

    fn next_is_member_access(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|s| &s.token),
            Some(Token::Dot) | Some(Token::LBracket)
        )
    }

    fn member(&mut self) -> Result<Expr, ExpressionError> {
        let mut operand = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let offset = self.offset();
                    let name = match self.advance() {
                        Token::Ident(name) => name,
                        other => {
                            return Err(ExpressionError::syntax(
                                offset,
                                format!("expected field name, found {}", other.describe()),
                            ))
                        }
                    };
                    if self.eat(&Token::LParen) {
                        let args = self.arguments(Token::RParen)?;
                        operand = member_call(operand, name, args, offset)?;
                    } else {
                        operand = Expr::Select {
                            operand: Box::new(operand),
                            field: name,
                        };
                    }
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expr()?;
                    self.expect(Token::RBracket)?;
                    operand = Expr::Index {
                        operand: Box::new(operand),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(operand),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Token::Int(magnitude) => {
                let value = i64::try_from(magnitude)
                    .map_err(|_| ExpressionError::syntax(offset, "integer literal out of range"))?;
                Ok(Expr::Literal(Literal::Int(value)))
            }
            Token::UInt(value) => Ok(Expr::Literal(Literal::UInt(value))),
            Token::Double(value) => Ok(Expr::Literal(Literal::Double(value))),
            Token::String(value) => Ok(Expr::Literal(Literal::String(value))),
            Token::Bytes(value) => Ok(Expr::Literal(Literal::Bytes(value))),
            Token::True => Ok(Expr::Literal(Literal::Bool(true))),
            Token::False => Ok(Expr::Literal(Literal::Bool(false))),
            Token::Null => Ok(Expr::Literal(Literal::Null)),
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments(Token::RParen)?;
                    global_call(name, args, offset)
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let items = self.arguments(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::LBrace => self.map_literal(),
            other => Err(ExpressionError::syntax(
                offset,
                format!("unexpected {}", other.describe()),
            )),
        }
    }

    /// Comma separated expressions up to `close`; a trailing comma is allowed.
    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>, ExpressionError> {
        let mut args = Vec::new();
        if self.eat(&close) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::Comma) {
                if self.eat(&close) {
                    return Ok(args);
                }
                continue;
            }
            self.expect(close)?;
            return Ok(args);
        }
    }

    fn map_literal(&mut self) -> Result<Expr, ExpressionError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = self.expr()?;
            self.expect(Token::Colon)?;
            let value = self.expr()?;
            entries.push((key, value));
            if self.eat(&Token::Comma) {
                if self.eat(&Token::RBrace) {
                    return Ok(Expr::Map(entries));
                }
                continue;
            }
            self.expect(Token::RBrace)?;
            return Ok(Expr::Map(entries));
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn negative_int(magnitude: u64, offset: usize) -> Result<Literal, ExpressionError> {
    if magnitude == i64::MIN.unsigned_abs() {
        return Ok(Literal::Int(i64::MIN));
    }
    i64::try_from(magnitude)
        .map(|v| Literal::Int(-v))
        .map_err(|_| ExpressionError::syntax(offset, "integer literal out of range"))
}

fn global_call(name: String, mut args: Vec<Expr>, offset: usize) -> Result<Expr, ExpressionError> {
    if name == "has" {
        if args.len() != 1 {
            return Err(ExpressionError::syntax(offset, "has() takes exactly one argument"));
        }
        return match args.pop() {
            Some(Expr::Select { operand, field }) => Ok(Expr::Has { operand, field }),
            _ => Err(ExpressionError::syntax(
                offset,
                "has() argument must be a field selection",
            )),
        };
    }
    Ok(Expr::Call {
        function: name,
        target: None,
        args,
    })
}

fn member_call(
    target: Expr,
    name: String,
    mut args: Vec<Expr>,
    offset: usize,
) -> Result<Expr, ExpressionError> {
    let Some(kind) = Macro::from_name(&name) else {
        return Ok(Expr::Call {
            function: name,
            target: Some(Box::new(target)),
            args,
        });
    };

    let arity_ok = match kind {
        Macro::Map => args.len() == 2 || args.len() == 3,
        _ => args.len() == 2,
    };
    if !arity_ok {
        return Err(ExpressionError::syntax(
            offset,
            format!("wrong number of arguments to macro '{}'", kind.name()),
        ));
    }

    let variable = match args.remove(0) {
        Expr::Ident(name) => name,
        _ => {
            return Err(ExpressionError::syntax(
                offset,
                format!("argument 1 of '{}' must be a simple name", kind.name()),
            ))
        }
    };

    let (filter, body) = if args.len() == 2 {
        let body = args.pop();
        let filter = args.pop();
        (filter, body)
    } else {
        (None, args.pop())
    };
    let Some(body) = body else {
        return Err(ExpressionError::syntax(offset, "missing macro body"));
    };

    Ok(Expr::Comprehension {
        kind,
        range: Box::new(target),
        variable,
        body: Box::new(body),
        filter: filter.map(Box::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    fn int(v: i64) -> Box<Expr> {
        Box::new(Expr::Literal(Literal::Int(v)))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a + b * 2 > 3 && c").unwrap();
        let expected = Expr::And(
            Box::new(Expr::Binary {
                op: BinaryOp::Gt,
                lhs: Box::new(Expr::Binary {
                    op: BinaryOp::Add,
                    lhs: ident("a"),
                    rhs: Box::new(Expr::Binary {
                        op: BinaryOp::Mul,
                        lhs: ident("b"),
                        rhs: int(2),
                    }),
                }),
                rhs: int(3),
            }),
            ident("c"),
        );
        assert_eq!(expr, expected);
    }

    #[test]
    fn test_conditional_is_right_associative() {
        let expr = parse("a ? 1 : b ? 2 : 3").unwrap();
        match expr {
            Expr::Conditional { otherwise, .. } => {
                assert!(matches!(*otherwise, Expr::Conditional { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_member_and_calls() {
        let expr = parse("this.name.startsWith('a')").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                function: "startsWith".into(),
                target: Some(Box::new(Expr::Select {
                    operand: ident("this"),
                    field: "name".into(),
                })),
                args: vec![Expr::Literal(Literal::String("a".into()))],
            }
        );
    }

    #[test]
    fn test_has_macro() {
        let expr = parse("has(this.email)").unwrap();
        assert_eq!(
            expr,
            Expr::Has {
                operand: ident("this"),
                field: "email".into()
            }
        );
        assert!(parse("has(email)").is_err());
        assert!(parse("has(this.a, this.b)").is_err());
    }

    #[test]
    fn test_comprehension_macros() {
        let expr = parse("this.items.all(i, i.qty > 0)").unwrap();
        match expr {
            Expr::Comprehension {
                kind,
                variable,
                filter,
                ..
            } => {
                assert_eq!(kind, Macro::All);
                assert_eq!(variable, "i");
                assert!(filter.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }

        let expr = parse("[1, 2, 3].map(x, x > 1, x * 2)").unwrap();
        assert!(matches!(
            expr,
            Expr::Comprehension {
                kind: Macro::Map,
                filter: Some(_),
                ..
            }
        ));

        assert!(parse("this.items.all(1, true)").is_err());
        assert!(parse("this.items.exists(x)").is_err());
    }

    #[test]
    fn test_negative_literals() {
        assert_eq!(
            parse("-9223372036854775808").unwrap(),
            Expr::Literal(Literal::Int(i64::MIN))
        );
        assert!(parse("9223372036854775808").is_err());
        assert_eq!(
            parse("--1").unwrap(),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(Expr::Literal(Literal::Int(-1)))
            }
        );
    }

    #[test]
    fn test_collection_literals() {
        assert_eq!(
            parse("[1, 2,]").unwrap(),
            Expr::List(vec![
                Expr::Literal(Literal::Int(1)),
                Expr::Literal(Literal::Int(2))
            ])
        );
        assert!(matches!(parse("{'a': 1, 'b': 2}").unwrap(), Expr::Map(e) if e.len() == 2));
        assert!(matches!(parse("{}").unwrap(), Expr::Map(e) if e.is_empty()));
    }

    #[test]
    fn test_index_and_in() {
        let expr = parse("'timeout' in this.settings && this.tags[0] == 'x'").unwrap();
        assert!(matches!(expr, Expr::And(..)));
    }

    #[test]
    fn test_syntax_errors_report_offset() {
        match parse("this.age >") {
            Err(ExpressionError::Syntax { offset, .. }) => assert_eq!(offset, 10),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("this.").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(parse(&deep).is_err());
    }
}
