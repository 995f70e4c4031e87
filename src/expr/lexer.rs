//! Expression tokenizer

use super::error::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unsigned magnitude of an int literal; sign and range are applied by the parser.
    Int(u64),
    UInt(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Eof,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Int(v) | Token::UInt(v) => v.to_string(),
            Token::Double(v) => v.to_string(),
            Token::String(_) => "string literal".into(),
            Token::Bytes(_) => "bytes literal".into(),
            Token::Ident(name) => format!("'{}'", name),
            Token::Eof => "end of input".into(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::In => "in",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Question => "?",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::EqEq => "==",
            Token::Ne => "!=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            _ => "",
        }
    }
}

/// A token with the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Splits `source` into tokens, ending with `Token::Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    Lexer {
        src: source,
        bytes: source.as_bytes(),
        pos: 0,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Spanned>, ExpressionError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let offset = self.pos;
            let Some(&c) = self.bytes.get(self.pos) else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    offset,
                });
                return Ok(tokens);
            };

            let token = match c {
                b'0'..=b'9' => self.number()?,
                b'.' if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => self.number()?,
                b'"' | b'\'' => self.string_literal(false, false)?,
                b'r' | b'R' | b'b' | b'B' if self.is_literal_prefix() => self.prefixed_literal()?,
                c if c == b'_' || c.is_ascii_alphabetic() => self.ident(),
                _ => self.punct()?,
            };
            tokens.push(Spanned { token, offset });
        }
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(&c) = self.bytes.get(self.pos) {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else if c == b'/' && self.peek_at(1) == Some(b'/') {
                while let Some(&c) = self.bytes.get(self.pos) {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn is_literal_prefix(&self) -> bool {
        match (self.peek_at(1), self.peek_at(2)) {
            (Some(b'"' | b'\''), _) => true,
            (Some(b'r' | b'R' | b'b' | b'B'), Some(b'"' | b'\'')) => {
                let first = self.bytes[self.pos].to_ascii_lowercase();
                let second = self.bytes[self.pos + 1].to_ascii_lowercase();
                first != second
            }
            _ => false,
        }
    }

    fn prefixed_literal(&mut self) -> Result<Token, ExpressionError> {
        let mut raw = false;
        let mut bytes = false;
        while let Some(c) = self.bytes.get(self.pos).copied() {
            match c.to_ascii_lowercase() {
                b'r' => raw = true,
                b'b' => bytes = true,
                _ => break,
            }
            self.pos += 1;
        }
        self.string_literal(raw, bytes)
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while let Some(&c) = self.bytes.get(self.pos) {
            if c == b'_' || c.is_ascii_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        match &self.src[start..self.pos] {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            name => Token::Ident(name.to_string()),
        }
    }

    fn number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.pos;

        if self.bytes[self.pos] == b'0' && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.src[digits_start..self.pos];
            let value = u64::from_str_radix(digits, 16)
                .map_err(|_| ExpressionError::syntax(start, "invalid hex literal"))?;
            return Ok(self.int_suffix(value));
        }

        let mut is_double = false;
        while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.bytes.get(self.pos) == Some(&b'.')
            && self.peek_at(1).is_some_and(|b| b.is_ascii_digit())
        {
            is_double = true;
            self.pos += 1;
            while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.bytes.get(self.pos), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|b| b.is_ascii_digit()) {
                is_double = true;
                self.pos += ahead;
                while self.bytes.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text = &self.src[start..self.pos];
        if is_double {
            let value: f64 = text
                .parse()
                .map_err(|_| ExpressionError::syntax(start, "invalid double literal"))?;
            return Ok(Token::Double(value));
        }
        let value: u64 = text
            .parse()
            .map_err(|_| ExpressionError::syntax(start, "integer literal out of range"))?;
        Ok(self.int_suffix(value))
    }

    fn int_suffix(&mut self, value: u64) -> Token {
        if matches!(self.bytes.get(self.pos), Some(b'u' | b'U')) {
            self.pos += 1;
            Token::UInt(value)
        } else {
            Token::Int(value)
        }
    }

    fn string_literal(&mut self, raw: bool, bytes: bool) -> Result<Token, ExpressionError> {
        let start = self.pos;
        let quote = self.bytes[self.pos];
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(&c) = self.bytes.get(self.pos) else {
                return Err(ExpressionError::syntax(start, "unterminated string literal"));
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == b'\n' && !triple {
                return Err(ExpressionError::syntax(start, "newline in string literal"));
            }
            if c == b'\\' && !raw {
                self.escape(&mut out, bytes)?;
                continue;
            }
            out.push(c);
            self.pos += 1;
        }

        if bytes {
            return Ok(Token::Bytes(out));
        }
        String::from_utf8(out)
            .map(Token::String)
            .map_err(|_| ExpressionError::syntax(start, "string literal is not valid UTF-8"))
    }

    fn escape(&mut self, out: &mut Vec<u8>, bytes: bool) -> Result<(), ExpressionError> {
        let offset = self.pos;
        self.pos += 1;
        let Some(&c) = self.bytes.get(self.pos) else {
            return Err(ExpressionError::syntax(offset, "unterminated escape sequence"));
        };
        self.pos += 1;

        let simple = match c {
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0c),
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'v' => Some(0x0b),
            b'\\' | b'\'' | b'"' | b'`' | b'?' => Some(c),
            _ => None,
        };
        if let Some(b) = simple {
            out.push(b);
            return Ok(());
        }

        match c {
            b'x' | b'X' => {
                let value = self.hex_digits(2, offset)?;
                if bytes {
                    out.push(value as u8);
                } else {
                    push_char(out, value, offset)?;
                }
            }
            b'u' if !bytes => {
                let value = self.hex_digits(4, offset)?;
                push_char(out, value, offset)?;
            }
            b'U' if !bytes => {
                let value = self.hex_digits(8, offset)?;
                push_char(out, value, offset)?;
            }
            b'0'..=b'3' => {
                let rest = self
                    .src
                    .get(self.pos..self.pos + 2)
                    .ok_or_else(|| ExpressionError::syntax(offset, "invalid octal escape"))?;
                let digits = format!("{}{}", c as char, rest);
                let value = u32::from_str_radix(&digits, 8)
                    .map_err(|_| ExpressionError::syntax(offset, "invalid octal escape"))?;
                self.pos += 2;
                if bytes {
                    out.push(value as u8);
                } else {
                    push_char(out, value, offset)?;
                }
            }
            _ => return Err(ExpressionError::syntax(offset, "invalid escape sequence")),
        }
        Ok(())
    }

    fn hex_digits(&mut self, count: usize, offset: usize) -> Result<u32, ExpressionError> {
        let digits = self
            .src
            .get(self.pos..self.pos + count)
            .ok_or_else(|| ExpressionError::syntax(offset, "truncated escape sequence"))?;
        let value = u32::from_str_radix(digits, 16)
            .map_err(|_| ExpressionError::syntax(offset, "invalid hex escape"))?;
        self.pos += count;
        Ok(value)
    }

    fn punct(&mut self) -> Result<Token, ExpressionError> {
        let c = self.bytes[self.pos];
        let next = self.peek_at(1);
        let (token, len) = match (c, next) {
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'!', Some(b'=')) => (Token::Ne, 2),
            (b'&', Some(b'&')) => (Token::AndAnd, 2),
            (b'|', Some(b'|')) => (Token::OrOr, 2),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b'[', _) => (Token::LBracket, 1),
            (b']', _) => (Token::RBracket, 1),
            (b'{', _) => (Token::LBrace, 1),
            (b'}', _) => (Token::RBrace, 1),
            (b'.', _) => (Token::Dot, 1),
            (b',', _) => (Token::Comma, 1),
            (b':', _) => (Token::Colon, 1),
            (b'?', _) => (Token::Question, 1),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'%', _) => (Token::Percent, 1),
            (b'!', _) => (Token::Bang, 1),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            _ => {
                let ch = self.src[self.pos..].chars().next().unwrap_or('?');
                return Err(ExpressionError::syntax(
                    self.pos,
                    format!("unexpected character '{}'", ch),
                ));
            }
        };
        self.pos += len;
        Ok(token)
    }
}

fn push_char(out: &mut Vec<u8>, code: u32, offset: usize) -> Result<(), ExpressionError> {
    let ch = char::from_u32(code)
        .ok_or_else(|| ExpressionError::syntax(offset, "invalid unicode code point"))?;
    let mut buf = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_operators_and_idents() {
        assert_eq!(
            kinds("this.age >= 18 && !x"),
            vec![
                Token::Ident("this".into()),
                Token::Dot,
                Token::Ident("age".into()),
                Token::Ge,
                Token::Int(18),
                Token::AndAnd,
                Token::Bang,
                Token::Ident("x".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(
            kinds("1 2u 0x1F 1.5 1e3 .5"),
            vec![
                Token::Int(1),
                Token::UInt(2),
                Token::Int(31),
                Token::Double(1.5),
                Token::Double(1000.0),
                Token::Double(0.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            kinds(r#"'a\'b' "c\nd" r"\d+" b"\x00\xff" '''x'y'''"#),
            vec![
                Token::String("a'b".into()),
                Token::String("c\nd".into()),
                Token::String("\\d+".into()),
                Token::Bytes(vec![0x00, 0xff]),
                Token::String("x'y".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unicode_escape() {
        assert_eq!(
            kinds(r#""caf\u00e9""#),
            vec![Token::String("café".into()), Token::Eof]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("a // trailing comment\n + b"),
            vec![
                Token::Ident("a".into()),
                Token::Plus,
                Token::Ident("b".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            tokenize("'open"),
            Err(ExpressionError::Syntax { offset: 0, .. })
        ));
        assert!(matches!(
            tokenize("a # b"),
            Err(ExpressionError::Syntax { offset: 2, .. })
        ));
        assert!(tokenize("99999999999999999999").is_err());
    }

    #[test]
    fn test_identifier_starting_with_prefix_letter() {
        assert_eq!(
            kinds("bar rb"),
            vec![
                Token::Ident("bar".into()),
                Token::Ident("rb".into()),
                Token::Eof
            ]
        );
    }
}
