//! JSON line I/O for the CLI
//!
//! - Input: one JSON value per stdin line; blank lines are ignored
//! - Output: one JSON response per stdout line
//! - UTF-8 only
//!
//! A line that is not JSON is a per-line failure, answered and skipped. A
//! read failure ends input.

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

use super::errors::CliResult;

/// One non-blank input line: the parsed value, or why it is not JSON
pub type Request = Result<Value, serde_json::Error>;

/// Read JSON values from stdin, one per non-blank line
pub fn read_requests() -> impl Iterator<Item = io::Result<Request>> {
    parse_lines(io::stdin().lock())
}

/// Parse JSON values from a reader, one per non-blank line
pub fn parse_lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<Request>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(Ok(serde_json::from_str(&line))),
        Err(e) => Some(Err(e)),
    })
}

/// Success envelope
pub fn ok_response(data: Value) -> Value {
    json!({
        "status": "ok",
        "data": data
    })
}

/// Error envelope
pub fn error_response(code: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "code": code,
        "message": message
    })
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&ok_response(data))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&error_response(code, message))
}

/// Write one JSON value as a line to stdout
pub fn write_line(value: &Value) -> CliResult<()> {
    write_line_to(&mut io::stdout().lock(), value)
}

/// Write one JSON value as a line
pub fn write_line_to<W: Write>(writer: &mut W, value: &Value) -> CliResult<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines_skips_blanks() {
        let input = "{\"a\":1}\n\n   \n[2]\nnot json\n";
        let parsed: Vec<_> = parse_lines(input.as_bytes()).map(|r| r.unwrap()).collect();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].as_ref().unwrap(), &json!({"a": 1}));
        assert_eq!(parsed[1].as_ref().unwrap(), &json!([2]));
        assert!(parsed[2].is_err());
    }

    #[test]
    fn test_bad_line_does_not_end_input() {
        let input = "{\"a\":1}\n{not json\n{\"b\":2}\n";
        let parsed: Vec<_> = parse_lines(io::Cursor::new(input)).collect();
        assert_eq!(parsed.len(), 3);
        assert!(parsed.iter().all(|r| r.is_ok()));
        assert!(parsed[1].as_ref().unwrap().is_err());
        assert_eq!(parsed[2].as_ref().unwrap().as_ref().unwrap(), &json!({"b": 2}));
    }

    #[test]
    fn test_envelopes() {
        assert_eq!(ok_response(json!(1)), json!({"status": "ok", "data": 1}));
        assert_eq!(
            error_response("X", "bad"),
            json!({"status": "error", "code": "X", "message": "bad"})
        );
    }

    #[test]
    fn test_write_line_to() {
        let mut out = Vec::new();
        write_line_to(&mut out, &json!({"a": 1})).unwrap();
        write_line_to(&mut out, &json!([2])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"a\":1}\n[2]\n");
    }
}
