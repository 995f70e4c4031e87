//! Well-known string formats
//!
//! Shared by the standard rule library and the expression functions
//! (`isEmail`, `isHostname`, ...). All checks are pure.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// HTML5 "valid e-mail address" production.
const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is valid"))
}

/// Whether `s` is an email address (`local@domain`).
pub fn is_email(s: &str) -> bool {
    s.len() <= 254 && email_regex().is_match(s)
}

/// Whether `s` is a hostname per RFC 1034, with an optional trailing dot.
pub fn is_hostname(s: &str) -> bool {
    let s = s.strip_suffix('.').unwrap_or(s);
    if s.is_empty() || s.len() > 253 {
        return false;
    }

    let mut last = "";
    for label in s.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return false;
        }
        last = label;
    }

    // Top-level label must not be numeric
    !last.bytes().all(|b| b.is_ascii_digit())
}

/// Whether `s` is an IP address. `version` 0 accepts either family.
pub fn is_ip(s: &str, version: u8) -> bool {
    match version {
        0 => s.parse::<IpAddr>().is_ok(),
        4 => s.parse::<Ipv4Addr>().is_ok(),
        6 => s.parse::<Ipv6Addr>().is_ok(),
        _ => false,
    }
}

/// Whether `bytes` is a raw IP address (4 or 16 bytes).
pub fn is_ip_bytes(bytes: &[u8], version: u8) -> bool {
    match version {
        0 => bytes.len() == 4 || bytes.len() == 16,
        4 => bytes.len() == 4,
        6 => bytes.len() == 16,
        _ => false,
    }
}

fn has_forbidden_chars(s: &str) -> bool {
    s.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Whether `s` is an absolute URI.
pub fn is_uri(s: &str) -> bool {
    !s.is_empty() && !has_forbidden_chars(s) && Url::parse(s).is_ok()
}

/// Whether `s` is a URI or a relative reference. The empty string is a valid
/// relative reference.
pub fn is_uri_ref(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if has_forbidden_chars(s) {
        return false;
    }
    if Url::parse(s).is_ok() {
        return true;
    }
    match Url::parse("http://reference.invalid/") {
        Ok(base) => base.join(s).is_ok(),
        Err(_) => false,
    }
}

/// Whether `s` is a hyphenated UUID (8-4-4-4-12 hex digits).
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

/// Whether `s` is a hostname or an IP address.
pub fn is_address(s: &str) -> bool {
    is_hostname(s) || is_ip(s, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email() {
        assert!(is_email("alice@example.com"));
        assert!(is_email("first.last+tag@sub.example.org"));
        assert!(!is_email("alice"));
        assert!(!is_email("alice@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("alice@-example.com"));
        assert!(!is_email("Alice <alice@example.com>"));
    }

    #[test]
    fn test_hostname() {
        assert!(is_hostname("example.com"));
        assert!(is_hostname("example.com."));
        assert!(is_hostname("a-b.c"));
        assert!(!is_hostname(""));
        assert!(!is_hostname("-a.com"));
        assert!(!is_hostname("a..com"));
        assert!(!is_hostname("example.123"));
        assert!(!is_hostname("under_score.com"));
        assert!(!is_hostname(&"a".repeat(64)));
    }

    #[test]
    fn test_ip() {
        assert!(is_ip("127.0.0.1", 0));
        assert!(is_ip("::1", 0));
        assert!(is_ip("127.0.0.1", 4));
        assert!(!is_ip("::1", 4));
        assert!(is_ip("2001:db8::1", 6));
        assert!(!is_ip("256.0.0.1", 4));
        assert!(!is_ip("example.com", 0));
        assert!(!is_ip("127.0.0.1", 5));
    }

    #[test]
    fn test_ip_bytes() {
        assert!(is_ip_bytes(&[127, 0, 0, 1], 0));
        assert!(is_ip_bytes(&[0; 16], 6));
        assert!(!is_ip_bytes(&[0; 5], 0));
    }

    #[test]
    fn test_uri() {
        assert!(is_uri("https://example.com/path?q=1"));
        assert!(is_uri("urn:isbn:0451450523"));
        assert!(!is_uri("/relative/path"));
        assert!(!is_uri("https://exa mple.com"));
        assert!(!is_uri(""));
    }

    #[test]
    fn test_uri_ref() {
        assert!(is_uri_ref(""));
        assert!(is_uri_ref("/relative/path"));
        assert!(is_uri_ref("https://example.com"));
        assert!(!is_uri_ref("has space"));
    }

    #[test]
    fn test_uuid() {
        assert!(is_uuid("123e4567-e89b-12d3-a456-426614174000"));
        assert!(!is_uuid("123e4567e89b12d3a456426614174000"));
        assert!(!is_uuid("not-a-uuid"));
    }

    #[test]
    fn test_address() {
        assert!(is_address("example.com"));
        assert!(is_address("10.0.0.1"));
        assert!(!is_address("exa mple"));
    }
}
