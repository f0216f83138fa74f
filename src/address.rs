//! Email address type with optional display name.

use crate::error::DeliveryError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Permissive address grammar: something, an `@`, a domain containing a dot.
/// No whitespace and exactly one `@`.
fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern is valid")
    })
}

/// Check an email address against the permissive grammar used for both
/// contact-form input and outgoing messages.
///
/// ```
/// use contact_relay::is_valid_email;
///
/// assert!(is_valid_email("jane@example.com"));
/// assert!(!is_valid_email("jane@example"));
/// assert!(!is_valid_email("jane doe@example.com"));
/// ```
pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

/// Lowercase a domain and convert it to ASCII.
///
/// Falls back to plain lowercasing when IDNA conversion fails.
pub fn normalize_domain(domain: &str) -> String {
    idna::domain_to_ascii(domain.trim()).unwrap_or_else(|_| domain.trim().to_lowercase())
}

/// An email address with an optional display name.
///
/// ```
/// use contact_relay::Address;
///
/// let addr: Address = ("Jane Doe", "jane@example.com").into();
/// assert_eq!(addr.formatted(), "\"Jane Doe\" <jane@example.com>");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Optional display name (e.g., "Phialo Design")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Email address (e.g., "info@phialo.de")
    pub email: String,
}

impl Address {
    /// Create a new address with just an email.
    ///
    /// No validation happens here; messages are validated as a whole by the
    /// delivery service before any provider sees them.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new address with a name and email.
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() { None } else { Some(name) },
            email: email.into(),
        }
    }

    /// Parse and validate an email address.
    ///
    /// ```
    /// use contact_relay::Address;
    ///
    /// assert!(Address::parse("user@example.com").is_ok());
    /// assert!(Address::parse("not-an-email").is_err());
    /// ```
    pub fn parse(email: &str) -> Result<Self, DeliveryError> {
        if !is_valid_email(email) {
            return Err(DeliveryError::InvalidAddress(format!(
                "'{}' is not a valid email address",
                email
            )));
        }
        Ok(Self::new(email))
    }

    /// Whether the address matches the permissive grammar.
    pub fn is_valid(&self) -> bool {
        is_valid_email(&self.email)
    }

    /// The raw domain part (after the last `@`).
    pub fn domain(&self) -> Option<&str> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !domain.is_empty())
    }

    /// Domain lowercased and converted to ASCII (Punycode for IDN).
    ///
    /// Used for allow/deny list comparisons so `Müller.de` and
    /// `xn--mller-kva.de` are treated as the same domain.
    pub fn normalized_domain(&self) -> Option<String> {
        self.domain().map(normalize_domain)
    }

    /// Format as `"Name" <email>` or just `email` if there is no name.
    ///
    /// Backslashes and double quotes in the name are escaped.
    pub fn formatted(&self) -> String {
        match &self.name {
            Some(name) if name.is_empty() => self.email.clone(),
            Some(name) => {
                // Escape backslashes first, then quotes
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\" <{}>", escaped, self.email)
            }
            None => self.email.clone(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

impl From<&str> for Address {
    fn from(email: &str) -> Self {
        Self::new(email)
    }
}

impl From<String> for Address {
    fn from(email: String) -> Self {
        Self::new(email)
    }
}

impl From<(&str, &str)> for Address {
    fn from((name, email): (&str, &str)) -> Self {
        Self::with_name(name, email)
    }
}

impl From<(String, String)> for Address {
    fn from((name, email): (String, String)) -> Self {
        Self::with_name(name, email)
    }
}

impl From<(&str, String)> for Address {
    fn from((name, email): (&str, String)) -> Self {
        Self::with_name(name, email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        let addr: Address = "test@example.com".into();
        assert_eq!(addr.email, "test@example.com");
        assert_eq!(addr.name, None);
    }

    #[test]
    fn test_from_tuple() {
        let addr: Address = ("Alice", "alice@example.com").into();
        assert_eq!(addr.email, "alice@example.com");
        assert_eq!(addr.name, Some("Alice".to_string()));
    }

    #[test]
    fn test_empty_name_becomes_none() {
        let addr = Address::with_name("", "alice@example.com");
        assert_eq!(addr.name, None);
        assert_eq!(addr.formatted(), "alice@example.com");
    }

    #[test]
    fn test_formatted() {
        let addr = Address::with_name("Alice", "alice@example.com");
        assert_eq!(addr.formatted(), "\"Alice\" <alice@example.com>");

        let addr = Address::with_name("Alice \"Ali\" Smith", "alice@example.com");
        assert_eq!(
            addr.formatted(),
            "\"Alice \\\"Ali\\\" Smith\" <alice@example.com>"
        );

        let addr = Address::new("alice@example.com");
        assert_eq!(addr.to_string(), "alice@example.com");
    }

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user+tag@mail.example.com"));
        assert!(is_valid_email("user.name@example.co.uk"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user @example.com"));
        assert!(!is_valid_email("user@localhost"));
    }

    #[test]
    fn test_parse() {
        assert!(Address::parse("user@example.com").is_ok());
        let err = Address::parse("nope").unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress(msg) if msg.contains("not a valid")));
    }

    #[test]
    fn test_domain() {
        assert_eq!(Address::new("a@Example.com").domain(), Some("Example.com"));
        assert_eq!(Address::new("no-at").domain(), None);
        assert_eq!(Address::new("trailing@").domain(), None);
    }

    #[test]
    fn test_normalized_domain() {
        let addr = Address::new("user@Example.COM");
        assert_eq!(addr.normalized_domain().as_deref(), Some("example.com"));

        let addr = Address::new("user@müller.de");
        assert_eq!(addr.normalized_domain().as_deref(), Some("xn--mller-kva.de"));
    }
}
