//! Canonical email message with builder pattern.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::address::Address;

/// A provider-independent email message.
///
/// ```
/// use contact_relay::EmailMessage;
///
/// let message = EmailMessage::new()
///     .from(("Phialo Website", "noreply@phialo.de"))
///     .to(("Phialo Design", "info@phialo.de"))
///     .reply_to(("Jane Doe", "jane@example.com"))
///     .subject("New Contact Request: Hi")
///     .text("Hello")
///     .tag("contact-form");
/// ```
///
/// Every address must be well-formed, `to` must not be empty and at least one
/// of `text`/`html` must be present; [`EmailMessage::validate`] checks this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Sender address
    pub from: Option<Address>,
    /// Primary recipients
    pub to: Vec<Address>,
    /// Carbon copy recipients
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients
    pub bcc: Vec<Address>,
    /// Reply-to address
    pub reply_to: Option<Address>,
    /// Subject line
    pub subject: String,
    /// Plain text body
    pub text: Option<String>,
    /// HTML body
    pub html: Option<String>,
    /// Custom email headers
    pub headers: HashMap<String, String>,
    /// Free-form tags, mapped to provider categories/tags
    pub tags: Vec<String>,
    /// Metadata, mapped to provider custom arguments
    pub metadata: HashMap<String, serde_json::Value>,
}

impl EmailMessage {
    /// Create a new empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn from(mut self, addr: impl Into<Address>) -> Self {
        self.from = Some(addr.into());
        self
    }

    /// Add a recipient.
    pub fn to(mut self, addr: impl Into<Address>) -> Self {
        self.to.push(addr.into());
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, addr: impl Into<Address>) -> Self {
        self.cc.push(addr.into());
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, addr: impl Into<Address>) -> Self {
        self.bcc.push(addr.into());
        self
    }

    /// Set the reply-to address.
    pub fn reply_to(mut self, addr: impl Into<Address>) -> Self {
        self.reply_to = Some(addr.into());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    /// Set the HTML body.
    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    /// Add a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// All recipient addresses: to, cc and bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }

    /// Structural validation.
    ///
    /// Returns a human readable reason for the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.to.is_empty() {
            return Err("Email must have at least one recipient".into());
        }

        let from = match &self.from {
            Some(from) if !from.email.is_empty() => from,
            _ => return Err("Email must have a valid sender".into()),
        };

        if self.subject.is_empty() {
            return Err("Email must have a subject".into());
        }

        if self.text.is_none() && self.html.is_none() {
            return Err("Email must have either text or HTML content".into());
        }

        let invalid = std::iter::once(from)
            .chain(self.recipients())
            .chain(self.reply_to.iter())
            .find(|address| !address.is_valid());
        if let Some(address) = invalid {
            return Err(format!("Invalid email address: {}", address.email));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> EmailMessage {
        EmailMessage::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject("Hello")
            .text("Hi")
    }

    #[test]
    fn test_valid_message() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_requires_recipient() {
        let mut message = valid();
        message.to.clear();
        assert_eq!(
            message.validate().unwrap_err(),
            "Email must have at least one recipient"
        );
    }

    #[test]
    fn test_requires_sender() {
        let mut message = valid();
        message.from = None;
        assert!(message.validate().unwrap_err().contains("sender"));
    }

    #[test]
    fn test_requires_body() {
        let mut message = valid();
        message.text = None;
        assert!(message.validate().unwrap_err().contains("text or HTML"));

        let message = message.html("<p>Hi</p>");
        assert!(message.validate().is_ok());
    }

    #[test]
    fn test_rejects_malformed_cc() {
        let message = valid().cc("broken");
        assert_eq!(message.validate().unwrap_err(), "Invalid email address: broken");
    }

    #[test]
    fn test_recipients_iterates_all_lists() {
        let message = valid().cc("cc@example.com").bcc("bcc@example.com");
        let emails: Vec<_> = message.recipients().map(|a| a.email.as_str()).collect();
        assert_eq!(
            emails,
            vec!["recipient@example.com", "cc@example.com", "bcc@example.com"]
        );
    }
}
