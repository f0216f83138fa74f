//! Testing utilities and assertion helpers.
//!
//! Assertions over the messages captured by a [`LocalProvider`]. "Last email"
//! means the most recently captured one.
//!
//! # Example
//!
//! ```rust,ignore
//! use contact_relay::providers::LocalProvider;
//! use contact_relay::testing::*;
//!
//! #[tokio::test]
//! async fn test_contact_flow() {
//!     let provider = LocalProvider::new();
//!
//!     // ... process a contact-form batch ...
//!
//!     assert_email_sent(&provider);
//!     assert_email_to(&provider, "info@phialo.de");
//!     assert_email_subject_contains(&provider, "Neue Kontaktanfrage");
//!     refute_email_to(&provider, "attacker@example.com");
//!
//!     // Regex matching
//!     assert_email_subject_matches(&provider, r"^Ihre Nachricht");
//!     assert_email_html_matches(&provider, r"<strong>.*</strong>");
//! }
//! ```

use regex::Regex;

use crate::email::EmailMessage;
use crate::providers::{CapturedEmail, LocalProvider};

// ============================================================================
// Helper Functions
// ============================================================================

/// Format a list of emails for error messages.
fn format_email_summary(emails: &[CapturedEmail]) -> String {
    if emails.is_empty() {
        return "  (no emails sent)".to_string();
    }

    emails
        .iter()
        .enumerate()
        .map(|(i, captured)| {
            let m = &captured.message;
            let to = m
                .to
                .iter()
                .map(|a| a.email.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let from = m
                .from
                .as_ref()
                .map(|a| a.email.as_str())
                .unwrap_or("<none>");
            format!(
                "  {}. To: [{}], From: {}, Subject: \"{}\"",
                i + 1,
                to,
                from,
                m.subject
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_email(provider: &LocalProvider) -> CapturedEmail {
    provider
        .last_email()
        .expect("Expected at least one email to be sent, but none were sent")
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(500);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn sent_to(message: &EmailMessage, email: &str) -> bool {
    message.to.iter().any(|a| a.email.eq_ignore_ascii_case(email))
}

// ============================================================================
// Basic Assertions
// ============================================================================

/// Assert that at least one email was sent.
///
/// # Panics
///
/// Panics if no emails were sent.
pub fn assert_email_sent(provider: &LocalProvider) {
    assert!(
        provider.has_emails(),
        "Expected at least one email to be sent, but none were sent"
    );
}

/// Assert that no emails were sent.
pub fn assert_no_emails_sent(provider: &LocalProvider) {
    let emails = provider.emails();
    assert!(
        emails.is_empty(),
        "Expected no emails to be sent, but {} were sent.\n\nEmails sent:\n{}",
        emails.len(),
        format_email_summary(&emails)
    );
}

/// Assert that exactly N emails were sent.
pub fn assert_email_count(provider: &LocalProvider, expected: usize) {
    let actual = provider.email_count();
    assert!(
        actual == expected,
        "Expected {} email(s) to be sent, but {} were sent.\n\nEmails sent:\n{}",
        expected,
        actual,
        format_email_summary(&provider.emails())
    );
}

/// Assert that an email was sent to a specific address.
pub fn assert_email_to(provider: &LocalProvider, email: &str) {
    let emails = provider.emails();
    assert!(
        emails.iter().any(|captured| sent_to(&captured.message, email)),
        "Expected an email to be sent to '{}'.\n\nEmails sent:\n{}",
        email,
        format_email_summary(&emails)
    );
}

/// Assert that no email was sent to a specific address.
///
/// # Panics
///
/// Panics if an email was sent to the address.
pub fn assert_no_emails_to(provider: &LocalProvider, email: &str) {
    let emails = provider.emails();
    if let Some(found) = emails.iter().find(|captured| sent_to(&captured.message, email)) {
        panic!(
            "Expected no email to be sent to '{}', but found one.\n\nMatching email:\n  Subject: \"{}\"\n\nAll emails:\n{}",
            email,
            found.message.subject,
            format_email_summary(&emails)
        );
    }
}

/// Assert that an email with subject containing text was sent.
pub fn assert_email_subject_contains(provider: &LocalProvider, text: &str) {
    let emails = provider.emails();
    assert!(
        emails.iter().any(|captured| captured.message.subject.contains(text)),
        "Expected an email with subject containing '{}'.\n\nEmails sent:\n{}",
        text,
        format_email_summary(&emails)
    );
}

/// Assert that an email matching a predicate was sent.
pub fn assert_email_matches<F>(provider: &LocalProvider, predicate: F)
where
    F: Fn(&EmailMessage) -> bool,
{
    assert!(
        !provider.find_emails(predicate).is_empty(),
        "Expected an email matching the predicate, but none was found.\n\nEmails sent:\n{}",
        format_email_summary(&provider.emails())
    );
}

/// Get all emails sent to a specific address.
pub fn get_emails_to(provider: &LocalProvider, email: &str) -> Vec<CapturedEmail> {
    provider.find_emails(|m| sent_to(m, email))
}

/// Assert the last email replies to a specific address.
///
/// # Panics
///
/// Panics if no email was sent or its reply-to differs.
pub fn assert_email_reply_to(provider: &LocalProvider, email: &str) {
    let last = last_email(provider);
    let actual = last
        .message
        .reply_to
        .as_ref()
        .map(|a| a.email.as_str())
        .unwrap_or("<none>");

    assert!(
        actual.eq_ignore_ascii_case(email),
        "Expected last email to reply to '{}', but reply-to was '{}'.\n\nLast email:\n{}",
        email,
        actual,
        format_email_summary(&[last.clone()])
    );
}

/// Assert the last email carries a tag.
pub fn assert_email_tagged(provider: &LocalProvider, tag: &str) {
    let last = last_email(provider);
    assert!(
        last.message.tags.iter().any(|t| t == tag),
        "Expected last email to be tagged '{}', but tags were {:?}.",
        tag,
        last.message.tags
    );
}

/// Assert the last email has HTML body containing text.
pub fn assert_email_html_contains(provider: &LocalProvider, text: &str) {
    let last = last_email(provider);
    let html = last.message.html.as_deref().unwrap_or("");

    assert!(
        html.contains(text),
        "Expected HTML body to contain '{}', but it didn't.\n\nLast email:\n{}\n\nHTML body (first 500 chars):\n{}",
        text,
        format_email_summary(&[last.clone()]),
        preview(html)
    );
}

/// Assert the last email has text body containing text.
pub fn assert_email_text_contains(provider: &LocalProvider, text: &str) {
    let last = last_email(provider);
    let body = last.message.text.as_deref().unwrap_or("");

    assert!(
        body.contains(text),
        "Expected text body to contain '{}', but it didn't.\n\nLast email:\n{}\n\nText body (first 500 chars):\n{}",
        text,
        format_email_summary(&[last.clone()]),
        preview(body)
    );
}

// ============================================================================
// Regex Matching
// ============================================================================

/// Assert the last email subject matches a regex pattern.
///
/// # Panics
///
/// Panics if no email was sent or subject doesn't match.
pub fn assert_email_subject_matches(provider: &LocalProvider, pattern: &str) {
    let last = last_email(provider);
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(&last.message.subject),
        "Expected subject to match pattern '{}', but was '{}'.",
        pattern,
        last.message.subject
    );
}

/// Assert the last email HTML body matches a regex pattern.
pub fn assert_email_html_matches(provider: &LocalProvider, pattern: &str) {
    let last = last_email(provider);
    let html = last.message.html.as_deref().unwrap_or("");
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(html),
        "Expected HTML body to match pattern '{}', but it didn't.\n\nHTML body (first 500 chars):\n{}",
        pattern,
        preview(html)
    );
}

/// Assert the last email text body matches a regex pattern.
pub fn assert_email_text_matches(provider: &LocalProvider, pattern: &str) {
    let last = last_email(provider);
    let text = last.message.text.as_deref().unwrap_or("");
    let re = Regex::new(pattern).expect("Invalid regex pattern");

    assert!(
        re.is_match(text),
        "Expected text body to match pattern '{}', but it didn't.\n\nText body (first 500 chars):\n{}",
        pattern,
        preview(text)
    );
}

// ============================================================================
// Refute Assertions
// ============================================================================

/// Refute that any email was sent (alias for assert_no_emails_sent).
pub fn refute_email_sent(provider: &LocalProvider) {
    assert_no_emails_sent(provider);
}

/// Refute that an email was sent to a specific address (alias for assert_no_emails_to).
pub fn refute_email_to(provider: &LocalProvider, email: &str) {
    assert_no_emails_to(provider, email);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::EmailProvider;

    #[tokio::test]
    async fn test_assertions() {
        let provider = LocalProvider::new();

        provider
            .send(
                &EmailMessage::new()
                    .from("noreply@phialo.de")
                    .to("info@phialo.de")
                    .reply_to("jane@example.com")
                    .subject("Neue Kontaktanfrage: Ring")
                    .html("<p><strong>Jane</strong></p>")
                    .text("Jane")
                    .tag("contact-form"),
            )
            .await
            .unwrap();

        assert_email_sent(&provider);
        assert_email_count(&provider, 1);
        assert_email_to(&provider, "INFO@phialo.de");
        assert_email_reply_to(&provider, "jane@example.com");
        assert_email_tagged(&provider, "contact-form");
        assert_email_subject_contains(&provider, "Kontaktanfrage");
        assert_email_subject_matches(&provider, r"^Neue .*: Ring$");
        assert_email_html_contains(&provider, "<strong>Jane</strong>");
        assert_email_html_matches(&provider, r"<strong>\w+</strong>");
        assert_email_text_contains(&provider, "Jane");
        assert_email_text_matches(&provider, r"^Jane$");
        assert_email_matches(&provider, |m| m.tags.len() == 1);
        assert_eq!(get_emails_to(&provider, "info@phialo.de").len(), 1);
        refute_email_to(&provider, "other@example.com");
    }

    #[test]
    #[should_panic(expected = "Expected at least one email")]
    fn test_assert_sent_fails_when_empty() {
        assert_email_sent(&LocalProvider::new());
    }

    #[tokio::test]
    #[should_panic(expected = "Expected no emails")]
    async fn test_refute_sent_fails_when_sent() {
        let provider = LocalProvider::new();
        provider
            .send(
                &EmailMessage::new()
                    .from("a@example.com")
                    .to("b@example.com")
                    .subject("Test")
                    .text("x"),
            )
            .await
            .unwrap();
        refute_email_sent(&provider);
    }
}
