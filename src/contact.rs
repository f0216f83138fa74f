//! Contact form submission types.
//!
//! A [`ContactSubmission`] is built by the ingress handler from untrusted input
//! and travels through the queue as the payload of a `contact-form` envelope.
//! The wire form is camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported languages. Anything unrecognised falls back to German.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    De,
    En,
}

impl Locale {
    /// Lenient parse used on client input.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().eq_ignore_ascii_case("en") {
            Locale::En
        } else {
            Locale::De
        }
    }

    /// Short language tag (`de` / `en`).
    pub fn as_str(self) -> &'static str {
        match self {
            Locale::De => "de",
            Locale::En => "en",
        }
    }

    /// Response text returned to the browser once the submission is queued.
    pub fn acknowledgement(self) -> &'static str {
        match self {
            Locale::De => {
                "Ihre Nachricht wurde erfolgreich empfangen und wird in Kürze bearbeitet."
            }
            Locale::En => "Your message has been received and will be processed shortly.",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request context captured when the submission was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl SubmissionMetadata {
    /// Metadata with only a capture time.
    pub fn captured_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            ip_address: None,
            user_agent: None,
            referrer: None,
            timestamp,
            country: None,
        }
    }
}

/// A sanitised contact form submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub language: Locale,
    /// Whether the submitter asked for a confirmation copy.
    #[serde(default = "default_send_copy")]
    pub send_copy: bool,
    pub metadata: SubmissionMetadata,
}

fn default_send_copy() -> bool {
    true
}

/// Trim and strip angle brackets from free text.
pub fn sanitize(input: &str) -> String {
    input.trim().replace(['<', '>'], "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_locale_from_tag() {
        assert_eq!(Locale::from_tag("en"), Locale::En);
        assert_eq!(Locale::from_tag(" EN "), Locale::En);
        assert_eq!(Locale::from_tag("fr"), Locale::De);
        assert_eq!(Locale::from_tag(""), Locale::De);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  <b>Hi</b>  "), "bHi/b");
        assert_eq!(sanitize("plain"), "plain");
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let submission = ContactSubmission {
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            phone: None,
            subject: "Hi".into(),
            message: "Hello".into(),
            language: Locale::En,
            send_copy: false,
            metadata: SubmissionMetadata {
                ip_address: Some("203.0.113.7".into()),
                ..SubmissionMetadata::captured_at(Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap())
            },
        };

        let json = serde_json::to_value(&submission).unwrap();
        assert_eq!(json["language"], "en");
        assert_eq!(json["sendCopy"], false);
        assert_eq!(json["metadata"]["ipAddress"], "203.0.113.7");
        assert!(json.get("phone").is_none());

        let back: ContactSubmission = serde_json::from_value(json).unwrap();
        assert_eq!(back, submission);
    }

    #[test]
    fn test_defaults_when_absent() {
        let json = serde_json::json!({
            "name": "Jane",
            "email": "jane@example.com",
            "subject": "Hi",
            "message": "Hello",
            "metadata": {"timestamp": "2026-01-02T03:04:05Z"}
        });
        let submission: ContactSubmission = serde_json::from_value(json).unwrap();
        assert_eq!(submission.language, Locale::De);
        assert!(submission.send_copy);
    }
}
