//! Local provider for development and testing.
//!
//! Captures messages in memory so tests can assert on what the relay would
//! have sent.
//!
//! ```rust,ignore
//! use contact_relay::providers::LocalProvider;
//! use contact_relay::testing::*;
//!
//! #[tokio::test]
//! async fn test_sends_notification() {
//!     let provider = LocalProvider::new();
//!
//!     // Code under test
//!     relay_contact_form(&provider).await;
//!
//!     assert_email_sent(&provider);
//!     assert_email_to(&provider, "info@phialo.de");
//!     assert_email_subject_contains(&provider, "New Contact Request");
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::email::EmailMessage;
use crate::error::DeliveryError;
use crate::provider::{EmailProvider, ProviderResult};

/// A message accepted by a [`LocalProvider`].
#[derive(Debug, Clone)]
pub struct CapturedEmail {
    /// Message ID handed back to the caller.
    pub id: String,
    /// The message as it was sent.
    pub message: EmailMessage,
    /// When the message was captured.
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    emails: RwLock<Vec<CapturedEmail>>,
    fail_with: RwLock<Option<Failure>>,
    attempts: AtomicUsize,
}

#[derive(Clone)]
enum Failure {
    Rejected(String),
    Transport(String),
}

/// Provider that stores messages in memory.
///
/// Clones share the same mailbox, so a clone can be handed to the delivery
/// service while the test keeps the original for assertions.
#[derive(Clone)]
pub struct LocalProvider {
    name: &'static str,
    inner: Arc<Inner>,
}

impl LocalProvider {
    /// Create a local provider with an empty mailbox.
    pub fn new() -> Self {
        Self {
            name: "local",
            inner: Arc::new(Inner::default()),
        }
    }

    /// Create a local provider that reports a custom name.
    ///
    /// Handy when several local providers stand in for a fallback chain.
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::new()
        }
    }

    // =========================================================================
    // Failure Simulation (for testing)
    // =========================================================================

    /// Make every send report a provider rejection with this error.
    pub fn set_failure(&self, error: impl Into<String>) {
        *self.inner.fail_with.write() = Some(Failure::Rejected(error.into()));
    }

    /// Make every send fail as if the HTTP request itself had failed.
    pub fn set_transport_failure(&self, error: impl Into<String>) {
        *self.inner.fail_with.write() = Some(Failure::Transport(error.into()));
    }

    /// Clear the failure state.
    pub fn clear_failure(&self) {
        *self.inner.fail_with.write() = None;
    }

    // =========================================================================
    // Email Access (for testing assertions)
    // =========================================================================

    /// Number of times `send` was called, successful or not.
    pub fn attempt_count(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// All captured messages, oldest first.
    pub fn emails(&self) -> Vec<CapturedEmail> {
        self.inner.emails.read().clone()
    }

    /// The most recently captured message.
    pub fn last_email(&self) -> Option<CapturedEmail> {
        self.inner.emails.read().last().cloned()
    }

    /// Number of captured messages.
    pub fn email_count(&self) -> usize {
        self.inner.emails.read().len()
    }

    /// Whether any message was captured.
    pub fn has_emails(&self) -> bool {
        !self.inner.emails.read().is_empty()
    }

    /// Remove all captured messages and reset the attempt counter.
    pub fn clear(&self) {
        self.inner.emails.write().clear();
        self.inner.attempts.store(0, Ordering::SeqCst);
    }

    /// Remove and return all captured messages.
    pub fn flush(&self) -> Vec<CapturedEmail> {
        std::mem::take(&mut *self.inner.emails.write())
    }

    /// Check if a message was sent to a specific address.
    pub fn sent_to(&self, email: &str) -> bool {
        self.inner.emails.read().iter().any(|captured| {
            captured
                .message
                .to
                .iter()
                .any(|addr| addr.email.eq_ignore_ascii_case(email))
        })
    }

    /// Check if a message with subject containing `text` was sent.
    pub fn sent_with_subject_containing(&self, text: &str) -> bool {
        self.inner
            .emails
            .read()
            .iter()
            .any(|captured| captured.message.subject.contains(text))
    }

    /// Find messages matching a predicate.
    pub fn find_emails<F>(&self, predicate: F) -> Vec<CapturedEmail>
    where
        F: Fn(&EmailMessage) -> bool,
    {
        self.inner
            .emails
            .read()
            .iter()
            .filter(|captured| predicate(&captured.message))
            .cloned()
            .collect()
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailProvider for LocalProvider {
    async fn send(&self, message: &EmailMessage) -> Result<ProviderResult, DeliveryError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let failure = self.inner.fail_with.read().clone();
        match failure {
            Some(Failure::Rejected(error)) => return Ok(ProviderResult::rejected(self.name, error)),
            Some(Failure::Transport(error)) => return Err(DeliveryError::HttpError(error)),
            None => {}
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.inner.emails.write().push(CapturedEmail {
            id: id.clone(),
            message: message.clone(),
            sent_at: Utc::now(),
        });

        Ok(ProviderResult::accepted(self.name, id))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
