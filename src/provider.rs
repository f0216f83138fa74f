//! Provider trait and provider result type.
//!
//! Every outbound email API is wrapped in an [`EmailProvider`]. The delivery
//! service holds them as `Arc<dyn EmailProvider>` in priority order, which is
//! why the trait uses `#[async_trait]`: native async traits are not
//! object-safe.
//!
//! Adapters report ordinary provider errors (4xx/5xx with a body) as a failed
//! [`ProviderResult`]. Transport problems may surface as `Err`; the delivery
//! service treats both the same way.

use async_trait::async_trait;
use serde::Serialize;

use crate::email::EmailMessage;
use crate::error::DeliveryError;

/// Outcome of one provider send attempt.
///
/// A message id is present if and only if the attempt succeeded; an error
/// message is present if and only if it failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderResult {
    provider: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ProviderResult {
    /// The provider accepted the message.
    pub fn accepted(provider: &'static str, message_id: impl Into<String>) -> Self {
        Self {
            provider,
            message_id: Some(message_id.into()),
            error: None,
            details: None,
        }
    }

    /// The provider rejected the message.
    pub fn rejected(provider: &'static str, error: impl Into<String>) -> Self {
        Self {
            provider,
            message_id: None,
            error: Some(error.into()),
            details: None,
        }
    }

    /// Attach raw provider response data (logged, never shown to end users).
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether the provider accepted the message.
    pub fn is_success(&self) -> bool {
        self.message_id.is_some()
    }

    /// Name of the provider that produced this result.
    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Message ID assigned by the provider.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Error reported by the provider.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Raw provider response data, if any.
    pub fn details(&self) -> Option<&serde_json::Value> {
        self.details.as_ref()
    }
}

/// Trait for outbound email APIs.
///
/// # Example
///
/// ```ignore
/// use contact_relay::{EmailMessage, EmailProvider};
/// use contact_relay::providers::ResendProvider;
///
/// let provider = ResendProvider::new("re_xxxxx");
/// let result = provider.send(&message).await?;
/// if let Some(id) = result.message_id() {
///     println!("Sent with ID: {}", id);
/// }
/// ```
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send a single message.
    async fn send(&self, message: &EmailMessage) -> Result<ProviderResult, DeliveryError>;

    /// Advisory availability check, used for health reporting only.
    ///
    /// A `false` here never prevents a send attempt.
    async fn is_available(&self) -> bool {
        true
    }

    /// Provider name (for logging/debugging).
    fn name(&self) -> &'static str;
}
