//! Resend API provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use contact_relay::providers::ResendProvider;
//!
//! let provider = ResendProvider::new("re_xxxxx");
//! ```
//!
//! Tags become Resend tags (`{"name": tag, "value": "true"}`). A metadata
//! entry named `idempotencyKey` is sent as the `Idempotency-Key` header so a
//! redelivered queue message does not produce a second email.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::email::EmailMessage;
use crate::error::DeliveryError;
use crate::provider::{EmailProvider, ProviderResult};

const RESEND_API_URL: &str = "https://api.resend.com";
const PROVIDER_NAME: &str = "resend";

/// Resend API email provider.
pub struct ResendProvider {
    api_key: String,
    client: Client,
    base_url: String,
}

impl ResendProvider {
    /// Create a new Resend provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: RESEND_API_URL.to_string(),
        }
    }

    /// Create with a custom reqwest client.
    pub fn with_client(api_key: impl Into<String>, client: Client) -> Self {
        Self {
            api_key: api_key.into(),
            client,
            base_url: RESEND_API_URL.to_string(),
        }
    }

    /// Set a custom base URL (for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn build_request(&self, message: &EmailMessage) -> Result<ResendRequest, DeliveryError> {
        let from = message
            .from
            .as_ref()
            .ok_or_else(|| DeliveryError::InvalidMessage("missing sender".into()))?;

        if message.to.is_empty() {
            return Err(DeliveryError::InvalidMessage("missing recipients".into()));
        }

        Ok(ResendRequest {
            from: from.formatted(),
            to: message.to.iter().map(|a| a.formatted()).collect(),
            subject: message.subject.clone(),
            html: message.html.clone(),
            text: message.text.clone(),
            cc: if message.cc.is_empty() {
                None
            } else {
                Some(message.cc.iter().map(|a| a.formatted()).collect())
            },
            bcc: if message.bcc.is_empty() {
                None
            } else {
                Some(message.bcc.iter().map(|a| a.formatted()).collect())
            },
            // Resend only takes bare addresses here
            reply_to: message.reply_to.as_ref().map(|a| vec![a.email.clone()]),
            headers: if message.headers.is_empty() {
                None
            } else {
                Some(message.headers.clone())
            },
            tags: if message.tags.is_empty() {
                None
            } else {
                Some(
                    message
                        .tags
                        .iter()
                        .map(|tag| ResendTag {
                            name: tag.clone(),
                            value: "true".to_string(),
                        })
                        .collect(),
                )
            },
        })
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn send(&self, message: &EmailMessage) -> Result<ProviderResult, DeliveryError> {
        let request = self.build_request(message)?;

        let url = format!("{}/emails", self.base_url);
        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("User-Agent", format!("contact-relay/{}", crate::VERSION));

        if let Some(key) = message
            .metadata
            .get("idempotencyKey")
            .and_then(|value| value.as_str())
        {
            req = req.header("Idempotency-Key", key);
        }

        tracing::debug!(
            to = ?message.to.iter().map(|a| &a.email).collect::<Vec<_>>(),
            subject = %message.subject,
            has_reply_to = request.reply_to.is_some(),
            "Sending email via Resend"
        );

        let response = req.json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            let result: ResendResponse = response.json().await?;
            return Ok(match result.id {
                Some(id) => ProviderResult::accepted(PROVIDER_NAME, id),
                None => ProviderResult::rejected(PROVIDER_NAME, "Resend API returned no message ID"),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let error_message = serde_json::from_str::<ResendError>(&body)
            .ok()
            .and_then(ResendError::into_message)
            .unwrap_or_else(|| {
                format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown error")
                )
            });

        tracing::warn!(status = status.as_u16(), error = %error_message, "Resend API error response");

        let details = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        Ok(ProviderResult::rejected(PROVIDER_NAME, format!("Resend API error: {}", error_message))
            .with_details(details))
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

// ============================================================================
// Resend API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResendRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<ResendTag>>,
}

#[derive(Debug, Serialize)]
struct ResendTag {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Resend reports errors either flat (`{"message": ..}`) or nested
/// (`{"error": {"message": ..}}`).
#[derive(Debug, Deserialize)]
struct ResendError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<ResendNestedError>,
}

#[derive(Debug, Deserialize)]
struct ResendNestedError {
    message: String,
}

impl ResendError {
    fn into_message(self) -> Option<String> {
        self.message.or(self.error.map(|e| e.message))
    }
}
