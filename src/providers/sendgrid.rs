//! SendGrid API provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use contact_relay::providers::SendGridProvider;
//!
//! let provider = SendGridProvider::new("SG.xxxxx").compress(true);
//! ```
//!
//! Tags are sent as `categories`, metadata as `custom_args` (SendGrid only
//! accepts string values there, so other JSON values are stringified).

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;

use crate::address::Address;
use crate::email::EmailMessage;
use crate::error::DeliveryError;
use crate::provider::{EmailProvider, ProviderResult};

const SENDGRID_API_URL: &str = "https://api.sendgrid.com/v3";
const PROVIDER_NAME: &str = "sendgrid";

/// SendGrid API email provider.
pub struct SendGridProvider {
    api_key: String,
    client: Client,
    base_url: String,
    compress: bool,
}

impl SendGridProvider {
    /// Create a new SendGrid provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: SENDGRID_API_URL.to_string(),
            compress: false,
        }
    }

    /// Create with a custom reqwest client.
    pub fn with_client(api_key: impl Into<String>, client: Client) -> Self {
        Self {
            api_key: api_key.into(),
            client,
            base_url: SENDGRID_API_URL.to_string(),
            compress: false,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Enable gzip compression for requests.
    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    fn build_request(&self, message: &EmailMessage) -> Result<SendGridRequest, DeliveryError> {
        let from = message
            .from
            .as_ref()
            .ok_or_else(|| DeliveryError::InvalidMessage("missing sender".into()))?;

        if message.to.is_empty() {
            return Err(DeliveryError::InvalidMessage("missing recipients".into()));
        }

        let mut content = Vec::new();
        if let Some(ref text) = message.text {
            content.push(SendGridContent {
                content_type: "text/plain".to_string(),
                value: text.clone(),
            });
        }
        if let Some(ref html) = message.html {
            content.push(SendGridContent {
                content_type: "text/html".to_string(),
                value: html.clone(),
            });
        }

        Ok(SendGridRequest {
            personalizations: vec![SendGridPersonalization {
                to: message.to.iter().map(SendGridAddress::from).collect(),
                cc: address_list(&message.cc),
                bcc: address_list(&message.bcc),
            }],
            from: SendGridAddress::from(from),
            reply_to: message.reply_to.as_ref().map(SendGridAddress::from),
            subject: message.subject.clone(),
            content,
            headers: if message.headers.is_empty() {
                None
            } else {
                Some(message.headers.clone())
            },
            categories: if message.tags.is_empty() {
                None
            } else {
                Some(message.tags.clone())
            },
            custom_args: if message.metadata.is_empty() {
                None
            } else {
                Some(
                    message
                        .metadata
                        .iter()
                        .filter(|(_, value)| !value.is_null())
                        .map(|(key, value)| {
                            let value = match value {
                                serde_json::Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (key.clone(), value)
                        })
                        .collect(),
                )
            },
        })
    }

    fn compress_body(&self, body: &[u8]) -> Result<Vec<u8>, DeliveryError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body).map_err(|e| {
            DeliveryError::provider(PROVIDER_NAME, format!("Failed to compress body: {}", e))
        })?;
        encoder.finish().map_err(|e| {
            DeliveryError::provider(PROVIDER_NAME, format!("Failed to finish compression: {}", e))
        })
    }
}

fn address_list(addresses: &[Address]) -> Option<Vec<SendGridAddress>> {
    if addresses.is_empty() {
        None
    } else {
        Some(addresses.iter().map(SendGridAddress::from).collect())
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    async fn send(&self, message: &EmailMessage) -> Result<ProviderResult, DeliveryError> {
        let request = self.build_request(message)?;

        let url = format!("{}/mail/send", self.base_url);
        let json_body = serde_json::to_vec(&request)?;

        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("User-Agent", format!("contact-relay/{}", crate::VERSION));

        let body = if self.compress {
            req = req.header("Content-Encoding", "gzip");
            self.compress_body(&json_body)?
        } else {
            json_body
        };

        let response = req.body(body).send().await?;
        let status = response.status();

        // SendGrid returns 202 Accepted on success with no body
        if status.is_success() {
            let message_id = response
                .headers()
                .get("X-Message-Id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("sendgrid-{}", uuid::Uuid::new_v4()));

            tracing::debug!(message_id = %message_id, "Email accepted by SendGrid");
            return Ok(ProviderResult::accepted(PROVIDER_NAME, message_id));
        }

        let body = response.text().await.unwrap_or_default();
        let reason = status.canonical_reason().unwrap_or("Unknown error");
        let error_message = serde_json::from_str::<SendGridError>(&body)
            .ok()
            .map(|error| {
                error
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| reason.to_string());

        tracing::warn!(
            status = status.as_u16(),
            error = %error_message,
            "SendGrid API error"
        );

        let details = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        Ok(
            ProviderResult::rejected(PROVIDER_NAME, format!("SendGrid error: {}", error_message))
                .with_details(details),
        )
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

// ============================================================================
// SendGrid API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct SendGridRequest {
    personalizations: Vec<SendGridPersonalization>,
    from: SendGridAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<SendGridAddress>,
    subject: String,
    content: Vec<SendGridContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_args: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
struct SendGridPersonalization {
    to: Vec<SendGridAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cc: Option<Vec<SendGridAddress>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bcc: Option<Vec<SendGridAddress>>,
}

#[derive(Debug, Serialize)]
struct SendGridAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl From<&Address> for SendGridAddress {
    fn from(address: &Address) -> Self {
        Self {
            email: address.email.clone(),
            name: address.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendGridContent {
    #[serde(rename = "type")]
    content_type: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct SendGridError {
    errors: Vec<SendGridErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct SendGridErrorDetail {
    message: String,
}
