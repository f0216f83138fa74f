//! Dry-run provider that logs contact emails instead of sending them.
//!
//! Each send logs the routing a real provider would see: form id, language,
//! idempotency key, reply-to and tags. The message id is derived from the
//! idempotency key, so a redelivered send logs the same id as the first one.
//! Bodies are only logged at debug level when enabled.

use async_trait::async_trait;

use crate::email::EmailMessage;
use crate::error::DeliveryError;
use crate::provider::{EmailProvider, ProviderResult};

/// What the logger recorded for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEmail {
    pub message_id: String,
    pub form_id: Option<String>,
    pub language: Option<String>,
    pub idempotency_key: Option<String>,
    pub reply_to: Option<String>,
    pub recipients: Vec<String>,
    pub tags: Vec<String>,
}

impl LoggedEmail {
    fn from_message(message: &EmailMessage) -> Self {
        let meta = |key: &str| {
            message
                .metadata
                .get(key)
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };
        let idempotency_key = meta("idempotencyKey");
        let message_id = match &idempotency_key {
            Some(key) => format!("logger-{}", key),
            None => format!("logger-{}", uuid::Uuid::new_v4()),
        };

        Self {
            message_id,
            form_id: meta("formId"),
            language: meta("language"),
            idempotency_key,
            reply_to: message.reply_to.as_ref().map(|a| a.email.clone()),
            recipients: message.recipients().map(|a| a.email.clone()).collect(),
            tags: message.tags.clone(),
        }
    }
}

/// Provider that accepts every message and logs it.
#[derive(Debug, Default)]
pub struct LoggerProvider {
    log_bodies: bool,
}

impl LoggerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log the text body at debug level.
    pub fn log_bodies(mut self, enabled: bool) -> Self {
        self.log_bodies = enabled;
        self
    }

    /// The record a send of `message` produces.
    pub fn record(&self, message: &EmailMessage) -> LoggedEmail {
        LoggedEmail::from_message(message)
    }
}

#[async_trait]
impl EmailProvider for LoggerProvider {
    async fn send(&self, message: &EmailMessage) -> Result<ProviderResult, DeliveryError> {
        let record = self.record(message);

        tracing::info!(
            message_id = %record.message_id,
            form_id = record.form_id.as_deref().unwrap_or("-"),
            language = record.language.as_deref().unwrap_or("-"),
            idempotency_key = record.idempotency_key.as_deref().unwrap_or("-"),
            reply_to = record.reply_to.as_deref().unwrap_or("-"),
            recipients = ?record.recipients,
            tags = ?record.tags,
            subject = %message.subject,
            "Contact email logged instead of sent"
        );

        if self.log_bodies {
            if let Some(text) = &message.text {
                tracing::debug!(message_id = %record.message_id, body = %text, "Text body");
            }
        }

        Ok(ProviderResult::accepted("logger", record.message_id))
    }

    fn name(&self) -> &'static str {
        "logger"
    }
}
