//! Error types for contact-relay.

use thiserror::Error;

/// Errors that can occur while building or delivering an email.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Configuration error (no providers, missing API key, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The message failed structural validation and was never handed to a provider.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// A recipient domain is on the block list.
    #[error("Domain {0} is blocked")]
    DomainBlocked(String),

    /// A recipient domain is missing from a non-empty allow list.
    #[error("Domain {0} is not in the allowed list")]
    DomainNotAllowed(String),

    /// Provider-specific error with details.
    #[error("Provider error ({provider}): {message}")]
    ProviderError {
        provider: &'static str,
        message: String,
        /// Optional HTTP status code
        status: Option<u16>,
    },

    /// A provider failed and fallback is disabled.
    #[error("Provider {provider} failed: {message}")]
    ProviderFailed {
        provider: &'static str,
        message: String,
    },

    /// Every configured provider failed.
    #[error("Failed to send email after {attempts} attempts. Last error: {last_error}")]
    AllProvidersFailed { attempts: usize, last_error: String },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    TemplateError(String),
}

impl DeliveryError {
    /// Create a provider-specific error.
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider,
            message: message.into(),
            status: None,
        }
    }

    /// Create a provider error with HTTP status.
    pub fn provider_with_status(
        provider: &'static str,
        message: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::ProviderError {
            provider,
            message: message.into(),
            status: Some(status),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<askama::Error> for DeliveryError {
    fn from(err: askama::Error) -> Self {
        Self::TemplateError(err.to_string())
    }
}

/// Transport-level failure talking to the challenge verifier.
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    /// Request never produced a response.
    #[error("Verifier request failed: {0}")]
    Transport(String),

    /// Verifier answered with a non-success HTTP status.
    #[error("Verifier returned HTTP {0}")]
    Status(u16),

    /// Verifier body could not be decoded.
    #[error("Verifier response could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for VerifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Errors raised by a queue transport.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The queue refused or failed to store the message.
    #[error("Queue send failed: {0}")]
    Send(String),

    /// The message body could not be serialized.
    #[error("Queue payload error: {0}")]
    Payload(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

/// Errors raised while reading configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl From<ConfigError> for DeliveryError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Reasons the contact endpoint refuses a submission.
///
/// Each variant maps to one HTTP status and a fixed public message; the
/// response body never carries internal details.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Unauthorized origin")]
    OriginNotAllowed,

    #[error("Missing request signature")]
    MissingSignature,

    #[error("Invalid request signature")]
    InvalidSignature,

    /// Body is not a JSON object of the expected shape.
    #[error("Invalid JSON body")]
    InvalidInput,

    /// Required fields that are absent or blank, in form order.
    #[error("Missing required fields")]
    MissingFields(Vec<&'static str>),

    #[error("Invalid email address")]
    InvalidEmail,

    /// Challenge verification failed with these codes.
    #[error("Captcha validation failed")]
    CaptchaFailed(Vec<String>),

    #[error("Too many requests. Please try again later.")]
    RateLimited { retry_after_secs: u64 },

    /// The submission could not be enqueued. Safe to retry.
    #[error("Failed to process your message. Please try again later.")]
    QueueUnavailable,

    /// The endpoint is not configured to accept submissions.
    #[error("Email service not configured")]
    ServiceUnavailable,
}
