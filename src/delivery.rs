//! Email delivery service with ordered provider fallback.
//!
//! The service owns a priority-ordered list of providers. A message is
//! validated and checked against the domain lists before any provider sees it,
//! then handed to the providers one at a time until one accepts it. Providers
//! are never called concurrently for the same message.
//!
//! ```rust,ignore
//! use contact_relay::delivery::{DeliveryConfig, DeliveryService};
//! use contact_relay::providers::{ResendProvider, SendGridProvider};
//!
//! let service = DeliveryService::new(
//!     vec![
//!         Arc::new(ResendProvider::new("re_xxx")),
//!         Arc::new(SendGridProvider::new("SG.xxx")),
//!     ],
//!     DeliveryConfig::default().block_domain("mailinator.com"),
//! )?;
//!
//! let result = service.send(&message).await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "metrics")]
use std::time::Instant;

use tracing::Instrument;

use crate::address::normalize_domain;
use crate::config::RelayConfig;
use crate::email::EmailMessage;
use crate::error::DeliveryError;
use crate::provider::{EmailProvider, ProviderResult};
use crate::providers::LoggerProvider;

#[cfg(feature = "resend")]
use crate::providers::ResendProvider;
#[cfg(feature = "sendgrid")]
use crate::providers::SendGridProvider;

/// Default wait between two providers when fallback is enabled.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Fallback and domain policy for a [`DeliveryService`].
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Try the next provider after a failure.
    pub fallback_enabled: bool,
    /// Wait between a failed provider and the next one.
    pub retry_delay: Duration,
    /// If non-empty, every recipient domain must be listed.
    pub allowed_domains: Vec<String>,
    /// Recipient domains that are always refused.
    pub blocked_domains: Vec<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            retry_delay: DEFAULT_RETRY_DELAY,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
        }
    }
}

impl DeliveryConfig {
    /// Enable or disable provider fallback.
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Set the wait between providers.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Add a domain to the allow list.
    pub fn allow_domain(mut self, domain: impl Into<String>) -> Self {
        self.allowed_domains.push(domain.into());
        self
    }

    /// Add a domain to the block list.
    pub fn block_domain(mut self, domain: impl Into<String>) -> Self {
        self.blocked_domains.push(domain.into());
        self
    }
}

/// The closed set of providers that can be built from configuration.
#[derive(Clone, PartialEq, Eq)]
pub enum ProviderKind {
    #[cfg(feature = "resend")]
    Resend { api_key: String },
    #[cfg(feature = "sendgrid")]
    SendGrid { api_key: String },
    Logger,
}

// Keep API keys out of debug output.
impl std::fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "resend")]
            ProviderKind::Resend { .. } => f.write_str("Resend"),
            #[cfg(feature = "sendgrid")]
            ProviderKind::SendGrid { .. } => f.write_str("SendGrid"),
            ProviderKind::Logger => f.write_str("Logger"),
        }
    }
}

impl ProviderKind {
    fn build(&self) -> Arc<dyn EmailProvider> {
        match self {
            #[cfg(feature = "resend")]
            ProviderKind::Resend { api_key } => Arc::new(ResendProvider::new(api_key.as_str())),
            #[cfg(feature = "sendgrid")]
            ProviderKind::SendGrid { api_key } => {
                Arc::new(SendGridProvider::new(api_key.as_str()))
            }
            ProviderKind::Logger => Arc::new(LoggerProvider::new()),
        }
    }
}

/// One configured provider slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub enabled: bool,
    /// Lower numbers are tried first.
    pub priority: u32,
}

/// Sends messages through an ordered list of providers.
pub struct DeliveryService {
    providers: Vec<Arc<dyn EmailProvider>>,
    config: DeliveryConfig,
    allowed: HashSet<String>,
    blocked: HashSet<String>,
}

impl std::fmt::Debug for DeliveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryService")
            .field("providers", &self.provider_names())
            .field("config", &self.config)
            .finish()
    }
}

impl DeliveryService {
    /// Create a service from providers already in priority order.
    ///
    /// Fails with [`DeliveryError::Configuration`] if `providers` is empty.
    pub fn new(
        providers: Vec<Arc<dyn EmailProvider>>,
        config: DeliveryConfig,
    ) -> Result<Self, DeliveryError> {
        if providers.is_empty() {
            return Err(DeliveryError::Configuration(
                "No email providers are enabled".into(),
            ));
        }

        let allowed = config.allowed_domains.iter().map(|d| normalize_domain(d)).collect();
        let blocked = config.blocked_domains.iter().map(|d| normalize_domain(d)).collect();

        tracing::debug!(
            providers = ?providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            fallback = config.fallback_enabled,
            "Delivery service configured"
        );

        Ok(Self {
            providers,
            config,
            allowed,
            blocked,
        })
    }

    /// Build the enabled providers from settings, ordered by ascending priority.
    ///
    /// Settings with equal priority keep their relative order.
    pub fn from_settings(
        settings: &[ProviderSettings],
        config: DeliveryConfig,
    ) -> Result<Self, DeliveryError> {
        let mut enabled: Vec<&ProviderSettings> = settings.iter().filter(|s| s.enabled).collect();
        enabled.sort_by_key(|s| s.priority);

        Self::new(enabled.into_iter().map(|s| s.kind.build()).collect(), config)
    }

    /// Build the service described by the relay configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self, DeliveryError> {
        Self::from_settings(&config.providers, config.delivery.clone())
    }

    /// Provider names in the order they are tried.
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Query every provider's advisory availability.
    pub async fn test_connection(&self) -> Vec<(&'static str, bool)> {
        let mut report = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            report.push((provider.name(), provider.is_available().await));
        }
        report
    }

    /// Validate, apply domain rules, then deliver through the first provider
    /// that accepts the message.
    pub async fn send(&self, message: &EmailMessage) -> Result<ProviderResult, DeliveryError> {
        message.validate().map_err(DeliveryError::InvalidMessage)?;
        self.check_domains(message)?;

        let span = tracing::info_span!(
            "contact_relay.send",
            to = ?message.to.iter().map(|a| &a.email).collect::<Vec<_>>(),
            subject = %message.subject,
        );

        self.send_ordered(message).instrument(span).await
    }

    async fn send_ordered(&self, message: &EmailMessage) -> Result<ProviderResult, DeliveryError> {
        let mut last_error = String::new();
        let mut attempts = 0;

        for (index, provider) in self.providers.iter().enumerate() {
            let name = provider.name();
            attempts += 1;

            tracing::debug!(provider = name, attempt = attempts, "Sending email");

            let timer = AttemptTimer::start(name);
            let outcome = provider.send(message).await;

            let error = match outcome {
                Ok(result) if result.is_success() => {
                    timer.finish("success");
                    tracing::info!(
                        provider = name,
                        message_id = result.message_id().unwrap_or_default(),
                        "Email delivered"
                    );
                    return Ok(result);
                }
                Ok(result) => {
                    if let Some(details) = result.details() {
                        tracing::debug!(provider = name, details = %details, "Provider response");
                    }
                    result.error().unwrap_or("Unknown provider error").to_string()
                }
                Err(e) => e.to_string(),
            };

            timer.finish("error");
            tracing::warn!(provider = name, error = %error, "Email provider failed");

            if !self.config.fallback_enabled {
                return Err(DeliveryError::ProviderFailed {
                    provider: name,
                    message: error,
                });
            }

            last_error = error;

            if index + 1 < self.providers.len() && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        tracing::error!(attempts, last_error = %last_error, "All email providers failed");
        Err(DeliveryError::AllProvidersFailed {
            attempts,
            last_error,
        })
    }

    fn check_domains(&self, message: &EmailMessage) -> Result<(), DeliveryError> {
        for recipient in message.recipients() {
            let Some(domain) = recipient.normalized_domain() else {
                continue;
            };

            if self.blocked.contains(&domain) {
                tracing::warn!(domain = %domain, "Recipient domain is blocked");
                return Err(DeliveryError::DomainBlocked(domain));
            }

            if !self.allowed.is_empty() && !self.allowed.contains(&domain) {
                tracing::warn!(domain = %domain, "Recipient domain is not allowed");
                return Err(DeliveryError::DomainNotAllowed(domain));
            }
        }
        Ok(())
    }
}

/// Records per-attempt metrics when the `metrics` feature is on.
struct AttemptTimer {
    #[cfg(feature = "metrics")]
    provider: &'static str,
    #[cfg(feature = "metrics")]
    start: Instant,
}

impl AttemptTimer {
    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn start(provider: &'static str) -> Self {
        Self {
            #[cfg(feature = "metrics")]
            provider,
            #[cfg(feature = "metrics")]
            start: Instant::now(),
        }
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn finish(self, status: &'static str) {
        #[cfg(feature = "metrics")]
        {
            metrics::counter!("contact_relay_emails_total", "provider" => self.provider, "status" => status)
                .increment(1);
            metrics::histogram!("contact_relay_delivery_duration_seconds", "provider" => self.provider)
                .record(self.start.elapsed().as_secs_f64());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LocalProvider;

    fn message() -> EmailMessage {
        EmailMessage::new()
            .from("noreply@phialo.de")
            .to("info@phialo.de")
            .subject("Hello")
            .text("Hi")
    }

    #[test]
    fn test_empty_provider_list_is_configuration_error() {
        let err = DeliveryService::new(Vec::new(), DeliveryConfig::default()).unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[test]
    fn test_from_settings_orders_by_priority_and_skips_disabled() {
        let mut settings = vec![ProviderSettings {
            kind: ProviderKind::Logger,
            enabled: true,
            priority: 100,
        }];
        #[cfg(feature = "sendgrid")]
        settings.push(ProviderSettings {
            kind: ProviderKind::SendGrid {
                api_key: "SG.test".into(),
            },
            enabled: true,
            priority: 2,
        });
        #[cfg(feature = "resend")]
        settings.push(ProviderSettings {
            kind: ProviderKind::Resend {
                api_key: "re_test".into(),
            },
            enabled: false,
            priority: 1,
        });

        let service = DeliveryService::from_settings(&settings, DeliveryConfig::default()).unwrap();
        let names = service.provider_names();
        assert_eq!(names.last(), Some(&"logger"));
        assert!(!names.contains(&"resend"));
    }

    #[test]
    fn test_from_settings_all_disabled() {
        let settings = vec![ProviderSettings {
            kind: ProviderKind::Logger,
            enabled: false,
            priority: 1,
        }];
        let err = DeliveryService::from_settings(&settings, DeliveryConfig::default()).unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_blocked_domain_is_normalized() {
        let local = LocalProvider::new();
        let service = DeliveryService::new(
            vec![Arc::new(local.clone())],
            DeliveryConfig::default().block_domain("Example.COM"),
        )
        .unwrap();

        let err = service
            .send(&message().cc("someone@EXAMPLE.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::DomainBlocked(ref d) if d == "example.com"));
        assert_eq!(local.attempt_count(), 0);
    }

    #[cfg(feature = "resend")]
    #[test]
    fn test_debug_hides_api_keys() {
        let kind = ProviderKind::Resend {
            api_key: "re_secret".into(),
        };
        assert_eq!(format!("{:?}", kind), "Resend");
    }
}
