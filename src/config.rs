//! Relay configuration read from the environment.
//!
//! Every setting has a default except the provider API keys: a provider is
//! enabled by setting its key. Empty variables count as unset.
//!
//! | Variable | Default |
//! |---|---|
//! | `RESEND_API_KEY`, `RESEND_PRIORITY` | unset, `1` |
//! | `SENDGRID_API_KEY`, `SENDGRID_PRIORITY` | unset, `2` |
//! | `EMAIL_LOGGER_ENABLED` | `false` |
//! | `EMAIL_FALLBACK_ENABLED` | `true` |
//! | `EMAIL_RETRY_DELAY_MS` | `1000` |
//! | `ALLOWED_EMAIL_DOMAINS`, `BLOCKED_EMAIL_DOMAINS` | empty |
//! | `FROM_EMAIL`, `TO_EMAIL` | `noreply@phialo.de`, `info@phialo.de` |
//! | `TURNSTILE_SECRET_KEY` | unset (no challenge verification) |
//! | `TURNSTILE_ALLOWED_HOSTNAMES`, `TURNSTILE_ALLOWED_ORIGINS` | empty |
//! | `TURNSTILE_ENABLE_IDEMPOTENCY` | `true` |
//! | `TURNSTILE_MAX_RETRIES`, `TURNSTILE_RETRY_DELAY` (ms) | `3`, `1000` |
//! | `ENABLE_REQUEST_SIGNING`, `REQUEST_SIGNING_SECRET` | `false`, unset |
//! | `ALLOWED_ORIGINS` | empty |
//! | `MAX_CONTACT_ATTEMPTS` | `5` |
//! | `QUEUE_MAX_RETRIES` | `3` |
//! | `QUEUE_RETRY_DELAY_MS` (first redelivery, doubles after) | `30000` |
//! | `BIND_ADDR` | `0.0.0.0:8787` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::consumer::MailRouting;
use crate::delivery::{DeliveryConfig, ProviderKind, ProviderSettings};
use crate::error::ConfigError;
use crate::ingress::IngressConfig;
use crate::queue::RedeliveryBackoff;
use crate::turnstile::TurnstileConfig;

/// Default priority of the logger provider, tried after every API provider.
pub const LOGGER_PRIORITY: u32 = 100;

/// Default listen address of the standalone binary.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8787";

/// Everything the relay needs to run.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub providers: Vec<ProviderSettings>,
    pub delivery: DeliveryConfig,
    pub routing: MailRouting,
    /// Challenge verification; `None` when no secret is configured.
    pub turnstile: Option<TurnstileConfig>,
    pub ingress: IngressConfig,
    /// Redeliveries before a failing queue message is dead-lettered.
    pub queue_max_retries: u32,
    /// Delay schedule for redelivering failed queue messages.
    pub queue_backoff: RedeliveryBackoff,
    pub bind_addr: SocketAddr,
}

impl RelayConfig {
    /// Read the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name: &str| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| non_empty(lookup(name));

        let providers = providers_from_lookup(&get)?;

        let mut delivery = DeliveryConfig::default();
        if let Some(value) = get("EMAIL_FALLBACK_ENABLED") {
            delivery.fallback_enabled = parse_bool("EMAIL_FALLBACK_ENABLED", &value)?;
        }
        if let Some(value) = get("EMAIL_RETRY_DELAY_MS") {
            delivery.retry_delay =
                Duration::from_millis(parse_num("EMAIL_RETRY_DELAY_MS", &value)?);
        }
        delivery.allowed_domains = get("ALLOWED_EMAIL_DOMAINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();
        delivery.blocked_domains = get("BLOCKED_EMAIL_DOMAINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        let mut routing = MailRouting::default();
        if let Some(from) = get("FROM_EMAIL") {
            routing.from_email = from;
        }
        if let Some(to) = get("TO_EMAIL") {
            routing.to_email = to;
        }

        let turnstile = match get("TURNSTILE_SECRET_KEY") {
            Some(_) => Some(turnstile_from_lookup(lookup)?),
            None => None,
        };

        let mut ingress = IngressConfig::default();
        let signing = match get("ENABLE_REQUEST_SIGNING") {
            Some(value) => parse_bool("ENABLE_REQUEST_SIGNING", &value)?,
            None => false,
        };
        if signing {
            ingress.signing_secret = Some(
                get("REQUEST_SIGNING_SECRET").ok_or(ConfigError::Missing("REQUEST_SIGNING_SECRET"))?,
            );
        }
        ingress.allowed_origins = get("ALLOWED_ORIGINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();
        if let Some(value) = get("MAX_CONTACT_ATTEMPTS") {
            ingress.max_contact_attempts = parse_num("MAX_CONTACT_ATTEMPTS", &value)?;
        }

        let queue_max_retries = match get("QUEUE_MAX_RETRIES") {
            Some(value) => parse_num("QUEUE_MAX_RETRIES", &value)?,
            None => 3,
        };
        let mut queue_backoff = RedeliveryBackoff::default();
        if let Some(value) = get("QUEUE_RETRY_DELAY_MS") {
            queue_backoff.base = Duration::from_millis(parse_num("QUEUE_RETRY_DELAY_MS", &value)?);
        }

        let bind_addr = parse_num("BIND_ADDR", &get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()))?;

        Ok(Self {
            providers,
            delivery,
            routing,
            turnstile,
            ingress,
            queue_max_retries,
            queue_backoff,
            bind_addr,
        })
    }
}

fn providers_from_lookup(
    get: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<ProviderSettings>, ConfigError> {
    let mut providers = Vec::new();

    #[cfg(feature = "resend")]
    if let Some(api_key) = get("RESEND_API_KEY") {
        providers.push(ProviderSettings {
            kind: ProviderKind::Resend { api_key },
            enabled: true,
            priority: priority(get, "RESEND_PRIORITY", 1)?,
        });
    }

    #[cfg(feature = "sendgrid")]
    if let Some(api_key) = get("SENDGRID_API_KEY") {
        providers.push(ProviderSettings {
            kind: ProviderKind::SendGrid { api_key },
            enabled: true,
            priority: priority(get, "SENDGRID_PRIORITY", 2)?,
        });
    }

    let logger = match get("EMAIL_LOGGER_ENABLED") {
        Some(value) => parse_bool("EMAIL_LOGGER_ENABLED", &value)?,
        None => false,
    };
    providers.push(ProviderSettings {
        kind: ProviderKind::Logger,
        enabled: logger,
        priority: LOGGER_PRIORITY,
    });

    Ok(providers)
}

#[cfg(any(feature = "resend", feature = "sendgrid"))]
fn priority(
    get: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
    default: u32,
) -> Result<u32, ConfigError> {
    match get(name) {
        Some(value) => parse_num(name, &value),
        None => Ok(default),
    }
}

/// Read the `TURNSTILE_*` variables.
pub(crate) fn turnstile_from_lookup(
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<TurnstileConfig, ConfigError> {
    let get = |name: &str| non_empty(lookup(name));

    let secret = get("TURNSTILE_SECRET_KEY").ok_or(ConfigError::Missing("TURNSTILE_SECRET_KEY"))?;
    let mut config = TurnstileConfig::new(secret);

    if let Some(value) = get("TURNSTILE_ALLOWED_HOSTNAMES") {
        config = config.allowed_hostnames(parse_list(&value));
    }
    if let Some(value) = get("TURNSTILE_ALLOWED_ORIGINS") {
        config = config.allowed_origins(parse_list(&value));
    }
    if let Some(value) = get("TURNSTILE_ENABLE_IDEMPOTENCY") {
        config = config.idempotency(parse_bool("TURNSTILE_ENABLE_IDEMPOTENCY", &value)?);
    }
    if let Some(value) = get("TURNSTILE_MAX_RETRIES") {
        config = config.max_retries(parse_num("TURNSTILE_MAX_RETRIES", &value)?);
    }
    if let Some(value) = get("TURNSTILE_RETRY_DELAY") {
        config = config.retry_delay(Duration::from_millis(parse_num(
            "TURNSTILE_RETRY_DELAY",
            &value,
        )?));
    }

    Ok(config)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_num<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

/// Comma-separated list, entries trimmed, empty entries dropped.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
