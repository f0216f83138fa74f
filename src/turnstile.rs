//! Cloudflare Turnstile verification.
//!
//! [`TurnstileVerifier`] posts the client token to the siteverify endpoint,
//! retrying transport failures with exponential backoff, and then applies the
//! checks Turnstile itself does not make: hostname and origin allowlists and a
//! comparison between the hostname the request arrived on and the hostname
//! the challenge was solved on.
//!
//! ```rust,ignore
//! use contact_relay::turnstile::{TurnstileConfig, TurnstileVerifier, VerifyRequest, ChallengeVerifier};
//!
//! let verifier = TurnstileVerifier::new(
//!     TurnstileConfig::new(secret).allowed_hostnames(["phialo.de"]),
//! )?;
//!
//! let result = verifier
//!     .verify(VerifyRequest::new(token).ip("203.0.113.7"))
//!     .await;
//! if !result.success {
//!     println!("rejected: {:?}", result.error_codes);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConfigError, VerifyError};

/// Cloudflare siteverify endpoint.
pub const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

pub const HOSTNAME_NOT_ALLOWED: &str = "hostname-not-allowed";
pub const ORIGIN_NOT_ALLOWED: &str = "origin-not-allowed";
pub const HOSTNAME_MISMATCH: &str = "hostname-mismatch";
pub const INTERNAL_ERROR: &str = "internal-error";

/// Verifier settings.
#[derive(Clone)]
pub struct TurnstileConfig {
    pub secret_key: String,
    pub allowed_hostnames: Vec<String>,
    pub allowed_origins: Vec<String>,
    /// Send an idempotency key with every verification.
    pub enable_idempotency: bool,
    /// Extra attempts after the first one fails at the transport level.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each further retry.
    pub retry_delay: Duration,
    /// Upper bound for a single backoff.
    pub max_retry_delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for TurnstileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnstileConfig")
            .field("allowed_hostnames", &self.allowed_hostnames)
            .field("allowed_origins", &self.allowed_origins)
            .field("enable_idempotency", &self.enable_idempotency)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("is_test_key", &self.is_test_key())
            .finish()
    }
}

impl TurnstileConfig {
    /// Settings with defaults: idempotency on, 3 retries, 1s initial backoff.
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            allowed_hostnames: Vec::new(),
            allowed_origins: Vec::new(),
            enable_idempotency: true,
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        }
    }

    /// Read settings from the `TURNSTILE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        crate::config::turnstile_from_lookup(&|name: &str| std::env::var(name).ok())
    }

    pub fn allowed_hostnames<I, S>(mut self, hostnames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_hostnames = hostnames.into_iter().map(Into::into).collect();
        self
    }

    pub fn allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn idempotency(mut self, enabled: bool) -> Self {
        self.enable_idempotency = enabled;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Whether the secret is one of Cloudflare's published test secrets
    /// (`1x...` always passes, `2x...` always fails).
    pub fn is_test_key(&self) -> bool {
        self.secret_key.starts_with("1x") || self.secret_key.starts_with("2x")
    }

    /// Backoff before retry number `retry` (0-based), capped.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }
}

/// Input to a verification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifyRequest {
    pub token: String,
    /// Client IP, forwarded to Turnstile as `remoteip`.
    pub ip: Option<String>,
    /// `Origin` header of the submitting request.
    pub origin: Option<String>,
    /// Hostname the submitting request was addressed to.
    pub hostname: Option<String>,
    pub idempotency_key: Option<String>,
}

impl VerifyRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Outcome of a verification.
///
/// `success` implies the reported hostname and the supplied origin passed the
/// configured allowlists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationResult {
    pub success: bool,
    pub hostname: Option<String>,
    pub challenge_ts: Option<String>,
    pub action: Option<String>,
    pub cdata: Option<String>,
    pub error_codes: Vec<String>,
    pub idempotency_key: Option<String>,
}

impl VerificationResult {
    /// A failed result carrying only `code`.
    pub fn failed(code: impl Into<String>) -> Self {
        Self {
            error_codes: vec![code.into()],
            ..Self::default()
        }
    }

    fn reject(mut self, code: &str) -> Self {
        self.success = false;
        self.error_codes.push(code.to_string());
        self
    }
}

/// Anything that can judge a challenge token.
///
/// The ingress handler only sees this trait, so tests can swap in a double.
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    async fn verify(&self, request: VerifyRequest) -> VerificationResult;
}

/// Turnstile siteverify client.
pub struct TurnstileVerifier {
    config: TurnstileConfig,
    client: Client,
    url: String,
}

impl TurnstileVerifier {
    /// Create a verifier. Fails if the secret key is empty.
    pub fn new(config: TurnstileConfig) -> Result<Self, ConfigError> {
        Self::with_client(config, Client::new())
    }

    /// Create with a custom reqwest client.
    pub fn with_client(config: TurnstileConfig, client: Client) -> Result<Self, ConfigError> {
        if config.secret_key.trim().is_empty() {
            return Err(ConfigError::Missing("TURNSTILE_SECRET_KEY"));
        }
        if config.is_test_key() {
            tracing::warn!("Turnstile is using a test secret key");
        }
        Ok(Self {
            config,
            client,
            url: SITEVERIFY_URL.to_string(),
        })
    }

    /// Set a custom siteverify URL (for testing).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn config(&self) -> &TurnstileConfig {
        &self.config
    }

    async fn siteverify(&self, form: &[(&str, &str)]) -> Result<SiteverifyResponse, VerifyError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.config.timeout)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Status(status.as_u16()));
        }

        response
            .json::<SiteverifyResponse>()
            .await
            .map_err(|e| VerifyError::Decode(e.to_string()))
    }

    async fn siteverify_with_retry(
        &self,
        form: &[(&str, &str)],
    ) -> Result<SiteverifyResponse, VerifyError> {
        let mut retry = 0;
        loop {
            match self.siteverify(form).await {
                Ok(response) => return Ok(response),
                Err(e) if retry < self.config.max_retries => {
                    let delay = self.config.backoff(retry);
                    retry += 1;
                    tracing::warn!(
                        error = %e,
                        attempts_left = self.config.max_retries - retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Turnstile verification failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn enforce_allowlists(
        &self,
        result: VerificationResult,
        request: &VerifyRequest,
    ) -> VerificationResult {
        let allowed_hostnames = &self.config.allowed_hostnames;
        if !allowed_hostnames.is_empty() {
            let listed = result.hostname.as_deref().is_some_and(|reported| {
                allowed_hostnames
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(reported))
            });
            if !listed {
                tracing::warn!(
                    hostname = ?result.hostname,
                    allowed = ?allowed_hostnames,
                    "Turnstile hostname not in allowlist"
                );
                return result.reject(HOSTNAME_NOT_ALLOWED);
            }
        }

        if let Some(origin) = request.origin.as_deref() {
            let allowed_origins = &self.config.allowed_origins;
            let origin = origin.trim_end_matches('/');
            if !allowed_origins.is_empty()
                && !allowed_origins
                    .iter()
                    .any(|allowed| allowed.trim_end_matches('/').eq_ignore_ascii_case(origin))
            {
                tracing::warn!(origin = %origin, allowed = ?allowed_origins, "Turnstile origin not in allowlist");
                return result.reject(ORIGIN_NOT_ALLOWED);
            }
        }

        if let (Some(supplied), Some(reported)) =
            (request.hostname.as_deref(), result.hostname.as_deref())
        {
            if !supplied.eq_ignore_ascii_case(reported) {
                tracing::warn!(provided = %supplied, recorded = %reported, "Turnstile hostname mismatch");
                return result.reject(HOSTNAME_MISMATCH);
            }
        }

        result
    }
}

#[async_trait]
impl ChallengeVerifier for TurnstileVerifier {
    async fn verify(&self, request: VerifyRequest) -> VerificationResult {
        let idempotency_key = if self.config.enable_idempotency {
            Some(
                request
                    .idempotency_key
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            )
        } else {
            None
        };

        let mut form: Vec<(&str, &str)> = vec![
            ("secret", self.config.secret_key.as_str()),
            ("response", request.token.as_str()),
        ];
        if let Some(ip) = request.ip.as_deref() {
            form.push(("remoteip", ip));
        }
        if let Some(key) = idempotency_key.as_deref() {
            form.push(("idempotency_key", key));
        }

        let response = match self.siteverify_with_retry(&form).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Turnstile verification error");
                return VerificationResult {
                    idempotency_key,
                    ..VerificationResult::failed(INTERNAL_ERROR)
                };
            }
        };

        let result = VerificationResult {
            success: response.success,
            hostname: response.hostname,
            challenge_ts: response.challenge_ts,
            action: response.action,
            cdata: response.cdata,
            error_codes: response.error_codes,
            idempotency_key,
        };

        if !result.success {
            tracing::warn!(error_codes = ?result.error_codes, "Turnstile verification failed");
            return result;
        }

        let result = self.enforce_allowlists(result, &request);
        if result.success {
            tracing::info!(
                hostname = ?result.hostname,
                challenge_ts = ?result.challenge_ts,
                action = ?result.action,
                "Turnstile verification successful"
            );
        }
        result
    }
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default)]
    challenge_ts: Option<String>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    cdata: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = TurnstileConfig::new("secret")
            .retry_delay(Duration::from_millis(100))
            .max_retry_delay(Duration::from_millis(350));
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(350));
        assert_eq!(config.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn test_is_test_key() {
        assert!(TurnstileConfig::new("1x0000000000000000000000000000000AA").is_test_key());
        assert!(TurnstileConfig::new("2x0000000000000000000000000000000AA").is_test_key());
        assert!(!TurnstileConfig::new("0x4AAAAAAA").is_test_key());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(matches!(
            TurnstileVerifier::new(TurnstileConfig::new("  ")),
            Err(ConfigError::Missing("TURNSTILE_SECRET_KEY"))
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = TurnstileConfig::new("0x-very-secret");
        assert!(!format!("{:?}", config).contains("very-secret"));
    }
}
