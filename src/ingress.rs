//! HTTP ingress for the contact form.
//!
//! [`contact_router`] mounts `/api/contact`. A submission passes the checks
//! below in order and is then enqueued; the response never waits for email
//! delivery.
//!
//! 1. method must be `POST`
//! 2. `Origin`, when present, must be allowlisted
//! 3. request signature, when signing is enabled
//! 4. JSON body
//! 5. required fields
//! 6. email syntax
//! 7. challenge token, when a verifier is configured and a token was sent
//! 8. per-IP rate limit
//!
//! ```rust,ignore
//! use contact_relay::ingress::{contact_router, ContactState};
//! use contact_relay::queue::MemoryQueue;
//!
//! let queue = MemoryQueue::new();
//! let state = ContactState::new(Arc::new(queue.clone()));
//! let app = contact_router(state);
//! axum::serve(listener, app).await?;
//! ```

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::address::is_valid_email;
use crate::config::RelayConfig;
use crate::contact::{sanitize, ContactSubmission, Locale, SubmissionMetadata};
use crate::error::{ConfigError, ContactError};
use crate::queue::{MessageType, QueueEnvelope, QueueProducer};
use crate::rate_limit::{RateLimiter, DEFAULT_MAX_ATTEMPTS, DEFAULT_WINDOW};
use crate::signing::{RequestSigner, DEFAULT_FRESHNESS};
use crate::turnstile::{ChallengeVerifier, TurnstileVerifier, VerifyRequest};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const SIGNATURE_HEADER: &str = "x-signature";
const TIMESTAMP_HEADER: &str = "x-timestamp";
const CLIENT_IP_HEADER: &str = "cf-connecting-ip";
const COUNTRY_HEADER: &str = "cf-ipcountry";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Ingress settings.
#[derive(Clone, PartialEq)]
pub struct IngressConfig {
    /// Shared secret for request signatures. `None` disables signing.
    pub signing_secret: Option<String>,
    pub signature_freshness: Duration,
    /// Origins allowed to submit. Empty allows any.
    pub allowed_origins: Vec<String>,
    pub max_contact_attempts: u32,
    pub rate_window: Duration,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            signature_freshness: DEFAULT_FRESHNESS,
            allowed_origins: Vec::new(),
            max_contact_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_window: DEFAULT_WINDOW,
        }
    }
}

impl std::fmt::Debug for IngressConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressConfig")
            .field("signing", &self.signing_secret.is_some())
            .field("signature_freshness", &self.signature_freshness)
            .field("allowed_origins", &self.allowed_origins)
            .field("max_contact_attempts", &self.max_contact_attempts)
            .field("rate_window", &self.rate_window)
            .finish()
    }
}

/// Shared state of the contact endpoint.
#[derive(Clone)]
pub struct ContactState {
    producer: Arc<dyn QueueProducer>,
    verifier: Option<Arc<dyn ChallengeVerifier>>,
    signer: Option<Arc<RequestSigner>>,
    allowed_origins: Arc<Vec<String>>,
    limiter: Arc<RateLimiter>,
    accepting: bool,
}

impl ContactState {
    /// State that enqueues into `producer`, with no verifier, no signing, no
    /// origin restriction and the default rate limit.
    pub fn new(producer: Arc<dyn QueueProducer>) -> Self {
        Self {
            producer,
            verifier: None,
            signer: None,
            allowed_origins: Arc::new(Vec::new()),
            limiter: Arc::new(RateLimiter::default()),
            accepting: true,
        }
    }

    /// State described by the relay configuration.
    pub fn from_config(
        relay: &RelayConfig,
        producer: Arc<dyn QueueProducer>,
    ) -> Result<Self, ConfigError> {
        let ingress = &relay.ingress;
        let mut state = Self::new(producer)
            .allowed_origins(ingress.allowed_origins.clone())
            .rate_limit(ingress.max_contact_attempts, ingress.rate_window)
            .accepting(relay.providers.iter().any(|p| p.enabled));

        if let Some(secret) = &ingress.signing_secret {
            state = state.signer(RequestSigner::new(secret).freshness(ingress.signature_freshness));
        }
        if let Some(turnstile) = &relay.turnstile {
            state = state.verifier(Arc::new(TurnstileVerifier::new(turnstile.clone())?));
        }
        Ok(state)
    }

    pub fn verifier(mut self, verifier: Arc<dyn ChallengeVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Require signed requests.
    pub fn signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    pub fn allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = Arc::new(origins.into_iter().map(Into::into).collect());
        self
    }

    pub fn rate_limit(mut self, max_attempts: u32, window: Duration) -> Self {
        self.limiter = Arc::new(RateLimiter::new(max_attempts, window));
        self
    }

    /// Whether valid submissions are taken. When `false` they are answered
    /// with 503, e.g. because no email provider is configured.
    pub fn accepting(mut self, accepting: bool) -> Self {
        self.accepting = accepting;
        self
    }
}

/// Router serving `/api/contact` with security headers on every response.
pub fn contact_router(state: ContactState) -> Router {
    Router::new()
        .route("/api/contact", any(submit_contact))
        .layer(axum::middleware::map_response(security_headers))
        .with_state(state)
}

/// Form body as sent by the browser.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactForm {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    subject: Option<String>,
    message: Option<String>,
    language: Option<String>,
    turnstile_token: Option<String>,
    idempotency_key: Option<String>,
    send_copy: Option<bool>,
}

impl ContactForm {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("email", &self.email),
            ("subject", &self.subject),
            ("message", &self.message),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(field, _)| field)
        .collect()
    }
}

async fn submit_contact(
    State(state): State<ContactState>,
    request: Request,
) -> Result<Response, ContactError> {
    if request.method() != Method::POST {
        return Err(ContactError::MethodNotAllowed);
    }

    let (parts, body) = request.into_parts();
    let headers = &parts.headers;

    let origin = header_str(headers, header::ORIGIN.as_str());
    if let Some(origin) = origin {
        if !state.allowed_origins.is_empty() && !state.allowed_origins.iter().any(|o| o == origin) {
            tracing::warn!(origin = %origin, "Rejected submission from unlisted origin");
            return Err(ContactError::OriginNotAllowed);
        }
    }

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ContactError::InvalidInput)?;

    if let Some(signer) = &state.signer {
        let (Some(signature), Some(timestamp)) = (
            header_str(headers, SIGNATURE_HEADER),
            header_str(headers, TIMESTAMP_HEADER),
        ) else {
            return Err(ContactError::MissingSignature);
        };
        if let Err(reason) = signer.verify(timestamp, signature, &body) {
            tracing::warn!(reason = ?reason, "Rejected request signature");
            return Err(ContactError::InvalidSignature);
        }
    }

    let form: ContactForm = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Unparseable contact body");
        ContactError::InvalidInput
    })?;

    let missing = form.missing_fields();
    if !missing.is_empty() {
        return Err(ContactError::MissingFields(missing));
    }

    let email = form.email.as_deref().unwrap_or_default().trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ContactError::InvalidEmail);
    }

    let client_ip = client_ip(headers);

    if let (Some(verifier), Some(token)) = (&state.verifier, form.turnstile_token.as_deref()) {
        let mut verify = VerifyRequest::new(token);
        if let Some(ip) = &client_ip {
            verify = verify.ip(ip.as_str());
        }
        if let Some(origin) = origin {
            verify = verify.origin(origin);
        }
        if let Some(hostname) = request_hostname(headers, &parts.uri) {
            verify = verify.hostname(hostname);
        }
        if let Some(key) = &form.idempotency_key {
            verify = verify.idempotency_key(key.as_str());
        }

        let result = verifier.verify(verify).await;
        if !result.success {
            tracing::warn!(error_codes = ?result.error_codes, "Captcha validation failed");
            return Err(ContactError::CaptchaFailed(result.error_codes));
        }
    }

    let rate_key = client_ip.as_deref().unwrap_or("unknown");
    if let Err(limited) = state.limiter.check(rate_key) {
        return Err(ContactError::RateLimited {
            retry_after_secs: limited.retry_after.as_secs().max(1),
        });
    }

    if !state.accepting {
        tracing::error!("Contact submission received but email delivery is not configured");
        return Err(ContactError::ServiceUnavailable);
    }

    let submission = build_submission(form, email, headers, client_ip);
    let locale = submission.language;
    let envelope = QueueEnvelope::new(MessageType::ContactForm, submission)
        .into_value()
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to encode contact submission");
            ContactError::QueueUnavailable
        })?;
    let message_id = envelope.id.clone();

    if let Err(e) = state.producer.send(envelope).await {
        tracing::error!(error = %e, "Failed to enqueue contact submission");
        return Err(ContactError::QueueUnavailable);
    }

    tracing::info!(message_id = %message_id, language = %locale, "Contact submission queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "success": true,
            "message": locale.acknowledgement(),
            "messageId": message_id,
        })),
    )
        .into_response())
}

fn build_submission(
    form: ContactForm,
    email: String,
    headers: &HeaderMap,
    client_ip: Option<String>,
) -> ContactSubmission {
    let clean = |value: Option<String>| sanitize(value.as_deref().unwrap_or_default());

    let mut metadata = SubmissionMetadata::captured_at(Utc::now());
    metadata.ip_address = client_ip;
    metadata.user_agent = header_str(headers, header::USER_AGENT.as_str()).map(str::to_string);
    metadata.referrer = header_str(headers, header::REFERER.as_str()).map(str::to_string);
    metadata.country = header_str(headers, COUNTRY_HEADER).map(str::to_string);

    ContactSubmission {
        name: clean(form.name),
        email,
        phone: form
            .phone
            .map(|phone| sanitize(&phone))
            .filter(|phone| !phone.is_empty()),
        subject: clean(form.subject),
        message: clean(form.message),
        language: form
            .language
            .as_deref()
            .map(Locale::from_tag)
            .unwrap_or_default(),
        send_copy: form.send_copy.unwrap_or(true),
        metadata,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, CLIENT_IP_HEADER)
        .or_else(|| {
            header_str(headers, FORWARDED_FOR_HEADER)
                .and_then(|list| list.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
        })
        .map(str::to_string)
}

/// Host the request was addressed to, without port.
///
/// HTTP/2 clients usually send the authority in the URI instead of `Host`.
fn request_hostname(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let hostname = match header_str(headers, header::HOST.as_str()) {
        Some(host) => strip_port(host),
        None => uri.authority()?.host(),
    };
    let hostname = hostname.trim_start_matches('[').trim_end_matches(']');
    (!hostname.is_empty()).then(|| hostname.to_ascii_lowercase())
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [::1]:8787
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.split(':').next().unwrap_or(host)
    }
}

async fn security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    let fixed: [(HeaderName, &'static str); 6] = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
        (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        (header::PRAGMA, "no-cache"),
        (header::EXPIRES, "0"),
    ];
    for (name, value) in fixed {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

impl IntoResponse for ContactError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, body) = match &self {
            ContactError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, json!({ "error": message }))
            }
            ContactError::OriginNotAllowed => (StatusCode::FORBIDDEN, json!({ "error": message })),
            ContactError::MissingSignature | ContactError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, json!({ "error": message }))
            }
            ContactError::InvalidInput | ContactError::InvalidEmail => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ContactError::MissingFields(fields) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "fields": fields }),
            ),
            ContactError::CaptchaFailed(codes) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message, "error_codes": codes }),
            ),
            ContactError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, json!({ "error": message }))
            }
            ContactError::QueueUnavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
            }
            ContactError::ServiceUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": message }))
            }
        };

        let mut response = (status, Json(body)).into_response();
        match self {
            ContactError::MethodNotAllowed => {
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("POST"));
            }
            ContactError::RateLimited { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            _ => {}
        }
        response
    }
}
