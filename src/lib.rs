//! # contact-relay
//!
//! Reliable delivery for a public contact form: accept a submission over
//! HTTP, screen it, queue it, and deliver an operator notification plus an
//! optional confirmation copy through an ordered list of email providers.
//!
//! ## Flow
//!
//! ```text
//! POST /api/contact ─▶ ingress ─▶ turnstile ─▶ queue ─┐
//!                                                     │ (async)
//!        provider ◀── delivery ◀── template ◀── consumer
//! ```
//!
//! The ingress answers `202 Accepted` as soon as the submission is queued.
//! The consumer retries failed deliveries through the queue and dead-letters
//! a message once its redelivery budget is spent.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contact_relay::prelude::*;
//!
//! let config = RelayConfig::from_env()?;
//! let queue = MemoryQueue::new();
//!
//! let app = contact_router(ContactState::from_config(&config, Arc::new(queue.clone()))?);
//! let consumer = EmailQueueConsumer::from_config(&config);
//!
//! tokio::spawn(async move {
//!     loop {
//!         consumer.process_batch(queue.receive(10).await).await;
//!     }
//! });
//! axum::serve(listener, app).await?;
//! ```
//!
//! See [`config`] for the environment variables.
//!
//! ## Feature Flags
//!
//! - `resend` - Resend API provider (default)
//! - `sendgrid` - SendGrid API provider (default)
//! - `metrics` - Prometheus-style metrics (counters/histograms)
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `contact_relay_emails_total` | Counter | provider, status | Provider attempts |
//! | `contact_relay_delivery_duration_seconds` | Histogram | provider | Attempt duration |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the contact-relay crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod email;
mod error;
mod provider;

pub mod config;
pub mod consumer;
pub mod contact;
pub mod delivery;
pub mod ingress;
pub mod providers;
pub mod queue;
pub mod rate_limit;
pub mod signing;
pub mod template;
pub mod testing;
pub mod turnstile;

// Re-exports
pub use address::{is_valid_email, normalize_domain, Address};
pub use email::EmailMessage;
pub use error::{ConfigError, ContactError, DeliveryError, QueueError, VerifyError};
pub use provider::{EmailProvider, ProviderResult};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::RelayConfig;
    pub use crate::consumer::{ConsumerConfig, DeliveryOutcome, EmailQueueConsumer};
    pub use crate::contact::{ContactSubmission, Locale};
    pub use crate::delivery::{DeliveryConfig, DeliveryService};
    pub use crate::ingress::{contact_router, ContactState};
    pub use crate::queue::{MemoryQueue, QueueEnvelope, QueueProducer};
    pub use crate::turnstile::{ChallengeVerifier, TurnstileConfig, TurnstileVerifier};
    pub use crate::{Address, DeliveryError, EmailMessage, EmailProvider, ProviderResult};
    pub use std::sync::Arc;
}
