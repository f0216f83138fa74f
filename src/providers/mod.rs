//! Email provider implementations.
//!
//! Each provider implements the [`EmailProvider`](crate::EmailProvider) trait.
//!
//! ## Available Providers
//!
//! | Provider | Feature Flag | Description |
//! |----------|-------------|-------------|
//! | [`ResendProvider`] | `resend` | Resend API |
//! | [`SendGridProvider`] | `sendgrid` | SendGrid API |
//! | [`LoggerProvider`] | (none) | Dry run: logs routing and idempotency key |
//! | [`LocalProvider`] | (none) | In-memory capture for dev/testing |

#[cfg(feature = "resend")]
mod resend;
#[cfg(feature = "resend")]
pub use resend::ResendProvider;

#[cfg(feature = "sendgrid")]
mod sendgrid;
#[cfg(feature = "sendgrid")]
pub use sendgrid::SendGridProvider;

mod local;
pub use local::{CapturedEmail, LocalProvider};

mod logger;
pub use logger::{LoggedEmail, LoggerProvider};
