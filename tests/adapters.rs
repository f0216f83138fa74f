//! Adapter integration tests.
//!
//! Tests for email provider adapters against mocked provider APIs.

#[path = "adapters/local_test.rs"]
mod local_test;
#[path = "adapters/logger_test.rs"]
mod logger_test;
#[cfg(feature = "resend")]
#[path = "adapters/resend_test.rs"]
mod resend_test;
#[cfg(feature = "sendgrid")]
#[path = "adapters/sendgrid_test.rs"]
mod sendgrid_test;
