//! Logger adapter tests.

use contact_relay::providers::LoggerProvider;
use contact_relay::{EmailMessage, EmailProvider};

fn contact_email() -> EmailMessage {
    EmailMessage::new()
        .from(("Phialo Website", "noreply@phialo.de"))
        .to(("Phialo Design", "info@phialo.de"))
        .reply_to("jane@example.com")
        .subject("Neue Kontaktanfrage: Ring")
        .html("<p>Hallo</p>")
        .text("Hallo")
        .tag("contact-form")
        .tag("de")
        .metadata("formId", "contact")
        .metadata("language", "de")
        .metadata("idempotencyKey", "m-1-notification")
}

#[tokio::test]
async fn send_accepts_and_reports_logger() {
    let provider = LoggerProvider::new();

    let result = provider.send(&contact_email()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.provider(), "logger");
}

#[tokio::test]
async fn redelivered_send_logs_the_same_message_id() {
    let provider = LoggerProvider::new().log_bodies(true);

    let first = provider.send(&contact_email()).await.unwrap();
    let second = provider.send(&contact_email()).await.unwrap();
    assert_eq!(first.message_id(), Some("logger-m-1-notification"));
    assert_eq!(first.message_id(), second.message_id());
}

#[tokio::test]
async fn messages_without_idempotency_key_get_distinct_ids() {
    let provider = LoggerProvider::new();
    let message = EmailMessage::new()
        .from("noreply@phialo.de")
        .to("info@phialo.de")
        .subject("Test")
        .text("x");

    let first = provider.send(&message).await.unwrap();
    let second = provider.send(&message).await.unwrap();
    assert_ne!(first.message_id(), second.message_id());
}

#[tokio::test]
async fn is_always_available() {
    assert!(LoggerProvider::new().is_available().await);
    assert_eq!(LoggerProvider::new().name(), "logger");
}
