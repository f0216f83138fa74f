//! Local adapter tests.

use contact_relay::providers::LocalProvider;
use contact_relay::testing::*;
use contact_relay::{DeliveryError, EmailMessage, EmailProvider};

fn email_to(to: &str, subject: &str) -> EmailMessage {
    EmailMessage::new()
        .from("noreply@phialo.de")
        .to(to)
        .subject(subject)
        .text("Hallo!")
}

#[tokio::test]
async fn send_captures_email() {
    let provider = LocalProvider::new();

    let result = provider
        .send(&email_to("info@phialo.de", "Neue Kontaktanfrage: Ring"))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_email_sent(&provider);
    assert_email_to(&provider, "info@phialo.de");
    assert_email_subject_contains(&provider, "Kontaktanfrage");
    assert_eq!(
        provider.last_email().unwrap().id,
        result.message_id().unwrap()
    );
}

#[tokio::test]
async fn clones_share_the_mailbox() {
    let provider = LocalProvider::new();
    let handle = provider.clone();

    handle.send(&email_to("a@example.com", "One")).await.unwrap();
    handle.send(&email_to("b@example.com", "Two")).await.unwrap();

    assert_email_count(&provider, 2);
    let subjects: Vec<_> = provider
        .emails()
        .into_iter()
        .map(|captured| captured.message.subject)
        .collect();
    assert_eq!(subjects, vec!["One", "Two"]);
}

#[tokio::test]
async fn flush_empties_the_mailbox() {
    let provider = LocalProvider::new();
    provider.send(&email_to("a@example.com", "One")).await.unwrap();

    let flushed = provider.flush();
    assert_eq!(flushed.len(), 1);
    assert_no_emails_sent(&provider);
}

#[tokio::test]
async fn forced_failures() {
    let provider = LocalProvider::named("primary");

    provider.set_failure("mailbox full");
    let result = provider.send(&email_to("a@example.com", "One")).await.unwrap();
    assert_eq!(result.error(), Some("mailbox full"));
    assert_eq!(result.provider(), "primary");

    provider.set_transport_failure("connection reset");
    assert!(matches!(
        provider.send(&email_to("a@example.com", "One")).await,
        Err(DeliveryError::HttpError(_))
    ));

    provider.clear_failure();
    provider.send(&email_to("a@example.com", "One")).await.unwrap();

    assert_eq!(provider.attempt_count(), 3);
    assert_email_count(&provider, 1);
}

#[tokio::test]
async fn find_emails_by_predicate() {
    let provider = LocalProvider::new();
    provider.send(&email_to("a@example.com", "One")).await.unwrap();
    provider
        .send(&email_to("b@example.com", "Two").tag("contact-form"))
        .await
        .unwrap();

    let tagged = provider.find_emails(|m| m.tags.iter().any(|t| t == "contact-form"));
    assert_eq!(tagged.len(), 1);
    assert_eq!(get_emails_to(&provider, "a@example.com").len(), 1);
    refute_email_to(&provider, "c@example.com");
}
