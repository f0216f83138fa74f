//! Resend adapter tests.

use contact_relay::providers::ResendProvider;
use contact_relay::{Address, EmailMessage, EmailProvider};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helper Functions
// ============================================================================

fn valid_email() -> EmailMessage {
    EmailMessage::new()
        .from("noreply@phialo.de")
        .to("info@phialo.de")
        .subject("Neue Kontaktanfrage: Ring")
        .html("<p>Hallo</p>")
        .text("Hallo")
}

fn success_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "049b9217-30b5-4f61-a8e3-4d2d12f9f5a7"
    }))
}

// ============================================================================
// Basic Delivery Tests
// ============================================================================

#[tokio::test]
async fn successful_delivery_returns_message_id() {
    let server = MockServer::start().await;
    let provider = ResendProvider::new("re_123456789").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("Authorization", "Bearer re_123456789"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({
            "from": "noreply@phialo.de",
            "to": ["info@phialo.de"],
            "subject": "Neue Kontaktanfrage: Ring",
            "html": "<p>Hallo</p>",
            "text": "Hallo"
        })))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.provider(), "resend");
    assert_eq!(
        result.message_id(),
        Some("049b9217-30b5-4f61-a8e3-4d2d12f9f5a7")
    );
}

#[tokio::test]
async fn all_fields_are_mapped() {
    let server = MockServer::start().await;
    let provider = ResendProvider::new("re_123456789").base_url(server.uri());

    let email = EmailMessage::new()
        .from(("Phialo Website", "noreply@phialo.de"))
        .to(("Phialo Design", "info@phialo.de"))
        .cc("cc@phialo.de")
        .bcc("audit@phialo.de")
        .reply_to(("Jane Doe", "jane@example.com"))
        .subject("Neue Kontaktanfrage: Ring")
        .text("Hallo")
        .tag("contact-form")
        .tag("de");

    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(body_json(json!({
            "from": "\"Phialo Website\" <noreply@phialo.de>",
            "to": ["\"Phialo Design\" <info@phialo.de>"],
            "cc": ["cc@phialo.de"],
            "bcc": ["audit@phialo.de"],
            "reply_to": ["jane@example.com"],
            "subject": "Neue Kontaktanfrage: Ring",
            "text": "Hallo",
            "tags": [
                {"name": "contact-form", "value": "true"},
                {"name": "de", "value": "true"}
            ]
        })))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    assert!(provider.send(&email).await.unwrap().is_success());
}

#[tokio::test]
async fn idempotency_key_metadata_becomes_header() {
    let server = MockServer::start().await;
    let provider = ResendProvider::new("re_123456789").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("Idempotency-Key", "msg-1-notification"))
        .respond_with(success_response())
        .expect(1)
        .mount(&server)
        .await;

    let email = valid_email().metadata("idempotencyKey", "msg-1-notification");
    assert!(provider.send(&email).await.unwrap().is_success());
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn success_without_id_is_a_failure() {
    let server = MockServer::start().await;
    let provider = ResendProvider::new("re_123456789").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert!(!result.is_success());
    assert!(result.error().unwrap().contains("no message ID"));
}

#[tokio::test]
async fn error_message_comes_from_body() {
    let server = MockServer::start().await;
    let provider = ResendProvider::new("re_123456789").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "statusCode": 422,
            "name": "validation_error",
            "message": "Invalid `to` field."
        })))
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.error(), Some("Resend API error: Invalid `to` field."));
    assert_eq!(result.details().unwrap()["name"], "validation_error");
}

#[tokio::test]
async fn error_without_body_uses_status_text() {
    let server = MockServer::start().await;
    let provider = ResendProvider::new("re_123456789").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert_eq!(
        result.error(),
        Some("Resend API error: HTTP 500: Internal Server Error")
    );
}

#[tokio::test]
async fn unreachable_server_is_an_error() {
    let provider = ResendProvider::new("re_123456789").base_url("http://127.0.0.1:1");
    let result = provider.send(&valid_email()).await;
    assert!(matches!(result, Err(contact_relay::DeliveryError::HttpError(_))));
}

#[tokio::test]
async fn missing_sender_is_rejected_before_request() {
    let provider = ResendProvider::new("re_123456789").base_url("http://127.0.0.1:1");
    let email = EmailMessage::new()
        .to(Address::new("info@phialo.de"))
        .subject("x")
        .text("x");

    assert!(matches!(
        provider.send(&email).await,
        Err(contact_relay::DeliveryError::InvalidMessage(_))
    ));
}
