//! SendGrid adapter tests.

use contact_relay::providers::SendGridProvider;
use contact_relay::{EmailMessage, EmailProvider};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn valid_email() -> EmailMessage {
    EmailMessage::new()
        .from("noreply@phialo.de")
        .to("info@phialo.de")
        .subject("New Contact Request: Ring")
        .html("<p>Hello</p>")
        .text("Hello")
}

#[tokio::test]
async fn successful_delivery_uses_message_id_header() {
    let server = MockServer::start().await;
    let provider = SendGridProvider::new("SG.test").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .and(header("Authorization", "Bearer SG.test"))
        .and(body_json(json!({
            "personalizations": [{"to": [{"email": "info@phialo.de"}]}],
            "from": {"email": "noreply@phialo.de"},
            "subject": "New Contact Request: Ring",
            "content": [
                {"type": "text/plain", "value": "Hello"},
                {"type": "text/html", "value": "<p>Hello</p>"}
            ]
        })))
        .respond_with(ResponseTemplate::new(202).insert_header("X-Message-Id", "sg-abc123"))
        .expect(1)
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.provider(), "sendgrid");
    assert_eq!(result.message_id(), Some("sg-abc123"));
}

#[tokio::test]
async fn missing_message_id_header_generates_one() {
    let server = MockServer::start().await;
    let provider = SendGridProvider::new("SG.test").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert!(result.message_id().unwrap().starts_with("sendgrid-"));
}

#[tokio::test]
async fn tags_and_metadata_are_mapped() {
    let server = MockServer::start().await;
    let provider = SendGridProvider::new("SG.test").base_url(server.uri());

    let email = EmailMessage::new()
        .from(("Phialo Website", "noreply@phialo.de"))
        .to(("Phialo Design", "info@phialo.de"))
        .reply_to("jane@example.com")
        .subject("New Contact Request: Ring")
        .text("Hello")
        .tag("contact-form")
        .metadata("formId", "msg-1")
        .metadata("attempt", 2);

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .and(body_json(json!({
            "personalizations": [{"to": [{"email": "info@phialo.de", "name": "Phialo Design"}]}],
            "from": {"email": "noreply@phialo.de", "name": "Phialo Website"},
            "reply_to": {"email": "jane@example.com"},
            "subject": "New Contact Request: Ring",
            "content": [{"type": "text/plain", "value": "Hello"}],
            "categories": ["contact-form"],
            "custom_args": {"formId": "msg-1", "attempt": "2"}
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    assert!(provider.send(&email).await.unwrap().is_success());
}

#[tokio::test]
async fn compressed_request_sets_content_encoding() {
    let server = MockServer::start().await;
    let provider = SendGridProvider::new("SG.test")
        .base_url(server.uri())
        .compress(true);

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .and(header("Content-Encoding", "gzip"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    assert!(provider.send(&valid_email()).await.unwrap().is_success());
}

#[tokio::test]
async fn error_messages_are_joined() {
    let server = MockServer::start().await;
    let provider = SendGridProvider::new("SG.test").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [
                {"message": "The from address does not match a verified Sender Identity.", "field": "from"},
                {"message": "Invalid reply_to.", "field": "reply_to"}
            ]
        })))
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert!(!result.is_success());
    assert_eq!(
        result.error(),
        Some("SendGrid error: The from address does not match a verified Sender Identity.; Invalid reply_to.")
    );
}

#[tokio::test]
async fn error_without_body_uses_status_text() {
    let server = MockServer::start().await;
    let provider = SendGridProvider::new("SG.test").base_url(server.uri());

    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = provider.send(&valid_email()).await.unwrap();
    assert_eq!(result.error(), Some("SendGrid error: Unauthorized"));
}

#[tokio::test]
async fn availability_requires_api_key() {
    assert!(SendGridProvider::new("SG.test").is_available().await);
    assert!(!SendGridProvider::new("").is_available().await);
}
