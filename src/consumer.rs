//! Queue consumer that turns contact-form envelopes into emails.
//!
//! The consumer receives a batch, builds one [`DeliveryService`] for the whole
//! batch and then handles every message on its own: a failure in one message
//! never changes the decision recorded for another. Each decision is recorded
//! on the queue as soon as its handler returns, so an interrupted batch leaves
//! every undecided message redeliverable.
//!
//! ```rust,ignore
//! use contact_relay::consumer::{ConsumerConfig, EmailQueueConsumer};
//!
//! let consumer = EmailQueueConsumer::from_config(&relay_config);
//! loop {
//!     let batch = queue.receive(10).await;
//!     let report = consumer.process_batch(batch).await;
//!     tracing::info!(acked = report.acknowledged(), "Batch done");
//! }
//! ```

use serde_json::Value;
use std::sync::Arc;

use crate::address::Address;
use crate::config::RelayConfig;
use crate::contact::ContactSubmission;
use crate::delivery::DeliveryService;
use crate::email::EmailMessage;
use crate::error::DeliveryError;
use crate::queue::{Batch, MessageType, QueueDelivery, QueueEnvelope, QueueProducer};
use crate::template::{render_confirmation, render_notification};

/// Decision a message handler hands back to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Fully handled.
    Ack,
    /// Handled, but an optional step failed. Still acknowledged.
    Degraded(String),
    /// Not handled; the message should be delivered again.
    Retry(String),
}

/// What finally happened to one message of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acknowledged { degraded: bool },
    Retried { reason: String },
    DeadLettered { reason: String },
}

/// Per-message outcomes of one batch, in batch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<(String, DeliveryOutcome)>,
}

impl BatchReport {
    /// Outcome recorded for the message with `id`.
    pub fn outcome(&self, id: &str) -> Option<&DeliveryOutcome> {
        self.outcomes
            .iter()
            .find(|(message_id, _)| message_id == id)
            .map(|(_, outcome)| outcome)
    }

    pub fn acknowledged(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Acknowledged { .. }))
    }

    pub fn retried(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::Retried { .. }))
    }

    pub fn dead_lettered(&self) -> usize {
        self.count(|o| matches!(o, DeliveryOutcome::DeadLettered { .. }))
    }

    fn count(&self, predicate: impl Fn(&DeliveryOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

/// Sender and operator addresses used for contact emails.
#[derive(Debug, Clone, PartialEq)]
pub struct MailRouting {
    /// Address every email is sent from.
    pub from_email: String,
    /// Operator inbox receiving notifications.
    pub to_email: String,
}

impl Default for MailRouting {
    fn default() -> Self {
        Self {
            from_email: "noreply@phialo.de".to_string(),
            to_email: "info@phialo.de".to_string(),
        }
    }
}

/// Consumer behaviour.
#[derive(Clone)]
pub struct ConsumerConfig {
    /// Redeliveries allowed before a failing message is dead-lettered.
    pub max_retries: u32,
    /// Where exhausted messages go. Without one they are logged and dropped.
    pub dead_letter: Option<Arc<dyn QueueProducer>>,
    /// Report a failed confirmation copy as a degraded acknowledgement.
    pub report_degraded: bool,
    pub routing: MailRouting,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            dead_letter: None,
            report_degraded: true,
            routing: MailRouting::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn dead_letter(mut self, producer: Arc<dyn QueueProducer>) -> Self {
        self.dead_letter = Some(producer);
        self
    }

    pub fn report_degraded(mut self, enabled: bool) -> Self {
        self.report_degraded = enabled;
        self
    }

    pub fn routing(mut self, routing: MailRouting) -> Self {
        self.routing = routing;
        self
    }
}

type ServiceFactory = Arc<dyn Fn() -> Result<DeliveryService, DeliveryError> + Send + Sync>;

/// Drains queue batches into the delivery service.
pub struct EmailQueueConsumer {
    factory: ServiceFactory,
    config: ConsumerConfig,
}

impl EmailQueueConsumer {
    /// Create a consumer. `factory` is called once per batch.
    pub fn new<F>(factory: F, config: ConsumerConfig) -> Self
    where
        F: Fn() -> Result<DeliveryService, DeliveryError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            config,
        }
    }

    /// Consumer for the relay configuration: providers, routing and retry budget.
    pub fn from_config(relay: &RelayConfig) -> Self {
        let config = ConsumerConfig::default()
            .max_retries(relay.queue_max_retries)
            .routing(relay.routing.clone());
        let relay = relay.clone();
        Self::new(move || DeliveryService::from_config(&relay), config)
    }

    /// Forward exhausted messages to `producer` instead of dropping them.
    pub fn with_dead_letter(mut self, producer: Arc<dyn QueueProducer>) -> Self {
        self.config.dead_letter = Some(producer);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Handle every message of `batch` and settle it on the queue.
    pub async fn process_batch(&self, batch: Batch) -> BatchReport {
        let mut report = BatchReport::default();
        if batch.is_empty() {
            return report;
        }

        tracing::info!(message_count = batch.len(), "Processing email queue batch");

        let service = match (self.factory)() {
            Ok(service) => service,
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize email service, retrying all messages");
                let reason = e.to_string();
                for delivery in &batch {
                    delivery.retry();
                    report.outcomes.push((
                        delivery.envelope().id.clone(),
                        DeliveryOutcome::Retried {
                            reason: reason.clone(),
                        },
                    ));
                }
                return report;
            }
        };

        for delivery in &batch {
            let envelope = delivery.envelope();
            tracing::info!(
                id = %envelope.id,
                message_type = envelope.message_type.as_str(),
                retry_count = envelope.retry_count,
                "Processing email message"
            );

            let outcome = self.handle(&service, envelope).await;
            let outcome = self.settle(delivery.as_ref(), outcome).await;
            report.outcomes.push((envelope.id.clone(), outcome));
        }

        tracing::info!(
            acknowledged = report.acknowledged(),
            retried = report.retried(),
            dead_lettered = report.dead_lettered(),
            "Email queue batch processed"
        );
        report
    }

    /// Dispatch one envelope by type.
    pub async fn handle(
        &self,
        service: &DeliveryService,
        envelope: &QueueEnvelope<Value>,
    ) -> HandlerOutcome {
        let submission = match &envelope.message_type {
            MessageType::ContactForm | MessageType::ContactConfirmation => {
                match envelope.decode::<ContactSubmission>() {
                    Ok(submission) => submission,
                    Err(e) => return HandlerOutcome::Retry(format!("Invalid payload: {}", e)),
                }
            }
            MessageType::Unknown(tag) => {
                return HandlerOutcome::Retry(format!("Unknown email message type: {}", tag))
            }
        };

        match envelope.message_type {
            MessageType::ContactForm => self.handle_contact_form(service, envelope, &submission).await,
            _ => match self.send_confirmation(service, envelope, &submission).await {
                Ok(()) => HandlerOutcome::Ack,
                Err(e) => HandlerOutcome::Retry(e.to_string()),
            },
        }
    }

    async fn handle_contact_form(
        &self,
        service: &DeliveryService,
        envelope: &QueueEnvelope<Value>,
        submission: &ContactSubmission,
    ) -> HandlerOutcome {
        let notification = match render_notification(submission) {
            Ok(rendered) => notification_message(submission, &self.config.routing, &envelope.id)
                .subject(rendered.subject)
                .html(rendered.html)
                .text(rendered.text),
            Err(e) => return HandlerOutcome::Retry(e.to_string()),
        };

        match service.send(&notification).await {
            Ok(result) => tracing::info!(
                message_id = result.message_id().unwrap_or_default(),
                provider = result.provider(),
                "Main contact form email sent"
            ),
            Err(e) => {
                return HandlerOutcome::Retry(format!("Failed to send main email: {}", e));
            }
        }

        if !submission.send_copy {
            return HandlerOutcome::Ack;
        }

        match self.send_confirmation(service, envelope, submission).await {
            Ok(()) => HandlerOutcome::Ack,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send confirmation email");
                if self.config.report_degraded {
                    HandlerOutcome::Degraded(e.to_string())
                } else {
                    HandlerOutcome::Ack
                }
            }
        }
    }

    async fn send_confirmation(
        &self,
        service: &DeliveryService,
        envelope: &QueueEnvelope<Value>,
        submission: &ContactSubmission,
    ) -> Result<(), DeliveryError> {
        let rendered = render_confirmation(submission)?;
        let message = confirmation_message(submission, &self.config.routing, &envelope.id)
            .subject(rendered.subject)
            .html(rendered.html)
            .text(rendered.text);

        let result = service.send(&message).await?;
        tracing::info!(
            message_id = result.message_id().unwrap_or_default(),
            "Confirmation email sent"
        );
        Ok(())
    }

    async fn settle(&self, delivery: &dyn QueueDelivery, outcome: HandlerOutcome) -> DeliveryOutcome {
        let envelope = delivery.envelope();

        let reason = match outcome {
            HandlerOutcome::Ack => {
                delivery.ack();
                tracing::info!(id = %envelope.id, "Email message acknowledged");
                return DeliveryOutcome::Acknowledged { degraded: false };
            }
            HandlerOutcome::Degraded(reason) => {
                delivery.ack();
                tracing::info!(id = %envelope.id, reason = %reason, "Email message acknowledged (degraded)");
                return DeliveryOutcome::Acknowledged { degraded: true };
            }
            HandlerOutcome::Retry(reason) => reason,
        };

        if envelope.retry_count < self.config.max_retries {
            tracing::error!(
                id = %envelope.id,
                retry_count = envelope.retry_count,
                error = %reason,
                "Failed to process email message"
            );
            delivery.retry();
            return DeliveryOutcome::Retried { reason };
        }

        match &self.config.dead_letter {
            Some(dead_letter) => match dead_letter.send(envelope.clone()).await {
                Ok(()) => {
                    delivery.ack();
                    tracing::error!(
                        id = %envelope.id,
                        message_type = envelope.message_type.as_str(),
                        error = %reason,
                        "Email message dead-lettered"
                    );
                    DeliveryOutcome::DeadLettered { reason }
                }
                Err(e) => {
                    tracing::error!(id = %envelope.id, error = %e, "Dead-letter forwarding failed");
                    delivery.retry();
                    DeliveryOutcome::Retried { reason }
                }
            },
            None => {
                delivery.ack();
                tracing::error!(
                    id = %envelope.id,
                    message_type = envelope.message_type.as_str(),
                    error = %reason,
                    payload = %envelope.data,
                    "Email message dropped after exhausting retries"
                );
                DeliveryOutcome::DeadLettered { reason }
            }
        }
    }
}

/// Operator notification skeleton: routing, reply-to, tags and metadata.
pub fn notification_message(
    submission: &ContactSubmission,
    routing: &MailRouting,
    envelope_id: &str,
) -> EmailMessage {
    EmailMessage::new()
        .from(("Phialo Website", routing.from_email.as_str()))
        .to(("Phialo Design", routing.to_email.as_str()))
        .reply_to(Address::with_name(
            submission.name.as_str(),
            submission.email.as_str(),
        ))
        .tag("contact-form")
        .tag(submission.language.as_str())
        .metadata("formId", "contact")
        .metadata("language", submission.language.as_str())
        .metadata("timestamp", submission.metadata.timestamp.to_rfc3339())
        .metadata("idempotencyKey", format!("{}-notification", envelope_id))
}

/// Confirmation copy skeleton addressed to the submitter.
pub fn confirmation_message(
    submission: &ContactSubmission,
    routing: &MailRouting,
    envelope_id: &str,
) -> EmailMessage {
    EmailMessage::new()
        .from(("Phialo Design", routing.from_email.as_str()))
        .to(Address::with_name(
            submission.name.as_str(),
            submission.email.as_str(),
        ))
        .tag("contact-form-confirmation")
        .tag(submission.language.as_str())
        .metadata("formId", "contact-confirmation")
        .metadata("language", submission.language.as_str())
        .metadata("timestamp", submission.metadata.timestamp.to_rfc3339())
        .metadata("idempotencyKey", format!("{}-confirmation", envelope_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{Locale, SubmissionMetadata};
    use chrono::Utc;

    fn submission() -> ContactSubmission {
        ContactSubmission {
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            phone: None,
            subject: "Hi".into(),
            message: "Hello".into(),
            language: Locale::En,
            send_copy: true,
            metadata: SubmissionMetadata::captured_at(Utc::now()),
        }
    }

    #[test]
    fn test_notification_message_routing() {
        let message = notification_message(&submission(), &MailRouting::default(), "abc");
        assert_eq!(message.from.unwrap().formatted(), "\"Phialo Website\" <noreply@phialo.de>");
        assert_eq!(message.to[0].email, "info@phialo.de");
        assert_eq!(message.reply_to.unwrap().email, "jane@example.com");
        assert_eq!(message.tags, vec!["contact-form", "en"]);
        assert_eq!(message.metadata["idempotencyKey"], "abc-notification");
    }

    #[test]
    fn test_confirmation_message_routing() {
        let message = confirmation_message(&submission(), &MailRouting::default(), "abc");
        assert_eq!(message.from.unwrap().name.as_deref(), Some("Phialo Design"));
        assert_eq!(message.to[0].formatted(), "\"Jane Doe\" <jane@example.com>");
        assert!(message.reply_to.is_none());
        assert_eq!(message.tags, vec!["contact-form-confirmation", "en"]);
    }

    #[test]
    fn test_batch_report_counts() {
        let report = BatchReport {
            outcomes: vec![
                ("a".into(), DeliveryOutcome::Acknowledged { degraded: false }),
                ("b".into(), DeliveryOutcome::Retried { reason: "x".into() }),
                ("c".into(), DeliveryOutcome::DeadLettered { reason: "y".into() }),
            ],
        };
        assert_eq!(report.acknowledged(), 1);
        assert_eq!(report.retried(), 1);
        assert_eq!(report.dead_lettered(), 1);
        assert_eq!(
            report.outcome("b"),
            Some(&DeliveryOutcome::Retried { reason: "x".into() })
        );
    }
}
