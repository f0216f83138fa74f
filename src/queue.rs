//! Queue message contract and an in-memory at-least-once transport.
//!
//! Producers enqueue [`QueueEnvelope`]s. Consumers receive a batch of
//! [`QueueDelivery`] handles and settle each one with `ack()` or `retry()`.
//! A retried (or never settled) message comes back with the same id and a
//! `retryCount` one higher, after a [`RedeliveryBackoff`] delay that doubles
//! with every redelivery; an acknowledged message never comes back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::QueueError;

/// Discriminator carried in every envelope's `type` field.
///
/// Tags this build does not know are kept verbatim in [`MessageType::Unknown`]
/// so a dead-lettered envelope still says what it was.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    ContactForm,
    ContactConfirmation,
    Unknown(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::ContactForm => "contact-form",
            MessageType::ContactConfirmation => "contact-confirmation",
            MessageType::Unknown(tag) => tag,
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "contact-form" => MessageType::ContactForm,
            "contact-confirmation" => MessageType::ContactConfirmation,
            _ => MessageType::Unknown(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// A queued message.
///
/// `id` is assigned once when the envelope is created and survives every
/// redelivery; `retry_count` starts at 0 and grows by one per redelivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEnvelope<T> {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    pub data: T,
}

impl<T> QueueEnvelope<T> {
    /// Wrap `data` in a fresh envelope.
    pub fn new(message_type: MessageType, data: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            timestamp: Utc::now(),
            retry_count: 0,
            data,
        }
    }
}

impl<T: Serialize> QueueEnvelope<T> {
    /// Convert the payload to JSON for transport.
    pub fn into_value(self) -> Result<QueueEnvelope<Value>, QueueError> {
        Ok(QueueEnvelope {
            id: self.id,
            message_type: self.message_type,
            timestamp: self.timestamp,
            retry_count: self.retry_count,
            data: serde_json::to_value(self.data)?,
        })
    }
}

impl QueueEnvelope<Value> {
    /// Decode the JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Sending side of a queue.
#[async_trait]
pub trait QueueProducer: Send + Sync {
    async fn send(&self, envelope: QueueEnvelope<Value>) -> Result<(), QueueError>;
}

/// One received message awaiting a decision.
///
/// Only the first of `ack()`/`retry()` takes effect.
pub trait QueueDelivery: Send + Sync {
    fn envelope(&self) -> &QueueEnvelope<Value>;

    /// Delivery attempt number, starting at 1.
    fn attempts(&self) -> u32 {
        self.envelope().retry_count + 1
    }

    fn ack(&self);

    fn retry(&self);
}

/// A batch as handed to a consumer.
pub type Batch = Vec<Box<dyn QueueDelivery>>;

/// Delay before the first redelivery of a retried message.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(30);

/// Upper bound for any single redelivery delay.
pub const MAX_REDELIVERY_DELAY: Duration = Duration::from_secs(10 * 60);

/// Acknowledged ids remembered for [`MemoryQueue::is_acked`].
pub const ACK_HISTORY: usize = 1024;

/// How long a retried message is held back before it can be received again.
///
/// The n-th redelivery waits `base * 2^(n-1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl RedeliveryBackoff {
    /// Redeliver immediately.
    pub const NONE: Self = Self {
        base: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay for an envelope whose `retry_count` has just become `retry_count`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        self.base.saturating_mul(1 << exponent).min(self.max)
    }
}

impl Default for RedeliveryBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_REDELIVERY_DELAY, MAX_REDELIVERY_DELAY)
    }
}

struct Pending {
    envelope: QueueEnvelope<Value>,
    not_before: Option<Instant>,
}

impl Pending {
    fn is_due(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Pending>,
    in_flight: HashMap<String, QueueEnvelope<Value>>,
    recent_acks: VecDeque<String>,
    acked_total: usize,
    unavailable: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    ready: Notify,
    backoff: RedeliveryBackoff,
}

impl Shared {
    fn redeliver(&self, id: &str) {
        let mut state = self.state.lock();
        if let Some(mut envelope) = state.in_flight.remove(id) {
            envelope.retry_count += 1;
            let delay = self.backoff.delay_for(envelope.retry_count);
            tracing::debug!(
                id = %envelope.id,
                retry_count = envelope.retry_count,
                delay_ms = delay.as_millis() as u64,
                "Message scheduled for redelivery"
            );
            let not_before = (!delay.is_zero()).then(|| Instant::now() + delay);
            state.pending.push_back(Pending {
                envelope,
                not_before,
            });
            drop(state);
            // Wakes a waiting receiver so it can re-arm its timer.
            self.ready.notify_one();
        }
    }

    fn acknowledge(&self, id: &str) {
        let mut state = self.state.lock();
        if state.in_flight.remove(id).is_some() {
            state.acked_total += 1;
            if state.recent_acks.len() == ACK_HISTORY {
                state.recent_acks.pop_front();
            }
            state.recent_acks.push_back(id.to_string());
        }
    }
}

/// In-process at-least-once queue.
///
/// Clones share the same queue. Useful for the standalone binary and tests;
/// production deployments plug a durable transport in behind
/// [`QueueProducer`] and [`QueueDelivery`].
#[derive(Clone)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    /// Queue with the default [`RedeliveryBackoff`].
    pub fn new() -> Self {
        Self::with_backoff(RedeliveryBackoff::default())
    }

    pub fn with_backoff(backoff: RedeliveryBackoff) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                ready: Notify::new(),
                backoff,
            }),
        }
    }

    /// Make `send` fail, simulating an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.state.lock().unavailable = unavailable;
    }

    /// Take up to `max` messages that are due, without waiting.
    ///
    /// Messages still held back for redelivery stay queued.
    pub fn try_receive(&self, max: usize) -> Batch {
        let now = Instant::now();
        let mut state = self.shared.state.lock();

        let mut taken = Vec::new();
        let mut waiting = VecDeque::with_capacity(state.pending.len());
        while let Some(entry) = state.pending.pop_front() {
            if taken.len() < max && entry.is_due(now) {
                taken.push(entry.envelope);
            } else {
                waiting.push_back(entry);
            }
        }
        state.pending = waiting;

        taken
            .into_iter()
            .map(|envelope| {
                state
                    .in_flight
                    .insert(envelope.id.clone(), envelope.clone());
                Box::new(MemoryDelivery {
                    envelope,
                    shared: Arc::clone(&self.shared),
                    settled: AtomicBool::new(false),
                }) as Box<dyn QueueDelivery>
            })
            .collect()
    }

    /// Wait until at least one message is due, then take up to `max`.
    pub async fn receive(&self, max: usize) -> Batch {
        loop {
            let notified = self.shared.ready.notified();
            let batch = self.try_receive(max);
            if !batch.is_empty() {
                return batch;
            }

            match self.next_due() {
                Some(at) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.shared
            .state
            .lock()
            .pending
            .iter()
            .filter_map(|entry| entry.not_before)
            .min()
    }

    /// Messages waiting for delivery, including ones held back for redelivery.
    pub fn pending(&self) -> Vec<QueueEnvelope<Value>> {
        self.shared
            .state
            .lock()
            .pending
            .iter()
            .map(|entry| entry.envelope.clone())
            .collect()
    }

    /// Number of messages waiting for delivery.
    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Number of delivered but unsettled messages.
    pub fn in_flight_len(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Whether the message with `id` is among the last [`ACK_HISTORY`]
    /// acknowledged ones.
    pub fn is_acked(&self, id: &str) -> bool {
        self.shared.state.lock().recent_acks.iter().any(|acked| acked == id)
    }

    /// Number of messages acknowledged since the queue was created.
    pub fn acked_len(&self) -> usize {
        self.shared.state.lock().acked_total
    }
}

#[async_trait]
impl QueueProducer for MemoryQueue {
    async fn send(&self, envelope: QueueEnvelope<Value>) -> Result<(), QueueError> {
        {
            let mut state = self.shared.state.lock();
            if state.unavailable {
                return Err(QueueError::Send("queue is unavailable".into()));
            }
            tracing::debug!(id = %envelope.id, message_type = envelope.message_type.as_str(), "Message enqueued");
            state.pending.push_back(Pending {
                envelope,
                not_before: None,
            });
        }
        self.shared.ready.notify_one();
        Ok(())
    }
}

struct MemoryDelivery {
    envelope: QueueEnvelope<Value>,
    shared: Arc<Shared>,
    settled: AtomicBool,
}

impl MemoryDelivery {
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::SeqCst)
    }
}

impl QueueDelivery for MemoryDelivery {
    fn envelope(&self) -> &QueueEnvelope<Value> {
        &self.envelope
    }

    fn ack(&self) {
        if self.settle() {
            self.shared.acknowledge(&self.envelope.id);
        }
    }

    fn retry(&self) {
        if self.settle() {
            self.shared.redeliver(&self.envelope.id);
        }
    }
}

// A handle dropped without a decision is redelivered.
impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        if self.settle() {
            self.shared.redeliver(&self.envelope.id);
        }
    }
}
