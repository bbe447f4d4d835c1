use crate::configuration::InMemoryQueueSettings;
use crate::consumers::{Message, MessageId, ReceiptHandle};
use crate::queue::{Queue, QueueError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A message as stored by the queue, between deliveries.
#[derive(Debug, Clone)]
struct StoredMessage {
    id: MessageId,
    body: Vec<u8>,
    attributes: HashMap<String, String>,
    /// Number of times the message has been handed out so far.
    deliveries: u32,
    /// The message is not visible before this instant.
    available_at: Instant,
}

/// A message handed out to a consumer and not yet deleted or requeued.
#[derive(Debug)]
struct InFlightMessage {
    message: StoredMessage,
    visible_again_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<ReceiptHandle, InFlightMessage>,
}

impl QueueState {
    /// Move in-flight messages whose visibility timeout expired back into the pending set.
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<ReceiptHandle> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.visible_again_at <= now)
            .map(|(handle, _)| handle.clone())
            .collect();
        for handle in expired {
            if let Some(in_flight) = self.in_flight.remove(&handle) {
                tracing::debug!(
                    message_id = %in_flight.message.id,
                    "Visibility timeout expired, the message is visible again"
                );
                let mut message = in_flight.message;
                message.available_at = now;
                self.pending.push_back(message);
            }
        }
    }

    /// The earliest instant at which something may become visible.
    fn next_change(&self) -> Option<Instant> {
        let pending = self.pending.iter().map(|m| m.available_at);
        let in_flight = self.in_flight.values().map(|m| m.visible_again_at);
        pending.chain(in_flight).min()
    }
}

/// An in-memory [`Queue`] with SQS-like semantics.
///
/// - messages are handed out in FIFO order among the visible ones;
/// - a dequeued message stays invisible for the configured visibility timeout, after which it
///   is redelivered unless it has been deleted or requeued;
/// - every delivery carries a fresh receipt handle: deleting with a stale handle fails.
///
/// Use an [`InMemoryBroker`] to get queues by name.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    settings: InMemoryQueueSettings,
    state: Mutex<QueueState>,
    message_available: Notify,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>, settings: InMemoryQueueSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            state: Mutex::new(QueueState::default()),
            message_available: Notify::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of messages waiting to be delivered, including delayed ones.
    pub fn approximate_number_of_messages(&self) -> usize {
        self.state().pending.len()
    }

    /// Number of messages handed out and not yet deleted, requeued or expired.
    pub fn in_flight_count(&self) -> usize {
        self.state().in_flight.len()
    }

    /// `true` if the queue holds no message at all, in flight or not.
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.pending.is_empty() && state.in_flight.is_empty()
    }

    /// Hand out the first visible message, if any. Never blocks.
    fn try_receive(&self, now: Instant) -> Option<Message> {
        let mut state = self.state();
        state.reclaim_expired(now);

        let position = state.pending.iter().position(|m| m.available_at <= now)?;
        let mut stored = state.pending.remove(position)?;
        stored.deliveries += 1;

        let receipt_handle = ReceiptHandle::new();
        let message = Message {
            id: stored.id,
            queue_name: self.name.clone(),
            body: stored.body.clone(),
            attributes: stored.attributes.clone(),
            receive_attempt: stored.deliveries,
            receipt_handle: receipt_handle.clone(),
        };
        state.in_flight.insert(
            receipt_handle,
            InFlightMessage {
                message: stored,
                visible_again_at: now + self.settings.visibility_timeout(),
            },
        );
        Some(message)
    }

    fn not_in_flight(message: &Message) -> QueueError {
        QueueError::ReceiptHandleNotFound {
            message_id: message.id,
            receipt_handle: message.receipt_handle.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Queue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(
        &self,
        body: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> Result<MessageId, QueueError> {
        let id = MessageId::new();
        self.state().pending.push_back(StoredMessage {
            id,
            body,
            attributes,
            deliveries: 0,
            available_at: Instant::now(),
        });
        self.message_available.notify_one();
        Ok(id)
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Message>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            let now = Instant::now();
            // Nothing is awaited between taking the message and returning it,
            // which keeps `dequeue` cancel safe.
            if let Some(message) = self.try_receive(now) {
                return Ok(Some(message));
            }
            if now >= deadline {
                return Ok(None);
            }

            let wake_up_at = self
                .state()
                .next_change()
                .map_or(deadline, |next| next.min(deadline));
            tokio::select! {
                _ = self.message_available.notified() => {}
                _ = tokio::time::sleep_until(wake_up_at) => {}
            }
        }
    }

    async fn delete(&self, message: &Message) -> Result<(), QueueError> {
        self.state()
            .in_flight
            .remove(&message.receipt_handle)
            .map(|_| ())
            .ok_or_else(|| Self::not_in_flight(message))
    }

    async fn requeue(&self, message: &Message) -> Result<(), QueueError> {
        {
            let mut state = self.state();
            let in_flight = state
                .in_flight
                .remove(&message.receipt_handle)
                .ok_or_else(|| Self::not_in_flight(message))?;
            let mut stored = in_flight.message;
            stored.available_at = Instant::now() + self.settings.requeue_delay();
            state.pending.push_back(stored);
        }
        self.message_available.notify_one();
        Ok(())
    }
}

/// A set of named [`InMemoryQueue`]s sharing the same settings.
///
/// Queues are created the first time they are asked for. `InMemoryBroker` is cheap to clone:
/// all clones share the same queues.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    settings: InMemoryQueueSettings,
    queues: Mutex<HashMap<String, Arc<InMemoryQueue>>>,
}

impl InMemoryBroker {
    pub fn new(settings: InMemoryQueueSettings) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                settings,
                queues: Mutex::default(),
            }),
        }
    }

    /// Get the queue called `name`, creating it if it does not exist yet.
    pub fn queue(&self, name: &str) -> Arc<InMemoryQueue> {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(InMemoryQueue::new(name, self.inner.settings.clone())))
            .clone()
    }

    /// The names of all the queues created so far.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
