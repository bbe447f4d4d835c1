//! The queue contract the pipeline depends on, plus an in-memory implementation with
//! visibility-timeout semantics.
use crate::consumers::{Message, MessageId, ReceiptHandle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

mod in_memory;

pub use in_memory::{InMemoryBroker, InMemoryQueue};

/// A queue of [`Message`]s.
///
/// Listener containers only rely on these four operations: any backend implementing them can
/// be plugged in.
///
/// # Visibility
///
/// A dequeued message is invisible to other consumers until it is deleted or requeued.
/// If neither happens within the backend's visibility timeout, the message becomes visible
/// again and is redelivered with an incremented `receive_attempt`.
#[async_trait::async_trait]
pub trait Queue: Send + Sync + 'static {
    /// The name of the queue.
    fn name(&self) -> &str;

    /// Append a message to the queue, returning the identifier assigned to it.
    async fn enqueue(
        &self,
        body: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> Result<MessageId, QueueError>;

    /// Wait at most `wait` for a visible message.
    ///
    /// Returns `Ok(None)` if nothing became available in time.
    ///
    /// # Cancel safety
    ///
    /// Workers race `dequeue` against their stop signal: implementations must not lose a
    /// message if the returned future is dropped before completion.
    async fn dequeue(&self, wait: Duration) -> Result<Option<Message>, QueueError>;

    /// Acknowledge a message, removing it from the queue for good.
    async fn delete(&self, message: &Message) -> Result<(), QueueError>;

    /// Give a message back to the queue so that it can be delivered again.
    async fn requeue(&self, message: &Message) -> Result<(), QueueError>;
}

/// assert it's object safe
type _CHECK = Box<dyn Queue>;

#[async_trait::async_trait]
impl<Q> Queue for Arc<Q>
where
    Q: Queue + ?Sized,
{
    fn name(&self) -> &str {
        Q::name(self)
    }

    async fn enqueue(
        &self,
        body: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> Result<MessageId, QueueError> {
        Q::enqueue(self, body, attributes).await
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Message>, QueueError> {
        Q::dequeue(self, wait).await
    }

    async fn delete(&self, message: &Message) -> Result<(), QueueError> {
        Q::delete(self, message).await
    }

    async fn requeue(&self, message: &Message) -> Result<(), QueueError> {
        Q::requeue(self, message).await
    }
}

/// Error returned by [`Queue`] operations.
#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    /// The delivery the caller refers to is no longer current: the message was already
    /// deleted, or its visibility timeout expired and it was handed out again.
    #[error("Message {message_id} is not in flight with receipt handle {receipt_handle}")]
    ReceiptHandleNotFound {
        message_id: MessageId,
        receipt_handle: ReceiptHandle,
    },
    /// The backend could not serve the request.
    #[error("The queue backend is unavailable")]
    Unavailable(#[source] anyhow::Error),
}
