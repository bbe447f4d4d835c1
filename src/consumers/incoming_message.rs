use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// The attribute under which [`CorrelationIdInterceptor`] stores the correlation id.
///
/// [`CorrelationIdInterceptor`]: crate::consumers::hooks::interceptors::CorrelationIdInterceptor
pub const CORRELATION_ID_ATTRIBUTE: &str = "correlationId";

/// Identifier assigned by the queue when a message is enqueued.
///
/// It never changes afterwards, not even when the message is redelivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A token identifying one specific delivery of a message.
///
/// Every (re)delivery gets a fresh handle: only the holder of the current handle
/// can delete or requeue the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dequeued message, ready for processing.
///
/// `Message` is the input type of handlers, interceptors, error handlers and acknowledgement
/// callbacks (check out [`Handler`](crate::consumers::Handler)'s docs for more details).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub(crate) id: MessageId,
    /// The name of the queue the message was received from.
    pub queue_name: String,
    /// The payload, opaque to the pipeline.
    pub body: Vec<u8>,
    /// String attributes carried alongside the body (e.g. a correlation id).
    ///
    /// Interceptors are the only component expected to mutate them.
    pub attributes: HashMap<String, String>,
    /// How many times this message has been delivered, starting at 1.
    pub receive_attempt: u32,
    /// Handle of the current delivery, used by the queue to delete or requeue the message.
    pub(crate) receipt_handle: ReceiptHandle,
}

impl Message {
    /// Build a message as a queue would hand it out on its first delivery.
    ///
    /// Mostly useful to exercise handlers and interceptors in isolation.
    pub fn new(queue_name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::new(),
            queue_name: queue_name.into(),
            body: body.into(),
            attributes: HashMap::new(),
            receive_attempt: 1,
            receipt_handle: ReceiptHandle::new(),
        }
    }

    /// The identifier assigned by the queue at enqueue time.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Attach an attribute, replacing any previous value under the same key.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The correlation id stamped on the message, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.attribute(CORRELATION_ID_ATTRIBUTE)
    }

    pub fn receipt_handle(&self) -> &ReceiptHandle {
        &self.receipt_handle
    }
}
