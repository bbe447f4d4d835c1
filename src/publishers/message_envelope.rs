use crate::consumers::CORRELATION_ID_ATTRIBUTE;
use std::collections::HashMap;

/// The attribute carrying the time a message was published at, in milliseconds since the Unix
/// epoch.
pub const SENT_TIMESTAMP_ATTRIBUTE: &str = "SentTimestamp";

/// A message to be published via `Publisher`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// The name of the queue we are publishing the message to.
    pub queue_name: String,
    /// The body of the message - as a sequence of bytes.
    pub body: Vec<u8>,
    /// Attributes attached to the message.
    pub attributes: HashMap<String, String>,
}

impl MessageEnvelope {
    pub fn new(queue_name: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            queue_name: queue_name.into(),
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Serialize `value` as JSON and use it as the body of the message.
    pub fn json<T: serde::Serialize>(
        queue_name: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(queue_name, serde_json::to_vec(value)?))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        self.with_attribute(CORRELATION_ID_ATTRIBUTE, correlation_id)
    }
}
