//! A collection of acknowledgement callbacks.

use crate::consumers::{AcknowledgementCallback, Message};
use crate::queue::QueueError;

/// Do nothing.
///
/// The default acknowledgement callback of a
/// [`ListenerContainer`](crate::consumers::ListenerContainer).
pub struct IgnoreAcknowledgement;

#[async_trait::async_trait]
impl AcknowledgementCallback for IgnoreAcknowledgement {
    fn name(&self) -> &str {
        "ignore"
    }

    async fn on_delete_success(&self, _message: &Message) {}

    async fn on_delete_failure(&self, _message: &Message, _error: &QueueError) {}
}

/// Log the result of every delete.
pub struct LoggingAcknowledgementCallback;

#[async_trait::async_trait]
impl AcknowledgementCallback for LoggingAcknowledgementCallback {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_delete_success(&self, message: &Message) {
        tracing::info!(
            message_id = %message.id,
            queue_name = %message.queue_name,
            "[ack-callback] delete confirmed"
        );
    }

    async fn on_delete_failure(&self, message: &Message, error: &QueueError) {
        tracing::error!(
            message_id = %message.id,
            queue_name = %message.queue_name,
            error = %error,
            "[ack-callback] delete failed"
        );
    }
}
