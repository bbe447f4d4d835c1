//! A collection of error handlers.

use crate::consumers::{Decision, ErrorHandler, Message, ProcessingError};

/// Hand every failed message back to the queue.
///
/// The default error handler of a [`ListenerContainer`](crate::consumers::ListenerContainer).
pub struct AlwaysRedeliver;

#[async_trait::async_trait]
impl ErrorHandler for AlwaysRedeliver {
    fn name(&self) -> &str {
        "always-redeliver"
    }

    async fn handle(
        &self,
        _message: &Message,
        _cause: &ProcessingError,
    ) -> Result<Decision, anyhow::Error> {
        Ok(Decision::Redeliver)
    }
}

/// Delete every failed message, as if it had been processed successfully.
pub struct AlwaysSuppress;

#[async_trait::async_trait]
impl ErrorHandler for AlwaysSuppress {
    fn name(&self) -> &str {
        "always-suppress"
    }

    async fn handle(
        &self,
        _message: &Message,
        _cause: &ProcessingError,
    ) -> Result<Decision, anyhow::Error> {
        Ok(Decision::Suppress)
    }
}

/// Log the failure, then redeliver the message.
pub struct LoggingErrorHandler;

#[async_trait::async_trait]
impl ErrorHandler for LoggingErrorHandler {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(
        &self,
        message: &Message,
        cause: &ProcessingError,
    ) -> Result<Decision, anyhow::Error> {
        tracing::warn!(
            message_id = %message.id,
            receive_attempt = message.receive_attempt,
            "[error-handler] '{}' - message will return to queue for redelivery.",
            cause
        );
        Ok(Decision::Redeliver)
    }
}

/// Redeliver a failed message until it has been received `max_receive_attempts` times, then
/// suppress the failure.
pub struct RedeliverUntil {
    pub max_receive_attempts: u32,
}

#[async_trait::async_trait]
impl ErrorHandler for RedeliverUntil {
    fn name(&self) -> &str {
        "redeliver-until"
    }

    async fn handle(
        &self,
        message: &Message,
        cause: &ProcessingError,
    ) -> Result<Decision, anyhow::Error> {
        if message.receive_attempt < self.max_receive_attempts {
            return Ok(Decision::Redeliver);
        }
        tracing::error!(
            message_id = %message.id,
            receive_attempt = message.receive_attempt,
            error = %cause,
            "Giving up on message after {} attempts",
            message.receive_attempt
        );
        Ok(Decision::Suppress)
    }
}
