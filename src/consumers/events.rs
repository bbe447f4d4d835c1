//! Structured events emitted while a message goes through the pipeline.
//!
//! Observability is a side channel: the pipeline only emits events, an [`EventListener`] decides
//! what to do with them. [`TracingEventListener`] is installed by default and turns each event
//! into a `tracing` record.
use crate::consumers::{
    Decision, Disposition, Message, MessageId, ProcessingError, ProcessingOutcome,
};
use crate::queue::QueueError;

/// What happened, and to which message.
#[derive(Debug)]
pub struct PipelineEvent<'a> {
    pub message_id: MessageId,
    /// The correlation id stamped on the message, if an interceptor stamped one.
    pub correlation_id: Option<&'a str>,
    pub kind: PipelineEventKind<'a>,
}

impl<'a> PipelineEvent<'a> {
    pub(crate) fn new(message: &'a Message, kind: PipelineEventKind<'a>) -> Self {
        Self {
            message_id: message.id,
            correlation_id: message.correlation_id(),
            kind,
        }
    }
}

#[derive(Debug)]
pub enum PipelineEventKind<'a> {
    /// A worker dequeued the message and is about to process it.
    MessageReceived { receive_attempt: u32 },
    /// A `before` hook failed, the handler will be skipped.
    BeforeHookFailed {
        interceptor: &'a str,
        error: &'a ProcessingError,
    },
    /// The handler returned. `outcome` is the handler outcome, before any error handling.
    HandlerCompleted { outcome: &'a ProcessingOutcome },
    /// The message was deleted from the queue.
    DeleteSucceeded,
    /// Deleting the message failed.
    DeleteFailed { error: &'a QueueError },
    /// The error handler decided the fate of a failed message.
    ErrorHandlerDecided {
        decision: Decision,
        cause: &'a ProcessingError,
    },
    /// The error handler itself failed: the message is redelivered.
    ErrorHandlerFailed { error: &'a anyhow::Error },
    /// The message was handed back to the queue.
    Requeued,
    /// Handing the message back to the queue failed.
    RequeueFailed { error: &'a QueueError },
    /// An `after` hook failed. The other `after` hooks still run.
    AfterHookFailed {
        interceptor: &'a str,
        error: &'a anyhow::Error,
    },
    /// The pass is over.
    PassCompleted {
        outcome: &'a ProcessingOutcome,
        disposition: Disposition,
    },
}

/// Receives every [`PipelineEvent`].
///
/// Listeners are called synchronously from the worker processing the message: keep them cheap.
pub trait EventListener: Send + Sync + 'static {
    fn on_event(&self, event: &PipelineEvent<'_>);
}

/// Logs every event using `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventListener;

impl EventListener for TracingEventListener {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let message_id = event.message_id;
        let correlation_id = event.correlation_id.unwrap_or("-");
        match &event.kind {
            PipelineEventKind::MessageReceived { receive_attempt } => tracing::debug!(
                %message_id,
                correlation_id,
                receive_attempt,
                "Message received"
            ),
            PipelineEventKind::BeforeHookFailed { interceptor, error } => tracing::warn!(
                %message_id,
                correlation_id,
                interceptor,
                error = %error,
                "Interceptor failed before processing, skipping the handler"
            ),
            PipelineEventKind::HandlerCompleted { outcome } => match outcome {
                ProcessingOutcome::Success => {
                    tracing::debug!(%message_id, correlation_id, "Handler succeeded")
                }
                ProcessingOutcome::Failure(e) => tracing::info!(
                    %message_id,
                    correlation_id,
                    error = %e,
                    "Handler failed"
                ),
            },
            PipelineEventKind::DeleteSucceeded => {
                tracing::debug!(%message_id, correlation_id, "Message deleted")
            }
            PipelineEventKind::DeleteFailed { error } => tracing::warn!(
                %message_id,
                correlation_id,
                error = %error,
                "Failed to delete message"
            ),
            PipelineEventKind::ErrorHandlerDecided { decision, cause } => tracing::info!(
                %message_id,
                correlation_id,
                ?decision,
                cause = %cause,
                "Error handler decided"
            ),
            PipelineEventKind::ErrorHandlerFailed { error } => tracing::error!(
                %message_id,
                correlation_id,
                error = %error,
                "Error handler failed, the message will be redelivered"
            ),
            PipelineEventKind::Requeued => {
                tracing::debug!(%message_id, correlation_id, "Message requeued")
            }
            PipelineEventKind::RequeueFailed { error } => tracing::warn!(
                %message_id,
                correlation_id,
                error = %error,
                "Failed to requeue message, it will be redelivered after its visibility timeout"
            ),
            PipelineEventKind::AfterHookFailed { interceptor, error } => tracing::warn!(
                %message_id,
                correlation_id,
                interceptor,
                error = %error,
                "Interceptor failed after processing"
            ),
            PipelineEventKind::PassCompleted {
                outcome,
                disposition,
            } => tracing::debug!(
                %message_id,
                correlation_id,
                success = outcome.is_success(),
                ?disposition,
                "Pass completed"
            ),
        }
    }
}
