use crate::consumers::error::panic_message;
use crate::consumers::events::{EventListener, PipelineEvent, PipelineEventKind};
use crate::consumers::extensions::with_extensions;
use crate::consumers::{
    AcknowledgementCallback, Decision, ErrorHandler, Handler, InterceptorChain, Message,
    ProcessingError,
};
use crate::queue::Queue;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use task_local_extensions::Extensions;

/// The outcome of a pass over a message.
///
/// Interceptors get it in `after`, once the message has been deleted or requeued.
/// A failure suppressed by the error handler counts as a success.
#[derive(Debug)]
pub enum ProcessingOutcome {
    Success,
    Failure(ProcessingError),
}

impl ProcessingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The cause of the failure, if the pass failed.
    pub fn error(&self) -> Option<&ProcessingError> {
        match self {
            Self::Success => None,
            Self::Failure(e) => Some(e),
        }
    }
}

/// What the pipeline did with the message at the end of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The message was deleted from the queue.
    Deleted,
    /// Deleting the message failed: it may be delivered again.
    DeleteFailed,
    /// The message was handed back to the queue.
    Requeued,
    /// Handing the message back failed: it will be redelivered once its visibility timeout
    /// expires.
    RequeueFailed,
}

/// Everything that happened during a pass over a message.
#[derive(Debug)]
pub struct PassSummary {
    /// The message, as mutated by the `before` hooks. Its id and receipt handle are always the
    /// ones of the dequeued delivery.
    pub message: Message,
    /// The final outcome, as seen by the `after` hooks.
    pub outcome: ProcessingOutcome,
    /// The error handler decision, if the error handler was invoked.
    pub decision: Option<Decision>,
    /// The failure the error handler suppressed, if it did.
    pub suppressed: Option<ProcessingError>,
    pub disposition: Disposition,
}

/// Fans every event out to all the registered listeners.
pub(crate) struct EventListeners(pub(crate) Vec<Arc<dyn EventListener>>);

impl EventListener for EventListeners {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        for listener in &self.0 {
            let notified =
                std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if let Err(payload) = notified {
                tracing::error!(
                    message_id = %event.message_id,
                    "Event listener panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

/// The per-message processing pipeline shared by all the workers of a container:
///
/// 1. `before` hooks;
/// 2. the handler, unless a `before` hook failed;
/// 3. on success, delete the message and notify the acknowledgement callback;
/// 4. on failure, ask the error handler: requeue the message, or delete it as in 3;
/// 5. `after` hooks, always.
pub struct Pipeline {
    pub(crate) queue: Arc<dyn Queue>,
    pub(crate) interceptors: InterceptorChain,
    pub(crate) handler: Arc<dyn Handler>,
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
    pub(crate) acknowledgement_callback: Arc<dyn AcknowledgementCallback>,
    pub(crate) listeners: EventListeners,
}

impl Pipeline {
    /// Run a full pass over `message`.
    ///
    /// It never fails: every failure is turned into an outcome, a decision and a disposition.
    /// The pass runs within its own message-local storage scope
    /// (see [`set_message_local_item`](crate::consumers::set_message_local_item)).
    #[tracing::instrument(
        name = "process_message",
        skip_all,
        fields(
            message_id = %message.id,
            queue_name = %message.queue_name,
            receive_attempt = message.receive_attempt
        ),
        level = tracing::Level::DEBUG
    )]
    pub async fn process(&self, message: Message) -> PassSummary {
        let (_, summary) = with_extensions(Extensions::new(), self.run(message)).await;
        summary
    }

    async fn run(&self, mut message: Message) -> PassSummary {
        let listener = &self.listeners;
        listener.on_event(&PipelineEvent::new(
            &message,
            PipelineEventKind::MessageReceived {
                receive_attempt: message.receive_attempt,
            },
        ));

        // `before` hooks may replace the message: delete and requeue must still target the
        // delivery that was dequeued.
        let id = message.id;
        let receipt_handle = message.receipt_handle.clone();
        let before = self.interceptors.before(&mut message, listener).await;
        message.id = id;
        message.receipt_handle = receipt_handle;

        let outcome = match before {
            Ok(()) => {
                let outcome = self.invoke_handler(&message).await;
                listener.on_event(&PipelineEvent::new(
                    &message,
                    PipelineEventKind::HandlerCompleted { outcome: &outcome },
                ));
                outcome
            }
            Err(e) => ProcessingOutcome::Failure(e),
        };

        let (outcome, decision, suppressed, disposition) = match outcome {
            ProcessingOutcome::Success => {
                let disposition = self.acknowledge(&message).await;
                (ProcessingOutcome::Success, None, None, disposition)
            }
            ProcessingOutcome::Failure(cause) => match self.decide(&message, &cause).await {
                Decision::Suppress => {
                    let disposition = self.acknowledge(&message).await;
                    (
                        ProcessingOutcome::Success,
                        Some(Decision::Suppress),
                        Some(cause),
                        disposition,
                    )
                }
                Decision::Redeliver => {
                    let disposition = self.redeliver(&message).await;
                    (
                        ProcessingOutcome::Failure(cause),
                        Some(Decision::Redeliver),
                        None,
                        disposition,
                    )
                }
            },
        };

        self.interceptors.after(&message, &outcome, listener).await;
        listener.on_event(&PipelineEvent::new(
            &message,
            PipelineEventKind::PassCompleted {
                outcome: &outcome,
                disposition,
            },
        ));

        PassSummary {
            message,
            outcome,
            decision,
            suppressed,
            disposition,
        }
    }

    async fn invoke_handler(&self, message: &Message) -> ProcessingOutcome {
        match AssertUnwindSafe(self.handler.handle(message))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => ProcessingOutcome::Success,
            Ok(Err(e)) => ProcessingOutcome::Failure(ProcessingError::Handler(e)),
            Err(payload) => ProcessingOutcome::Failure(ProcessingError::Panicked {
                stage: "Handler".into(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Ask the error handler what to do. Redeliver if it fails to answer.
    async fn decide(&self, message: &Message, cause: &ProcessingError) -> Decision {
        let listener = &self.listeners;
        let result = AssertUnwindSafe(self.error_handler.handle(message, cause))
            .catch_unwind()
            .await;
        let error = match result {
            Ok(Ok(decision)) => {
                listener.on_event(&PipelineEvent::new(
                    message,
                    PipelineEventKind::ErrorHandlerDecided { decision, cause },
                ));
                return decision;
            }
            Ok(Err(e)) => e,
            Err(payload) => anyhow::anyhow!(
                "The error handler panicked: {}",
                panic_message(payload.as_ref())
            ),
        };
        listener.on_event(&PipelineEvent::new(
            message,
            PipelineEventKind::ErrorHandlerFailed { error: &error },
        ));
        Decision::Redeliver
    }

    /// Delete the message and report the result to the acknowledgement callback.
    async fn acknowledge(&self, message: &Message) -> Disposition {
        let listener = &self.listeners;
        let callback = &self.acknowledgement_callback;
        match self.queue.delete(message).await {
            Ok(()) => {
                listener.on_event(&PipelineEvent::new(
                    message,
                    PipelineEventKind::DeleteSucceeded,
                ));
                let notified = AssertUnwindSafe(callback.on_delete_success(message))
                    .catch_unwind()
                    .await;
                if let Err(payload) = notified {
                    tracing::error!(
                        message_id = %message.id,
                        "Acknowledgement callback panicked on delete success: {}",
                        panic_message(payload.as_ref())
                    );
                }
                Disposition::Deleted
            }
            Err(error) => {
                listener.on_event(&PipelineEvent::new(
                    message,
                    PipelineEventKind::DeleteFailed { error: &error },
                ));
                let notified = AssertUnwindSafe(callback.on_delete_failure(message, &error))
                    .catch_unwind()
                    .await;
                if let Err(payload) = notified {
                    tracing::error!(
                        message_id = %message.id,
                        "Acknowledgement callback panicked on delete failure: {}",
                        panic_message(payload.as_ref())
                    );
                }
                Disposition::DeleteFailed
            }
        }
    }

    async fn redeliver(&self, message: &Message) -> Disposition {
        match self.queue.requeue(message).await {
            Ok(()) => {
                self.listeners
                    .on_event(&PipelineEvent::new(message, PipelineEventKind::Requeued));
                Disposition::Requeued
            }
            Err(error) => {
                self.listeners.on_event(&PipelineEvent::new(
                    message,
                    PipelineEventKind::RequeueFailed { error: &error },
                ));
                Disposition::RequeueFailed
            }
        }
    }
}
