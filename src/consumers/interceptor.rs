use crate::consumers::error::panic_message;
use crate::consumers::events::{EventListener, PipelineEvent, PipelineEventKind};
use crate::consumers::{Message, ProcessingError, ProcessingOutcome};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Hooks executed before and after the handler processes a message.
///
/// # Use case
///
/// Interceptors extract cross-cutting concerns out of handlers: stamping a correlation id,
/// timing, logging, etc.
///
/// - `before` runs before the handler and may enrich the message (e.g. add attributes) or
///   replace it altogether. Returning an error aborts the pass: the remaining `before` hooks
///   and the handler are skipped and the outcome is a failure.
/// - `after` observes the final outcome. It runs exactly once per pass, for every registered
///   interceptor, no matter where the pass failed.
///
/// Both hooks default to doing nothing.
#[async_trait::async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// The name used to report failures of this interceptor.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn before(&self, _message: &mut Message) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn after(
        &self,
        _message: &Message,
        _outcome: &ProcessingOutcome,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// assert it's object safe
type _CHECK = Box<dyn Interceptor>;

/// An ordered collection of [`Interceptor`]s.
///
/// `before` hooks run in registration order, and so do `after` hooks (they are not reversed).
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self { interceptors }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run every `before` hook in order, stopping at the first failure.
    ///
    /// A panicking hook counts as a failure.
    pub async fn before(
        &self,
        message: &mut Message,
        listener: &dyn EventListener,
    ) -> Result<(), ProcessingError> {
        for interceptor in &self.interceptors {
            let result = AssertUnwindSafe(interceptor.before(message))
                .catch_unwind()
                .await;
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => ProcessingError::Interceptor {
                    interceptor: interceptor.name().to_owned(),
                    source,
                },
                Err(payload) => ProcessingError::Panicked {
                    stage: format!("Interceptor `{}`", interceptor.name()),
                    message: panic_message(payload.as_ref()),
                },
            };
            listener.on_event(&PipelineEvent::new(
                message,
                PipelineEventKind::BeforeHookFailed {
                    interceptor: interceptor.name(),
                    error: &error,
                },
            ));
            return Err(error);
        }
        Ok(())
    }

    /// Run every `after` hook in order.
    ///
    /// Failures are reported to `listener` and never prevent the following hooks from running.
    pub async fn after(
        &self,
        message: &Message,
        outcome: &ProcessingOutcome,
        listener: &dyn EventListener,
    ) {
        for interceptor in &self.interceptors {
            let result = AssertUnwindSafe(interceptor.after(message, outcome))
                .catch_unwind()
                .await;
            let error = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(payload) => anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())),
            };
            listener.on_event(&PipelineEvent::new(
                message,
                PipelineEventKind::AfterHookFailed {
                    interceptor: interceptor.name(),
                    error: &error,
                },
            ));
        }
    }
}
