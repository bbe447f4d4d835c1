use crate::consumers::MessageId;
use crate::publishers::{MessageEnvelope, PublisherError};
use crate::queue::{InMemoryBroker, Queue};
use std::sync::Arc;
use task_local_extensions::Extensions;

#[async_trait::async_trait]
/// Middlewares to execute logic before and after a message is published by [`Publisher`].
///
/// # Use case
///
/// The main purpose of middlewares is to extract and centralise common non-business logic that
/// would otherwise have to be copy-pasted for all publishers - e.g. stamping attributes or
/// logging.
///
/// # Extensions
///
/// `extensions` can be used to store values that are needed in this middleware on the way
/// back, after having called [`Next::run`], or should be shared with other middlewares downstream.
///
/// [`Publisher`]: super::Publisher
pub trait PublisherMiddleware: Send + Sync {
    async fn handle(
        &self,
        envelope: MessageEnvelope,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<MessageId, PublisherError>;
}

/// The remainder of the publishing middleware chain, including the final publishing action.
#[allow(missing_debug_implementations)]
pub struct Next<'a> {
    pub(super) broker: &'a InMemoryBroker,
    /// Timeout on the enqueue.
    pub(super) timeout: std::time::Duration,
    /// The remainder of the middleware chain.
    pub(super) next_middleware: &'a [Arc<dyn PublisherMiddleware>],
}

impl<'a> Next<'a> {
    /// Asynchronously execute the remaining middleware chain.
    pub async fn run(
        mut self,
        envelope: MessageEnvelope,
        extensions: &mut Extensions,
    ) -> Result<MessageId, PublisherError> {
        if let Some((current, next)) = self.next_middleware.split_first() {
            self.next_middleware = next;
            current.handle(envelope, extensions, self).await
        } else {
            let MessageEnvelope {
                queue_name,
                body,
                attributes,
            } = envelope;
            let queue = self.broker.queue(&queue_name);

            match tokio::time::timeout(self.timeout, queue.enqueue(body, attributes)).await {
                Ok(result) => result.map_err(PublisherError::Queue),
                Err(_) => Err(PublisherError::Timeout),
            }
        }
    }
}
