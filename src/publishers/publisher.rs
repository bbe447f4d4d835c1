use crate::consumers::MessageId;
use crate::publishers::publisher_middleware::Next;
use crate::publishers::{MessageEnvelope, PublisherMiddleware, SENT_TIMESTAMP_ATTRIBUTE};
use crate::queue::{InMemoryBroker, QueueError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use task_local_extensions::Extensions;
use tracing::warn;

/// A high-level interface to publish messages.
///
/// It supports middlewares which can be used for a variety of purposes (e.g. injecting
/// attributes, logging, etc.).
///
/// # How do I build a `Publisher`?
///
/// `Publisher` provides a fluent API to add configuration step-by-step, known as
/// "builder pattern" in Rust.
/// The starting point is [`Publisher::builder`].
///
/// # Example
///
/// ```rust
/// use queue_listener::publishers::{MessageEnvelope, Publisher};
/// use queue_listener::queue::InMemoryBroker;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let publisher = Publisher::builder(InMemoryBroker::default())
///     .publish_timeout(std::time::Duration::from_secs(3))
///     .build();
/// publisher
///     .publish(MessageEnvelope::new("orders", "hello"))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Publisher {
    broker: InMemoryBroker,
    /// Timeout on publishing.
    timeout: std::time::Duration,
    /// The middleware chain that will be executed before publishing the message.
    middleware_chain: Vec<Arc<dyn PublisherMiddleware + 'static>>,
}

impl Publisher {
    /// Start building a [`Publisher`] targeting the queues of `broker`.
    pub fn builder(broker: InMemoryBroker) -> PublisherBuilder {
        PublisherBuilder::new(broker)
    }

    /// Publish a message, returning the id assigned to it by the queue.
    ///
    /// The target queue is created if it does not exist yet.
    #[tracing::instrument(
        name = "publish_message",
        skip_all,
        fields(queue_name = %envelope.queue_name),
        level = tracing::Level::DEBUG
    )]
    pub async fn publish(&self, envelope: MessageEnvelope) -> Result<MessageId, PublisherError> {
        let mut extensions = Extensions::new();

        let envelope = inject_sent_timestamp(envelope);

        let next = Next {
            broker: &self.broker,
            timeout: self.timeout,
            next_middleware: self.middleware_chain.as_slice(),
        };

        next.run(envelope, &mut extensions).await
    }
}

/// Error returned when trying to publish a message using `Publisher`.
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("The queue refused the message")]
    Queue(#[source] QueueError),
    #[error("A middleware failed to process the message before publishing")]
    Middleware(#[source] anyhow::Error),
    #[error("The timeout threshold was reached while trying to publish the message")]
    Timeout,
}

/// A builder for [`Publisher`].
///
/// Use [`Publisher::builder`] as entrypoint.
pub struct PublisherBuilder {
    broker: InMemoryBroker,
    timeout: std::time::Duration,
    middleware_chain: Vec<Arc<dyn PublisherMiddleware>>,
}

impl PublisherBuilder {
    fn new(broker: InMemoryBroker) -> Self {
        Self {
            broker,
            timeout: std::time::Duration::from_secs(3),
            middleware_chain: vec![],
        }
    }

    /// Set a timeout for publishing.
    ///
    /// Defaults to 3 seconds.
    #[must_use]
    pub fn publish_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// You can add middleware to inject logic before and after publishing a message.
    /// Middlewares are executed in the order they are registered: the first registered
    /// middleware executes first on the way in and last on the way out.
    ///
    /// Check out [`PublisherMiddleware`]'s documentation for more details.
    #[must_use]
    pub fn with_middleware<M: PublisherMiddleware + 'static>(self, middleware: M) -> Self {
        self.with_dyn_middleware(Arc::new(middleware))
    }

    /// Append dynamic middleware logic, see [`PublisherBuilder::with_middleware`].
    #[must_use]
    pub fn with_dyn_middleware(
        mut self,
        middleware: Arc<dyn PublisherMiddleware + 'static>,
    ) -> Self {
        self.middleware_chain.push(middleware);
        self
    }

    /// Append multiple dynamic middlewares, see [`PublisherBuilder::with_middleware`].
    #[must_use]
    pub fn with_middlewares<I>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PublisherMiddleware + 'static>>,
    {
        self.middleware_chain.extend(middlewares);
        self
    }

    /// Finalise the builder and get an instance of [`Publisher`].
    pub fn build(self) -> Publisher {
        Publisher {
            broker: self.broker,
            timeout: self.timeout,
            middleware_chain: self.middleware_chain,
        }
    }
}

fn inject_sent_timestamp(mut envelope: MessageEnvelope) -> MessageEnvelope {
    if envelope.attributes.contains_key(SENT_TIMESTAMP_ATTRIBUTE) {
        return envelope;
    }
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(now) => {
            envelope.attributes.insert(
                SENT_TIMESTAMP_ATTRIBUTE.into(),
                now.as_millis().to_string(),
            );
        }
        Err(_) => warn!("System time is before 1970"),
    }
    envelope
}
