//! Reference business logic: an order consumer and an order producer, wired to the listener
//! container according to [`ListenerSettings`].
use crate::configuration::ListenerSettings;
use crate::consumers::hooks::acknowledgement::LoggingAcknowledgementCallback;
use crate::consumers::hooks::error_handler::LoggingErrorHandler;
use crate::consumers::hooks::interceptors::CorrelationIdInterceptor;
use crate::consumers::{
    ContainerError, Handler, HandlerError, ListenerContainer, ListenerContainerRegistry, Message,
    MessageId,
};
use crate::publishers::{MessageEnvelope, Publisher};
use crate::queue::Queue;
use crate::simulation::FailureSimulator;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// The payload exchanged on the orders queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub order_id: String,
    pub description: String,
}

impl OrderEvent {
    /// The `index`-th order of a batch: `order-{index}`, described as `Order #{index}`.
    pub fn numbered(index: usize) -> Self {
        Self {
            order_id: format!("order-{index}"),
            description: format!("Order #{index}"),
        }
    }
}

/// Processes [`OrderEvent`]s, failing on purpose when the [`FailureSimulator`] says so.
///
/// The handler keeps track of every invocation and of the orders it processed successfully.
pub struct OrderHandler {
    simulator: Arc<FailureSimulator>,
    invocations: AtomicUsize,
    received: Mutex<Vec<OrderEvent>>,
}

impl OrderHandler {
    pub fn new(simulator: Arc<FailureSimulator>) -> Self {
        Self {
            simulator,
            invocations: AtomicUsize::new(0),
            received: Mutex::new(vec![]),
        }
    }

    /// How many times the handler has been invoked, failures included.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// The orders processed successfully, in processing order.
    pub fn received(&self) -> Vec<OrderEvent> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn simulator(&self) -> &FailureSimulator {
        &self.simulator
    }
}

#[async_trait::async_trait]
impl Handler for OrderHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let order: OrderEvent =
            serde_json::from_slice(&message.body).context("Failed to deserialize the order")?;

        self.simulator.check(&order.order_id)?;

        tracing::info!(
            message_id = %message.id,
            receive_attempt = message.receive_attempt,
            "Received: orderId={}, description={}",
            order.order_id,
            order.description
        );
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(order);
        Ok(())
    }
}

/// Publishes batches of [`OrderEvent`]s.
pub struct OrderProducer {
    publisher: Publisher,
    queue_name: String,
}

impl OrderProducer {
    pub fn new(publisher: Publisher, queue_name: impl Into<String>) -> Self {
        Self {
            publisher,
            queue_name: queue_name.into(),
        }
    }

    /// Publish `order-1` to `order-{count}`, in order.
    pub async fn send(&self, count: usize) -> Result<Vec<MessageId>, anyhow::Error> {
        let mut ids = Vec::with_capacity(count);
        for index in 1..=count {
            let order = OrderEvent::numbered(index);
            let envelope = MessageEnvelope::json(&self.queue_name, &order)
                .context("Failed to serialize the order")?;
            let id = self
                .publisher
                .publish(envelope)
                .await
                .with_context(|| format!("Failed to publish {}", order.order_id))?;
            tracing::info!(
                message_id = %id,
                "Sent: orderId={}, description={}",
                order.order_id,
                order.description
            );
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Build the listener container for `settings.queue_name`, with the optional scenario hooks
/// enabled in `settings.scenarios`.
pub fn listener_container(
    settings: &ListenerSettings,
    queue: Arc<dyn Queue>,
    handler: Arc<dyn Handler>,
) -> ListenerContainer {
    let scenarios = settings.scenarios;
    let mut builder = ListenerContainer::builder_with_dyn_queue(queue)
        .id(format!("{}-listener", settings.queue_name))
        .with_settings(settings);
    if scenarios.interceptor_logging {
        builder = builder.with_interceptor(CorrelationIdInterceptor);
    }
    if scenarios.error_handler {
        builder = builder.error_handler(LoggingErrorHandler);
    }
    if scenarios.ack_callback {
        builder = builder.acknowledgement_callback(LoggingAcknowledgementCallback);
    }
    builder.raw_arc_handler(handler)
}

/// Register the orders listener container in a fresh registry, logging the assembled
/// containers if the assembly view is enabled.
pub fn listener_registry(
    settings: &ListenerSettings,
    queue: Arc<dyn Queue>,
    handler: Arc<dyn Handler>,
) -> Result<ListenerContainerRegistry, ContainerError> {
    let mut registry = ListenerContainerRegistry::new();
    registry.register(listener_container(settings, queue, handler))?;
    if settings.scenarios.assembly_view {
        registry.log_assembly();
    }
    Ok(registry)
}
