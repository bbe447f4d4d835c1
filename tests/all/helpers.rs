use queue_listener::configuration::InMemoryQueueSettings;
use queue_listener::consumers::{
    AcknowledgementCallback, Decision, ErrorHandler, EventListener, Interceptor, Message,
    MessageId, PipelineEvent, PipelineEventKind, ProcessingError, ProcessingOutcome,
};
use queue_listener::publishers::{MessageEnvelope, Publisher};
use queue_listener::queue::{InMemoryBroker, InMemoryQueue, Queue, QueueError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn get_broker() -> InMemoryBroker {
    InMemoryBroker::new(InMemoryQueueSettings::default())
}

pub fn get_publisher(broker: &InMemoryBroker) -> Publisher {
    Publisher::builder(broker.clone())
        .publish_timeout(Duration::from_secs(3))
        .build()
}

/// Publish a random sentence on `queue_name`.
pub async fn publish_random(publisher: &Publisher, queue_name: &str) -> MessageId {
    use fake::faker::lorem::en::Sentence;
    use fake::Fake;

    let body: String = Sentence(3..8).fake();
    publisher
        .publish(MessageEnvelope::new(queue_name, body))
        .await
        .unwrap()
}

/// Take the next message out of `queue`, as a worker would.
pub async fn receive(queue: &InMemoryQueue) -> Message {
    queue
        .dequeue(Duration::ZERO)
        .await
        .unwrap()
        .expect("The queue is empty")
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("The condition was not met in time")
}

/// Records `before:<name>` and `after:<name>:<success>` entries in a shared journal.
pub struct JournalingInterceptor {
    pub name: &'static str,
    pub journal: Journal,
    pub fail_before: bool,
}

impl JournalingInterceptor {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            fail_before: false,
        }
    }

    pub fn failing(name: &'static str, journal: &Journal) -> Self {
        Self {
            fail_before: true,
            ..Self::new(name, journal)
        }
    }
}

#[async_trait::async_trait]
impl Interceptor for JournalingInterceptor {
    fn name(&self) -> &str {
        self.name
    }

    async fn before(&self, _message: &mut Message) -> Result<(), anyhow::Error> {
        self.journal
            .lock()
            .await
            .push(format!("before:{}", self.name));
        if self.fail_before {
            anyhow::bail!("{} rejected the message", self.name);
        }
        Ok(())
    }

    async fn after(
        &self,
        _message: &Message,
        outcome: &ProcessingOutcome,
    ) -> Result<(), anyhow::Error> {
        self.journal
            .lock()
            .await
            .push(format!("after:{}:{}", self.name, outcome.is_success()));
        Ok(())
    }
}

/// Counts its invocations and answers with a fixed decision.
#[derive(Clone)]
pub struct CountingErrorHandler {
    pub decision: Decision,
    pub causes: Arc<Mutex<Vec<String>>>,
}

impl CountingErrorHandler {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            causes: Default::default(),
        }
    }

    pub async fn calls(&self) -> usize {
        self.causes.lock().await.len()
    }
}

#[async_trait::async_trait]
impl ErrorHandler for CountingErrorHandler {
    async fn handle(
        &self,
        _message: &Message,
        cause: &ProcessingError,
    ) -> Result<Decision, anyhow::Error> {
        self.causes.lock().await.push(cause.to_string());
        Ok(self.decision)
    }
}

#[derive(Clone, Default)]
pub struct CountingAcknowledgement {
    pub successes: Arc<Mutex<Vec<MessageId>>>,
    pub failures: Arc<Mutex<Vec<MessageId>>>,
}

impl CountingAcknowledgement {
    pub async fn successes(&self) -> usize {
        self.successes.lock().await.len()
    }

    pub async fn failures(&self) -> usize {
        self.failures.lock().await.len()
    }
}

#[async_trait::async_trait]
impl AcknowledgementCallback for CountingAcknowledgement {
    async fn on_delete_success(&self, message: &Message) {
        self.successes.lock().await.push(message.id());
    }

    async fn on_delete_failure(&self, message: &Message, _error: &QueueError) {
        self.failures.lock().await.push(message.id());
    }
}

/// Keeps the name of every event it receives.
///
/// Event listeners are synchronous, hence the blocking mutex.
#[derive(Clone, Default)]
pub struct RecordingEventListener {
    pub events: Arc<std::sync::Mutex<Vec<&'static str>>>,
}

impl RecordingEventListener {
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl EventListener for RecordingEventListener {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let name = match event.kind {
            PipelineEventKind::MessageReceived { .. } => "MessageReceived",
            PipelineEventKind::BeforeHookFailed { .. } => "BeforeHookFailed",
            PipelineEventKind::HandlerCompleted { .. } => "HandlerCompleted",
            PipelineEventKind::DeleteSucceeded => "DeleteSucceeded",
            PipelineEventKind::DeleteFailed { .. } => "DeleteFailed",
            PipelineEventKind::ErrorHandlerDecided { .. } => "ErrorHandlerDecided",
            PipelineEventKind::ErrorHandlerFailed { .. } => "ErrorHandlerFailed",
            PipelineEventKind::Requeued => "Requeued",
            PipelineEventKind::RequeueFailed { .. } => "RequeueFailed",
            PipelineEventKind::AfterHookFailed { .. } => "AfterHookFailed",
            PipelineEventKind::PassCompleted { .. } => "PassCompleted",
        };
        self.events.lock().unwrap().push(name);
    }
}

/// A queue whose deletes always fail.
pub struct FailingDeleteQueue(pub Arc<InMemoryQueue>);

#[async_trait::async_trait]
impl Queue for FailingDeleteQueue {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn enqueue(
        &self,
        body: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> Result<MessageId, QueueError> {
        self.0.enqueue(body, attributes).await
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Message>, QueueError> {
        self.0.dequeue(wait).await
    }

    async fn delete(&self, _message: &Message) -> Result<(), QueueError> {
        Err(QueueError::Unavailable(anyhow::anyhow!(
            "The delete endpoint is down"
        )))
    }

    async fn requeue(&self, message: &Message) -> Result<(), QueueError> {
        self.0.requeue(message).await
    }
}
