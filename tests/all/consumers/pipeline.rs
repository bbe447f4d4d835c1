use crate::helpers::{
    get_broker, get_publisher, publish_random, receive, CountingAcknowledgement,
    CountingErrorHandler, FailingDeleteQueue, Journal, JournalingInterceptor,
    RecordingEventListener,
};
use queue_listener::consumers::hooks::error_handler::AlwaysSuppress;
use queue_listener::consumers::{
    get_message_local_item, set_message_local_item, Decision, Disposition, ErrorHandler,
    EventListener, Handler, HandlerError, Interceptor, ListenerContainer, Message,
    PipelineEvent, PipelineEventKind, ProcessingError,
};
use queue_listener::queue::InMemoryQueue;
use std::sync::Arc;
use std::time::Duration;

async fn ok_handler(_message: &Message) -> Result<(), HandlerError> {
    Ok(())
}

async fn failing_handler(_message: &Message) -> Result<(), HandlerError> {
    Err(anyhow::anyhow!("Something went wrong").into())
}

async fn queue_with_one_message() -> Arc<InMemoryQueue> {
    let broker = get_broker();
    publish_random(&get_publisher(&broker), "pipeline").await;
    broker.queue("pipeline")
}

fn journal_interceptors(journal: &Journal) -> Vec<Arc<dyn Interceptor>> {
    vec![
        Arc::new(JournalingInterceptor::new("a", journal)),
        Arc::new(JournalingInterceptor::new("b", journal)),
    ]
}

#[tokio::test]
async fn a_successful_pass_deletes_the_message_and_acknowledges_it() {
    // Arrange
    let queue = queue_with_one_message().await;
    let journal = Journal::default();
    let acknowledgement = CountingAcknowledgement::default();
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let listener = RecordingEventListener::default();
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptors(journal_interceptors(&journal))
        .error_handler(error_handler.clone())
        .acknowledgement_callback(acknowledgement.clone())
        .with_event_listener(listener.clone())
        .handler(ok_handler);

    // Act
    let summary = container.pipeline().process(receive(&queue).await).await;

    // Assert
    assert!(summary.outcome.is_success());
    assert_eq!(summary.disposition, Disposition::Deleted);
    assert_eq!(summary.decision, None);
    assert!(queue.is_empty());
    assert_eq!(acknowledgement.successes().await, 1);
    assert_eq!(acknowledgement.failures().await, 0);
    assert_eq!(error_handler.calls().await, 0);
    assert_eq!(
        *journal.lock().await,
        vec!["before:a", "before:b", "after:a:true", "after:b:true"]
    );
    assert_eq!(
        listener.events(),
        vec![
            "MessageReceived",
            "HandlerCompleted",
            "DeleteSucceeded",
            "PassCompleted"
        ]
    );
}

#[tokio::test]
async fn a_failed_pass_is_redelivered_without_acknowledgement() {
    // Arrange
    let queue = queue_with_one_message().await;
    let journal = Journal::default();
    let acknowledgement = CountingAcknowledgement::default();
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptors(journal_interceptors(&journal))
        .error_handler(error_handler.clone())
        .acknowledgement_callback(acknowledgement.clone())
        .handler(failing_handler);
    let message = receive(&queue).await;
    let message_id = message.id();

    // Act
    let summary = container.pipeline().process(message).await;

    // Assert
    assert!(!summary.outcome.is_success());
    assert_eq!(summary.decision, Some(Decision::Redeliver));
    assert_eq!(summary.disposition, Disposition::Requeued);
    assert_eq!(error_handler.calls().await, 1);
    assert_eq!(acknowledgement.successes().await, 0);
    assert_eq!(acknowledgement.failures().await, 0);
    assert_eq!(
        *journal.lock().await,
        vec!["before:a", "before:b", "after:a:false", "after:b:false"]
    );

    // The same logical message comes back, with a new delivery.
    let redelivered = receive(&queue).await;
    assert_eq!(redelivered.id(), message_id);
    assert_eq!(redelivered.receive_attempt, 2);
    assert_ne!(redelivered.receipt_handle(), summary.message.receipt_handle());
}

#[tokio::test]
async fn a_failing_before_hook_skips_the_handler_but_every_after_hook_runs_once() {
    // Arrange
    let queue = queue_with_one_message().await;
    let journal = Journal::default();
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let handler_calls = Arc::new(tokio::sync::Mutex::new(0));
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptor(JournalingInterceptor::new("a", &journal))
        .with_interceptor(JournalingInterceptor::failing("b", &journal))
        .with_interceptor(JournalingInterceptor::new("c", &journal))
        .error_handler(error_handler.clone())
        .raw_handler(CountingHandler(handler_calls.clone()));

    // Act
    let summary = container.pipeline().process(receive(&queue).await).await;

    // Assert
    assert_eq!(*handler_calls.lock().await, 0);
    assert!(matches!(
        summary.outcome.error(),
        Some(ProcessingError::Interceptor { interceptor, .. }) if interceptor == "b"
    ));
    assert_eq!(error_handler.calls().await, 1);
    assert_eq!(summary.disposition, Disposition::Requeued);
    assert_eq!(
        *journal.lock().await,
        vec![
            "before:a",
            "before:b",
            "after:a:false",
            "after:b:false",
            "after:c:false"
        ]
    );
}

struct CountingHandler(Arc<tokio::sync::Mutex<usize>>);

#[async_trait::async_trait]
impl Handler for CountingHandler {
    async fn handle(&self, _message: &Message) -> Result<(), HandlerError> {
        *self.0.lock().await += 1;
        Ok(())
    }
}

#[tokio::test]
async fn a_suppressed_failure_counts_as_a_success() {
    // Arrange
    let queue = queue_with_one_message().await;
    let journal = Journal::default();
    let acknowledgement = CountingAcknowledgement::default();
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptors(journal_interceptors(&journal))
        .error_handler(AlwaysSuppress)
        .acknowledgement_callback(acknowledgement.clone())
        .handler(failing_handler);

    // Act
    let summary = container.pipeline().process(receive(&queue).await).await;

    // Assert
    assert!(summary.outcome.is_success());
    assert_eq!(summary.decision, Some(Decision::Suppress));
    assert!(summary.suppressed.is_some());
    assert_eq!(summary.disposition, Disposition::Deleted);
    assert!(queue.is_empty());
    assert_eq!(acknowledgement.successes().await, 1);
    assert_eq!(
        *journal.lock().await,
        vec!["before:a", "before:b", "after:a:true", "after:b:true"]
    );
}

#[tokio::test]
async fn a_failed_delete_is_reported_to_the_acknowledgement_callback() {
    // Arrange
    let queue = queue_with_one_message().await;
    let acknowledgement = CountingAcknowledgement::default();
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let listener = RecordingEventListener::default();
    let container = ListenerContainer::builder(FailingDeleteQueue(queue.clone()))
        .error_handler(error_handler.clone())
        .acknowledgement_callback(acknowledgement.clone())
        .with_event_listener(listener.clone())
        .handler(ok_handler);

    // Act
    let summary = container.pipeline().process(receive(&queue).await).await;

    // Assert
    // The handler succeeded: a failed delete does not change the outcome.
    assert!(summary.outcome.is_success());
    assert_eq!(summary.disposition, Disposition::DeleteFailed);
    assert_eq!(acknowledgement.successes().await, 0);
    assert_eq!(acknowledgement.failures().await, 1);
    assert_eq!(error_handler.calls().await, 0);
    assert!(listener.events().contains(&"DeleteFailed"));
}

#[tokio::test(start_paused = true)]
async fn deleting_with_a_stale_receipt_handle_fails() {
    // Arrange
    let broker = get_broker();
    publish_random(&get_publisher(&broker), "pipeline").await;
    let queue = broker.queue("pipeline");
    let acknowledgement = CountingAcknowledgement::default();
    let container = ListenerContainer::builder(queue.clone())
        .acknowledgement_callback(acknowledgement.clone())
        .handler(ok_handler);
    let first_delivery = receive(&queue).await;

    // The visibility timeout expires: the message is handed out again.
    tokio::time::advance(Duration::from_secs(31)).await;
    let second_delivery = receive(&queue).await;
    assert_eq!(second_delivery.receive_attempt, 2);

    // Act
    let stale = container.pipeline().process(first_delivery).await;
    let current = container.pipeline().process(second_delivery).await;

    // Assert
    assert_eq!(stale.disposition, Disposition::DeleteFailed);
    assert_eq!(current.disposition, Disposition::Deleted);
    assert_eq!(acknowledgement.failures().await, 1);
    assert_eq!(acknowledgement.successes().await, 1);
    assert!(queue.is_empty());
}

struct BrokenErrorHandler {
    panic: bool,
}

#[async_trait::async_trait]
impl ErrorHandler for BrokenErrorHandler {
    async fn handle(
        &self,
        _message: &Message,
        _cause: &ProcessingError,
    ) -> Result<Decision, anyhow::Error> {
        if self.panic {
            panic!("The error handler exploded");
        }
        anyhow::bail!("The error handler is broken")
    }
}

#[tokio::test]
async fn messages_are_redelivered_when_the_error_handler_fails() {
    for panic in [false, true] {
        // Arrange
        let queue = queue_with_one_message().await;
        let listener = RecordingEventListener::default();
        let container = ListenerContainer::builder(queue.clone())
            .error_handler(BrokenErrorHandler { panic })
            .with_event_listener(listener.clone())
            .handler(failing_handler);

        // Act
        let summary = container.pipeline().process(receive(&queue).await).await;

        // Assert
        assert_eq!(summary.decision, Some(Decision::Redeliver));
        assert_eq!(summary.disposition, Disposition::Requeued);
        assert!(listener.events().contains(&"ErrorHandlerFailed"));
        assert_eq!(queue.approximate_number_of_messages(), 1);
    }
}

struct PanickingHandler;

#[async_trait::async_trait]
impl Handler for PanickingHandler {
    async fn handle(&self, _message: &Message) -> Result<(), HandlerError> {
        panic!("The handler exploded")
    }
}

#[tokio::test]
async fn a_panicking_handler_is_a_failure() {
    // Arrange
    let queue = queue_with_one_message().await;
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let container = ListenerContainer::builder(queue.clone())
        .error_handler(error_handler.clone())
        .raw_handler(PanickingHandler);

    // Act
    let summary = container.pipeline().process(receive(&queue).await).await;

    // Assert
    assert!(matches!(
        summary.outcome.error(),
        Some(ProcessingError::Panicked { message, .. }) if message == "The handler exploded"
    ));
    assert_eq!(error_handler.calls().await, 1);
    assert_eq!(summary.disposition, Disposition::Requeued);
}

#[derive(Clone, Debug, PartialEq)]
struct Tenant(String);

struct TenantInterceptor;

#[async_trait::async_trait]
impl Interceptor for TenantInterceptor {
    async fn before(&self, message: &mut Message) -> Result<(), anyhow::Error> {
        message.attributes.insert("tenant".into(), "acme".into());
        set_message_local_item(Tenant("acme".into()));
        Ok(())
    }
}

#[tokio::test]
async fn handlers_see_the_message_as_enriched_by_interceptors() {
    // Arrange
    let queue = queue_with_one_message().await;
    let seen = Arc::new(tokio::sync::Mutex::new(None));
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptor(TenantInterceptor)
        .raw_handler(TenantHandler(seen.clone()));

    // Act
    let summary = container.pipeline().process(receive(&queue).await).await;

    // Assert
    assert!(summary.outcome.is_success());
    assert_eq!(summary.message.attribute("tenant"), Some("acme"));
    assert_eq!(
        *seen.lock().await,
        Some((Some("acme".to_owned()), Some(Tenant("acme".into()))))
    );
    // Message-local storage does not outlive the pass.
    assert_eq!(get_message_local_item::<Tenant>(), None);
}

type SeenTenant = Option<(Option<String>, Option<Tenant>)>;

struct TenantHandler(Arc<tokio::sync::Mutex<SeenTenant>>);

#[async_trait::async_trait]
impl Handler for TenantHandler {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        *self.0.lock().await = Some((
            message.attribute("tenant").map(ToOwned::to_owned),
            get_message_local_item::<Tenant>(),
        ));
        Ok(())
    }
}

struct PanickingEventListener;

impl EventListener for PanickingEventListener {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        if let PipelineEventKind::MessageReceived { .. } = event.kind {
            panic!("The event listener exploded");
        }
    }
}

#[tokio::test]
async fn a_panicking_event_listener_does_not_abort_the_pass() {
    // Arrange
    let queue = queue_with_one_message().await;
    let journal = Journal::default();
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let listener = RecordingEventListener::default();
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptor(JournalingInterceptor::new("a", &journal))
        .error_handler(error_handler.clone())
        .with_event_listener(PanickingEventListener)
        .with_event_listener(listener.clone())
        .handler(ok_handler);

    // Act
    let summary = container.pipeline().process(receive(&queue).await).await;

    // Assert
    assert!(summary.outcome.is_success());
    assert_eq!(summary.disposition, Disposition::Deleted);
    assert!(queue.is_empty());
    assert_eq!(queue.in_flight_count(), 0);
    assert_eq!(error_handler.calls().await, 0);
    assert_eq!(*journal.lock().await, vec!["before:a", "after:a:true"]);
    // Listeners registered after the panicking one still see every event.
    assert_eq!(
        listener.events(),
        vec![
            "MessageReceived",
            "HandlerCompleted",
            "DeleteSucceeded",
            "PassCompleted"
        ]
    );
}

struct ReplacingInterceptor;

#[async_trait::async_trait]
impl Interceptor for ReplacingInterceptor {
    async fn before(&self, message: &mut Message) -> Result<(), anyhow::Error> {
        *message = Message::new(message.queue_name.clone(), "replaced");
        Ok(())
    }
}

#[tokio::test]
async fn a_message_replaced_by_a_before_hook_is_still_acknowledged() {
    // Arrange
    let queue = queue_with_one_message().await;
    let acknowledgement = CountingAcknowledgement::default();
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptor(ReplacingInterceptor)
        .acknowledgement_callback(acknowledgement.clone())
        .handler(ok_handler);
    let message = receive(&queue).await;
    let message_id = message.id();
    let receipt_handle = message.receipt_handle().clone();

    // Act
    let summary = container.pipeline().process(message).await;

    // Assert
    assert!(summary.outcome.is_success());
    assert_eq!(summary.disposition, Disposition::Deleted);
    assert!(queue.is_empty());
    assert_eq!(acknowledgement.successes().await, 1);
    assert_eq!(acknowledgement.failures().await, 0);
    assert_eq!(summary.message.body, b"replaced");
    assert_eq!(summary.message.id(), message_id);
    assert_eq!(summary.message.receipt_handle(), &receipt_handle);
}

#[tokio::test]
async fn a_failed_message_replaced_by_a_before_hook_is_requeued() {
    // Arrange
    let queue = queue_with_one_message().await;
    let container = ListenerContainer::builder(queue.clone())
        .with_interceptor(ReplacingInterceptor)
        .handler(failing_handler);
    let message = receive(&queue).await;
    let message_id = message.id();

    // Act
    let summary = container.pipeline().process(message).await;

    // Assert
    assert_eq!(summary.disposition, Disposition::Requeued);
    let redelivered = receive(&queue).await;
    assert_eq!(redelivered.id(), message_id);
    assert_eq!(redelivered.receive_attempt, 2);
}
