use crate::helpers::{
    get_broker, get_publisher, wait_until, CountingAcknowledgement, CountingErrorHandler,
};
use queue_listener::configuration::{FailureSimulationSettings, ListenerSettings};
use queue_listener::consumers::hooks::interceptors::CorrelationIdInterceptor;
use queue_listener::consumers::{Decision, ListenerContainer};
use queue_listener::orders::{listener_registry, OrderEvent, OrderHandler, OrderProducer};
use queue_listener::simulation::FailureSimulator;
use std::sync::Arc;
use std::time::Duration;

fn settings(failure_simulation: FailureSimulationSettings) -> ListenerSettings {
    ListenerSettings {
        max_concurrent_messages: 4,
        poll_timeout_millis: Some(50),
        failure_simulation,
        ..ListenerSettings::default()
    }
}

#[tokio::test]
async fn a_failing_order_is_redelivered_until_it_succeeds() {
    // Arrange
    let settings = settings(FailureSimulationSettings {
        enabled: true,
        target_key: "order-2".into(),
        fail_n_times: 2,
    });
    let broker = get_broker();
    let queue = broker.queue(&settings.queue_name);
    let handler = Arc::new(OrderHandler::new(Arc::new(FailureSimulator::new(
        settings.failure_simulation.clone(),
    ))));
    let acknowledgement = CountingAcknowledgement::default();
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let container = ListenerContainer::builder(queue.clone())
        .with_settings(&settings)
        .with_interceptor(CorrelationIdInterceptor)
        .error_handler(error_handler.clone())
        .acknowledgement_callback(acknowledgement.clone())
        .raw_arc_handler(handler.clone());
    let producer = OrderProducer::new(get_publisher(&broker), &settings.queue_name);

    // Act
    container.start().await.unwrap();
    producer.send(3).await.unwrap();
    wait_until(|| {
        let acknowledgement = acknowledgement.clone();
        async move { acknowledgement.successes().await == 3 }
    })
    .await;
    container.stop().await.unwrap();

    // Assert
    assert_eq!(handler.invocations(), 5);
    assert_eq!(handler.simulator().attempts("order-2"), 2);
    assert_eq!(error_handler.calls().await, 2);
    for cause in error_handler.causes.lock().await.iter() {
        assert!(cause.contains("Simulated failure for order-2"), "{cause}");
    }
    let mut received = handler.received();
    received.sort_by(|a, b| a.order_id.cmp(&b.order_id));
    assert_eq!(
        received,
        (1..=3).map(OrderEvent::numbered).collect::<Vec<_>>()
    );
    assert!(queue.is_empty());
}

#[tokio::test]
async fn without_failures_every_order_is_acknowledged_once() {
    // Arrange
    let settings = settings(FailureSimulationSettings::default());
    let broker = get_broker();
    let queue = broker.queue(&settings.queue_name);
    let handler = Arc::new(OrderHandler::new(Arc::new(FailureSimulator::disabled())));
    let acknowledgement = CountingAcknowledgement::default();
    let error_handler = CountingErrorHandler::new(Decision::Redeliver);
    let container = ListenerContainer::builder(queue.clone())
        .with_settings(&settings)
        .error_handler(error_handler.clone())
        .acknowledgement_callback(acknowledgement.clone())
        .raw_arc_handler(handler.clone());
    let producer = OrderProducer::new(get_publisher(&broker), &settings.queue_name);

    // Act
    container.start().await.unwrap();
    let ids = producer.send(10).await.unwrap();
    wait_until(|| {
        let acknowledgement = acknowledgement.clone();
        async move { acknowledgement.successes().await == 10 }
    })
    .await;
    container.stop().await.unwrap();

    // Assert
    assert_eq!(handler.invocations(), 10);
    assert_eq!(error_handler.calls().await, 0);
    assert_eq!(acknowledgement.failures().await, 0);
    let mut acknowledged = acknowledgement.successes.lock().await.clone();
    let mut sent = ids;
    acknowledged.sort_by_key(ToString::to_string);
    sent.sort_by_key(ToString::to_string);
    assert_eq!(acknowledged, sent);
}

#[tokio::test]
async fn the_orders_registry_wires_the_enabled_scenarios() {
    // Arrange
    let mut settings = settings(FailureSimulationSettings::default());
    settings.scenarios.interceptor_logging = true;
    settings.scenarios.error_handler = true;
    settings.scenarios.ack_callback = true;
    settings.scenarios.assembly_view = true;
    let broker = get_broker();
    let handler = Arc::new(OrderHandler::new(Arc::new(FailureSimulator::disabled())));

    // Act
    let registry = listener_registry(
        &settings,
        broker.queue(&settings.queue_name),
        handler.clone(),
    )
    .unwrap();
    registry.start_all().await.unwrap();
    OrderProducer::new(get_publisher(&broker), &settings.queue_name)
        .send(2)
        .await
        .unwrap();
    wait_until(|| {
        let handler = handler.clone();
        let queue = broker.queue(&settings.queue_name);
        async move { handler.received().len() == 2 && queue.is_empty() }
    })
    .await;
    registry.stop_all().await.unwrap();

    // Assert
    let descriptions = registry.describe_all();
    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].id, "orders-listener");
    assert_eq!(descriptions[0].interceptors, 1);
    assert_eq!(descriptions[0].max_concurrent_messages, 4);
    assert_eq!(descriptions[0].poll_timeout, Duration::from_millis(50));
    assert_eq!(descriptions[0].error_handler, "logging");
    assert_eq!(descriptions[0].acknowledgement, "logging");
}
