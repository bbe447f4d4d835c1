use queue_listener::configuration::{FailureSimulationSettings, ListenerSettings};
use queue_listener::orders::{listener_registry, OrderHandler, OrderProducer};
use queue_listener::publishers::Publisher;
use queue_listener::queue::InMemoryBroker;
use queue_listener::simulation::FailureSimulator;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Settings can be loaded from a JSON file passed as first argument.
    // Without it, `order-2` fails twice and every optional scenario is enabled.
    let settings = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => {
            let mut settings = ListenerSettings {
                failure_simulation: FailureSimulationSettings {
                    enabled: true,
                    target_key: "order-2".into(),
                    fail_n_times: 2,
                },
                ..ListenerSettings::default()
            };
            settings.scenarios.interceptor_logging = true;
            settings.scenarios.error_handler = true;
            settings.scenarios.ack_callback = true;
            settings.scenarios.assembly_view = true;
            settings
        }
    };

    // The broker owns the queues: the producer and the listener container share it.
    let broker = InMemoryBroker::new(settings.queue.clone());
    let queue = broker.queue(&settings.queue_name);

    // The simulator is injected in the handler: it decides which orders fail, and how many
    // times.
    let simulator = FailureSimulator::new(settings.failure_simulation.clone());
    let handler = Arc::new(OrderHandler::new(Arc::new(simulator)));

    let registry = listener_registry(&settings, queue.clone(), handler.clone())?;
    registry.start_all().await?;

    let publisher = Publisher::builder(broker.clone())
        .publish_timeout(Duration::from_secs(3))
        .build();
    let producer = OrderProducer::new(publisher, &settings.queue_name);
    let sent = producer.send(3).await?.len();

    // Wait for every order to be processed, or for Ctrl+C.
    let drained = async {
        while handler.received().len() < sent || !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    tokio::select! {
        _ = drained => tracing::info!("All orders processed"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(30)) => {
            tracing::warn!("Timed out waiting for the orders")
        }
    }

    registry.stop_all().await?;
    tracing::info!(
        handler_invocations = handler.invocations(),
        processed = handler.received().len(),
        "Demo completed"
    );
    Ok(())
}
