//! Configuration types for listener containers, the in-memory queue and the failure simulator.
//!
//! All types implement `Deserialize` (kebab-case field names) and `Default`, so they can be
//! loaded from whatever configuration source the host process uses.
use serde::Deserialize;
use serde_aux::field_attributes::{deserialize_bool_from_anything, deserialize_number_from_string};
use std::time::Duration;

const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 10;
const DEFAULT_POLL_TIMEOUT_MILLIS: u64 = 1_000;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
/// Configuration of a [`ListenerContainer`](crate::consumers::ListenerContainer) and the
/// scenario hooks wired around it.
///
/// `ListenerSettings::default()` consumes from the `orders` queue with 10 workers and no
/// optional scenario enabled.
pub struct ListenerSettings {
    /// The name of the queue to consume from.
    pub queue_name: String,
    /// Size of the worker pool: how many messages are processed concurrently.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_messages: usize,
    /// How long a worker waits for a message before polling again, in milliseconds.
    pub poll_timeout_millis: Option<u64>,
    #[serde(default)]
    pub failure_simulation: FailureSimulationSettings,
    #[serde(default)]
    pub scenarios: ScenarioSettings,
    #[serde(default)]
    pub queue: InMemoryQueueSettings,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            queue_name: "orders".into(),
            max_concurrent_messages: DEFAULT_MAX_CONCURRENT_MESSAGES,
            poll_timeout_millis: Some(DEFAULT_POLL_TIMEOUT_MILLIS),
            failure_simulation: FailureSimulationSettings::default(),
            scenarios: ScenarioSettings::default(),
            queue: InMemoryQueueSettings::default(),
        }
    }
}

impl ListenerSettings {
    /// The bounded wait applied to every dequeue.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(
            self.poll_timeout_millis
                .unwrap_or(DEFAULT_POLL_TIMEOUT_MILLIS),
        )
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
/// Which business key should fail, and how many times.
///
/// Disabled by default.
pub struct FailureSimulationSettings {
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub enabled: bool,
    /// The business key (e.g. an order id) that is made to fail.
    pub target_key: String,
    /// How many attempts fail before processing succeeds.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub fail_n_times: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
/// Toggles for the optional hooks wired around a container.
pub struct ScenarioSettings {
    /// Stamp a correlation id on every message and log before/after each pass.
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub interceptor_logging: bool,
    /// Log failures and redeliver the message.
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub error_handler: bool,
    /// Log the outcome of every delete.
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub ack_callback: bool,
    /// Log a description of every container once they have been assembled.
    #[serde(deserialize_with = "deserialize_bool_from_anything")]
    pub assembly_view: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", default)]
/// Redelivery timings of an [`InMemoryQueue`](crate::queue::InMemoryQueue).
pub struct InMemoryQueueSettings {
    /// How long a dequeued message stays invisible before it is redelivered, in milliseconds.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub visibility_timeout_millis: u64,
    /// How long a requeued message waits before becoming visible again, in milliseconds.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub requeue_delay_millis: u64,
}

impl Default for InMemoryQueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout_millis: 30_000,
            requeue_delay_millis: 0,
        }
    }
}

impl InMemoryQueueSettings {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_millis)
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_millis)
    }
}
