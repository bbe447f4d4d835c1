use crate::consumers::error::panic_message;
use crate::consumers::Pipeline;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long a worker waits before polling again after the queue failed to answer.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// A single polling loop of a [`ListenerContainer`].
///
/// A container spawns `max_concurrent_messages` workers: each of them processes at most one
/// message at a time, which bounds the number of in-flight messages.
///
/// Users of the crate are never exposed to `Worker` directly.
///
/// [`ListenerContainer`]: super::ListenerContainer
pub(super) struct Worker {
    pub(super) index: usize,
    pub(super) container_id: String,
    pub(super) pipeline: Arc<Pipeline>,
    /// How long a single receive waits for a message before checking the stop signal again.
    pub(super) poll_timeout: Duration,
}

impl Worker {
    /// Poll the queue and process messages until `stop` flips to `true` (or its sender is
    /// dropped).
    ///
    /// A message that has been dequeued is always processed to completion: the stop signal is
    /// only checked between messages.
    #[tracing::instrument(
        skip_all,
        name = "listener_worker",
        fields(container_id = %self.container_id, worker = self.index)
    )]
    pub(super) async fn run_until_stopped(self, mut stop: watch::Receiver<bool>) {
        tracing::debug!("Worker started");
        'poll: loop {
            if *stop.borrow_and_update() {
                break 'poll;
            }

            // The dequeue future is cancel-safe: dropping it when the stop signal wins the race
            // does not lose a message.
            let received = tokio::select! {
                // prefer stopping over receiving more messages
                biased;

                changed = stop.changed() => {
                    if changed.is_err() {
                        break 'poll;
                    }
                    continue 'poll;
                }
                received = self.pipeline.queue.dequeue(self.poll_timeout) => received,
            };

            match received {
                Ok(Some(message)) => {
                    let message_id = message.id;
                    // A panic escaping the pipeline must not take the worker down.
                    let pass = AssertUnwindSafe(self.pipeline.process(message))
                        .catch_unwind()
                        .await;
                    if let Err(payload) = pass {
                        tracing::error!(
                            %message_id,
                            "Message processing panicked: {}",
                            panic_message(payload.as_ref())
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive a message");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }
        tracing::debug!("Worker stopped");
    }
}
