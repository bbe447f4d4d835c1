use crate::consumers::Message;
use crate::queue::QueueError;

/// Reports the outcome of acknowledging (deleting) a message.
///
/// # When is it invoked?
///
/// Only after a successful pass - the handler succeeded, or the [`ErrorHandler`] suppressed the
/// failure - once the queue has answered the delete request.
/// Messages that are redelivered never reach the callback.
///
/// A failed delete does not change the processing outcome: the message was processed, it may
/// simply be delivered again later because it is still in the queue.
///
/// Callbacks are purely observational. Panics are caught and logged by the container.
///
/// [`ErrorHandler`]: crate::consumers::ErrorHandler
#[async_trait::async_trait]
pub trait AcknowledgementCallback: Send + Sync + 'static {
    /// The name shown in the container description.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn on_delete_success(&self, message: &Message);

    async fn on_delete_failure(&self, message: &Message, error: &QueueError);
}

/// assert it's object safe
type _CHECK = Box<dyn AcknowledgementCallback>;
