use crate::consumers::{Message, ProcessingError};

#[async_trait::async_trait]
/// A hook to determine the fate of a message whose processing failed.
///
/// # Use case
///
/// The container invokes the error handler for every failed pass - the handler returned an
/// error, or an interceptor failed before the handler could run.
/// The returned [`Decision`] tells the container what to do with the message.
///
/// # Failures
///
/// If the error handler itself returns an error (or panics) the container logs it and falls
/// back to [`Decision::Redeliver`].
///
/// # Plug and play implementations
///
/// You can find ready-to-go error handlers in the [`hooks::error_handler`] module -
/// [`AlwaysRedeliver`] (the default), [`AlwaysSuppress`], [`LoggingErrorHandler`] and
/// [`RedeliverUntil`].
///
/// [`hooks::error_handler`]: crate::consumers::hooks::error_handler
/// [`AlwaysRedeliver`]: crate::consumers::hooks::error_handler::AlwaysRedeliver
/// [`AlwaysSuppress`]: crate::consumers::hooks::error_handler::AlwaysSuppress
/// [`LoggingErrorHandler`]: crate::consumers::hooks::error_handler::LoggingErrorHandler
/// [`RedeliverUntil`]: crate::consumers::hooks::error_handler::RedeliverUntil
pub trait ErrorHandler: Send + Sync + 'static {
    /// The name shown in the container description.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(
        &self,
        message: &Message,
        cause: &ProcessingError,
    ) -> Result<Decision, anyhow::Error>;
}

/// assert it's object safe
type _CHECK = Box<dyn ErrorHandler>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Determines what happens to a message whose processing failed.
///
/// Check out [`ErrorHandler`]'s documentation for more details.
pub enum Decision {
    /// Do not delete the message: hand it back to the queue for a future delivery attempt.
    Redeliver,
    /// Treat the failure as handled: the message is deleted and the error is only recorded.
    Suppress,
}
