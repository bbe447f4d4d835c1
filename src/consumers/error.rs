use crate::simulation::SimulatedFailure;

/// The error type returned by message handlers.
///
/// Any failure ends up in the [`ErrorHandler`](crate::consumers::ErrorHandler), which decides
/// if the message should be redelivered.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    /// A failure injected by the [`FailureSimulator`](crate::simulation::FailureSimulator).
    #[error(transparent)]
    Simulated(#[from] SimulatedFailure),
    /// Any other failure raised by business logic.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why a pass over a message did not succeed.
///
/// It is the cause carried by [`ProcessingOutcome::Failure`](crate::consumers::ProcessingOutcome).
#[derive(thiserror::Error, Debug)]
pub enum ProcessingError {
    /// The handler returned an error.
    #[error("The handler failed to process the message: {0}")]
    Handler(#[source] HandlerError),
    /// A `before` hook failed, the handler was never invoked.
    #[error("Interceptor `{interceptor}` failed before the handler ran: {source}")]
    Interceptor {
        interceptor: String,
        #[source]
        source: anyhow::Error,
    },
    /// A hook panicked while processing the message.
    #[error("{stage} panicked: {message}")]
    Panicked { stage: String, message: String },
}

impl ProcessingError {
    /// `true` if the failure was injected by the failure simulator.
    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Handler(HandlerError::Simulated(_)))
    }
}

impl From<HandlerError> for ProcessingError {
    fn from(e: HandlerError) -> Self {
        Self::Handler(e)
    }
}

/// Best effort extraction of a human readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
