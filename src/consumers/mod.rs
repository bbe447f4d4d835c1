//! Facilities to consume messages from a queue. Check out [`ListenerContainer`] as a
//! starting point.
pub use acknowledgement::AcknowledgementCallback;
pub use builders::{
    ContainerDescription, ContainerError, ContainerState, ListenerContainer,
    ListenerContainerBuilder, ListenerContainerRegistry,
};
pub use error::{HandlerError, ProcessingError};
pub use error_handler::{Decision, ErrorHandler};
pub use events::{EventListener, PipelineEvent, PipelineEventKind, TracingEventListener};
pub use extensions::{get_message_local_item, set_message_local_item};
pub use handler::{AsyncClosure, ClosureHandler, Handler};
pub use incoming_message::{Message, MessageId, ReceiptHandle, CORRELATION_ID_ATTRIBUTE};
pub use interceptor::{Interceptor, InterceptorChain};
pub use pipeline::{Disposition, PassSummary, Pipeline, ProcessingOutcome};

mod acknowledgement;
mod builders;
mod error;
mod error_handler;
mod events;
mod extensions;
mod handler;
pub mod hooks;
mod incoming_message;
mod interceptor;
mod pipeline;
mod worker;
