//! Facilities to publish messages to a queue. Check out [`Publisher`] as a starting point.
mod message_envelope;
mod publisher;
mod publisher_middleware;

pub use message_envelope::{MessageEnvelope, SENT_TIMESTAMP_ATTRIBUTE};
pub use publisher::{Publisher, PublisherBuilder, PublisherError};
pub use publisher_middleware::{Next, PublisherMiddleware};
