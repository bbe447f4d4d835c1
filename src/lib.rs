//! `queue-listener` consumes messages from a queue with a pool of workers and runs each of them
//! through a processing pipeline: interceptors, a handler, an error handler deciding between
//! redelivery and suppression, and an acknowledgement callback.
//!
//! [`ListenerContainer`](crate::consumers::ListenerContainer) and
//! [`Publisher`](crate::publishers::Publisher) are the best starting points to learn more
//! about what `queue-listener` provides and how to leverage it.
//!
//! The [`queue`] module ships an in-memory queue with visibility timeouts and redelivery, while
//! [`simulation`] makes it possible to fail a given business key a controlled number of times.
//!
//! ## Examples
//!
//! Check the `demos` directory to see the library in action on an orders queue.

pub mod configuration;
pub mod consumers;
pub mod orders;
pub mod publishers;
pub mod queue;
pub mod simulation;
