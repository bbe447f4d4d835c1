//! Ready-to-go implementations of the container hooks: error handlers, acknowledgement callbacks
//! and interceptors.
pub mod acknowledgement;
pub mod error_handler;
pub mod interceptors;
