//! The `Handler` trait is heavily inspired by `tide`'s approach to endpoint handlers.
use crate::consumers::{HandlerError, Message};
use std::future::Future;

/// Implementers of the `Handler` trait can be used in a [`ListenerContainer`]
/// to process messages retrieved from a queue.
///
/// # Scope
///
/// `handle` does not get access to the underlying queue.
/// The container takes care of deleting or requeueing the message according to the outcome
/// of processing: `Ok(())` deletes it, an error hands it over to the
/// [`ErrorHandler`](crate::consumers::ErrorHandler).
/// Retries are a property of redelivery, handlers never retry internally.
///
/// # Implementors
///
/// While you can implement `Handler` for a struct or enum, you can also rely on our
/// implementation of `Handler` for async functions that have a matching signature -
/// `Fn(&Message) -> Fut`. See [`AsyncClosure`] for more details.
///
/// [`ListenerContainer`]: crate::consumers::ListenerContainer
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

/// Implement the [`Handler`] trait for all Boxed handlers.
///
/// E.g. Box<dyn Handler>.
#[async_trait::async_trait]
impl<H> Handler for Box<H>
where
    H: Handler + ?Sized,
{
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        H::handle(self, message).await
    }
}

/// `AsyncClosure` is implemented for all functions of the form:
/// ```ignore
/// async fn(message: &Message) -> Result<(), impl Into<HandlerError>>;
/// ```
///
/// When combined with the [`ClosureHandler`] type, you get a [`Handler`] that can be used
/// by listener containers. `ListenerContainerBuilder::handler` performs this wrapping for you.
pub trait AsyncClosure<'a>: Send + Sync + 'static {
    type Output: Future<Output = Result<(), Self::Err>> + Send + 'a;
    type Err: Into<HandlerError> + 'static;
    fn call(&'a self, message: &'a Message) -> Self::Output;
}

impl<'a, F, Fut, Err> AsyncClosure<'a> for F
where
    F: Send + Sync + 'static,
    F: Fn(&'a Message) -> Fut,
    Fut: Future<Output = Result<(), Err>> + Send + 'a,
    Err: Into<HandlerError> + 'static,
{
    type Err = Err;
    type Output = Fut;

    fn call(&'a self, message: &'a Message) -> Self::Output {
        (self)(message)
    }
}

/// Wrapper type to turn an [`AsyncClosure`] into a [`Handler`].
pub struct ClosureHandler<H>(pub H);

/// We do not require handlers to return a [`HandlerError`] directly - it is enough for them to
/// return an error type that can be converted to [`HandlerError`].
#[async_trait::async_trait]
impl<F> Handler for ClosureHandler<F>
where
    F: for<'a> AsyncClosure<'a>,
{
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        self.0.call(message).await.map_err(Into::into)
    }
}
