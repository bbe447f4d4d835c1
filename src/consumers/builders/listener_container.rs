use crate::configuration::ListenerSettings;
use crate::consumers::events::{EventListener, TracingEventListener};
use crate::consumers::handler::{AsyncClosure, ClosureHandler};
use crate::consumers::hooks::acknowledgement::IgnoreAcknowledgement;
use crate::consumers::hooks::error_handler::AlwaysRedeliver;
use crate::consumers::pipeline::EventListeners;
use crate::consumers::worker::Worker;
use crate::consumers::{
    AcknowledgementCallback, ErrorHandler, Handler, Interceptor, InterceptorChain, Pipeline,
};
use crate::queue::Queue;
use futures_util::future::join_all;
use futures_util::Future;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 10;
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// The lifecycle of a [`ListenerContainer`].
///
/// ```text
/// Created -> Starting -> Running -> Stopping -> Stopped
///                           ^                      |
///                           +------ start() -------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ContainerError {
    #[error("Cannot {operation} listener container `{container_id}`: it is {from}")]
    InvalidTransition {
        container_id: String,
        from: ContainerState,
        operation: &'static str,
    },
    #[error("Listener container `{container_id}` must have at least one worker")]
    NoWorkers { container_id: String },
    #[error("{count} worker(s) of listener container `{container_id}` panicked")]
    WorkerPanicked { container_id: String, count: usize },
    #[error("A listener container with id `{0}` is already registered")]
    DuplicateId(String),
}

/// A snapshot of a container configuration and state, used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescription {
    pub id: String,
    pub queue_name: String,
    pub state: ContainerState,
    pub max_concurrent_messages: usize,
    pub poll_timeout: Duration,
    pub interceptors: usize,
    /// The [`ErrorHandler::name`](crate::consumers::ErrorHandler::name) of the error handler.
    pub error_handler: String,
    /// The [`AcknowledgementCallback::name`](crate::consumers::AcknowledgementCallback::name) of
    /// the acknowledgement callback.
    pub acknowledgement: String,
}

impl fmt::Display for ContainerDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "container `{}` on queue `{}` ({}): {} worker(s), {} interceptor(s), \
             poll timeout {:?}, error handler `{}`, acknowledgement `{}`",
            self.id,
            self.queue_name,
            self.state,
            self.max_concurrent_messages,
            self.interceptors,
            self.poll_timeout,
            self.error_handler,
            self.acknowledgement
        )
    }
}

struct RunningWorkers {
    stop: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Consumes messages from a single queue with a bounded pool of workers, running each of them
/// through the processing pipeline (interceptors, handler, error handler, acknowledgement).
///
/// Use [`ListenerContainer::builder`] to compose a `ListenerContainer` using a fluent builder
/// API, then [`start`](ListenerContainer::start) it.
///
/// A container can be stopped and started again. Stopping is graceful: every message that
/// has already been dequeued is processed to completion before [`stop`](ListenerContainer::stop)
/// returns.
pub struct ListenerContainer {
    id: String,
    max_concurrent_messages: usize,
    poll_timeout: Duration,
    pipeline: Arc<Pipeline>,
    state: watch::Sender<ContainerState>,
    /// Serialises lifecycle transitions.
    workers: Mutex<Option<RunningWorkers>>,
}

impl ListenerContainer {
    /// Start building a [`ListenerContainer`] consuming from `queue`.
    pub fn builder<Q: Queue>(queue: Q) -> ListenerContainerBuilder {
        ListenerContainerBuilder::new(Arc::new(queue))
    }

    /// A version of [`ListenerContainer::builder`] for an already Arc-ed queue.
    pub fn builder_with_dyn_queue(queue: Arc<dyn Queue>) -> ListenerContainerBuilder {
        ListenerContainerBuilder::new(queue)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn queue_name(&self) -> &str {
        self.pipeline.queue.name()
    }

    pub fn max_concurrent_messages(&self) -> usize {
        self.max_concurrent_messages
    }

    pub fn state(&self) -> ContainerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ContainerState::Running
    }

    /// Subscribe to the state transitions of the container.
    pub fn watch_state(&self) -> watch::Receiver<ContainerState> {
        self.state.subscribe()
    }

    /// The processing pipeline shared by the workers.
    ///
    /// Useful to drive a single pass by hand, e.g. in tests.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn describe(&self) -> ContainerDescription {
        ContainerDescription {
            id: self.id.clone(),
            queue_name: self.queue_name().to_owned(),
            state: self.state(),
            max_concurrent_messages: self.max_concurrent_messages,
            poll_timeout: self.poll_timeout,
            interceptors: self.pipeline.interceptors.len(),
            error_handler: self.pipeline.error_handler.name().to_owned(),
            acknowledgement: self.pipeline.acknowledgement_callback.name().to_owned(),
        }
    }

    /// Spawn the worker pool: the container starts consuming messages.
    ///
    /// Allowed from `Created` and `Stopped`. It must be called from within a tokio runtime.
    #[tracing::instrument(
        skip_all,
        name = "listener_container_start",
        fields(container_id = %self.id)
    )]
    pub async fn start(&self) -> Result<(), ContainerError> {
        let mut workers = self.workers.lock().await;
        let current = self.state();
        if !matches!(current, ContainerState::Created | ContainerState::Stopped) {
            return Err(self.invalid_transition(current, "start"));
        }
        if self.max_concurrent_messages == 0 {
            return Err(ContainerError::NoWorkers {
                container_id: self.id.clone(),
            });
        }

        self.state.send_replace(ContainerState::Starting);
        let (stop, stop_receiver) = watch::channel(false);
        let handles = (0..self.max_concurrent_messages)
            .map(|index| {
                let worker = Worker {
                    index,
                    container_id: self.id.clone(),
                    pipeline: self.pipeline.clone(),
                    poll_timeout: self.poll_timeout,
                };
                tokio::spawn(worker.run_until_stopped(stop_receiver.clone()))
            })
            .collect();
        *workers = Some(RunningWorkers { stop, handles });
        self.state.send_replace(ContainerState::Running);

        tracing::info!(
            queue_name = %self.queue_name(),
            max_concurrent_messages = self.max_concurrent_messages,
            "Listener container started"
        );
        Ok(())
    }

    /// Signal the workers to stop and wait for the in-flight messages to be processed.
    ///
    /// Only allowed from `Running`. The container is `Stopped` when `stop` returns, even if some
    /// workers panicked.
    #[tracing::instrument(
        skip_all,
        name = "listener_container_stop",
        fields(container_id = %self.id)
    )]
    pub async fn stop(&self) -> Result<(), ContainerError> {
        let mut workers = self.workers.lock().await;
        let current = self.state();
        if current != ContainerState::Running {
            return Err(self.invalid_transition(current, "stop"));
        }

        self.state.send_replace(ContainerState::Stopping);
        let mut panicked = 0;
        if let Some(RunningWorkers { stop, handles }) = workers.take() {
            // Workers that are already gone dropped their receivers, that's fine.
            let _ = stop.send(true);
            panicked = join_all(handles)
                .await
                .into_iter()
                .filter(Result::is_err)
                .count();
        }
        self.state.send_replace(ContainerState::Stopped);
        tracing::info!("Listener container stopped");

        if panicked > 0 {
            return Err(ContainerError::WorkerPanicked {
                container_id: self.id.clone(),
                count: panicked,
            });
        }
        Ok(())
    }

    /// Start the container, wait for `shutdown` to resolve and then stop it gracefully.
    pub async fn run_until_shutdown(
        &self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ContainerError> {
        self.start().await?;
        shutdown.await;
        tracing::info!(container_id = %self.id, "Listener container received shutdown signal");
        self.stop().await
    }

    fn invalid_transition(&self, from: ContainerState, operation: &'static str) -> ContainerError {
        ContainerError::InvalidTransition {
            container_id: self.id.clone(),
            from,
            operation,
        }
    }
}

/// A builder to compose a [`ListenerContainer`] with a fluent API.
///
/// Use [`ListenerContainer::builder`] as entrypoint.
///
/// Unless configured otherwise, a container:
///
/// - runs 10 workers polling with a 1 second timeout;
/// - redelivers every failed message ([`AlwaysRedeliver`]);
/// - ignores acknowledgement results ([`IgnoreAcknowledgement`]);
/// - logs every pipeline event ([`TracingEventListener`]).
pub struct ListenerContainerBuilder {
    id: Option<String>,
    queue: Arc<dyn Queue>,
    max_concurrent_messages: usize,
    poll_timeout: Duration,
    interceptors: Vec<Arc<dyn Interceptor>>,
    error_handler: Arc<dyn ErrorHandler>,
    acknowledgement_callback: Arc<dyn AcknowledgementCallback>,
    event_listeners: Vec<Arc<dyn EventListener>>,
}

impl ListenerContainerBuilder {
    fn new(queue: Arc<dyn Queue>) -> Self {
        Self {
            id: None,
            queue,
            max_concurrent_messages: DEFAULT_MAX_CONCURRENT_MESSAGES,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            interceptors: vec![],
            error_handler: Arc::new(AlwaysRedeliver),
            acknowledgement_callback: Arc::new(IgnoreAcknowledgement),
            event_listeners: vec![Arc::new(TracingEventListener)],
        }
    }

    /// Set the identifier of the container.
    ///
    /// Defaults to the queue name followed by a random suffix.
    #[must_use]
    pub fn id<T: Into<String>>(mut self, id: T) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The size of the worker pool, e.g. the maximum number of messages processed concurrently.
    #[must_use]
    pub fn max_concurrent_messages(mut self, max_concurrent_messages: usize) -> Self {
        self.max_concurrent_messages = max_concurrent_messages;
        self
    }

    /// How long a worker waits for a message before checking whether it should stop.
    #[must_use]
    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Apply the pool size and the poll timeout from `settings`.
    #[must_use]
    pub fn with_settings(self, settings: &ListenerSettings) -> Self {
        self.max_concurrent_messages(settings.max_concurrent_messages)
            .poll_timeout(settings.poll_timeout())
    }

    /// Add an interceptor to inject logic before and after the handler logic.
    ///
    /// Interceptors are executed in the order they are registered, both before and after the
    /// handler.
    ///
    /// Check out [`Interceptor`]'s documentation for more details.
    #[must_use]
    pub fn with_interceptor<I: Interceptor>(self, interceptor: I) -> Self {
        self.with_dyn_interceptor(Arc::new(interceptor))
    }

    /// Append a dynamic interceptor, see [`ListenerContainerBuilder::with_interceptor`].
    #[must_use]
    pub fn with_dyn_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Append multiple dynamic interceptors, see [`ListenerContainerBuilder::with_interceptor`].
    #[must_use]
    pub fn with_interceptors<I>(mut self, interceptors: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Interceptor>>,
    {
        self.interceptors.extend(interceptors);
        self
    }

    /// Decide what happens to messages whose processing failed.
    ///
    /// Check out [`ErrorHandler`]'s documentation for more details.
    #[must_use]
    pub fn error_handler<H: ErrorHandler>(self, error_handler: H) -> Self {
        self.dyn_error_handler(Arc::new(error_handler))
    }

    /// A version of [`ListenerContainerBuilder::error_handler`] for already Arc-ed handlers.
    ///
    /// Useful for sharing `!Clone` error handlers across containers.
    #[must_use]
    pub fn dyn_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    /// Get notified about the result of each delete.
    ///
    /// Check out [`AcknowledgementCallback`]'s documentation for more details.
    #[must_use]
    pub fn acknowledgement_callback<A: AcknowledgementCallback>(self, callback: A) -> Self {
        self.dyn_acknowledgement_callback(Arc::new(callback))
    }

    /// A version of [`ListenerContainerBuilder::acknowledgement_callback`] for already Arc-ed
    /// callbacks.
    #[must_use]
    pub fn dyn_acknowledgement_callback(
        mut self,
        callback: Arc<dyn AcknowledgementCallback>,
    ) -> Self {
        self.acknowledgement_callback = callback;
        self
    }

    /// Receive every pipeline event, in addition to the default [`TracingEventListener`].
    #[must_use]
    pub fn with_event_listener<L: EventListener>(self, listener: L) -> Self {
        self.with_dyn_event_listener(Arc::new(listener))
    }

    /// Append a dynamic event listener, see [`ListenerContainerBuilder::with_event_listener`].
    #[must_use]
    pub fn with_dyn_event_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.event_listeners.push(listener);
        self
    }

    /// The handler function used to process incoming messages.
    ///
    /// Passing in the handler function finalises the `ListenerContainer` construction - you will
    /// not be able to register additional interceptors or hooks after having specified the
    /// handler.
    ///
    /// # Scope
    ///
    /// The function does not get access to the underlying queue.
    /// The container takes care of deleting or requeueing the message according to the outcome
    /// of processing and the decision of the [`ErrorHandler`].
    pub fn handler<H>(self, handler: H) -> ListenerContainer
    where
        H: for<'a> AsyncClosure<'a>,
    {
        self.raw_handler(ClosureHandler(handler))
    }

    /// The raw handler used to process incoming messages. Prefer `handler` if you
    /// only want to register a function handler.
    ///
    /// Check out [`Handler`]'s documentation for more details.
    pub fn raw_handler<H: Handler>(self, handler: H) -> ListenerContainer {
        self.raw_arc_handler(Arc::new(handler))
    }

    /// The raw Arc<handler> used to process incoming messages, see
    /// [`ListenerContainerBuilder::raw_handler`].
    pub fn raw_arc_handler(self, handler: Arc<dyn Handler>) -> ListenerContainer {
        let Self {
            id,
            queue,
            max_concurrent_messages,
            poll_timeout,
            interceptors,
            error_handler,
            acknowledgement_callback,
            event_listeners,
        } = self;
        let id = id.unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("{}-{}", queue.name(), &suffix[..8])
        });
        let pipeline = Pipeline {
            queue,
            interceptors: InterceptorChain::new(interceptors),
            handler,
            error_handler,
            acknowledgement_callback,
            listeners: EventListeners(event_listeners),
        };
        let (state, _) = watch::channel(ContainerState::Created);
        ListenerContainer {
            id,
            max_concurrent_messages,
            poll_timeout,
            pipeline: Arc::new(pipeline),
            state,
            workers: Mutex::new(None),
        }
    }
}
