use crate::consumers::builders::listener_container::{
    ContainerDescription, ContainerError, ContainerState, ListenerContainer,
};
use futures_util::Future;
use std::sync::Arc;

/// A collection of [`ListenerContainer`]s managed as a whole.
///
/// The registry starts and stops all its containers together, and can describe the assembled
/// containers for diagnostics (see [`ListenerContainerRegistry::log_assembly`]).
#[derive(Default)]
pub struct ListenerContainerRegistry {
    containers: Vec<Arc<ListenerContainer>>,
}

impl ListenerContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a container to the registry. Container ids must be unique.
    pub fn register(
        &mut self,
        container: ListenerContainer,
    ) -> Result<Arc<ListenerContainer>, ContainerError> {
        if self.get(container.id()).is_some() {
            return Err(ContainerError::DuplicateId(container.id().to_owned()));
        }
        let container = Arc::new(container);
        self.containers.push(container.clone());
        Ok(container)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<ListenerContainer>> {
        self.containers.iter().find(|c| c.id() == id)
    }

    pub fn containers(&self) -> &[Arc<ListenerContainer>] {
        &self.containers
    }

    /// Start every container that is not running yet, in registration order.
    ///
    /// It stops at the first container that fails to start.
    pub async fn start_all(&self) -> Result<(), ContainerError> {
        for container in &self.containers {
            if !container.is_running() {
                container.start().await?;
            }
        }
        Ok(())
    }

    /// Stop every running container.
    ///
    /// All containers are stopped even if some of them fail: the first error is returned.
    pub async fn stop_all(&self) -> Result<(), ContainerError> {
        let mut first_error = None;
        for container in &self.containers {
            if !container.is_running() {
                continue;
            }
            if let Err(e) = container.stop().await {
                tracing::error!(
                    container_id = %container.id(),
                    error = %e,
                    "Failed to stop listener container"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Start all containers, wait for `shutdown` to resolve and then stop them gracefully.
    pub async fn run_until_shutdown(
        &self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ContainerError> {
        self.start_all().await?;
        shutdown.await;
        tracing::info!("Listener container registry received shutdown signal");
        self.stop_all().await
    }

    pub fn describe_all(&self) -> Vec<ContainerDescription> {
        self.containers.iter().map(|c| c.describe()).collect()
    }

    /// Log the configuration and state of every registered container.
    pub fn log_assembly(&self) {
        tracing::info!(
            containers = self.containers.len(),
            "Listener containers assembled"
        );
        for description in self.describe_all() {
            tracing::info!(
                container_id = %description.id,
                queue_name = %description.queue_name,
                state = %description.state,
                running = description.state == ContainerState::Running,
                max_concurrent_messages = description.max_concurrent_messages,
                error_handler = %description.error_handler,
                acknowledgement = %description.acknowledgement,
                "{}",
                description
            );
        }
    }
}
