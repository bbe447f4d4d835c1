mod listener_container;
mod registry;

pub use listener_container::{
    ContainerDescription, ContainerError, ContainerState, ListenerContainer,
    ListenerContainerBuilder,
};
pub use registry::ListenerContainerRegistry;
