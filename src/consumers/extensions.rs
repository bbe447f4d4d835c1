//! An extension type-map is useful to share data between the hooks that take part in a pass
//! over a message: interceptors on the way in, the handler, the error handler and interceptors
//! on the way out.
//!
//! Our implementation relies on task-local storage, making it ergonomic to use from different
//! parts of the codebase without having to explicitly pass it around as an argument.
//! Each pass gets a fresh, empty type-map.
//!
//! # Common use cases
//!
//! ## Correlating log records
//!
//! [`CorrelationIdInterceptor`] stores the correlation id it stamps on the message in the
//! extensions, every later hook can retrieve it with [`get_message_local_item`].
//!
//! ## Measuring elapsed time
//!
//! Start a timer in `before`, store the clock in the extensions, retrieve it in `after`.
//!
//! [`CorrelationIdInterceptor`]: crate::consumers::hooks::interceptors::CorrelationIdInterceptor
#![allow(clippy::declare_interior_mutable_const)] // silence tokio::task_local warning

use std::cell::RefCell;
use std::future::Future;
use task_local_extensions::Extensions;

tokio::task_local! {
    /// A type-map shared by the hooks of a single pass.
    /// It is behind a RefCell to allow insert by caller holding just a & reference instead of a
    /// &mut reference.
    static EXTENSIONS: RefCell<Extensions>;
}

/// Sets a task local to `Extensions` before `fut` is run,
/// and fetches the contents of the task local Extensions after completion
/// and returns it.
///
/// Used by the pipeline itself to make the extensions type-map available within
/// the message processing context. This function is not exposed externally.
pub(crate) async fn with_extensions<T>(
    extensions: Extensions,
    fut: impl Future<Output = T>,
) -> (Extensions, T) {
    EXTENSIONS
        .scope(RefCell::new(extensions), async move {
            let response = fut.await;
            let extensions = RefCell::new(Extensions::new());

            EXTENSIONS.with(|ext| ext.swap(&extensions));

            (extensions.into_inner(), response)
        })
        .await
}

/// Retrieve an item from message-local storage based on its type.
///
/// It returns `None` if the message-local storage does not contain an item of that type,
/// or if it is called outside of a pass.
pub fn get_message_local_item<T: Send + Sync + Clone + 'static>() -> Option<T> {
    EXTENSIONS
        .try_with(|e| e.borrow().get::<T>().cloned())
        .ok()
        .flatten()
}

/// Insert an item in message-local storage.
/// If another item with the same type was already stored in message-local storage it gets replaced.
pub fn set_message_local_item<T: Send + Sync + 'static>(item: T) {
    let _ = EXTENSIONS
        .try_with(|e| e.borrow_mut().insert(item))
        .map_err(|_| tracing::warn!("Failed to set local item in the message context extensions."));
}
