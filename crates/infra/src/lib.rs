//! Infrastructure layer: identity provider adapters, data stores and the
//! data-operation wrapper.

pub mod contacts;
pub mod identity;
pub mod loading;
pub mod notifications;
pub mod operations;
pub mod store;


pub use contacts::{Actor, ContactService};
pub use loading::{DEFAULT_LOADING_KEY, LoadingGuard, LoadingState, LoadingTracker};
pub use notifications::{
    Notification, NotificationLevel, NotificationLog, Notifier, TracingNotifier,
};
pub use operations::{OperationExecutor, OperationOptions, RetryPolicy, with_session_retry};
