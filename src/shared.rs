use std::{any::Any, error::Error, sync::Arc};

/// A reference-counted, thread-safe error value.
///
/// This is the element type stored by [`ErrorBatch`]. Using an [`Arc`] means copies of a batch's
/// errors (for example from [`ErrorBatch::errors`]) point at the very same error values, which can
/// be checked with [`Arc::ptr_eq`].
///
/// [`ErrorBatch`]: crate::ErrorBatch
/// [`ErrorBatch::errors`]: crate::ErrorBatch::errors
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// Converts any error into a [`SharedError`].
///
/// ```
/// # use errbatch::shared;
/// let err = shared(std::fmt::Error);
/// assert_eq!(err.to_string(), "an error occurred when formatting an argument");
/// ```
///
/// If the error is already a `SharedError`, it is returned as-is instead of being wrapped in a
/// second `Arc`:
///
/// ```
/// # use std::sync::Arc;
/// # use errbatch::shared;
/// let err = shared(std::fmt::Error);
/// let again = shared(err.clone());
/// assert!(Arc::ptr_eq(&err, &again));
/// ```
pub fn shared<E>(error: E) -> SharedError
where
    E: Error + Send + Sync + 'static,
{
    // `Arc<dyn Error>` is itself an `Error`; wrapping it again would break `Arc::ptr_eq` identity.
    if let Some(already) = (&error as &dyn Any).downcast_ref::<SharedError>() {
        return Arc::clone(already);
    }

    Arc::new(error)
}
