use std::error::Error;

use crate::{shared, SharedError};

/// Something which tracks a collection of errors.
///
/// This generalizes methods like [`ErrorBatch::propagate`] which allow errors to be handled by
/// merging them into a different collection of errors.
///
/// [`ErrorBatch::propagate`]: crate::ErrorBatch::propagate
pub trait ErrorCollector {
    /// Add a new error to the collection of errors.
    fn push_error(&mut self, error: SharedError);

    /// Records the error of a failed [`Result`], or returns the value of a successful one.
    ///
    /// This is convenient when draining the results of many independent operations:
    ///
    /// ```
    /// # use errbatch::{ErrorBatch, ErrorCollector};
    /// let mut batch = ErrorBatch::new();
    /// let mut total = 0;
    ///
    /// for input in ["1", "two", "3", "four"] {
    ///     if let Some(n) = batch.push_result(input.parse::<u32>()) {
    ///         total += n;
    ///     }
    /// }
    ///
    /// assert_eq!(total, 4);
    /// assert_eq!(batch.len(), 2);
    /// ```
    fn push_result<T, E>(&mut self, result: Result<T, E>) -> Option<T>
    where
        E: Error + Send + Sync + 'static,
        Self: Sized,
    {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push_error(shared(error));
                None
            }
        }
    }
}

/// A plain list of errors. Batches pushed into it are kept as single elements, not flattened.
impl ErrorCollector for Vec<SharedError> {
    fn push_error(&mut self, error: SharedError) {
        self.push(error);
    }
}
