use std::{
    error::Error,
    fmt::{self, Display},
    io, iter,
};

use tracing::trace;

use crate::{shared, ErrorCollector, SharedError};

/// An error which can contain multiple errors.
///
/// `ErrorBatch` collects the errors of many independent operations, such as parallel workers, and
/// turns them into the single error a function should return. The default value is an empty batch
/// which is ready to use.
///
/// # Adding errors
///
/// Errors go in with [`add`], which skips `None`, or [`push`] for a concrete error value. Failed
/// results can be recorded with [`ErrorCollector::push_result`].
///
/// If the error being added is itself an `ErrorBatch`, or wraps one somewhere in its
/// [`source`](Error::source) chain, the errors inside it are added instead of the batch. A batch
/// therefore never contains another batch.
///
/// ```
/// # use errbatch::ErrorBatch;
/// let mut inner = ErrorBatch::new();
/// inner.push(std::fmt::Error);
/// inner.push(std::fmt::Error);
///
/// let mut outer = ErrorBatch::new();
/// outer.push(std::fmt::Error);
/// outer.push(inner);
///
/// assert_eq!(outer.len(), 3);
/// ```
///
/// # Compiling
///
/// When all the errors are in, [`compile`] produces the error to return:
///
/// - no errors become `None`;
/// - exactly one error is returned as it is, so callers inspecting its type see the original error;
/// - more errors are returned as the batch itself.
///
/// [`add`]: ErrorBatch::add
/// [`push`]: ErrorBatch::push
/// [`compile`]: ErrorBatch::compile
#[derive(Debug, Clone, Default)]
pub struct ErrorBatch {
    errors: Vec<SharedError>,
}

impl ErrorBatch {
    /// Constructs a new, empty `ErrorBatch`.
    #[must_use]
    pub fn new() -> Self {
        ErrorBatch { errors: vec![] }
    }

    /// Adds an error to the batch. `None` is skipped.
    ///
    /// If the error is, or wraps, an `ErrorBatch`, its errors are added in their order instead of
    /// the batch. Wrappers around the nested batch are discarded.
    ///
    /// ```
    /// # use errbatch::{shared, ErrorBatch};
    /// let mut batch = ErrorBatch::new();
    /// batch.add(None);
    /// assert!(batch.is_empty());
    ///
    /// batch.add(Some(shared(std::fmt::Error)));
    /// assert_eq!(batch.len(), 1);
    /// ```
    pub fn add(&mut self, error: Option<SharedError>) {
        let Some(error) = error else {
            return;
        };

        match ErrorBatch::find_in(&*error) {
            Some(nested) => {
                trace!(
                    nested = nested.len(),
                    existing = self.errors.len(),
                    "flattening nested error batch"
                );
                self.errors.extend(nested.errors.iter().cloned());
            }
            None => self.errors.push(error),
        }
    }

    /// Adds a concrete error to the batch. Equivalent to `add(Some(shared(error)))`.
    pub fn push<E>(&mut self, error: E)
    where
        E: Error + Send + Sync + 'static,
    {
        self.add(Some(shared(error)));
    }

    /// Compiles the batch into a single error.
    ///
    /// - With zero errors, returns `None`.
    /// - With exactly one error, returns that error itself.
    /// - Otherwise, returns a copy of the batch.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use errbatch::{shared, ErrorBatch};
    /// let mut batch = ErrorBatch::new();
    /// assert!(batch.compile().is_none());
    ///
    /// let err = shared(std::fmt::Error);
    /// batch.add(Some(err.clone()));
    /// assert!(Arc::ptr_eq(&batch.compile().unwrap(), &err));
    ///
    /// batch.add(Some(err.clone()));
    /// assert!(batch.compile().unwrap().is::<ErrorBatch>());
    /// ```
    ///
    /// The returned batch is a snapshot; later changes to this batch do not show up in it.
    #[must_use]
    pub fn compile(&self) -> Option<SharedError> {
        match self.errors.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            _ => Some(shared(self.clone())),
        }
    }

    /// Converts this batch into a [`Result`], with the error being the one [`compile`] would give.
    ///
    /// This lets a function finish with the batch it has been filling:
    ///
    /// ```
    /// # use errbatch::{ErrorBatch, ErrorCollector, SharedError};
    /// fn parse_all(inputs: &[&str]) -> Result<(), SharedError> {
    ///     let mut batch = ErrorBatch::new();
    ///     for input in inputs {
    ///         batch.push_result(input.parse::<u8>());
    ///     }
    ///     batch.into_result()
    /// }
    ///
    /// assert!(parse_all(&["1", "2"]).is_ok());
    /// assert!(parse_all(&["1", "x"]).is_err());
    /// ```
    ///
    /// [`compile`]: ErrorBatch::compile
    pub fn into_result(self) -> Result<(), SharedError> {
        let mut errors = self.errors;
        if errors.len() > 1 {
            return Err(shared(ErrorBatch { errors }));
        }
        errors.pop().map_or(Ok(()), Err)
    }

    /// Removes all errors from the batch.
    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Returns a copy of the errors in this batch, in the order they were added.
    ///
    /// Changing the returned list does not change the batch.
    #[must_use]
    pub fn errors(&self) -> Vec<SharedError> {
        self.errors.clone()
    }

    /// The number of errors in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if this batch has no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterates over the errors in this batch without copying them.
    pub fn iter(&self) -> std::slice::Iter<'_, SharedError> {
        self.errors.iter()
    }

    /// Finds an `ErrorBatch` in an error or anywhere along its [`source`](Error::source) chain.
    ///
    /// Causes held as a [`SharedError`] or inside an [`io::Error`] are looked into as well, since
    /// the `source()` of those wrappers skips the value they hold.
    ///
    /// ```
    /// # use errbatch::{shared, ErrorBatch};
    /// let mut batch = ErrorBatch::new();
    /// batch.push(std::fmt::Error);
    /// batch.push(std::fmt::Error);
    ///
    /// let err = batch.compile().unwrap();
    /// assert_eq!(ErrorBatch::find_in(&*err).map(ErrorBatch::len), Some(2));
    ///
    /// let plain = shared(std::fmt::Error);
    /// assert!(ErrorBatch::find_in(&*plain).is_none());
    /// ```
    pub fn find_in<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a ErrorBatch> {
        iter::successors(Some(error), |&e| next_link(e)).find_map(|e| e.downcast_ref::<ErrorBatch>())
    }

    /// Consumes this batch and moves all of its errors into an [`ErrorCollector`], in order.
    ///
    /// ```
    /// # use errbatch::ErrorBatch;
    /// let mut source = ErrorBatch::new();
    /// source.push(std::fmt::Error);
    /// source.push(std::fmt::Error);
    /// let mut dest = ErrorBatch::new();
    /// dest.push(std::fmt::Error);
    ///
    /// source.propagate(&mut dest);
    /// assert_eq!(dest.len(), 3);
    /// ```
    pub fn propagate(self, other: &mut impl ErrorCollector) {
        for error in self.errors {
            other.push_error(error);
        }
    }
}

/// The next error to search for a batch: the value inside a wrapper, or else the error's source.
fn next_link<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a (dyn Error + 'static)> {
    if let Some(inner) = error.downcast_ref::<SharedError>() {
        return Some(&**inner as &(dyn Error + 'static));
    }
    if let Some(inner) = error.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
        return Some(inner as &(dyn Error + 'static));
    }
    error.source()
}

/// Writes an error followed by each of its causes, separated by `": "`.
fn write_detailed(f: &mut fmt::Formatter<'_>, error: &(dyn Error + 'static)) -> fmt::Result {
    write!(f, "{error}")?;
    for cause in iter::successors(error.source(), |&e| e.source()) {
        write!(f, ": {cause}")?;
    }
    Ok(())
}

impl Display for ErrorBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errbatch: total {} error(s) in this batch", self.errors.len())?;
        for (i, error) in self.errors.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write_detailed(f, &**error)?;
        }
        Ok(())
    }
}

impl Error for ErrorBatch {
    /// The only error in the batch, if it contains exactly one. A batch with zero or several
    /// errors has no single cause.
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self.errors.as_slice() {
            [only] => Some(&**only),
            _ => None,
        }
    }
}

impl ErrorCollector for ErrorBatch {
    fn push_error(&mut self, error: SharedError) {
        self.add(Some(error));
    }
}

impl Extend<SharedError> for ErrorBatch {
    fn extend<I: IntoIterator<Item = SharedError>>(&mut self, iter: I) {
        for error in iter {
            self.add(Some(error));
        }
    }
}

impl Extend<Option<SharedError>> for ErrorBatch {
    fn extend<I: IntoIterator<Item = Option<SharedError>>>(&mut self, iter: I) {
        for error in iter {
            self.add(error);
        }
    }
}

impl FromIterator<SharedError> for ErrorBatch {
    /// Collects errors into a batch, flattening any nested batches.
    ///
    /// ```
    /// # use errbatch::{shared, ErrorBatch};
    /// let batch: ErrorBatch = (0..3).map(|_| shared(std::fmt::Error)).collect();
    /// assert_eq!(batch.len(), 3);
    /// ```
    fn from_iter<I: IntoIterator<Item = SharedError>>(iter: I) -> Self {
        let mut batch = ErrorBatch::new();
        batch.extend(iter);
        batch
    }
}

impl FromIterator<Option<SharedError>> for ErrorBatch {
    /// Collects optional errors into a batch, skipping `None`.
    ///
    /// ```
    /// # use errbatch::{shared, ErrorBatch};
    /// let batch: ErrorBatch = vec![None, Some(shared(std::fmt::Error)), None]
    ///     .into_iter()
    ///     .collect();
    /// assert_eq!(batch.len(), 1);
    /// ```
    fn from_iter<I: IntoIterator<Item = Option<SharedError>>>(iter: I) -> Self {
        let mut batch = ErrorBatch::new();
        batch.extend(iter);
        batch
    }
}

impl IntoIterator for ErrorBatch {
    type Item = SharedError;
    type IntoIter = std::vec::IntoIter<SharedError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorBatch {
    type Item = &'a SharedError;
    type IntoIter = std::slice::Iter<'a, SharedError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct Message(&'static str);

    #[derive(Debug, thiserror::Error)]
    #[error("worker {id} failed")]
    struct WorkerFailed {
        id: u32,
        #[source]
        cause: ErrorBatch,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("could not load config")]
    struct ConfigError(#[source] io::Error);

    #[derive(Debug, thiserror::Error)]
    #[error("job failed")]
    struct JobFailed(#[source] SharedError);

    #[derive(Debug, thiserror::Error)]
    #[error("bar: {0}")]
    struct Bar(#[source] Message);

    fn batch_of(messages: &[&'static str]) -> ErrorBatch {
        messages.iter().map(|&m| shared(Message(m))).collect()
    }

    #[test]
    fn source_only_for_a_single_error() {
        let mut batch = ErrorBatch::new();
        assert!(batch.source().is_none());

        batch.push(Message("foo"));
        let cause = batch.source().map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("foo"));

        batch.push(Message("bar"));
        assert!(batch.source().is_none());
    }

    #[test]
    fn empty_batch_renders_count_only() {
        assert_eq!(
            ErrorBatch::new().to_string(),
            "errbatch: total 0 error(s) in this batch"
        );
    }

    #[test]
    fn single_error_batch_renders_with_count() {
        assert_eq!(
            batch_of(&["foo"]).to_string(),
            "errbatch: total 1 error(s) in this batch: foo"
        );
    }

    #[test]
    fn rendering_includes_cause_chain() {
        let mut batch = batch_of(&["foo"]);
        batch.push(ConfigError(io::Error::new(io::ErrorKind::NotFound, "no such file")));

        assert_eq!(
            batch.to_string(),
            "errbatch: total 2 error(s) in this batch: foo; could not load config: no such file"
        );
    }

    #[test]
    fn flattens_batch_wrapped_in_another_error() {
        let wrapped = WorkerFailed {
            id: 7,
            cause: batch_of(&["bar", "baz"]),
        };

        let mut batch = batch_of(&["foo"]);
        batch.push(wrapped);

        let messages: Vec<_> = batch.iter().map(ToString::to_string).collect();
        assert_eq!(messages, ["foo", "bar", "baz"]);
    }

    #[test]
    fn rendering_repeats_cause_already_in_message() {
        let mut batch = batch_of(&["foo"]);
        batch.push(Bar(Message("baz")));

        assert_eq!(
            batch.to_string(),
            "errbatch: total 2 error(s) in this batch: foo; bar: baz: baz"
        );
    }

    #[test]
    fn flattens_compiled_batch_held_as_shared_source() {
        let Some(compiled) = batch_of(&["bar", "baz"]).compile() else {
            panic!("two errors should compile to a batch");
        };

        let wrapped = JobFailed(compiled);
        assert_eq!(ErrorBatch::find_in(&wrapped).map(ErrorBatch::len), Some(2));

        let mut batch = batch_of(&["foo"]);
        batch.push(wrapped);

        let messages: Vec<_> = batch.iter().map(ToString::to_string).collect();
        assert_eq!(messages, ["foo", "bar", "baz"]);
        assert!(batch.iter().all(|e| !e.is::<ErrorBatch>() && !e.is::<JobFailed>()));
    }

    #[test]
    fn flattens_batch_inside_io_error() {
        let mut batch = batch_of(&["foo"]);
        batch.push(io::Error::other(batch_of(&["bar", "baz"])));

        let messages: Vec<_> = batch.iter().map(ToString::to_string).collect();
        assert_eq!(messages, ["foo", "bar", "baz"]);
    }

    #[test]
    fn find_in_walks_the_source_chain() {
        let wrapped = shared(WorkerFailed {
            id: 1,
            cause: batch_of(&["a", "b"]),
        });

        let found = ErrorBatch::find_in(&*wrapped);
        assert_eq!(found.map(ErrorBatch::len), Some(2));
    }

    #[test]
    fn pushing_a_shared_batch_flattens_it() {
        let nested = batch_of(&["a", "b"]).compile();

        let mut batch = ErrorBatch::new();
        batch.add(nested.clone());
        assert_eq!(batch.len(), 2);

        // Going through `push` must not hide the batch behind a second `Arc`.
        let mut via_push = ErrorBatch::new();
        if let Some(nested) = nested {
            via_push.push(nested);
        }
        assert_eq!(via_push.len(), 2);
    }

    #[test]
    fn into_result_matches_compile() {
        assert!(ErrorBatch::new().into_result().is_ok());

        let err = shared(Message("foo"));
        let mut single = ErrorBatch::new();
        single.add(Some(err.clone()));
        match single.into_result() {
            Err(compiled) => assert!(Arc::ptr_eq(&compiled, &err)),
            Ok(()) => panic!("expected an error"),
        }

        match batch_of(&["foo", "bar"]).into_result() {
            Err(compiled) => assert_eq!(
                compiled.to_string(),
                "errbatch: total 2 error(s) in this batch: foo; bar"
            ),
            Ok(()) => panic!("expected an error"),
        }
    }

    #[test]
    fn propagate_into_vec_keeps_order() {
        let mut sink: Vec<SharedError> = vec![shared(Message("first"))];
        batch_of(&["a", "b"]).propagate(&mut sink);

        let messages: Vec<_> = sink.iter().map(ToString::to_string).collect();
        assert_eq!(messages, ["first", "a", "b"]);
    }

    #[test]
    fn compiled_batch_is_a_snapshot() {
        let mut batch = batch_of(&["foo", "bar"]);
        let compiled = batch.compile();
        batch.push(Message("baz"));

        let compiled = compiled.map(|e| e.to_string());
        assert_eq!(
            compiled.as_deref(),
            Some("errbatch: total 2 error(s) in this batch: foo; bar")
        );
    }
}
