//! Filter and apply capabilities.
//!
//! A handler is owned by the worker and only ever called from the worker
//! thread, so it may hold mutable context (connections, counters, the service
//! being reconfigured) without any locking of its own.

use crate::error::ApplyError;

/// The filter/apply contract run by the worker for each taken target.
pub trait ConfigHandler: Send {
    /// Decides whether `candidate` is worth applying.
    ///
    /// `previous` is `None` until a configuration has been applied. The
    /// default implementation always accepts.
    fn filter(&mut self, candidate: &[u8], previous: Option<&[u8]>) -> bool {
        let _ = (candidate, previous);
        true
    }

    /// Activates `config`. May block for as long as it needs; producers are
    /// never waiting on it.
    ///
    /// # Errors
    ///
    /// Returning an error leaves the monitor's current configuration
    /// unchanged.
    fn apply(&mut self, config: &[u8]) -> Result<(), ApplyError>;
}

impl<H: ConfigHandler + ?Sized> ConfigHandler for Box<H> {
    fn filter(&mut self, candidate: &[u8], previous: Option<&[u8]>) -> bool {
        (**self).filter(candidate, previous)
    }

    fn apply(&mut self, config: &[u8]) -> Result<(), ApplyError> {
        (**self).apply(config)
    }
}

/// Return types accepted from apply closures.
///
/// Lets infallible closures return `()` while fallible ones return
/// `Result<(), ApplyError>`.
pub trait ApplyOutput {
    /// Converts the closure's return value into an apply result.
    fn into_apply_result(self) -> Result<(), ApplyError>;
}

impl ApplyOutput for () {
    fn into_apply_result(self) -> Result<(), ApplyError> {
        Ok(())
    }
}

impl ApplyOutput for Result<(), ApplyError> {
    fn into_apply_result(self) -> Result<(), ApplyError> {
        self
    }
}

type FilterFn = Box<dyn FnMut(&[u8], Option<&[u8]>) -> bool + Send>;

/// Closure-backed handler: a required apply closure and an optional filter.
///
/// ```
/// use config_monitor::FnHandler;
///
/// let handler = FnHandler::new(|cfg: &[u8]| println!("applying {} bytes", cfg.len()))
///     .with_filter(|new: &[u8], old: Option<&[u8]>| old != Some(new));
/// # let _ = handler;
/// ```
pub struct FnHandler<A> {
    apply: A,
    filter: Option<FilterFn>,
}

impl<A, R> FnHandler<A>
where
    A: FnMut(&[u8]) -> R + Send,
    R: ApplyOutput,
{
    /// Creates a handler without a filter: every taken target is applied.
    pub fn new(apply: A) -> Self {
        Self { apply, filter: None }
    }

    /// Adds a filter closure.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&[u8], Option<&[u8]>) -> bool + Send + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Returns true if a filter was configured.
    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }
}

impl<A, R> ConfigHandler for FnHandler<A>
where
    A: FnMut(&[u8]) -> R + Send,
    R: ApplyOutput,
{
    fn filter(&mut self, candidate: &[u8], previous: Option<&[u8]>) -> bool {
        match self.filter.as_mut() {
            Some(filter) => filter(candidate, previous),
            None => true,
        }
    }

    fn apply(&mut self, config: &[u8]) -> Result<(), ApplyError> {
        (self.apply)(config).into_apply_result()
    }
}

impl<A> std::fmt::Debug for FnHandler<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("has_filter", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}
