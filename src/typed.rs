//! Typed handlers over JSON-encoded payloads.
//!
//! The monitor itself only sees bytes. `JsonHandler` decodes candidates and
//! the previous configuration with `serde_json` before handing them to a
//! [`TypedHandler`]. A candidate that does not decode is skipped.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::ApplyError;
use crate::handler::ConfigHandler;

/// Filter/apply contract over decoded configurations.
pub trait TypedHandler<T>: Send {
    /// Decides whether `candidate` is worth applying. `previous` is `None`
    /// before the first apply.
    fn filter(&mut self, candidate: &T, previous: Option<&T>) -> bool {
        let _ = (candidate, previous);
        true
    }

    /// Activates `config`.
    ///
    /// # Errors
    ///
    /// Returning an error leaves the current configuration unchanged.
    fn apply(&mut self, config: &T) -> Result<(), ApplyError>;
}

/// Adapts a [`TypedHandler`] to the byte-level [`ConfigHandler`].
pub struct JsonHandler<T, H> {
    inner: H,
    _config: PhantomData<fn() -> T>,
}

impl<T, H> JsonHandler<T, H>
where
    T: DeserializeOwned,
    H: TypedHandler<T>,
{
    /// Wraps `inner`.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            _config: PhantomData,
        }
    }

    /// The wrapped handler.
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<T, H> ConfigHandler for JsonHandler<T, H>
where
    T: DeserializeOwned,
    H: TypedHandler<T>,
{
    fn filter(&mut self, candidate: &[u8], previous: Option<&[u8]>) -> bool {
        let candidate: T = match serde_json::from_slice(candidate) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "configuration does not decode; skipping");
                return false;
            }
        };
        // Previous bytes were accepted once, so a decode failure here means the
        // type changed under us. Treat it like a first configuration.
        let previous: Option<T> = previous.and_then(|bytes| match serde_json::from_slice(bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "current configuration does not decode; filtering without it");
                None
            }
        });
        self.inner.filter(&candidate, previous.as_ref())
    }

    fn apply(&mut self, config: &[u8]) -> Result<(), ApplyError> {
        let config: T = serde_json::from_slice(config)
            .map_err(|err| ApplyError::new(format!("configuration does not decode: {err}")))?;
        self.inner.apply(&config)
    }
}

impl<T, H: fmt::Debug> fmt::Debug for JsonHandler<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonHandler").field("inner", &self.inner).finish()
    }
}
