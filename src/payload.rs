//! Owned configuration payloads.

use std::fmt;
use std::ops::Deref;

use crate::error::{MonitorError, MonitorResult};

/// An immutable, owned copy of a configuration submitted through
/// [`ConfigMonitor::update`](crate::ConfigMonitor::update).
///
/// The bytes are opaque to the monitor. Each payload remembers the version it
/// was accepted under and a BLAKE3 digest used to identify it in logs and
/// events without printing its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    bytes: Box<[u8]>,
    version: u32,
    digest: blake3::Hash,
}

impl ConfigPayload {
    /// Copies `bytes` into a freshly allocated buffer.
    ///
    /// # Errors
    ///
    /// The allocation is fallible: if the buffer cannot be reserved this
    /// returns [`MonitorError::ResourceExhausted`] instead of aborting.
    pub fn copy_from(bytes: &[u8], version: u32) -> MonitorResult<Self> {
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(bytes.len())
            .map_err(|_| MonitorError::ResourceExhausted {
                requested: bytes.len(),
            })?;
        owned.extend_from_slice(bytes);
        Ok(Self::from_vec(owned, version))
    }

    /// Takes ownership of an already allocated buffer.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>, version: u32) -> Self {
        let digest = blake3::hash(&bytes);
        Self {
            bytes: bytes.into_boxed_slice(),
            version,
            digest,
        }
    }

    /// The payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true for a zero-length payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Version the payload was accepted under.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Full BLAKE3 digest of the payload bytes.
    #[must_use]
    pub const fn digest(&self) -> &blake3::Hash {
        &self.digest
    }

    /// First 16 hex characters of the digest, for log lines.
    #[must_use]
    pub fn short_digest(&self) -> String {
        let mut hex = self.digest.to_hex().to_string();
        hex.truncate(16);
        hex
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

impl Deref for ConfigPayload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for ConfigPayload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

// Contents are opaque and may hold secrets; print only identifying metadata.
impl fmt::Debug for ConfigPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigPayload")
            .field("version", &self.version)
            .field("len", &self.bytes.len())
            .field("digest", &self.short_digest())
            .finish()
    }
}
