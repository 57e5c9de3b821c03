//! Session identity validation and persistence.
//!
//! A session identifier is either absent or a canonical hyphenated UUID
//! (`8-4-4-4-12` hex digits, any case). Anything else is discarded at the
//! boundary: a malformed persisted value is cleared on load, a malformed
//! received value is never stored, and [`SessionId`] can only be built from
//! a value that passed [`is_valid`], so outbound requests cannot carry one.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::storage::{KeyValueStore, SESSION_ID_KEY, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid session identifier: {0:?}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A session identifier that passed [`is_valid`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// # Errors
    ///
    /// Returns [`IdentityError::Invalid`] unless `raw` is a canonical UUID.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        if is_valid(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(IdentityError::Invalid(raw.to_owned()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strict canonical UUID check. Braced, URN and unhyphenated forms are
/// rejected even though they name a UUID.
#[must_use]
pub fn is_valid(raw: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];

    let mut parts = raw.split('-');
    for len in GROUPS {
        let Some(part) = parts.next() else {
            return false;
        };
        if part.len() != len || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }
    }
    parts.next().is_none()
}

/// Read the persisted identifier, clearing it if it is malformed.
pub fn load(store: &mut dyn KeyValueStore) -> Option<SessionId> {
    let raw = store.get(SESSION_ID_KEY)?;
    match SessionId::parse(&raw) {
        Ok(id) => Some(id),
        Err(_) => {
            info!(value = %raw, "identity: clearing invalid stored session id");
            if let Err(e) = store.remove(SESSION_ID_KEY) {
                warn!(error = %e, "identity: failed to clear invalid session id");
            }
            None
        }
    }
}

/// Persist `raw` if it is valid. Invalid values are logged and never written.
///
/// # Errors
///
/// Returns [`IdentityError::Invalid`] for a malformed value and
/// [`IdentityError::Storage`] if the write fails.
pub fn store(store: &mut dyn KeyValueStore, raw: &str) -> Result<SessionId, IdentityError> {
    let id = SessionId::parse(raw).inspect_err(|_| {
        warn!(value = %raw, "identity: refusing to store invalid session id");
    })?;
    store.set(SESSION_ID_KEY, id.as_str())?;
    Ok(id)
}

/// Forget the persisted identifier.
///
/// # Errors
///
/// Returns an error if the backing store cannot be written.
pub fn clear(store: &mut dyn KeyValueStore) -> Result<(), StorageError> {
    store.remove(SESSION_ID_KEY)
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
