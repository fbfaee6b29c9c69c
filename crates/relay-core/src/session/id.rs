//! Opaque session identifiers.

use std::fmt;

use uuid::Uuid;

/// Unique identifier assigned to a session when its client is accepted.
///
/// The identifier is stable for the whole life of the session and is the key
/// of the [`SessionRegistry`](crate::registry::SessionRegistry).  It carries no
/// meaning beyond identity; callers must not parse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hyphenated form, the same as the log fields and diagnostics output.
        write!(f, "{}", self.0.hyphenated())
    }
}
