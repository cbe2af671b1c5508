//! Domain types for the stash state store.

use std::fmt;

/// Identity of a stored state blob.
///
/// `namespace` comes from the credential resolver, `identifier` from the
/// request path. Neither is validated here; empty strings are valid keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey {
    pub namespace: String,
    pub identifier: String,
}

impl StateKey {
    pub fn new(namespace: &str, identifier: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.identifier)
    }
}

/// A stored state blob together with its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub key: StateKey,
    /// Opaque payload; never parsed.
    pub contents: Vec<u8>,
    /// `Some(id)` while locked. The holder ID may itself be empty.
    lock_holder: Option<String>,
}

impl StateRecord {
    /// A fresh, unlocked record.
    pub fn new(key: StateKey, contents: Vec<u8>) -> Self {
        Self {
            key,
            contents,
            lock_holder: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock_holder.is_some()
    }

    pub fn lock_holder(&self) -> Option<&str> {
        self.lock_holder.as_deref()
    }

    /// Whether `lock_id` may write to this record.
    pub fn permits(&self, lock_id: &str) -> bool {
        match &self.lock_holder {
            None => true,
            Some(holder) => holder == lock_id,
        }
    }

    pub(crate) fn set_lock(&mut self, lock_id: &str) {
        self.lock_holder = Some(lock_id.to_string());
    }

    pub(crate) fn clear_lock(&mut self) {
        self.lock_holder = None;
    }
}
