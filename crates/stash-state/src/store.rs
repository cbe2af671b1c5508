//! The storage contract every stash backend implements.
//!
//! Operations are synchronous and must not block on other keys: the lock
//! coordinator calls them between suspend points and expects each call to
//! acquire and release any internal guards before returning.

use crate::error::StoreResult;

/// Pluggable storage for state blobs, keyed by `(namespace, identifier)`.
pub trait StateStore: Send + Sync {
    /// Current contents of a record.
    fn get(&self, namespace: &str, identifier: &str) -> StoreResult<Vec<u8>>;

    /// Replace a record's contents, creating the record if it does not exist.
    ///
    /// An existing locked record is only writable with its holder's `lock_id`.
    fn update(
        &self,
        namespace: &str,
        identifier: &str,
        contents: Vec<u8>,
        lock_id: &str,
    ) -> StoreResult<()>;

    /// Try once to lock an existing record. Never waits.
    ///
    /// On conflict the error carries the current holder's ID.
    fn lock(&self, namespace: &str, identifier: &str, lock_id: &str) -> StoreResult<()>;

    /// Release a lock. Succeeds with an empty `lock_id` or the holder's ID,
    /// and is a no-op on an unlocked record.
    fn unlock(&self, namespace: &str, identifier: &str, lock_id: &str) -> StoreResult<()>;

    /// Release a lock regardless of who holds it.
    fn force_unlock(&self, namespace: &str, identifier: &str) -> StoreResult<()>;

    fn delete(&self, namespace: &str, identifier: &str) -> StoreResult<()>;
}
