//! stash-state — storage and locking engine for stash.
//!
//! A state record is an opaque blob keyed by `(namespace, identifier)` with
//! an optional exclusive lock. Backends implement [`StateStore`]; the
//! in-memory backend ([`InMemoryStateStore`]) is non-durable and meant for
//! local use and tests.
//!
//! `lock` is single-shot: it either takes the lock or returns
//! [`StoreError::LockedConflict`] with the current holder. Waiting for a lock
//! is the caller's job (see `stash-api`'s lock coordinator).

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStateStore;
pub use store::StateStore;
pub use types::{StateKey, StateRecord};
