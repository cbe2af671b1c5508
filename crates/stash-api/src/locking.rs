//! Lock coordinator — waits for a state lock on behalf of a client.
//!
//! `StateStore::lock` never waits. This module polls it at a fixed interval
//! until the lock is taken, the retry budget runs out, or the caller is
//! cancelled:
//!
//! ```text
//! ATTEMPTING ─ok──────────────▶ ACQUIRED
//!     │ conflict
//!     ▼
//!  WAITING ─interval, budget > 0─▶ ATTEMPTING
//!     │         └─budget == 0───▶ GIVING_UP  (conflict + last holder)
//!     └─cancelled────────────────▶ ABORTED
//! ```
//!
//! A missing record is created empty and locked once more, since clients
//! lock before their first write. Store guards are only held inside the
//! synchronous store calls, never across the wait.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use stash_state::{StateStore, StoreError};

/// Default wait between lock attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 120;

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// Why a lock could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// Still held by `holder` after the retry budget ran out.
    #[error("Locked Conflict")]
    Conflict { holder: String },

    /// The caller went away while waiting.
    #[error("lock wait aborted")]
    Aborted,

    /// Creating the missing record, or locking it afterwards, failed.
    #[error("could not create state before locking: {0}")]
    Heal(StoreError),

    #[error(transparent)]
    Store(StoreError),
}

/// Acquire `lock_id` on a record, waiting per `policy`.
///
/// `cancel` resolves when the caller should stop waiting; it is only
/// observed between attempts.
pub async fn acquire<C>(
    store: &dyn StateStore,
    namespace: &str,
    identifier: &str,
    lock_id: &str,
    policy: LockPolicy,
    cancel: C,
) -> Result<(), AcquireError>
where
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    let mut retries_left = policy.max_retries;

    loop {
        let holder = match store.lock(namespace, identifier, lock_id) {
            Ok(()) => {
                info!(%namespace, %identifier, %lock_id, "state lock acquired");
                return Ok(());
            }
            Err(StoreError::NotFound) => return heal_and_lock(store, namespace, identifier, lock_id),
            Err(StoreError::LockedConflict { holder }) => holder,
            Err(e) => return Err(AcquireError::Store(e)),
        };

        debug!(%namespace, %identifier, %holder, retries_left, "state locked, waiting");

        tokio::select! {
            biased;
            _ = &mut cancel => {
                info!(%namespace, %identifier, %lock_id, "lock wait aborted");
                return Err(AcquireError::Aborted);
            }
            _ = tokio::time::sleep(policy.poll_interval) => {}
        }

        if retries_left == 0 {
            warn!(%namespace, %identifier, %holder, "giving up on state lock");
            return Err(AcquireError::Conflict { holder });
        }
        retries_left -= 1;
    }
}

/// Create an empty record and lock it once.
fn heal_and_lock(
    store: &dyn StateStore,
    namespace: &str,
    identifier: &str,
    lock_id: &str,
) -> Result<(), AcquireError> {
    debug!(%namespace, %identifier, "state missing, creating empty record");
    store
        .update(namespace, identifier, Vec::new(), "")
        .map_err(AcquireError::Heal)?;
    store
        .lock(namespace, identifier, lock_id)
        .map_err(AcquireError::Heal)?;
    info!(%namespace, %identifier, %lock_id, "state created and locked");
    Ok(())
}

/// Resolves once `signal` turns true. Never resolves if the sender is
/// dropped without signalling.
pub async fn cancelled(mut signal: watch::Receiver<bool>) {
    if signal.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
