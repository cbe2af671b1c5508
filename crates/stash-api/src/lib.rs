//! stash-api — HTTP API for stash.
//!
//! Serves the state-backend protocol over axum. Every state route requires
//! HTTP Basic credentials, which the configured `NamespaceResolver` turns
//! into the namespace the request operates in.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Route overview (no auth) |
//! | GET | `/v1/states/{id}` | Fetch raw state contents |
//! | POST | `/v1/states/{id}?ID={lock}` | Store state |
//! | LOCK | `/v1/states/{id}` | Acquire a lock, waiting while held |
//! | UNLOCK | `/v1/states/{id}` | Release (or force-release) a lock |
//! | DELETE | `/v1/states/{id}` | Delete state |

pub mod auth;
pub mod handlers;
pub mod locking;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{any, get};
use tokio::sync::watch;

use stash_auth::NamespaceResolver;
use stash_state::StateStore;

pub use auth::Namespace;
pub use locking::{AcquireError, LockPolicy};

/// Default cap on a state upload.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn StateStore>,
    pub resolver: Arc<dyn NamespaceResolver>,
    pub lock_policy: LockPolicy,
    /// Turns true when the server is shutting down; pending lock waits abort.
    pub shutdown: watch::Receiver<bool>,
    pub max_body_bytes: usize,
}

impl ApiState {
    /// State with the default lock policy and no shutdown signal.
    pub fn new(store: Arc<dyn StateStore>, resolver: Arc<dyn NamespaceResolver>) -> Self {
        // Sender dropped: the receiver never reports shutdown.
        let (_, shutdown) = watch::channel(false);
        Self {
            store,
            resolver,
            lock_policy: LockPolicy::default(),
            shutdown,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let state_routes = Router::new()
        .route("/{id}", any(handlers::dispatch))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_namespace,
        ))
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    Router::new()
        .route("/", get(handlers::help))
        .nest("/v1/states", state_routes)
        .with_state(state)
}
