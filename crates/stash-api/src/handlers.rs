//! State route handlers.
//!
//! All verbs on `/v1/states/{id}` land in [`dispatch`], which switches on
//! the method because `LOCK` and `UNLOCK` are not standard HTTP methods.
//! Responses use the envelope state-backend clients expect: `{"updated":
//! true}` and friends on success, `{"error": ...}` on failure.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use stash_state::StoreError;

use crate::ApiState;
use crate::auth::Namespace;
use crate::locking::{self, AcquireError};

/// Lock ID asserted in the query string (`?ID=...`).
///
/// Repeated keys are allowed; the first `ID` wins.
pub fn lock_param(query: &[(String, String)]) -> Option<&str> {
    query
        .iter()
        .find(|(key, _)| key == "ID")
        .map(|(_, value)| value.as_str())
}

/// JSON body of `LOCK` and `UNLOCK`.
#[derive(Debug, Default, Deserialize)]
pub struct LockBody {
    #[serde(rename = "ID", default)]
    pub id: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

fn error_response(status: StatusCode, msg: &str, holder: Option<String>) -> Response {
    (status, Json(ErrorBody { error: msg, id: holder })).into_response()
}

fn store_error(e: &StoreError) -> Response {
    let status = match e {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::LockedConflict { .. } => StatusCode::CONFLICT,
        StoreError::NotImplemented(_) | StoreError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, &e.to_string(), None)
}

fn ok(field: &str) -> Response {
    Json(json!({ field: true })).into_response()
}

// ── Routes ─────────────────────────────────────────────────────

/// GET /
pub async fn help() -> impl IntoResponse {
    Json(json!({
        "help": "remote state backend; authenticate with HTTP Basic",
        "routes": {
            "GET /v1/states/{id}": "fetch state contents",
            "POST /v1/states/{id}?ID={lock}": "store state, asserting a lock if held",
            "LOCK /v1/states/{id}": "acquire a lock, body {\"ID\": \"...\"}; waits while held elsewhere",
            "UNLOCK /v1/states/{id}": "release a lock; an empty ID force-unlocks",
            "DELETE /v1/states/{id}": "delete state, if the backend supports it",
        },
    }))
}

/// Any method on /v1/states/{id}
pub async fn dispatch(
    method: Method,
    State(state): State<ApiState>,
    Extension(Namespace(namespace)): Extension<Namespace>,
    Path(id): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    debug!(%method, %namespace, %id, "state request");
    match method.as_str() {
        "GET" => get_state(&state, &namespace, &id),
        "POST" => update_state(&state, &namespace, &id, lock_param(&query), body),
        "DELETE" => delete_state(&state, &namespace, &id),
        "LOCK" => lock_state(&state, &namespace, &id, &body).await,
        "UNLOCK" => unlock_state(&state, &namespace, &id, &body),
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed", None),
    }
}

fn get_state(state: &ApiState, namespace: &str, id: &str) -> Response {
    match state.store.get(namespace, id) {
        Ok(contents) => (StatusCode::OK, contents).into_response(),
        Err(e) => store_error(&e),
    }
}

fn update_state(
    state: &ApiState,
    namespace: &str,
    id: &str,
    lock_id: Option<&str>,
    body: Bytes,
) -> Response {
    let lock_id = lock_id.unwrap_or_default();
    match state.store.update(namespace, id, body.to_vec(), lock_id) {
        Ok(()) => ok("updated"),
        Err(e) => store_error(&e),
    }
}

async fn lock_state(state: &ApiState, namespace: &str, id: &str, body: &[u8]) -> Response {
    let lock: LockBody = match serde_json::from_slice(body) {
        Ok(lock) => lock,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("invalid lock body: {e}"),
                None,
            );
        }
    };

    let cancel = locking::cancelled(state.shutdown.clone());
    let result = locking::acquire(
        &*state.store,
        namespace,
        id,
        &lock.id,
        state.lock_policy,
        cancel,
    )
    .await;

    match result {
        Ok(()) => ok("locked"),
        Err(AcquireError::Conflict { holder }) => {
            error_response(StatusCode::CONFLICT, "Locked Conflict", Some(holder))
        }
        Err(e @ AcquireError::Aborted) => {
            error_response(StatusCode::BAD_REQUEST, &e.to_string(), None)
        }
        Err(e @ AcquireError::Heal(_)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None)
        }
        Err(AcquireError::Store(e)) => store_error(&e),
    }
}

fn unlock_state(state: &ApiState, namespace: &str, id: &str, body: &[u8]) -> Response {
    // Clients do not always send a body on unlock; unreadable means force.
    let lock: LockBody = serde_json::from_slice(body).unwrap_or_default();

    let result = if lock.id.is_empty() {
        state.store.force_unlock(namespace, id)
    } else {
        state.store.unlock(namespace, id, &lock.id)
    };

    match result {
        Ok(()) => ok("unlocked"),
        Err(e) => store_error(&e),
    }
}

fn delete_state(state: &ApiState, namespace: &str, id: &str) -> Response {
    match state.store.delete(namespace, id) {
        Ok(()) => ok("deleted"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string(), None),
    }
}
