//! HTTP regression tests.
//!
//! Drives the full router (auth middleware included) the way a state
//! backend client does: lock, write with the lock ID, read, unlock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tower::ServiceExt;

use stash_api::{ApiState, LockPolicy, build_router};
use stash_auth::{PassthroughResolver, StaticCredential, StaticResolver};
use stash_state::{InMemoryStateStore, StateStore, StoreResult};

fn fast_policy(max_retries: u32) -> LockPolicy {
    LockPolicy {
        poll_interval: Duration::from_millis(10),
        max_retries,
    }
}

fn test_app(max_retries: u32) -> (Router, Arc<InMemoryStateStore>) {
    let store = Arc::new(InMemoryStateStore::new());
    let state = ApiState::new(store.clone(), Arc::new(PassthroughResolver))
        .with_lock_policy(fast_policy(max_retries));
    (build_router(state), store)
}

fn request(method: &str, uri: &str, user: &str, body: impl Into<Body>) -> Request<Body> {
    let auth = format!("Basic {}", STANDARD.encode(format!("{user}:secret")));
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, auth)
        .body(body.into())
        .unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> Response {
    router.clone().oneshot(req).await.unwrap()
}

async fn body_json(resp: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

// ── Authentication ─────────────────────────────────────────────

#[tokio::test]
async fn missing_credentials_get_challenge() {
    let (router, store) = test_app(0);
    let req = Request::builder()
        .method("POST")
        .uri("/v1/states/prod")
        .body(Body::from("data"))
        .unwrap();

    let resp = send(&router, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp.headers().get(header::WWW_AUTHENTICATE).unwrap();
    assert_eq!(challenge, "Basic realm=\"Authorization Required\"");
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn rejected_credentials_never_reach_the_store() {
    let store = Arc::new(InMemoryStateStore::new());
    let resolver = StaticResolver::new([StaticCredential::from_secret("ci", "token", "platform")]);
    let router = build_router(ApiState::new(store.clone(), Arc::new(resolver)));

    // `request` always sends "secret", which is wrong for "ci".
    let resp = send(&router, request("POST", "/v1/states/prod", "ci", "data")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn static_credentials_share_a_namespace() {
    let store = Arc::new(InMemoryStateStore::new());
    let resolver = StaticResolver::new([
        StaticCredential::from_secret("ci", "secret", "platform"),
        StaticCredential::from_secret("alice", "secret", "platform"),
    ]);
    let router = build_router(ApiState::new(store.clone(), Arc::new(resolver)));

    let resp = send(&router, request("POST", "/v1/states/net", "ci", "from-ci")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&router, request("GET", "/v1/states/net", "alice", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"from-ci");
    assert_eq!(store.get("platform", "net").unwrap(), b"from-ci");
}

#[tokio::test]
async fn help_needs_no_credentials() {
    let (router, _) = test_app(0);
    let req = Request::builder().uri("/").body(Body::empty()).unwrap();
    let resp = send(&router, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_json(resp).await["help"].is_string());
}

// ── Protocol ───────────────────────────────────────────────────

#[tokio::test]
async fn full_lock_write_unlock_cycle() {
    let (router, store) = test_app(0);

    let resp = send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"run-1"}"#)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!({ "locked": true }));

    // Writing without the lock ID is refused.
    let resp = send(&router, request("POST", "/v1/states/prod", "alice", "v1")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(body_json(resp).await["error"].is_string());

    let resp = send(&router, request("POST", "/v1/states/prod?ID=run-1", "alice", "v1")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!({ "updated": true }));

    let resp = send(&router, request("GET", "/v1/states/prod", "alice", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"v1");

    let resp = send(&router, request("UNLOCK", "/v1/states/prod", "alice", r#"{"ID":"run-1"}"#)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, serde_json::json!({ "unlocked": true }));

    let resp = send(&router, request("POST", "/v1/states/prod", "alice", "v2")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(store.get("alice", "prod").unwrap(), b"v2");
}

#[tokio::test]
async fn namespaces_do_not_see_each_other() {
    let (router, _) = test_app(0);

    send(&router, request("POST", "/v1/states/prod", "alice", "alice-state")).await;
    send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"A"}"#)).await;

    let resp = send(&router, request("GET", "/v1/states/prod", "bob", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Bob's lock on the same identifier is independent of Alice's.
    let resp = send(&router, request("LOCK", "/v1/states/prod", "bob", r#"{"ID":"B"}"#)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&router, request("GET", "/v1/states/prod", "alice", Body::empty())).await;
    assert_eq!(body_bytes(resp).await, b"alice-state");
}

#[tokio::test]
async fn repeated_lock_id_uses_first_value() {
    let (router, store) = test_app(0);
    send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"A"}"#)).await;

    let resp = send(&router, request("POST", "/v1/states/prod?ID=A&ID=B", "alice", "v1")).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&router, request("POST", "/v1/states/prod?ID=B&ID=A", "alice", "v2")).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(store.get("alice", "prod").unwrap(), b"v1");
}

#[tokio::test]
async fn unlock_with_empty_body_force_unlocks() {
    let (router, store) = test_app(0);
    send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"A"}"#)).await;

    let resp = send(&router, request("UNLOCK", "/v1/states/prod", "alice", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!store.snapshot("alice", "prod").unwrap().is_locked());
}

#[tokio::test]
async fn malformed_lock_body_is_400() {
    let (router, store) = test_app(0);
    let resp = send(&router, request("LOCK", "/v1/states/prod", "alice", "ID=A")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn delete_reports_unsupported_backend() {
    let (router, _) = test_app(0);
    send(&router, request("POST", "/v1/states/prod", "alice", "v1")).await;

    let resp = send(&router, request("DELETE", "/v1/states/prod", "alice", Body::empty())).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(resp).await["error"].is_string());
}

// ── Lock contention ────────────────────────────────────────────

#[tokio::test]
async fn waiting_lock_succeeds_after_release() {
    let (router, store) = test_app(200);
    send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"A"}"#)).await;

    let releaser = store.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        releaser.unlock("alice", "prod", "A").unwrap();
    });

    let resp = send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"B"}"#)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(store.snapshot("alice", "prod").unwrap().lock_holder(), Some("B"));
}

#[tokio::test]
async fn exhausted_wait_reports_holder() {
    let (router, _) = test_app(2);
    send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"A"}"#)).await;

    let resp = send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"B"}"#)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "Locked Conflict");
    assert_eq!(body["ID"], "A");
}

#[tokio::test]
async fn shutdown_aborts_waiting_lock() {
    let store = Arc::new(InMemoryStateStore::new());
    store.update("alice", "prod", Vec::new(), "").unwrap();
    store.lock("alice", "prod", "A").unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = ApiState::new(store.clone(), Arc::new(PassthroughResolver))
        .with_lock_policy(fast_policy(10_000))
        .with_shutdown(shutdown_rx);
    let router = build_router(state);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(true);
    });

    let resp = send(&router, request("LOCK", "/v1/states/prod", "alice", r#"{"ID":"B"}"#)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "lock wait aborted");
    assert_eq!(store.snapshot("alice", "prod").unwrap().lock_holder(), Some("A"));
}

#[tokio::test]
async fn oversized_state_is_rejected() {
    let store = Arc::new(InMemoryStateStore::new());
    let state = ApiState::new(store.clone(), Arc::new(PassthroughResolver)).with_max_body_bytes(16);
    let router = build_router(state);

    let resp = send(&router, request("POST", "/v1/states/prod", "alice", "x".repeat(64))).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.is_empty().unwrap());
}

/// Counts `lock` calls on top of an in-memory store.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStateStore,
    lock_calls: AtomicU32,
}

impl StateStore for CountingStore {
    fn get(&self, ns: &str, id: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(ns, id)
    }
    fn update(&self, ns: &str, id: &str, contents: Vec<u8>, lock_id: &str) -> StoreResult<()> {
        self.inner.update(ns, id, contents, lock_id)
    }
    fn lock(&self, ns: &str, id: &str, lock_id: &str) -> StoreResult<()> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.lock(ns, id, lock_id)
    }
    fn unlock(&self, ns: &str, id: &str, lock_id: &str) -> StoreResult<()> {
        self.inner.unlock(ns, id, lock_id)
    }
    fn force_unlock(&self, ns: &str, id: &str) -> StoreResult<()> {
        self.inner.force_unlock(ns, id)
    }
    fn delete(&self, ns: &str, id: &str) -> StoreResult<()> {
        self.inner.delete(ns, id)
    }
}

#[tokio::test]
async fn client_disconnect_stops_lock_polling() {
    let store = Arc::new(CountingStore::default());
    store.update("alice", "prod", Vec::new(), "").unwrap();
    store.inner.lock("alice", "prod", "A").unwrap();

    let state = ApiState::new(store.clone(), Arc::new(PassthroughResolver))
        .with_lock_policy(fast_policy(10_000));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    let body = r#"{"ID":"B"}"#;
    let raw = format!(
        "LOCK /v1/states/prod HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Authorization: Basic {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\r\n{body}",
        STANDARD.encode("alice:secret"),
        body.len(),
    );
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(raw.as_bytes()).await.unwrap();

    // Let the coordinator poll a few times against the held lock.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.lock_calls.load(Ordering::SeqCst) < 3 {
        assert!(tokio::time::Instant::now() < deadline, "lock was never polled");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    drop(client);

    // Allow for one attempt already in flight, then expect silence.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after_drop = store.lock_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.lock_calls.load(Ordering::SeqCst), after_drop);
    assert_eq!(store.inner.snapshot("alice", "prod").unwrap().lock_holder(), Some("A"));
}
