//! HTTP Basic authentication middleware.
//!
//! Decodes the `Authorization` header, hands the credentials to the
//! configured `NamespaceResolver`, and stores the resulting [`Namespace`] in
//! the request extensions. Anything else ends the request with a 401
//! challenge before a handler runs.

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::ApiState;

/// Value of the `WWW-Authenticate` challenge.
pub const CHALLENGE: &str = "Basic realm=\"Authorization Required\"";

/// Namespace resolved for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(pub String);

/// Middleware guarding every state route.
pub async fn require_namespace(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some((username, secret)) = basic_credentials(req.headers()) else {
        return challenge();
    };

    match state.resolver.resolve(&username, &secret) {
        Ok(namespace) => {
            req.extensions_mut().insert(Namespace(namespace));
            next.run(req).await
        }
        Err(e) => {
            warn!(%username, error = %e, "credentials rejected");
            challenge()
        }
    }
}

/// Extract `(username, secret)` from a Basic `Authorization` header.
///
/// The secret may contain colons; only the first one separates the pair.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, secret) = decoded.split_once(':')?;
    Some((username.to_string(), secret.to_string()))
}

fn challenge() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, CHALLENGE)],
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}
