use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub const BACK_OFFICE_KEY_HEADER: &str = "X-Internal-Api-Key";

fn carries_back_office_key(headers: &HeaderMap, configured: &str) -> bool {
    if configured.is_empty() {
        return false;
    }
    headers
        .get(BACK_OFFICE_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|key| key == configured)
}

/// Admin charge and subscription routes. With no key configured nothing gets through.
pub async fn guard_back_office(State(configured): State<String>, request: Request<Body>, next: Next) -> Response {
    if carries_back_office_key(request.headers(), &configured) {
        return next.run(request).await;
    }

    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        key_configured = !configured.is_empty(),
        "back-office request refused"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": true, "message": "unauthorized"})),
    )
        .into_response()
}
