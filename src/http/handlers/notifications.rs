use crate::service::notifications::{parse_notification, ProcessOutcome};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Gateway webhook receiver. Anything that parses is acknowledged with 200 so the gateway
/// stops redelivering; processing failures are logged and noted on the order.
pub async fn receive_notification(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let notification = match parse_notification(&body) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting notification");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": true}))).into_response();
        }
    };

    tracing::info!(
        event = %notification.event,
        body = %String::from_utf8_lossy(&body),
        "notification received"
    );

    match state.notifications.process(&notification).await {
        Ok(ProcessOutcome::Applied { order_no }) => {
            tracing::debug!(event = %notification.event, order_no = %order_no, "notification processed");
        }
        Ok(ProcessOutcome::Ignored(reason)) => {
            tracing::debug!(event = %notification.event, reason, "notification ignored");
        }
        Err(e) => {
            tracing::error!(event = %notification.event, error = %e, "notification processing failed");
        }
    }

    (StatusCode::OK, Json(json!({"success": true}))).into_response()
}
