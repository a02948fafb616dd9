use crate::error::SubscriptionError;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct SubscriptionForm {
    #[serde(default)]
    pub operation: Option<String>,
}

pub async fn handle_subscriptions(
    State(state): State<AppState>,
    Form(form): Form<SubscriptionForm>,
) -> impl IntoResponse {
    match state.subscriptions.handle(form.operation.as_deref()).await {
        Ok(data) => (StatusCode::OK, Json(json!({"error": false, "data": data}))).into_response(),
        Err(e) => {
            let status = match &e {
                SubscriptionError::Gateway(_) => StatusCode::BAD_GATEWAY,
                SubscriptionError::MissingDestination => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, Json(json!({"error": true, "message": e.to_string()}))).into_response()
        }
    }
}
