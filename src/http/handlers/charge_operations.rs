use crate::error::ChargeOperationError;
use crate::service::charge_operations::AdminChargeRequest;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Form, Json};
use serde_json::json;

pub async fn handle_charge(
    State(state): State<AppState>,
    Form(req): Form<AdminChargeRequest>,
) -> impl IntoResponse {
    match state.charge_operations.handle_admin(&req).await {
        Ok(message) => (StatusCode::OK, Json(json!({"error": false, "message": message}))).into_response(),
        Err(e) => {
            let status = match &e {
                ChargeOperationError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                ChargeOperationError::Gateway(_) => StatusCode::BAD_GATEWAY,
                ChargeOperationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            tracing::warn!(
                order_no = req.order_no.as_deref().unwrap_or_default(),
                operation = req.operation.as_deref().unwrap_or_default(),
                error = %e,
                "admin charge operation rejected"
            );
            (status, Json(json!({"error": true, "message": e.to_string()}))).into_response()
        }
    }
}
