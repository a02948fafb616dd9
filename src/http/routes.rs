use crate::http::handlers::{charge_operations, notifications, ops, subscriptions};
use crate::http::middleware::admin_auth::guard_back_office;
use crate::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

pub fn router(state: AppState, admin_key: String) -> Router {
    let admin_routes = Router::new()
        .route("/admin/charges", post(charge_operations::handle_charge))
        .route("/admin/notifications", post(subscriptions::handle_subscriptions))
        .layer(from_fn_with_state(admin_key, guard_back_office));

    Router::new()
        .route("/notifications", post(notifications::receive_notification))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .merge(admin_routes)
        .with_state(state)
}
