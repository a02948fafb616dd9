mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{charged_order, money, settings, Harness};
use gateway_checkout::domain::payment::{ChargeStatus, FraudStatus, OrderPaymentStatus, OrderStatus};
use gateway_checkout::http::routes::router;
use gateway_checkout::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

fn app(h: &Harness) -> Router {
    let state = AppState::new(h.gateway.clone(), h.store.clone(), settings());
    router(state, ADMIN_KEY.to_string())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn webhook(body: Value) -> Request<Body> {
    Request::post("/notifications")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_form(path: &str, form: &str) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("X-Internal-Api-Key", ADMIN_KEY)
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn capture_event(charge_id: &str, captures: &[&str]) -> Value {
    let transactions: Vec<Value> = captures
        .iter()
        .map(|amount| json!({"type": "capture", "status": "complete", "amount": amount, "currency": "AUD"}))
        .collect();
    let last = transactions.last().cloned().unwrap_or(Value::Null);
    json!({
        "event": "transaction_success",
        "data": {
            "_id": charge_id,
            "status": "complete",
            "amount": "100.00",
            "currency": "AUD",
            "transactions": transactions,
            "transaction": last
        }
    })
}

#[tokio::test]
async fn malformed_webhooks_get_a_server_error() {
    let h = Harness::new();
    let app = app(&h);

    let bad_json = Request::post("/notifications").body(Body::from("{oops")).unwrap();
    let (status, body) = send(&app, bad_json).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": true}));

    let (status, _) = send(&app, webhook(json!({"event": "transaction_success"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn unknown_events_and_orders_are_acknowledged() {
    let h = Harness::new();
    h.store
        .insert_order(charged_order("10001", "ch_1", 10000, ChargeStatus::Pending))
        .await;
    let app = app(&h);

    let (status, body) = send(&app, webhook(json!({"event": "charge_created", "data": {"_id": "ch_1"}}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _) = send(&app, webhook(capture_event("ch_unknown", &["10.00"]))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.order("10001").await.notes.is_empty());
}

#[tokio::test]
async fn replayed_capture_webhooks_converge_on_the_ledger() {
    let h = Harness::new();
    h.store
        .insert_order(charged_order("10002", "ch_2", 10000, ChargeStatus::Pending))
        .await;
    let app = app(&h);

    let (status, _) = send(&app, webhook(capture_event("ch_2", &["50.00"]))).await;
    assert_eq!(status, StatusCode::OK);
    let order = h.order("10002").await;
    assert_eq!(order.payment_status, OrderPaymentStatus::PartPaid);
    assert!(order.captured);
    assert_eq!(order.gateway_instrument().unwrap().captured_amount, money(5000));
    assert!(order.notes.last().unwrap().text.starts_with("Captured 50"));

    send(&app, webhook(capture_event("ch_2", &["50.00"]))).await;
    let order = h.order("10002").await;
    assert_eq!(order.payment_status, OrderPaymentStatus::PartPaid);
    assert_eq!(order.gateway_instrument().unwrap().captured_amount, money(5000));

    send(&app, webhook(capture_event("ch_2", &["50.00", "50.00"]))).await;
    let order = h.order("10002").await;
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    let pi = order.gateway_instrument().unwrap();
    assert_eq!(pi.captured_amount, money(10000));
    assert_eq!(pi.charge_status, Some(ChargeStatus::Complete));
}

#[tokio::test]
async fn full_refund_webhook_marks_order_unpaid() {
    let h = Harness::new();
    let mut order = charged_order("10003", "ch_3", 4000, ChargeStatus::Complete);
    order.payment_status = OrderPaymentStatus::Paid;
    order.instruments[0].captured_amount = money(4000);
    h.store.insert_order(order).await;
    let app = app(&h);

    let refund = json!({"type": "refund", "status": "complete", "amount": "40.00"});
    let event = json!({
        "event": "refund_success",
        "data": {
            "_id": "ch_3",
            "status": "refunded",
            "amount": "40.00",
            "transactions": [
                {"type": "sale", "status": "complete", "amount": "40.00"},
                refund
            ],
            "transaction": refund
        }
    });
    send(&app, webhook(event)).await;

    let order = h.order("10003").await;
    assert_eq!(order.payment_status, OrderPaymentStatus::NotPaid);
    assert!(order.refunded);
    assert_eq!(order.notes.last().unwrap().text, "Refunded");
    assert_eq!(order.gateway_instrument().unwrap().refunded_amount, money(4000));
}

#[tokio::test]
async fn fraud_events_update_fraud_status() {
    let h = Harness::new();
    h.store
        .insert_order(charged_order("10004", "ch_4", 1500, ChargeStatus::Inreview))
        .await;
    let app = app(&h);

    send(
        &app,
        webhook(json!({"event": "fraud_check_transaction_in_review_declined", "data": {"_id": "ch_4"}})),
    )
    .await;

    let order = h.order("10004").await;
    let note = order.notes.last().unwrap();
    assert_eq!(note.subject, "Fraud Notification");
    assert_eq!(note.text, "Fraud check transaction in review declined");
    assert_eq!(order.gateway_instrument().unwrap().fraud_status, Some(FraudStatus::Declined));
}

#[tokio::test]
async fn admin_routes_require_the_internal_key() {
    let h = Harness::new();
    let app = app(&h);
    let request = Request::post("/admin/charges")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from("orderID=1&orderToken=noToken&operation=cancel"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_capture_respects_the_ceiling() {
    let h = Harness::new();
    h.store
        .insert_order(charged_order("10005", "ch_5", 10000, ChargeStatus::Pending))
        .await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        admin_form("/admin/charges", "orderID=10005&orderToken=noToken&operation=capture&captureAmount=150"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!(true));
    assert!(h.gateway.calls().is_empty());

    let (status, body) = send(
        &app,
        admin_form("/admin/charges", "orderID=10005&orderToken=noToken&operation=capture&captureAmount=60"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"error": false, "message": "Charge capture requested"}));
    let order = h.order("10005").await;
    assert_eq!(order.notes.last().unwrap().text, "Capture for 60 AUD requested. Charge ch_5");
}

#[tokio::test]
async fn admin_cancel_cancels_the_order() {
    let h = Harness::new();
    let order = charged_order("10006", "ch_6", 2500, ChargeStatus::Pending);
    let token = order.token.clone();
    h.store.insert_order(order).await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        admin_form("/admin/charges", "orderID=10006&orderToken=wrong&operation=cancel"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!(true));

    let (status, _) = send(
        &app,
        admin_form("/admin/charges", &format!("orderID=10006&orderToken={token}&operation=cancel")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let order = h.order("10006").await;
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.cancel_code.as_deref(), Some("PowerBoard"));
    assert_eq!(order.cancel_description.as_deref(), Some("Cancelled due to Payment Cancellation"));
    assert_eq!(order.gateway_instrument().unwrap().charge_status, Some(ChargeStatus::Cancelled));
}

#[tokio::test]
async fn subscription_create_only_adds_missing_events() {
    let h = Harness::new();
    let destination = settings().notification_url;
    h.gateway.script(
        "search_notifications",
        Ok(json!([
            {"_id": "n1", "event": "transaction_success", "destination": destination, "type": "webhook"},
            {"_id": "n2", "event": "refund_success", "destination": destination, "type": "webhook"},
            {"_id": "n3", "event": "refund_failure", "destination": "https://elsewhere.example.com", "type": "webhook"}
        ])),
    );
    let app = app(&h);

    let (status, body) = send(&app, admin_form("/admin/notifications", "operation=create")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["existingAlreadyNotifications"],
        json!(["transaction_success", "refund_success"])
    );
    assert_eq!(body["data"]["createdNotificationsFor"].as_array().unwrap().len(), 19);
    assert_eq!(h.gateway.calls_to("create_notification").len(), 19);

    let (status, body) = send(&app, admin_form("/admin/notifications", "operation=rebuild")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!(true));
}

#[tokio::test]
async fn ops_endpoints_report_health() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send(&app, Request::get("/ops/liveness").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"alive": true}));

    let (status, body) = send(&app, Request::get("/ops/readiness").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], json!(true));
}

#[tokio::test]
async fn odd_data_shapes_are_acknowledged() {
    let h = Harness::new();
    h.store
        .insert_order(charged_order("10007", "ch_7", 3000, ChargeStatus::Pending))
        .await;
    let app = app(&h);

    let (status, body) = send(
        &app,
        webhook(json!({"event": "transaction_success", "data": {"_id": "ch_7", "transactions": null}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _) = send(
        &app,
        webhook(json!({"event": "refund_failure", "data": {"_id": "ch_7", "amount": [1, 2]}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let order = h.order("10007").await;
    assert_eq!(order.notes.last().unwrap().text, "Refund failed");
    assert_eq!(order.payment_status, OrderPaymentStatus::NotPaid);
}
