use gateway_checkout::config::{ConnectionType, GatewayProfile, GatewaySettings};
use gateway_checkout::gateways::client::GatewayClient;
use gateway_checkout::gateways::retry::ReadRetryPolicy;
use gateway_checkout::gateways::{ChargeRequest, GatewayApi};
use gateway_checkout::domain::payment::ChargeStatus;
use rust_decimal::Decimal;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GatewayClient {
    let mut settings = GatewaySettings::sandbox(GatewayProfile::PAYDOCK);
    settings.base_url = server.uri();
    settings.api_secret = "sk_test".to_string();
    settings.connection_type = ConnectionType::SecretKey;
    let mut client = GatewayClient::from_settings(&settings);
    client.read_retry = ReadRetryPolicy {
        max_attempts: 2,
        backoff: Duration::from_millis(1),
    };
    client
}

#[tokio::test]
async fn create_charge_sends_capture_flag_and_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .and(query_param("capture", "false"))
        .and(header("x-user-secret-key", "sk_test"))
        .and(body_partial_json(json!({"currency": "AUD", "reference": "00042"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": 201,
            "resource": {"type": "charge", "data": {"_id": "ch_42", "status": "pending", "transactions": []}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = ChargeRequest::new(Decimal::new(1999, 2), "AUD");
    request.reference = Some("00042".to_string());
    let charge = client(&server).create_charge(&request, false).await.unwrap();

    assert_eq!(charge.id.as_deref(), Some("ch_42"));
    assert_eq!(charge.status, Some(ChargeStatus::Pending));
}

#[tokio::test]
async fn gateway_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges/ch_1/capture"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "status": 400,
            "error": {"message": "Charge already captured"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .capture_charge("ch_1", Some(Decimal::new(500, 2)))
        .await
        .unwrap_err();
    assert_eq!(err.message, "Charge already captured");
    assert_eq!(err.http_status, Some(400));
}

#[tokio::test]
async fn charge_lookup_retries_once_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/charges/ch_9"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/charges/ch_9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource": {"data": {"_id": "ch_9", "status": "complete", "transactions": []}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let charge = client(&server).get_charge("ch_9").await.unwrap();
    assert_eq!(charge.status, Some(ChargeStatus::Complete));
}

#[tokio::test]
async fn charge_create_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .create_charge(&ChargeRequest::new(Decimal::ONE, "AUD"), true)
        .await
        .unwrap_err();
    assert_eq!(err.http_status, Some(502));
}
