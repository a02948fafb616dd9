use crate::config::{ConnectionType, GatewaySettings};
use crate::domain::charge::{
    Charge, GatewayCustomer, NotificationSubscription, VaultedSource, WalletChargeSession,
};
use crate::error::GatewayError;
use crate::gateways::retry::{with_read_retry, ReadRetryPolicy};
use crate::gateways::{
    ChargeRequest, CustomerRequest, GatewayApi, NotificationQuery, NotificationSubscriptionRequest,
    VaultRequest,
};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct Envelope<T> {
    resource: Resource<T>,
}

#[derive(Deserialize)]
struct Resource<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// REST client for the hosted gateway API.
pub struct GatewayClient {
    pub name: &'static str,
    pub base_url: String,
    pub connection_type: ConnectionType,
    pub api_secret: String,
    pub timeout_ms: u64,
    pub read_retry: ReadRetryPolicy,
    pub client: reqwest::Client,
}

impl GatewayClient {
    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self {
            name: settings.profile.name,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            connection_type: settings.connection_type,
            api_secret: settings.api_secret.clone(),
            timeout_ms: settings.timeout_ms,
            read_retry: ReadRetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .client
            .request(method, url)
            .header(self.connection_type.header_name(), &self.api_secret)
            .timeout(std::time::Duration::from_millis(self.timeout_ms));
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                let message = if e.is_timeout() {
                    "gateway timeout".to_string()
                } else {
                    e.to_string()
                };
                tracing::error!(gateway = self.name, operation, error = %message, "gateway call failed");
                return Err(GatewayError::transport(message));
            }
        };

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::new(e.to_string(), Some(status.as_u16())))?;

        if !status.is_success() {
            let message = error_message(&text, status.as_u16());
            tracing::error!(
                gateway = self.name,
                operation,
                http_status = status.as_u16(),
                error = %message,
                "gateway rejected call"
            );
            return Err(GatewayError::new(message, Some(status.as_u16())));
        }

        serde_json::from_str::<Envelope<T>>(&text)
            .map(|env| env.resource.data)
            .map_err(|e| {
                GatewayError::new(
                    format!("unexpected {operation} response: {e}"),
                    Some(status.as_u16()),
                )
            })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
        body: serde_json::Value,
    ) -> Result<T, GatewayError> {
        self.call(operation, Method::POST, path, query, Some(body)).await
    }
}

fn error_message(body: &str, status: u16) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) if body.trim().is_empty() => format!("HTTP {status}"),
        Err(_) => body.chars().take(500).collect(),
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::transport(e.to_string()))
}

fn capture_query(capture: bool) -> [(&'static str, String); 1] {
    [("capture", capture.to_string())]
}

fn amount_body(amount: Option<Decimal>) -> serde_json::Value {
    match amount {
        Some(amount) => json!({ "amount": amount.to_string() }),
        None => json!({}),
    }
}

#[async_trait::async_trait]
impl GatewayApi for GatewayClient {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn create_vault(&self, request: &VaultRequest) -> Result<VaultedSource, GatewayError> {
        self.post("create_vault", "/v1/vault/payment_sources", &[], to_body(request)?)
            .await
    }

    async fn create_customer(&self, request: &CustomerRequest) -> Result<GatewayCustomer, GatewayError> {
        self.post("create_customer", "/v1/customers", &[], to_body(request)?)
            .await
    }

    async fn create_charge(&self, request: &ChargeRequest, capture: bool) -> Result<Charge, GatewayError> {
        self.post("create_charge", "/v1/charges", &capture_query(capture), to_body(request)?)
            .await
    }

    async fn get_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let path = format!("/v1/charges/{charge_id}");
        with_read_retry(&self.read_retry, "get_charge", || {
            self.call("get_charge", Method::GET, &path, &[], None)
        })
        .await
    }

    async fn capture_charge(&self, charge_id: &str, amount: Option<Decimal>) -> Result<Charge, GatewayError> {
        let path = format!("/v1/charges/{charge_id}/capture");
        self.post("capture_charge", &path, &[], amount_body(amount)).await
    }

    async fn refund_charge(&self, charge_id: &str, amount: Option<Decimal>) -> Result<Charge, GatewayError> {
        let path = format!("/v1/charges/{charge_id}/refunds");
        self.post("refund_charge", &path, &[], amount_body(amount)).await
    }

    async fn cancel_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let path = format!("/v1/charges/{charge_id}/capture");
        self.call("cancel_charge", Method::DELETE, &path, &[], None).await
    }

    async fn archive_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let path = format!("/v1/charges/{charge_id}");
        self.call("archive_charge", Method::DELETE, &path, &[], None).await
    }

    async fn fraud_check(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        self.post("fraud_check", "/v1/charges/fraud", &[], to_body(request)?)
            .await
    }

    async fn attach_fraud(&self, charge_id: &str, fraud_charge_id: &str) -> Result<Charge, GatewayError> {
        let path = format!("/v1/charges/{charge_id}/fraud/attach");
        self.post(
            "attach_fraud",
            &path,
            &[],
            json!({ "fraud_charge_id": fraud_charge_id }),
        )
        .await
    }

    async fn wallet_charge(
        &self,
        request: &ChargeRequest,
        capture: bool,
    ) -> Result<WalletChargeSession, GatewayError> {
        self.post(
            "wallet_charge",
            "/v1/charges/wallet",
            &capture_query(capture),
            to_body(request)?,
        )
        .await
    }

    async fn pre_auth_3ds(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        self.post("pre_auth_3ds", "/v1/charges/3ds", &[], to_body(request)?)
            .await
    }

    async fn standalone_3ds(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        self.post("standalone_3ds", "/v1/charges/standalone-3ds", &[], to_body(request)?)
            .await
    }

    async fn search_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<NotificationSubscription>, GatewayError> {
        let params = [
            ("type", query.kind.clone()),
            ("skip", query.skip.to_string()),
            ("limit", query.limit.to_string()),
            ("sortkey", query.sortkey.clone()),
            ("sortdirection", query.sortdirection.clone()),
        ];
        with_read_retry(&self.read_retry, "search_notifications", || {
            self.call("search_notifications", Method::GET, "/v1/notifications", &params, None)
        })
        .await
    }

    async fn create_notification(
        &self,
        request: &NotificationSubscriptionRequest,
    ) -> Result<NotificationSubscription, GatewayError> {
        self.post("create_notification", "/v1/notifications", &[], to_body(request)?)
            .await
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<(), GatewayError> {
        let path = format!("/v1/notifications/{notification_id}");
        self.call::<serde_json::Value>("delete_notification", Method::DELETE, &path, &[], None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_gateway_text() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Vault token expired"}}"#, 400),
            "Vault token expired"
        );
        assert_eq!(error_message("", 502), "HTTP 502");
        assert_eq!(error_message("Bad Gateway", 502), "Bad Gateway");
    }
}
