use crate::domain::charge::{
    Charge, GatewayCustomer, NotificationSubscription, VaultedSource, WalletChargeSession,
};
use crate::error::GatewayError;
use crate::gateways::{
    ChargeRequest, CustomerRequest, GatewayApi, NotificationQuery, NotificationSubscriptionRequest,
    VaultRequest,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CreateVault(VaultRequest),
    CreateCustomer(CustomerRequest),
    CreateCharge { request: ChargeRequest, capture: bool },
    GetCharge(String),
    CaptureCharge { charge_id: String, amount: Option<Decimal> },
    RefundCharge { charge_id: String, amount: Option<Decimal> },
    CancelCharge(String),
    ArchiveCharge(String),
    FraudCheck(ChargeRequest),
    AttachFraud { charge_id: String, fraud_charge_id: String },
    WalletCharge { request: ChargeRequest, capture: bool },
    PreAuth3ds(ChargeRequest),
    Standalone3ds(ChargeRequest),
    SearchNotifications(NotificationQuery),
    CreateNotification(NotificationSubscriptionRequest),
    DeleteNotification(String),
}

impl GatewayCall {
    pub fn operation(&self) -> &'static str {
        match self {
            GatewayCall::CreateVault(_) => "create_vault",
            GatewayCall::CreateCustomer(_) => "create_customer",
            GatewayCall::CreateCharge { .. } => "create_charge",
            GatewayCall::GetCharge(_) => "get_charge",
            GatewayCall::CaptureCharge { .. } => "capture_charge",
            GatewayCall::RefundCharge { .. } => "refund_charge",
            GatewayCall::CancelCharge(_) => "cancel_charge",
            GatewayCall::ArchiveCharge(_) => "archive_charge",
            GatewayCall::FraudCheck(_) => "fraud_check",
            GatewayCall::AttachFraud { .. } => "attach_fraud",
            GatewayCall::WalletCharge { .. } => "wallet_charge",
            GatewayCall::PreAuth3ds(_) => "pre_auth_3ds",
            GatewayCall::Standalone3ds(_) => "standalone_3ds",
            GatewayCall::SearchNotifications(_) => "search_notifications",
            GatewayCall::CreateNotification(_) => "create_notification",
            GatewayCall::DeleteNotification(_) => "delete_notification",
        }
    }
}

/// In-process gateway: records every call and answers from a per-operation script,
/// falling back to a plausible success response when nothing is scripted.
#[derive(Default)]
pub struct MockGateway {
    calls: Mutex<Vec<GatewayCall>>,
    scripts: Mutex<HashMap<&'static str, VecDeque<Result<Value, GatewayError>>>>,
    sequence: AtomicU32,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next answer for `operation` (e.g. `"create_charge"`). Answers are consumed in order.
    pub fn script(&self, operation: &'static str, response: Result<Value, GatewayError>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(operation).or_default().push_back(response);
        }
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation() == operation)
            .collect()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.calls().iter().map(GatewayCall::operation).collect()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn respond<T: DeserializeOwned>(&self, call: GatewayCall, fallback: Value) -> Result<T, GatewayError> {
        let operation = call.operation();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let scripted = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut s| s.get_mut(operation).and_then(VecDeque::pop_front));
        let value = match scripted {
            Some(result) => result?,
            None => fallback,
        };
        serde_json::from_value(value)
            .map_err(|e| GatewayError::new(format!("mock {operation} response: {e}"), Some(200)))
    }
}

#[async_trait::async_trait]
impl GatewayApi for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_vault(&self, request: &VaultRequest) -> Result<VaultedSource, GatewayError> {
        let vault_type = request.vault_type.map(|v| v.as_str()).unwrap_or("permanent");
        let fallback = json!({
            "vault_token": self.next_id("vault"),
            "vault_type": vault_type,
            "card_name": "Test Holder",
            "card_number_bin": "411111",
            "card_number_last4": "1111",
            "card_scheme": "visa",
            "expire_month": 12,
            "expire_year": 2030
        });
        self.respond(GatewayCall::CreateVault(request.clone()), fallback)
    }

    async fn create_customer(&self, request: &CustomerRequest) -> Result<GatewayCustomer, GatewayError> {
        let fallback = json!({ "_id": self.next_id("cus") });
        self.respond(GatewayCall::CreateCustomer(request.clone()), fallback)
    }

    async fn create_charge(&self, request: &ChargeRequest, capture: bool) -> Result<Charge, GatewayError> {
        let amount = request.amount.unwrap_or_default();
        let fallback = if capture {
            json!({
                "_id": self.next_id("ch"),
                "status": "complete",
                "amount": amount,
                "transactions": [{"type": "sale", "status": "complete", "amount": amount}]
            })
        } else {
            json!({
                "_id": self.next_id("ch"),
                "status": "pending",
                "amount": amount,
                "transactions": [{"type": "sale", "status": "pending", "amount": amount}]
            })
        };
        self.respond(
            GatewayCall::CreateCharge {
                request: request.clone(),
                capture,
            },
            fallback,
        )
    }

    async fn get_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let fallback = json!({ "_id": charge_id, "status": "pending", "transactions": [] });
        self.respond(GatewayCall::GetCharge(charge_id.to_string()), fallback)
    }

    async fn capture_charge(&self, charge_id: &str, amount: Option<Decimal>) -> Result<Charge, GatewayError> {
        let fallback = json!({ "_id": charge_id, "status": "complete", "transactions": [] });
        self.respond(
            GatewayCall::CaptureCharge {
                charge_id: charge_id.to_string(),
                amount,
            },
            fallback,
        )
    }

    async fn refund_charge(&self, charge_id: &str, amount: Option<Decimal>) -> Result<Charge, GatewayError> {
        let fallback = json!({ "_id": charge_id, "status": "refunded", "transactions": [] });
        self.respond(
            GatewayCall::RefundCharge {
                charge_id: charge_id.to_string(),
                amount,
            },
            fallback,
        )
    }

    async fn cancel_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let fallback = json!({ "_id": charge_id, "status": "cancelled", "transactions": [] });
        self.respond(GatewayCall::CancelCharge(charge_id.to_string()), fallback)
    }

    async fn archive_charge(&self, charge_id: &str) -> Result<Charge, GatewayError> {
        let fallback = json!({ "_id": charge_id });
        self.respond(GatewayCall::ArchiveCharge(charge_id.to_string()), fallback)
    }

    async fn fraud_check(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        let fallback = json!({ "_id": self.next_id("fraud"), "status": "complete" });
        self.respond(GatewayCall::FraudCheck(request.clone()), fallback)
    }

    async fn attach_fraud(&self, charge_id: &str, fraud_charge_id: &str) -> Result<Charge, GatewayError> {
        let fallback = json!({ "_id": charge_id });
        self.respond(
            GatewayCall::AttachFraud {
                charge_id: charge_id.to_string(),
                fraud_charge_id: fraud_charge_id.to_string(),
            },
            fallback,
        )
    }

    async fn wallet_charge(
        &self,
        request: &ChargeRequest,
        capture: bool,
    ) -> Result<WalletChargeSession, GatewayError> {
        let fallback = json!({
            "token": self.next_id("wallet_tok"),
            "charge": {
                "_id": self.next_id("ch"),
                "customer": {"payment_source": {"gateway_name": "mock", "gateway_type": "MockWallet"}}
            }
        });
        self.respond(
            GatewayCall::WalletCharge {
                request: request.clone(),
                capture,
            },
            fallback,
        )
    }

    async fn pre_auth_3ds(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        let fallback = json!({
            "_id": self.next_id("3ds_charge"),
            "status": "pre_authentication_pending",
            "_3ds": {"token": self.next_id("3ds_tok")}
        });
        self.respond(GatewayCall::PreAuth3ds(request.clone()), fallback)
    }

    async fn standalone_3ds(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        let fallback = json!({
            "_id": self.next_id("3ds_charge"),
            "_3ds": {"id": self.next_id("3ds"), "token": self.next_id("3ds_tok")}
        });
        self.respond(GatewayCall::Standalone3ds(request.clone()), fallback)
    }

    async fn search_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<NotificationSubscription>, GatewayError> {
        self.respond(GatewayCall::SearchNotifications(query.clone()), json!([]))
    }

    async fn create_notification(
        &self,
        request: &NotificationSubscriptionRequest,
    ) -> Result<NotificationSubscription, GatewayError> {
        let fallback = json!({
            "_id": self.next_id("ntf"),
            "event": request.event,
            "destination": request.destination,
            "type": request.kind
        });
        self.respond(GatewayCall::CreateNotification(request.clone()), fallback)
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<(), GatewayError> {
        self.respond::<Value>(
            GatewayCall::DeleteNotification(notification_id.to_string()),
            json!({}),
        )
        .map(|_| ())
    }
}
