use crate::config::{GatewaySettings, ThreeDsFlow, ThreeDsType};
use crate::domain::charge::{Charge, ChargeTransaction, TransactionStatus, TransactionType};
use crate::domain::payment::{ChargeStatus, FraudStatus, Order, PaymentInstrument};
use crate::error::{GatewayError, NotificationError};
use crate::gateways::{ChargeRequest, GatewayApi, ThreeDsPayload};
use crate::repo::order_store::OrderStore;
use crate::service::authorization::record_charge;
use crate::service::reconciliation::{
    apply_charge_details, payment_status_after_capture, payment_status_after_refund,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

const TRANSACTION_NOTE: &str = "Transaction Notification";
const FRAUD_NOTE: &str = "Fraud Notification";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationEvent {
    TransactionSuccess,
    RefundFailure,
    RefundSuccess,
    RefundRequested,
    TransactionFailure,
    StandaloneFraudCheckInReviewApproved,
    FraudCheckTransactionInReviewApproved,
    FraudCheckInReview,
    FraudCheckFailed,
    FraudCheckSuccess,
    FraudCheckInReviewAsyncDeclined,
    StandaloneFraudCheckInReview,
    StandaloneFraudCheckInReviewDeclined,
    FraudCheckTransactionInReviewAsyncApproved,
    FraudCheckTransactionInReviewDeclined,
    StandaloneFraudCheckInReviewAsyncApproved,
    FraudCheckInReviewAsyncApproved,
    FraudCheckTransactionInReviewAsyncDeclined,
    StandaloneFraudCheckFailed,
    StandaloneFraudCheckInReviewAsyncDeclined,
    StandaloneFraudCheckSuccess,
}

impl NotificationEvent {
    /// Every event a subscription is created for, in registration order.
    pub const ALL: [NotificationEvent; 21] = [
        NotificationEvent::TransactionSuccess,
        NotificationEvent::RefundFailure,
        NotificationEvent::RefundSuccess,
        NotificationEvent::RefundRequested,
        NotificationEvent::TransactionFailure,
        NotificationEvent::StandaloneFraudCheckInReviewApproved,
        NotificationEvent::FraudCheckTransactionInReviewApproved,
        NotificationEvent::FraudCheckInReview,
        NotificationEvent::FraudCheckFailed,
        NotificationEvent::FraudCheckSuccess,
        NotificationEvent::FraudCheckInReviewAsyncDeclined,
        NotificationEvent::StandaloneFraudCheckInReview,
        NotificationEvent::StandaloneFraudCheckInReviewDeclined,
        NotificationEvent::FraudCheckTransactionInReviewAsyncApproved,
        NotificationEvent::FraudCheckTransactionInReviewDeclined,
        NotificationEvent::StandaloneFraudCheckInReviewAsyncApproved,
        NotificationEvent::FraudCheckInReviewAsyncApproved,
        NotificationEvent::FraudCheckTransactionInReviewAsyncDeclined,
        NotificationEvent::StandaloneFraudCheckFailed,
        NotificationEvent::StandaloneFraudCheckInReviewAsyncDeclined,
        NotificationEvent::StandaloneFraudCheckSuccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::TransactionSuccess => "transaction_success",
            NotificationEvent::RefundFailure => "refund_failure",
            NotificationEvent::RefundSuccess => "refund_success",
            NotificationEvent::RefundRequested => "refund_requested",
            NotificationEvent::TransactionFailure => "transaction_failure",
            NotificationEvent::StandaloneFraudCheckInReviewApproved => "standalone_fraud_check_in_review_approved",
            NotificationEvent::FraudCheckTransactionInReviewApproved => "fraud_check_transaction_in_review_approved",
            NotificationEvent::FraudCheckInReview => "fraud_check_in_review",
            NotificationEvent::FraudCheckFailed => "fraud_check_failed",
            NotificationEvent::FraudCheckSuccess => "fraud_check_success",
            NotificationEvent::FraudCheckInReviewAsyncDeclined => "fraud_check_in_review_async_declined",
            NotificationEvent::StandaloneFraudCheckInReview => "standalone_fraud_check_in_review",
            NotificationEvent::StandaloneFraudCheckInReviewDeclined => "standalone_fraud_check_in_review_declined",
            NotificationEvent::FraudCheckTransactionInReviewAsyncApproved => {
                "fraud_check_transaction_in_review_async_approved"
            }
            NotificationEvent::FraudCheckTransactionInReviewDeclined => "fraud_check_transaction_in_review_declined",
            NotificationEvent::StandaloneFraudCheckInReviewAsyncApproved => {
                "standalone_fraud_check_in_review_async_approved"
            }
            NotificationEvent::FraudCheckInReviewAsyncApproved => "fraud_check_in_review_async_approved",
            NotificationEvent::FraudCheckTransactionInReviewAsyncDeclined => {
                "fraud_check_transaction_in_review_async_declined"
            }
            NotificationEvent::StandaloneFraudCheckFailed => "standalone_fraud_check_failed",
            NotificationEvent::StandaloneFraudCheckInReviewAsyncDeclined => {
                "standalone_fraud_check_in_review_async_declined"
            }
            NotificationEvent::StandaloneFraudCheckSuccess => "standalone_fraud_check_success",
        }
    }

    /// Events whose payload carries the charge's full transaction ledger.
    pub fn carries_ledger(&self) -> bool {
        matches!(
            self,
            NotificationEvent::TransactionSuccess
                | NotificationEvent::TransactionFailure
                | NotificationEvent::RefundSuccess
                | NotificationEvent::RefundFailure
        )
    }

    /// Approval of a standalone fraud review; the deferred charge is created on receipt.
    pub fn is_standalone_approval(&self) -> bool {
        matches!(
            self,
            NotificationEvent::StandaloneFraudCheckInReviewApproved
                | NotificationEvent::StandaloneFraudCheckInReviewAsyncApproved
        )
    }

    /// Note text and resulting fraud status for fraud events.
    pub fn fraud_outcome(&self) -> Option<(&'static str, FraudStatus)> {
        use NotificationEvent::*;
        let outcome = match self {
            FraudCheckTransactionInReviewApproved => {
                ("Fraud check transaction in review approved", FraudStatus::Complete)
            }
            StandaloneFraudCheckInReview => ("Standalone Fraud check in review", FraudStatus::Inreview),
            StandaloneFraudCheckSuccess => ("Standalone Fraud check success", FraudStatus::Complete),
            StandaloneFraudCheckFailed => ("Standalone Fraud check failed", FraudStatus::Failed),
            StandaloneFraudCheckInReviewDeclined => {
                ("Standalone Fraud check in review declined", FraudStatus::Declined)
            }
            StandaloneFraudCheckInReviewAsyncDeclined => {
                ("Standalone Fraud check in review async declined", FraudStatus::Declined)
            }
            StandaloneFraudCheckInReviewApproved => {
                ("Standalone Fraud check in review approved", FraudStatus::Complete)
            }
            StandaloneFraudCheckInReviewAsyncApproved => {
                ("Standalone Fraud check in review async approved", FraudStatus::Complete)
            }
            FraudCheckInReview => ("Fraud check in review", FraudStatus::Inreview),
            FraudCheckInReviewAsyncApproved => ("Fraud check in review async approved", FraudStatus::Complete),
            FraudCheckInReviewAsyncDeclined => ("Fraud check in review async declined", FraudStatus::Declined),
            FraudCheckTransactionInReviewAsyncApproved => {
                ("Fraud check transaction in review async approved", FraudStatus::Complete)
            }
            FraudCheckTransactionInReviewAsyncDeclined => {
                ("Fraud check transaction in review async declined", FraudStatus::Declined)
            }
            FraudCheckSuccess => ("Fraud check success", FraudStatus::Complete),
            FraudCheckFailed => ("Fraud check failed", FraudStatus::Failed),
            FraudCheckTransactionInReviewDeclined => {
                ("Fraud check transaction in review declined", FraudStatus::Declined)
            }
            TransactionSuccess | RefundFailure | RefundSuccess | RefundRequested | TransactionFailure => {
                return None
            }
        };
        Some(outcome)
    }
}

impl FromStr for NotificationEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown notification event: {s}"))
    }
}

/// `data` of a webhook. Ledger events carry the whole charge plus the transaction that fired it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationData {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<ChargeStatus>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub transactions: Vec<ChargeTransaction>,
    #[serde(default)]
    pub transaction: Option<ChargeTransaction>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ChargeTransaction>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ChargeTransaction>>::deserialize(deserializer)?.unwrap_or_default())
}

fn field<T: DeserializeOwned>(data: &Value, key: &str) -> Option<T> {
    data.get(key).cloned().and_then(|v| serde_json::from_value(v).ok())
}

impl NotificationData {
    /// Reads each field on its own, dropping the ones with an unexpected shape.
    fn lenient(data: &Value) -> Self {
        Self {
            id: field(data, "_id"),
            status: field(data, "status"),
            amount: field(data, "amount"),
            currency: field(data, "currency"),
            transactions: field::<Option<Vec<ChargeTransaction>>>(data, "transactions")
                .flatten()
                .unwrap_or_default(),
            transaction: field(data, "transaction"),
        }
    }

    fn as_charge(&self) -> Charge {
        Charge {
            id: self.id.clone(),
            status: self.status,
            amount: self.amount,
            currency: self.currency.clone(),
            transactions: self.transactions.clone(),
            ..Charge::default()
        }
    }

    fn fired_transaction(&self) -> Option<&ChargeTransaction> {
        self.transaction.as_ref().or_else(|| self.transactions.last())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub event: String,
    pub data: NotificationData,
}

/// Parses a webhook body. A body that is not JSON, or lacks `event` or `data`, is malformed.
/// Anything else inside `data` is read as far as it goes.
pub fn parse_notification(body: &[u8]) -> Result<Notification, NotificationError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| NotificationError::Malformed(e.to_string()))?;
    let event = value
        .get("event")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| NotificationError::Malformed("missing event".to_string()))?
        .to_string();
    let data = value
        .get("data")
        .filter(|d| d.is_object())
        .cloned()
        .ok_or_else(|| NotificationError::Malformed("missing data".to_string()))?;
    let data = match NotificationData::deserialize(&data) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(event = %event, error = %e, "notification data has unexpected fields");
            NotificationData::lenient(&data)
        }
    };
    Ok(Notification { event, data })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Applied { order_no: String },
    Ignored(&'static str),
}

#[derive(Clone)]
pub struct NotificationProcessor {
    pub gateway: Arc<dyn GatewayApi>,
    pub store: Arc<dyn OrderStore>,
    pub settings: Arc<GatewaySettings>,
}

impl NotificationProcessor {
    pub async fn process(&self, notification: &Notification) -> Result<ProcessOutcome, NotificationError> {
        let Ok(event) = NotificationEvent::from_str(&notification.event) else {
            tracing::debug!(event = %notification.event, "ignoring unsupported notification");
            return Ok(ProcessOutcome::Ignored("unsupported event"));
        };
        let data = &notification.data;
        let Some(id) = data.id.as_deref().filter(|id| !id.is_empty()) else {
            tracing::debug!(event = event.as_str(), "notification without charge id");
            return Ok(ProcessOutcome::Ignored("missing charge id"));
        };

        let Some(mut order) = self.find_order(event, id).await? else {
            tracing::debug!(event = event.as_str(), charge_id = id, "no order for notification");
            return Ok(ProcessOutcome::Ignored("order not found"));
        };

        let result = if event.is_standalone_approval() {
            apply_order_update(&mut order, event, data);
            self.create_deferred_charge(&mut order).await
        } else {
            if event.carries_ledger() {
                if let Some(pi) = order.gateway_instrument_mut() {
                    apply_charge_details(pi, &data.as_charge());
                }
            }
            apply_order_update(&mut order, event, data);
            Ok(())
        };

        if let Err(e) = &result {
            tracing::error!(
                gateway = self.gateway.name(),
                order_no = %order.order_no,
                charge_id = id,
                event = event.as_str(),
                operation = "create_charge",
                error = %e,
                "deferred charge failed"
            );
            order.add_note(TRANSACTION_NOTE, format!("Charge failed.\n{}", e.message));
        }
        self.store.save_order(&order).await?;
        result?;

        tracing::info!(
            gateway = self.gateway.name(),
            order_no = %order.order_no,
            charge_id = id,
            event = event.as_str(),
            "notification applied"
        );
        Ok(ProcessOutcome::Applied {
            order_no: order.order_no,
        })
    }

    async fn find_order(&self, event: NotificationEvent, id: &str) -> anyhow::Result<Option<Order>> {
        if event.is_standalone_approval() {
            if let Some(order) = self.store.find_order_by_fraud_id(id).await? {
                return Ok(Some(order));
            }
        }
        self.store.find_order_by_charge_id(id).await
    }

    /// Creates the charge held back while standalone fraud review was pending and persists it
    /// at once, then links the fraud result to it. A failed link is noted; the charge stands.
    async fn create_deferred_charge(&self, order: &mut Order) -> Result<(), GatewayError> {
        let Some(pi) = order.gateway_instrument().cloned() else {
            return Ok(());
        };
        if pi.charge_id.is_some() {
            tracing::debug!(order_no = %order.order_no, "charge already exists, skipping deferred charge");
            return Ok(());
        }

        let request = self.deferred_charge_request(order, &pi);
        let charge = self
            .gateway
            .create_charge(&request, self.settings.charge_capture)
            .await?;
        order.add_note(
            &format!("{} charge succeeded", self.settings.profile.display_name),
            format!("Charge {}", charge.id.as_deref().unwrap_or_default()),
        );
        record_charge(order, &charge, pi.method.display_name());
        if let Err(e) = self.store.save_order(order).await {
            tracing::error!(
                order_no = %order.order_no,
                charge_id = charge.id.as_deref().unwrap_or_default(),
                error = %e,
                "saving deferred charge failed"
            );
        }

        if let (Some(charge_id), Some(fraud_id)) = (&charge.id, &pi.fraud_id) {
            if let Err(e) = self.gateway.attach_fraud(charge_id, fraud_id).await {
                tracing::error!(
                    gateway = self.gateway.name(),
                    order_no = %order.order_no,
                    charge_id = %charge_id,
                    operation = "attach_fraud",
                    error = %e,
                    "attaching fraud result failed"
                );
                order.add_note(TRANSACTION_NOTE, format!("Fraud attach failed.\n{}", e.message));
            }
        }
        Ok(())
    }

    fn deferred_charge_request(&self, order: &Order, pi: &PaymentInstrument) -> ChargeRequest {
        let s = &self.settings;
        let vault_flow = s.three_ds_flow == ThreeDsFlow::Vault;

        let mut request = ChargeRequest::new(order.cart.non_gift_certificate_amount(), order.cart.currency.clone());
        request.reference = Some(order.order_no.clone());
        request.customer_id = pi.customer_id.clone();
        let source = request.customer_mut().payment_source_mut();
        source.gateway_id = Some(s.gateway_id.clone());
        source.vault_token = pi.vault_token.clone();

        match s.three_ds_type {
            ThreeDsType::Inbuilt => {
                request.three_ds = Some(ThreeDsPayload {
                    id: pi.charge_3ds_token.clone(),
                    ..ThreeDsPayload::default()
                });
            }
            ThreeDsType::Standalone if vault_flow => {
                request.three_ds_charge_id = pi.charge_3ds_token.clone();
            }
            _ => {}
        }
        if !vault_flow && s.three_ds_type != ThreeDsType::Inbuilt {
            request.token = pi.token.clone();
        }
        request.with_cart_details(&order.cart)
    }
}

fn is_complete_capture(txn: &ChargeTransaction) -> bool {
    txn.is_complete(TransactionType::Capture) || txn.is_complete(TransactionType::Sale)
}

fn amount_note(verb: &str, data: &NotificationData, txn: &ChargeTransaction, currency: &str) -> String {
    match txn.amount {
        Some(amount) if data.amount != Some(amount) => {
            format!("{verb} {amount} {}", txn.currency.as_deref().unwrap_or(currency))
        }
        _ => verb.to_string(),
    }
}

/// Notes and status changes an event makes to the order after the ledger was applied.
fn apply_order_update(order: &mut Order, event: NotificationEvent, data: &NotificationData) {
    let currency = order.cart.currency.clone();
    match event {
        NotificationEvent::TransactionSuccess => {
            let Some(txn) = data.fired_transaction().filter(|t| is_complete_capture(t)) else {
                return;
            };
            let text = amount_note("Captured", data, txn, &currency);
            order.add_note(TRANSACTION_NOTE, text);
            if let Some(next) = order.gateway_instrument().map(payment_status_after_capture) {
                order.advance_payment_status(next);
            }
            order.captured = true;
        }
        NotificationEvent::TransactionFailure => {
            let authorized = data.fired_transaction().is_some_and(|t| {
                t.kind == Some(TransactionType::Sale) && t.status == Some(TransactionStatus::Pending)
            });
            order.add_note(TRANSACTION_NOTE, if authorized { "Authorized" } else { "Failed" });
        }
        NotificationEvent::RefundSuccess => {
            let Some(txn) = data
                .fired_transaction()
                .filter(|t| t.is_complete(TransactionType::Refund))
            else {
                return;
            };
            let text = amount_note("Refunded", data, txn, &currency);
            order.add_note(TRANSACTION_NOTE, text);
            if let Some(next) = order.gateway_instrument().map(payment_status_after_refund) {
                order.payment_status = next;
            }
            order.refunded = true;
        }
        NotificationEvent::RefundFailure => order.add_note(TRANSACTION_NOTE, "Refund failed"),
        NotificationEvent::RefundRequested => order.add_note(TRANSACTION_NOTE, "Refund requested"),
        fraud => {
            if let Some((text, status)) = fraud.fraud_outcome() {
                order.add_note(FRAUD_NOTE, text);
                if let Some(pi) = order.gateway_instrument_mut() {
                    pi.fraud_status = Some(status);
                }
            }
        }
    }
}
