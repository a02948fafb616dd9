use crate::config::GatewaySettings;
use crate::domain::charge::Charge;
use crate::domain::payment::{Order, OrderPaymentStatus, OrderStatus};
use crate::error::{ChargeOperationError, GatewayError};
use crate::gateways::GatewayApi;
use crate::repo::order_store::OrderStore;
use crate::service::reconciliation::{
    apply_charge_details, is_cancel_eligible, is_capture_eligible, is_refund_eligible,
    max_capture_amount, max_refund_amount, ChargeReconciler,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

const OPERATION_NOTE: &str = "Operation Notification";
pub const CANCEL_DESCRIPTION: &str = "Cancelled due to Payment Cancellation";
const ANY_ORDER_TOKEN: &str = "noToken";

/// Raw admin form values, validated in order by `ChargeOperationsService::handle_admin`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AdminChargeRequest {
    #[serde(rename = "orderID", default)]
    pub order_no: Option<String>,
    #[serde(rename = "orderToken", default)]
    pub order_token: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(rename = "captureAmount", default)]
    pub capture_amount: Option<String>,
    #[serde(rename = "refundAmount", default)]
    pub refund_amount: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOperation {
    Capture(Decimal),
    Refund(Decimal),
    Cancel,
}

#[derive(Clone)]
pub struct ChargeOperationsService {
    pub gateway: Arc<dyn GatewayApi>,
    pub store: Arc<dyn OrderStore>,
    pub settings: Arc<GatewaySettings>,
}

impl ChargeOperationsService {
    fn reconciler(&self) -> ChargeReconciler {
        ChargeReconciler {
            gateway: self.gateway.clone(),
        }
    }

    pub async fn capture_charge(
        &self,
        order: &mut Order,
        charge_id: &str,
        amount: Option<Decimal>,
    ) -> Result<Charge, GatewayError> {
        match self.gateway.capture_charge(charge_id, amount).await {
            Ok(charge) => {
                let text = match amount {
                    Some(amount) => format!(
                        "Capture for {} {} requested. Charge {}",
                        amount, order.cart.currency, charge_id
                    ),
                    None => format!("Capture requested. Charge {charge_id}"),
                };
                order.add_note(OPERATION_NOTE, text);
                Ok(charge)
            }
            Err(e) => {
                self.log_failure("capture_charge", order, charge_id, &e);
                order.add_note(OPERATION_NOTE, format!("Capture failed. \n{}", e.message));
                Err(e)
            }
        }
    }

    pub async fn refund_charge(
        &self,
        order: &mut Order,
        charge_id: &str,
        amount: Option<Decimal>,
    ) -> Result<Charge, GatewayError> {
        match self.gateway.refund_charge(charge_id, amount).await {
            Ok(charge) => {
                let text = match amount {
                    Some(amount) => format!(
                        "Refund for {} {} requested. Charge {}",
                        amount, order.cart.currency, charge_id
                    ),
                    None => format!("Refund requested. Charge {charge_id}"),
                };
                order.add_note(OPERATION_NOTE, text);
                Ok(charge)
            }
            Err(e) => {
                self.log_failure("refund_charge", order, charge_id, &e);
                order.add_note(OPERATION_NOTE, format!("Refund failed. \n{}", e.message));
                Err(e)
            }
        }
    }

    pub async fn cancel_charge(&self, order: &mut Order, charge_id: &str) -> Result<Charge, GatewayError> {
        match self.gateway.cancel_charge(charge_id).await {
            Ok(charge) => {
                order.add_note(OPERATION_NOTE, format!("Cancel requested. Charge {charge_id}"));
                Ok(charge)
            }
            Err(e) => {
                self.log_failure("cancel_charge", order, charge_id, &e);
                order.add_note(OPERATION_NOTE, format!("Cancel failed.\n{}", e.message));
                Err(e)
            }
        }
    }

    pub async fn archive_charge(&self, order: &mut Order, charge_id: &str) -> Result<Charge, GatewayError> {
        match self.gateway.archive_charge(charge_id).await {
            Ok(charge) => Ok(charge),
            Err(e) => {
                self.log_failure("archive_charge", order, charge_id, &e);
                order.add_note(OPERATION_NOTE, format!("Archive failed.\n{}", e.message));
                Err(e)
            }
        }
    }

    /// Captures every gateway charge on the order. Returns how many were captured; the
    /// first failure stops the loop and is returned. The caller persists the order either way.
    pub async fn capture_order_charges(&self, order: &mut Order) -> Result<u32, GatewayError> {
        let targets: Vec<(usize, String)> = charge_targets(order);
        let last = order.instruments.len().saturating_sub(1);
        let mut captured = 0;

        for (idx, charge_id) in targets {
            let charge = self.capture_charge(order, &charge_id, None).await?;
            if let Some(pi) = order.instruments.get_mut(idx) {
                if charge.status.is_some() {
                    pi.charge_status = charge.status;
                }
            }
            if idx == last {
                order.advance_payment_status(OrderPaymentStatus::Paid);
                order.captured = true;
            }
            captured += 1;
        }
        Ok(captured)
    }

    /// Refunds every gateway charge on the order, for `amount` or each instrument's full amount.
    pub async fn refund_order_charges(&self, order: &mut Order, amount: Option<Decimal>) -> Result<u32, GatewayError> {
        let targets: Vec<(usize, String)> = charge_targets(order);
        let last = order.instruments.len().saturating_sub(1);
        let mut refunded = 0;

        for (idx, charge_id) in targets {
            let full = order.instruments.get(idx).map(|pi| pi.amount);
            self.refund_charge(order, &charge_id, amount.or(full)).await?;
            if idx == last {
                order.refunded = true;
            }
            refunded += 1;
        }
        Ok(refunded)
    }

    /// Back-office capture / refund / cancel of an order's gateway charge. Returns the success message.
    pub async fn handle_admin(&self, req: &AdminChargeRequest) -> Result<&'static str, ChargeOperationError> {
        let order_no = non_blank(&req.order_no).ok_or(ChargeOperationError::MissingOrderNumber)?;
        let token = non_blank(&req.order_token).ok_or(ChargeOperationError::MissingOrderToken)?;

        let mut order = self
            .store
            .load_order(order_no)
            .await?
            .filter(|o| token == ANY_ORDER_TOKEN || o.token == token)
            .ok_or_else(|| ChargeOperationError::OrderNotFound(order_no.to_string()))?;

        let operation = parse_operation(req)?;

        let pi = order
            .gateway_instrument()
            .cloned()
            .ok_or(ChargeOperationError::NoGatewayInstrument)?;
        let charge_id = pi.charge_id.clone().ok_or(ChargeOperationError::MissingChargeId)?;

        match operation {
            AdminOperation::Capture(amount) => {
                if !is_capture_eligible(&pi) {
                    return Err(ChargeOperationError::NotEligible("capture"));
                }
                if let Some(max) = max_capture_amount(&pi).filter(|max| amount > *max) {
                    return Err(ChargeOperationError::AmountExceedsMaximum(max));
                }
            }
            AdminOperation::Refund(amount) => {
                if !is_refund_eligible(&pi) {
                    return Err(ChargeOperationError::NotEligible("refund"));
                }
                if let Some(max) = max_refund_amount(&pi).filter(|max| amount > *max) {
                    return Err(ChargeOperationError::AmountExceedsMaximum(max));
                }
            }
            AdminOperation::Cancel => {
                if !is_cancel_eligible(&pi) {
                    return Err(ChargeOperationError::NotEligible("cancel"));
                }
            }
        }

        let result = match operation {
            AdminOperation::Capture(amount) => self.capture_charge(&mut order, &charge_id, Some(amount)).await,
            AdminOperation::Refund(amount) => self.refund_charge(&mut order, &charge_id, Some(amount)).await,
            AdminOperation::Cancel => self.cancel_charge(&mut order, &charge_id).await,
        };

        match result {
            Ok(charge) => {
                if let Some(pi) = order.gateway_instrument_mut() {
                    apply_charge_details(pi, &charge);
                }
                if operation == AdminOperation::Cancel {
                    order.status = OrderStatus::Cancelled;
                    order.cancel_code = Some(self.settings.profile.display_name.to_string());
                    order.cancel_description = Some(CANCEL_DESCRIPTION.to_string());
                }
                self.store.save_order(&order).await?;
                Ok(match operation {
                    AdminOperation::Capture(_) => "Charge capture requested",
                    AdminOperation::Refund(_) => "Charge refund requested",
                    AdminOperation::Cancel => "Charge cancelled",
                })
            }
            Err(e) => {
                if let Some(pi) = order.gateway_instrument_mut() {
                    if let Err(refresh) = self.reconciler().reconcile(pi, None).await {
                        tracing::warn!(
                            gateway = self.gateway.name(),
                            charge_id = %charge_id,
                            error = %refresh,
                            "could not refresh charge after failed operation"
                        );
                    }
                }
                self.store.save_order(&order).await?;
                Err(e.into())
            }
        }
    }

    fn log_failure(&self, operation: &'static str, order: &Order, charge_id: &str, e: &GatewayError) {
        tracing::error!(
            gateway = self.gateway.name(),
            order_no = %order.order_no,
            charge_id,
            operation,
            http_status = ?e.http_status,
            error = %e,
            "charge operation failed"
        );
    }
}

fn charge_targets(order: &Order) -> Vec<(usize, String)> {
    order
        .instruments
        .iter()
        .enumerate()
        .filter_map(|(idx, pi)| pi.transaction_id.clone().map(|id| (idx, id)))
        .collect()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_amount(raw: &Option<String>) -> Result<Decimal, ChargeOperationError> {
    let raw = non_blank(raw).ok_or(ChargeOperationError::MissingAmount)?;
    let amount = Decimal::from_str(raw).map_err(|_| ChargeOperationError::InvalidAmount)?;
    if amount <= Decimal::ZERO {
        return Err(ChargeOperationError::InvalidAmount);
    }
    Ok(amount.round_dp(2))
}

fn parse_operation(req: &AdminChargeRequest) -> Result<AdminOperation, ChargeOperationError> {
    match non_blank(&req.operation).unwrap_or_default() {
        "capture" => parse_amount(&req.capture_amount).map(AdminOperation::Capture),
        "refund" => parse_amount(&req.refund_amount).map(AdminOperation::Refund),
        "cancel" => Ok(AdminOperation::Cancel),
        other => Err(ChargeOperationError::UnknownOperation(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(operation: &str, capture: Option<&str>, refund: Option<&str>) -> AdminChargeRequest {
        AdminChargeRequest {
            order_no: Some("00001".to_string()),
            order_token: Some("noToken".to_string()),
            operation: Some(operation.to_string()),
            capture_amount: capture.map(str::to_string),
            refund_amount: refund.map(str::to_string),
        }
    }

    #[test]
    fn capture_and_refund_need_their_own_amount() {
        assert!(matches!(
            parse_operation(&req("capture", None, Some("5"))),
            Err(ChargeOperationError::MissingAmount)
        ));
        assert_eq!(
            parse_operation(&req("refund", None, Some("12.345"))).ok(),
            Some(AdminOperation::Refund(Decimal::new(1234, 2)))
        );
        assert!(matches!(
            parse_operation(&req("capture", Some("-1"), None)),
            Err(ChargeOperationError::InvalidAmount)
        ));
        assert_eq!(parse_operation(&req("cancel", None, None)).ok(), Some(AdminOperation::Cancel));
        assert!(matches!(
            parse_operation(&req("void", None, None)),
            Err(ChargeOperationError::UnknownOperation(_))
        ));
    }
}
