use crate::domain::charge::{Charge, ChargeTransaction, TransactionType};
use crate::domain::payment::{ChargeStatus, FraudStatus, OrderPaymentStatus, PaymentInstrument};
use crate::error::GatewayError;
use crate::gateways::GatewayApi;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub captured: Decimal,
    pub refunded: Decimal,
}

/// Sums completed entries of a charge ledger. Completed captures win over completed sales;
/// sales only count when no capture has completed yet.
pub fn aggregate_ledger(transactions: &[ChargeTransaction]) -> LedgerTotals {
    let mut sold = Decimal::ZERO;
    let mut captured = Decimal::ZERO;
    let mut refunded = Decimal::ZERO;

    for txn in transactions {
        let Some(amount) = txn.amount else { continue };
        if txn.is_complete(TransactionType::Sale) {
            sold += amount;
        } else if txn.is_complete(TransactionType::Capture) {
            captured += amount;
        } else if txn.is_complete(TransactionType::Refund) {
            refunded += amount;
        }
    }

    LedgerTotals {
        captured: if captured.is_zero() { sold } else { captured }.round_dp(2),
        refunded: refunded.round_dp(2),
    }
}

/// Writes a charge snapshot onto the instrument. Captured and refunded amounts take the
/// larger of what is stored and what the ledger sums to, so a partial or older snapshot
/// never lowers them; the instrument is only a pure function of the ledger when the
/// ledger is complete.
pub fn apply_charge(instrument: &mut PaymentInstrument, status: Option<ChargeStatus>, totals: LedgerTotals) {
    if status.is_some() {
        instrument.charge_status = status;
    }
    instrument.captured_amount = instrument.captured_amount.max(totals.captured);
    instrument.refunded_amount = instrument.refunded_amount.max(totals.refunded);
}

pub fn apply_charge_details(instrument: &mut PaymentInstrument, charge: &Charge) {
    apply_charge(instrument, charge.status, aggregate_ledger(&charge.transactions));
}

pub fn is_capture_eligible(pi: &PaymentInstrument) -> bool {
    pi.charge_status == Some(ChargeStatus::Pending)
}

pub fn max_capture_amount(pi: &PaymentInstrument) -> Option<Decimal> {
    if !is_capture_eligible(pi) {
        return None;
    }
    Some((pi.amount - pi.captured_amount).max(Decimal::ZERO).round_dp(2))
}

pub fn is_refund_eligible(pi: &PaymentInstrument) -> bool {
    match pi.charge_status {
        Some(ChargeStatus::Complete) => true,
        Some(ChargeStatus::Refunded) => {
            if pi.captured_amount.is_zero() {
                pi.refunded_amount < pi.amount
            } else {
                pi.refunded_amount < pi.captured_amount
            }
        }
        _ => false,
    }
}

pub fn max_refund_amount(pi: &PaymentInstrument) -> Option<Decimal> {
    if !is_refund_eligible(pi) {
        return None;
    }
    Some((pi.captured_amount - pi.refunded_amount).max(Decimal::ZERO).round_dp(2))
}

/// Partial captures can only be refunded, not cancelled.
pub fn is_cancel_eligible(pi: &PaymentInstrument) -> bool {
    match pi.charge_status {
        Some(ChargeStatus::Pending) => true,
        Some(ChargeStatus::Complete) => pi.captured_amount == pi.amount,
        _ => false,
    }
}

pub fn is_under_processing(pi: &PaymentInstrument) -> bool {
    matches!(
        pi.charge_status,
        Some(ChargeStatus::Inreview) | Some(ChargeStatus::PreAuthenticationPending)
    ) || pi.fraud_status == Some(FraudStatus::Inreview)
}

pub fn payment_status_after_capture(pi: &PaymentInstrument) -> OrderPaymentStatus {
    if pi.captured_amount == pi.amount {
        OrderPaymentStatus::Paid
    } else {
        OrderPaymentStatus::PartPaid
    }
}

pub fn payment_status_after_refund(pi: &PaymentInstrument) -> OrderPaymentStatus {
    if pi.refunded_amount >= pi.captured_amount {
        OrderPaymentStatus::NotPaid
    } else {
        OrderPaymentStatus::PartPaid
    }
}

#[derive(Clone)]
pub struct ChargeReconciler {
    pub gateway: Arc<dyn GatewayApi>,
}

impl ChargeReconciler {
    /// Refreshes the instrument from `charge`, or from the gateway when no snapshot is given.
    pub async fn reconcile(
        &self,
        instrument: &mut PaymentInstrument,
        charge: Option<&Charge>,
    ) -> Result<(), GatewayError> {
        match charge {
            Some(charge) => apply_charge_details(instrument, charge),
            None => {
                let Some(charge_id) = instrument.charge_id.clone() else {
                    tracing::debug!(instrument = %instrument.id, "no charge to reconcile");
                    return Ok(());
                };
                let fetched = self.gateway.get_charge(&charge_id).await?;
                apply_charge_details(instrument, &fetched);
                tracing::debug!(
                    gateway = self.gateway.name(),
                    charge_id = %charge_id,
                    captured = %instrument.captured_amount,
                    refunded = %instrument.refunded_amount,
                    "charge reconciled"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charge::TransactionStatus;
    use crate::domain::payment::PaymentMethod;

    fn txn(kind: TransactionType, status: TransactionStatus, amount: i64) -> ChargeTransaction {
        ChargeTransaction {
            kind: Some(kind),
            status: Some(status),
            amount: Some(Decimal::new(amount, 2)),
            currency: Some("AUD".to_string()),
        }
    }

    fn instrument(amount: i64) -> PaymentInstrument {
        PaymentInstrument::new(PaymentMethod::DirectCard, Decimal::new(amount, 2), "AUD")
    }

    #[test]
    fn captures_take_precedence_over_sales() {
        let totals = aggregate_ledger(&[
            txn(TransactionType::Sale, TransactionStatus::Complete, 10000),
            txn(TransactionType::Capture, TransactionStatus::Complete, 4000),
            txn(TransactionType::Capture, TransactionStatus::Pending, 6000),
            txn(TransactionType::Refund, TransactionStatus::Complete, 1000),
        ]);
        assert_eq!(totals.captured, Decimal::new(4000, 2));
        assert_eq!(totals.refunded, Decimal::new(1000, 2));
    }

    #[test]
    fn sales_count_when_nothing_captured() {
        let totals = aggregate_ledger(&[txn(TransactionType::Sale, TransactionStatus::Complete, 2599)]);
        assert_eq!(totals.captured, Decimal::new(2599, 2));
        assert_eq!(totals.refunded, Decimal::ZERO);
    }

    #[test]
    fn cancel_requires_full_capture() {
        let mut pi = instrument(10000);
        pi.charge_status = Some(ChargeStatus::Complete);
        pi.captured_amount = Decimal::new(5000, 2);
        assert!(!is_cancel_eligible(&pi));
        pi.captured_amount = Decimal::new(10000, 2);
        assert!(is_cancel_eligible(&pi));
        pi.charge_status = Some(ChargeStatus::Pending);
        assert!(is_cancel_eligible(&pi));
    }

    #[test]
    fn ceilings_follow_eligibility() {
        let mut pi = instrument(10000);
        pi.charge_status = Some(ChargeStatus::Pending);
        pi.captured_amount = Decimal::new(2500, 2);
        assert_eq!(max_capture_amount(&pi), Some(Decimal::new(7500, 2)));
        assert_eq!(max_refund_amount(&pi), None);

        pi.charge_status = Some(ChargeStatus::Complete);
        pi.refunded_amount = Decimal::new(500, 2);
        assert_eq!(max_capture_amount(&pi), None);
        assert_eq!(max_refund_amount(&pi), Some(Decimal::new(2000, 2)));
    }

    #[test]
    fn refunded_without_capture_compares_to_authorized_amount() {
        let mut pi = instrument(10000);
        pi.charge_status = Some(ChargeStatus::Refunded);
        pi.refunded_amount = Decimal::new(4000, 2);
        assert!(is_refund_eligible(&pi));
        pi.refunded_amount = Decimal::new(10000, 2);
        assert!(!is_refund_eligible(&pi));
    }

    #[test]
    fn fraud_review_counts_as_processing() {
        let mut pi = instrument(100);
        assert!(!is_under_processing(&pi));
        pi.fraud_status = Some(FraudStatus::Inreview);
        assert!(is_under_processing(&pi));
        pi.fraud_status = None;
        pi.charge_status = Some(ChargeStatus::PreAuthenticationPending);
        assert!(is_under_processing(&pi));
    }
}
