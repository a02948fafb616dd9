use gateway_checkout::domain::charge::{ChargeTransaction, TransactionStatus, TransactionType};
use gateway_checkout::domain::payment::{ChargeStatus, PaymentInstrument, PaymentMethod};
use gateway_checkout::service::reconciliation::{
    aggregate_ledger, apply_charge, is_refund_eligible, max_refund_amount, LedgerTotals,
};
use rust_decimal::Decimal;

fn txn(kind: TransactionType, status: TransactionStatus, cents: i64) -> ChargeTransaction {
    ChargeTransaction {
        kind: Some(kind),
        status: Some(status),
        amount: Some(Decimal::new(cents, 2)),
        currency: Some("AUD".to_string()),
    }
}

fn ledger() -> Vec<ChargeTransaction> {
    vec![
        txn(TransactionType::Sale, TransactionStatus::Complete, 10000),
        txn(TransactionType::Capture, TransactionStatus::Complete, 3333),
        txn(TransactionType::Capture, TransactionStatus::Complete, 3333),
        txn(TransactionType::Capture, TransactionStatus::Failed, 3334),
        txn(TransactionType::Refund, TransactionStatus::Complete, 1001),
        txn(TransactionType::Refund, TransactionStatus::Pending, 500),
    ]
}

#[test]
fn applying_the_same_ledger_twice_changes_nothing() {
    let mut pi = PaymentInstrument::new(PaymentMethod::DirectCard, Decimal::new(10000, 2), "AUD");
    let totals = aggregate_ledger(&ledger());
    apply_charge(&mut pi, Some(ChargeStatus::Complete), totals);
    let once = pi.clone();
    apply_charge(&mut pi, Some(ChargeStatus::Complete), totals);

    assert_eq!(pi, once);
    assert_eq!(pi.captured_amount, Decimal::new(6666, 2));
    assert_eq!(pi.refunded_amount, Decimal::new(1001, 2));
}

#[test]
fn ledger_order_does_not_matter() {
    let base = ledger();
    let expected = aggregate_ledger(&base);
    for shift in 0..base.len() {
        let mut rotated = base.clone();
        rotated.rotate_left(shift);
        assert_eq!(aggregate_ledger(&rotated), expected);
        rotated.reverse();
        assert_eq!(aggregate_ledger(&rotated), expected);
    }
}

#[test]
fn partial_snapshot_never_lowers_totals() {
    let mut pi = PaymentInstrument::new(PaymentMethod::DirectCard, Decimal::new(10000, 2), "AUD");
    apply_charge(&mut pi, None, aggregate_ledger(&ledger()));
    apply_charge(&mut pi, None, LedgerTotals::default());
    assert_eq!(pi.captured_amount, Decimal::new(6666, 2));
}

#[test]
fn refund_boundary() {
    let mut pi = PaymentInstrument::new(PaymentMethod::DirectCard, Decimal::new(10000, 2), "AUD");
    pi.charge_status = Some(ChargeStatus::Refunded);
    pi.captured_amount = Decimal::new(10000, 2);

    pi.refunded_amount = Decimal::new(10000, 2);
    assert!(!is_refund_eligible(&pi));

    pi.refunded_amount = Decimal::new(9999, 2);
    assert!(is_refund_eligible(&pi));
    assert_eq!(max_refund_amount(&pi), Some(Decimal::new(1, 2)));
}
