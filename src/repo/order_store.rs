use crate::domain::payment::{
    Basket, Order, OrderPaymentStatus, OrderStatus, PaymentInstrument, WalletCard,
};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Which orders a batch job should revisit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepCriteria {
    /// Live, confirmed, unpaid orders that were neither captured nor refunded.
    Capture { created_since: DateTime<Utc> },
    /// Cancelled or failed orders that were not refunded.
    Refund { created_since: DateTime<Utc> },
}

impl SweepCriteria {
    pub fn matches(&self, order: &Order) -> bool {
        match self {
            SweepCriteria::Capture { created_since } => {
                !matches!(order.status, OrderStatus::Cancelled | OrderStatus::Failed)
                    && order.payment_status != OrderPaymentStatus::Paid
                    && order.confirmed
                    && order.created_at >= *created_since
                    && !order.captured
                    && !order.refunded
            }
            SweepCriteria::Refund { created_since } => {
                matches!(order.status, OrderStatus::Cancelled | OrderStatus::Failed)
                    && order.created_at >= *created_since
                    && !order.refunded
            }
        }
    }
}

/// Persistence boundary for baskets, orders, their gateway instruments and wallet cards.
/// Every write method is atomic.
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> Result<()>;

    async fn save_basket(&self, basket: &Basket) -> Result<()>;

    async fn load_basket(&self, basket_id: &str) -> Result<Option<Basket>>;

    /// Removes every gateway instrument on the basket and attaches `instrument` in its place.
    async fn replace_gateway_instrument(&self, basket_id: &str, instrument: PaymentInstrument) -> Result<()>;

    /// Turns a basket into an order, carrying its gateway instrument over.
    async fn place_order(&self, basket_id: &str, order_no: &str) -> Result<Order>;

    async fn load_order(&self, order_no: &str) -> Result<Option<Order>>;

    async fn find_order_by_charge_id(&self, charge_id: &str) -> Result<Option<Order>>;

    async fn find_order_by_fraud_id(&self, fraud_id: &str) -> Result<Option<Order>>;

    /// Writes order fields, instruments and any new notes in one unit, merged over the stored
    /// record the way `merge_saved_order` does.
    async fn save_order(&self, order: &Order) -> Result<()>;

    /// Order numbers matching `criteria`, oldest first.
    async fn sweep_candidates(&self, criteria: &SweepCriteria) -> Result<Vec<String>>;

    async fn wallet_cards(&self, customer_no: &str) -> Result<Vec<WalletCard>>;

    /// Stores `card`, replacing a saved card with the same fingerprint.
    async fn save_wallet_card(&self, card: WalletCard) -> Result<()>;

    /// Returns whether a wallet card with `vault_token` was found and updated.
    async fn attach_customer_to_wallet_card(
        &self,
        customer_no: &str,
        vault_token: &str,
        customer_id: &str,
    ) -> Result<bool>;
}

/// What a save leaves behind when `incoming` was loaded before `stored` was last written.
/// Notes are appended by id, captured and refunded totals and flags never go back.
pub fn merge_saved_order(stored: &Order, incoming: &Order) -> Order {
    let mut merged = incoming.clone();
    merged.captured |= stored.captured;
    merged.refunded |= stored.refunded;

    for pi in &mut merged.instruments {
        if let Some(prev) = stored.instruments.iter().find(|p| p.id == pi.id) {
            pi.captured_amount = pi.captured_amount.max(prev.captured_amount);
            pi.refunded_amount = pi.refunded_amount.max(prev.refunded_amount);
        }
    }

    let mut notes = stored.notes.clone();
    notes.extend(
        incoming
            .notes
            .iter()
            .filter(|n| !stored.notes.iter().any(|s| s.id == n.id))
            .cloned(),
    );
    merged.notes = notes;
    merged
}

/// Builds the order record for a basket at placement time.
pub fn order_from_basket(basket: &Basket, order_no: &str, now: DateTime<Utc>) -> Order {
    let instrument = basket.gateway_instrument();
    Order {
        order_no: order_no.to_string(),
        token: uuid::Uuid::new_v4().simple().to_string(),
        customer: basket.customer.clone(),
        cart: basket.cart.clone(),
        status: OrderStatus::Created,
        confirmed: false,
        payment_status: OrderPaymentStatus::NotPaid,
        created_at: now,
        charge_id: instrument.and_then(|i| i.charge_id.clone()),
        fraud_id: instrument.and_then(|i| i.fraud_id.clone()),
        captured: false,
        refunded: false,
        payment_method_name: None,
        cancel_code: None,
        cancel_description: None,
        instruments: basket.instruments.clone(),
        notes: Vec::new(),
    }
}
