use crate::domain::payment::{Basket, Order, PaymentInstrument, WalletCard};
use crate::repo::order_store::{merge_saved_order, order_from_basket, OrderStore, SweepCriteria};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    baskets: HashMap<String, Basket>,
    orders: HashMap<String, Order>,
    wallet_cards: Vec<WalletCard>,
}

/// `OrderStore` kept in process memory. Each call holds the write lock for its whole
/// mutation, so writes are atomic with respect to one another.
#[derive(Default)]
pub struct MemoryOrderStore {
    state: RwLock<State>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: Order) {
        self.state
            .write()
            .await
            .orders
            .insert(order.order_no.clone(), order);
    }
}

#[async_trait::async_trait]
impl OrderStore for MemoryOrderStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn save_basket(&self, basket: &Basket) -> Result<()> {
        self.state
            .write()
            .await
            .baskets
            .insert(basket.id.clone(), basket.clone());
        Ok(())
    }

    async fn load_basket(&self, basket_id: &str) -> Result<Option<Basket>> {
        Ok(self.state.read().await.baskets.get(basket_id).cloned())
    }

    async fn replace_gateway_instrument(&self, basket_id: &str, instrument: PaymentInstrument) -> Result<()> {
        let mut state = self.state.write().await;
        let basket = state
            .baskets
            .get_mut(basket_id)
            .ok_or_else(|| anyhow!("basket {basket_id} not found"))?;
        basket.instruments.clear();
        basket.instruments.push(instrument);
        Ok(())
    }

    async fn place_order(&self, basket_id: &str, order_no: &str) -> Result<Order> {
        let mut state = self.state.write().await;
        let basket = state
            .baskets
            .remove(basket_id)
            .ok_or_else(|| anyhow!("basket {basket_id} not found"))?;
        let order = order_from_basket(&basket, order_no, chrono::Utc::now());
        state.orders.insert(order.order_no.clone(), order.clone());
        Ok(order)
    }

    async fn load_order(&self, order_no: &str) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(order_no).cloned())
    }

    async fn find_order_by_charge_id(&self, charge_id: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.charge_id.as_deref() == Some(charge_id))
            .cloned())
    }

    async fn find_order_by_fraud_id(&self, fraud_id: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .find(|o| o.fraud_id.as_deref() == Some(fraud_id))
            .cloned())
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order.order_no)
            .ok_or_else(|| anyhow!("order {} not found", order.order_no))?;
        *stored = merge_saved_order(stored, order);
        Ok(())
    }

    async fn sweep_candidates(&self, criteria: &SweepCriteria) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let mut matching: Vec<&Order> = state.orders.values().filter(|o| criteria.matches(o)).collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.order_no.cmp(&b.order_no)));
        Ok(matching.into_iter().map(|o| o.order_no.clone()).collect())
    }

    async fn wallet_cards(&self, customer_no: &str) -> Result<Vec<WalletCard>> {
        Ok(self
            .state
            .read()
            .await
            .wallet_cards
            .iter()
            .filter(|c| c.customer_no == customer_no)
            .cloned()
            .collect())
    }

    async fn save_wallet_card(&self, card: WalletCard) -> Result<()> {
        let mut state = self.state.write().await;
        if card.card_details.is_some() {
            state.wallet_cards.retain(|c| {
                !(c.customer_no == card.customer_no && c.card_details == card.card_details)
            });
        }
        state.wallet_cards.push(card);
        Ok(())
    }

    async fn attach_customer_to_wallet_card(
        &self,
        customer_no: &str,
        vault_token: &str,
        customer_id: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state
            .wallet_cards
            .iter_mut()
            .find(|c| c.customer_no == customer_no && c.vault_token == vault_token)
        {
            Some(card) => {
                card.customer_id = Some(customer_id.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
