#![allow(dead_code)]

use chrono::{DateTime, Utc};
use gateway_checkout::config::{ButtonConfig, GatewayProfile, GatewaySettings};
use gateway_checkout::domain::payment::{
    Address, Basket, Cart, CartTotals, ChargeStatus, CustomerRef, Order, OrderStatus,
    PaymentInstrument, PaymentMethod, RegisteredCustomer,
};
use gateway_checkout::gateways::mock::MockGateway;
use gateway_checkout::repo::memory_store::MemoryOrderStore;
use gateway_checkout::repo::order_store::{order_from_basket, OrderStore};
use rust_decimal::Decimal;
use std::sync::Arc;

pub fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn settings() -> GatewaySettings {
    let mut s = GatewaySettings::sandbox(GatewayProfile::POWERBOARD);
    s.gateway_id = "gw_card".to_string();
    s.notification_url = "https://shop.example.com/notifications".to_string();
    s.apple_pay = ButtonConfig {
        gateway_id: "gw_apple".to_string(),
        charge_capture: true,
        fraud_enabled: false,
        fraud_service_id: None,
    };
    s.afterpay_checkout = ButtonConfig {
        gateway_id: "gw_afterpay".to_string(),
        charge_capture: true,
        fraud_enabled: false,
        fraud_service_id: None,
    };
    s
}

pub fn cart(total_cents: i64) -> Cart {
    Cart {
        currency: "AUD".to_string(),
        customer_email: Some("shopper@example.com".to_string()),
        billing_address: Some(Address {
            first_name: Some("Jo".to_string()),
            last_name: Some("Citizen".to_string()),
            phone: Some("+61400000000".to_string()),
            address1: Some("1 George St".to_string()),
            city: Some("Sydney".to_string()),
            state_code: Some("NSW".to_string()),
            postal_code: Some("2000".to_string()),
            country_code: Some("AU".to_string()),
            ..Address::default()
        }),
        totals: CartTotals {
            gross_total: money(total_cents),
            ..CartTotals::default()
        },
        ..Cart::default()
    }
}

pub fn shopper() -> RegisteredCustomer {
    RegisteredCustomer {
        customer_no: "C0001".to_string(),
        first_name: Some("Jo".to_string()),
        last_name: Some("Citizen".to_string()),
        email: Some("shopper@example.com".to_string()),
    }
}

pub fn basket(id: &str, customer: CustomerRef, total_cents: i64) -> Basket {
    Basket {
        id: id.to_string(),
        customer,
        cart: cart(total_cents),
        instruments: Vec::new(),
    }
}

/// A confirmed order whose card charge was authorized for `amount_cents`.
pub fn charged_order(order_no: &str, charge_id: &str, amount_cents: i64, status: ChargeStatus) -> Order {
    let mut pi = PaymentInstrument::new(PaymentMethod::DirectCard, money(amount_cents), "AUD");
    pi.charge_id = Some(charge_id.to_string());
    pi.transaction_id = Some(charge_id.to_string());
    pi.charge_status = Some(status);
    let mut b = basket("b-fixture", CustomerRef::Guest, amount_cents);
    b.instruments.push(pi);
    let mut order = order_from_basket(&b, order_no, Utc::now());
    order.status = OrderStatus::New;
    order.confirmed = true;
    order
}

pub fn aged(mut order: Order, created_at: DateTime<Utc>) -> Order {
    order.created_at = created_at;
    order
}

pub struct Harness {
    pub gateway: Arc<MockGateway>,
    pub store: Arc<MemoryOrderStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            gateway: Arc::new(MockGateway::new()),
            store: Arc::new(MemoryOrderStore::new()),
        }
    }

    pub async fn order(&self, order_no: &str) -> Order {
        self.store
            .load_order(order_no)
            .await
            .unwrap()
            .expect("order exists")
    }
}
