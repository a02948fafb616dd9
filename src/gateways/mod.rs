use crate::domain::charge::{
    Charge, GatewayCustomer, NotificationSubscription, VaultedSource, WalletChargeSession,
};
use crate::domain::payment::{Cart, VaultType};
use crate::error::GatewayError;
use rust_decimal::Decimal;
use serde::Serialize;

pub mod client;
pub mod mock;
pub mod retry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultRequest {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_type: Option<VaultType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentSourcePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomerPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_source: Option<PaymentSourcePayload>,
}

impl CustomerPayload {
    pub fn payment_source_mut(&mut self) -> &mut PaymentSourcePayload {
        self.payment_source.get_or_insert_with(PaymentSourcePayload::default)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContactPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ShippingPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemPayload {
    pub name: String,
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_uri: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreeDsAuthentication {
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThreeDsPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ThreeDsAuthentication>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FraudPayload {
    pub service_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletMeta {
    pub store_id: String,
    pub store_name: String,
    pub success_url: String,
    pub error_url: String,
}

/// Body shared by charge create, fraud check, 3DS pre-auth/standalone and wallet charge calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChargeRequest {
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemPayload>>,
    #[serde(rename = "_3ds", skip_serializing_if = "Option::is_none")]
    pub three_ds: Option<ThreeDsPayload>,
    #[serde(rename = "_3ds_charge_id", skip_serializing_if = "Option::is_none")]
    pub three_ds_charge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud: Option<FraudPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<WalletMeta>,
}

impl ChargeRequest {
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount: Some(amount),
            currency: Some(currency.into()),
            ..Self::default()
        }
    }

    pub fn customer_mut(&mut self) -> &mut CustomerPayload {
        self.customer.get_or_insert_with(CustomerPayload::default)
    }

    /// Shopper email, billing name/phone and billing address on `customer.payment_source`.
    pub fn with_customer_details(mut self, cart: &Cart) -> Self {
        let email = cart.customer_email.clone().filter(|s| !s.is_empty());
        let billing = cart.billing_address.clone();
        let customer = self.customer_mut();
        if email.is_some() {
            customer.email = email;
        }
        if let Some(billing) = billing {
            set_if_present(&mut customer.first_name, billing.first_name);
            set_if_present(&mut customer.last_name, billing.last_name);
            set_if_present(&mut customer.phone, billing.phone);

            let source = customer.payment_source_mut();
            set_if_present(&mut source.address_line1, billing.address1);
            set_if_present(&mut source.address_line2, billing.address2);
            set_if_present(&mut source.address_city, billing.city);
            set_if_present(&mut source.address_state, billing.state_code);
            set_if_present(&mut source.address_postcode, billing.postal_code);
            set_if_present(&mut source.address_country, billing.country_code);
        }
        self
    }

    pub fn with_shipping_details(mut self, cart: &Cart) -> Self {
        let shipment = &cart.shipment;
        let mut shipping = self.shipping.take().unwrap_or_default();

        if let Some(address) = shipment.address.clone() {
            set_if_present(&mut shipping.address_line1, address.address1);
            set_if_present(&mut shipping.address_line2, address.address2);
            set_if_present(&mut shipping.address_state, address.state_code);
            set_if_present(&mut shipping.address_country, address.country_code);
            set_if_present(&mut shipping.address_city, address.city);
            set_if_present(&mut shipping.address_postcode, address.postal_code);

            let contact = ContactPayload {
                first_name: non_empty(address.first_name),
                last_name: non_empty(address.last_name),
                phone: non_empty(address.phone),
            };
            if contact != ContactPayload::default() {
                shipping.contact = Some(contact);
            }
        }

        if shipment.has_shipping_method {
            if let Some(total) = shipment.shipping_total {
                shipping.method = Some(if shipment.store_pickup { "PICKUP" } else { "GROUND" }.to_string());
                shipping.currency = Some(cart.currency.clone());
                shipping.amount = Some(total);
            }
        }

        self.shipping = Some(shipping);
        self
    }

    /// Appends line items. A single incomplete line item empties the whole list.
    pub fn with_line_items(mut self, cart: &Cart) -> Self {
        let mut items = self.items.take().unwrap_or_default();
        for line in &cart.shipment.line_items {
            match (&line.name, line.quantity, line.adjusted_price, line.is_complete()) {
                (Some(name), Some(quantity), Some(amount), true) => items.push(ItemPayload {
                    name: name.clone(),
                    quantity,
                    item_uri: line.product_url.clone(),
                    amount,
                    image_uri: line.image_url.clone(),
                    kind: line.brand.clone(),
                }),
                _ => {
                    items.clear();
                    break;
                }
            }
        }
        self.items = Some(items);
        self
    }

    pub fn with_cart_details(self, cart: &Cart) -> Self {
        self.with_customer_details(cart)
            .with_shipping_details(cart)
            .with_line_items(cart)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn set_if_present(slot: &mut Option<String>, value: Option<String>) {
    if let Some(v) = non_empty(value) {
        *slot = Some(v);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub payment_source: PaymentSourcePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationQuery {
    #[serde(rename = "type")]
    pub kind: String,
    pub skip: u32,
    pub limit: u32,
    pub sortkey: String,
    pub sortdirection: String,
}

impl NotificationQuery {
    pub fn all_webhooks() -> Self {
        Self {
            kind: "webhook".to_string(),
            skip: 0,
            limit: 1000,
            sortkey: "created_at".to_string(),
            sortdirection: "DESC".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationSubscriptionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub destination: String,
    pub event: String,
    pub transaction_only: bool,
}

#[async_trait::async_trait]
pub trait GatewayApi: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_vault(&self, request: &VaultRequest) -> Result<VaultedSource, GatewayError>;

    async fn create_customer(&self, request: &CustomerRequest) -> Result<GatewayCustomer, GatewayError>;

    async fn create_charge(&self, request: &ChargeRequest, capture: bool) -> Result<Charge, GatewayError>;

    async fn get_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;

    async fn capture_charge(&self, charge_id: &str, amount: Option<Decimal>) -> Result<Charge, GatewayError>;

    async fn refund_charge(&self, charge_id: &str, amount: Option<Decimal>) -> Result<Charge, GatewayError>;

    async fn cancel_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;

    async fn archive_charge(&self, charge_id: &str) -> Result<Charge, GatewayError>;

    async fn fraud_check(&self, request: &ChargeRequest) -> Result<Charge, GatewayError>;

    async fn attach_fraud(&self, charge_id: &str, fraud_charge_id: &str) -> Result<Charge, GatewayError>;

    async fn wallet_charge(
        &self,
        request: &ChargeRequest,
        capture: bool,
    ) -> Result<WalletChargeSession, GatewayError>;

    async fn pre_auth_3ds(&self, request: &ChargeRequest) -> Result<Charge, GatewayError>;

    async fn standalone_3ds(&self, request: &ChargeRequest) -> Result<Charge, GatewayError>;

    async fn search_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<NotificationSubscription>, GatewayError>;

    async fn create_notification(
        &self,
        request: &NotificationSubscriptionRequest,
    ) -> Result<NotificationSubscription, GatewayError>;

    async fn delete_notification(&self, notification_id: &str) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{Address, LineItem, Shipment};

    fn cart() -> Cart {
        Cart {
            currency: "AUD".to_string(),
            customer_email: Some("jo@example.com".to_string()),
            billing_address: Some(Address {
                first_name: Some("Jo".to_string()),
                last_name: Some("Bloggs".to_string()),
                address1: Some("1 George St".to_string()),
                city: Some("Sydney".to_string()),
                country_code: Some("AU".to_string()),
                ..Address::default()
            }),
            shipment: Shipment {
                address: Some(Address {
                    first_name: Some("Jo".to_string()),
                    address1: Some("2 Pitt St".to_string()),
                    ..Address::default()
                }),
                store_pickup: false,
                has_shipping_method: true,
                shipping_total: Some(Decimal::new(995, 2)),
                line_items: vec![LineItem {
                    product_id: Some("p1".to_string()),
                    name: Some("Mug".to_string()),
                    quantity: Some(2),
                    adjusted_price: Some(Decimal::new(2000, 2)),
                    brand: Some("Acme".to_string()),
                    ..LineItem::default()
                }],
            },
            ..Cart::default()
        }
    }

    #[test]
    fn cart_details_serialize_with_gateway_field_names() {
        let mut req = ChargeRequest::new(Decimal::new(4995, 2), "AUD").with_cart_details(&cart());
        req.three_ds_charge_id = Some("3ds_1".to_string());
        let v = serde_json::to_value(&req).expect("json");

        assert_eq!(v["amount"], serde_json::json!(49.95));
        assert_eq!(v["customer"]["email"], "jo@example.com");
        assert_eq!(v["customer"]["payment_source"]["address_city"], "Sydney");
        assert_eq!(v["shipping"]["method"], "GROUND");
        assert_eq!(v["shipping"]["contact"]["first_name"], "Jo");
        assert_eq!(v["items"][0]["type"], "Acme");
        assert_eq!(v["_3ds_charge_id"], "3ds_1");
        assert!(v.get("token").is_none());
    }

    #[test]
    fn damaged_line_item_empties_items() {
        let mut c = cart();
        c.shipment.line_items.push(LineItem {
            name: Some("Broken".to_string()),
            ..LineItem::default()
        });
        let req = ChargeRequest::default().with_line_items(&c);
        assert_eq!(req.items, Some(vec![]));
    }
}
