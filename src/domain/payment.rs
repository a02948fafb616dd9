use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalletKind {
    ApplePay,
    GooglePay,
    PayPal,
    Afterpay,
}

impl WalletKind {
    fn code(&self) -> &'static str {
        match self {
            WalletKind::ApplePay => "APPLE_PAY",
            WalletKind::GooglePay => "GOOGLE_PAY",
            WalletKind::PayPal => "PAYPAL",
            WalletKind::Afterpay => "AFTERPAY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WalletKind::ApplePay => "Apple Pay",
            WalletKind::GooglePay => "Google Pay",
            WalletKind::PayPal => "PayPal",
            WalletKind::Afterpay => "Afterpay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckoutButtonKind {
    Afterpay,
    ZipMoney,
}

impl CheckoutButtonKind {
    fn code(&self) -> &'static str {
        match self {
            CheckoutButtonKind::Afterpay => "AFTERPAY",
            CheckoutButtonKind::ZipMoney => "ZIPMONEY",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CheckoutButtonKind::Afterpay => "Afterpay",
            CheckoutButtonKind::ZipMoney => "Zip",
        }
    }
}

/// Every gateway-backed payment method the checkout knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    DirectCard,
    WalletButton(WalletKind),
    CheckoutButton(CheckoutButtonKind),
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 7] = [
        PaymentMethod::DirectCard,
        PaymentMethod::WalletButton(WalletKind::ApplePay),
        PaymentMethod::WalletButton(WalletKind::GooglePay),
        PaymentMethod::WalletButton(WalletKind::PayPal),
        PaymentMethod::WalletButton(WalletKind::Afterpay),
        PaymentMethod::CheckoutButton(CheckoutButtonKind::Afterpay),
        PaymentMethod::CheckoutButton(CheckoutButtonKind::ZipMoney),
    ];

    /// Brand-independent storage code, e.g. `WALLET_BUTTONS_PAYPAL`.
    pub fn code(&self) -> String {
        match self {
            PaymentMethod::DirectCard => "DIRECT_CARD".to_string(),
            PaymentMethod::WalletButton(kind) => format!("WALLET_BUTTONS_{}", kind.code()),
            PaymentMethod::CheckoutButton(kind) => format!("CHECKOUT_BUTTON_{}", kind.code()),
        }
    }

    /// Storefront payment method id for a brand, e.g. `POWERBOARD_CHECKOUT_BUTTON_ZIPMONEY`.
    pub fn method_id(&self, prefix: &str) -> String {
        match self {
            PaymentMethod::DirectCard => prefix.to_string(),
            other => format!("{}_{}", prefix, other.code()),
        }
    }

    pub fn from_method_id(id: &str, prefix: &str) -> Option<PaymentMethod> {
        Self::ALL.into_iter().find(|m| m.method_id(prefix) == id)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::DirectCard => "Credit Card",
            PaymentMethod::WalletButton(kind) => kind.display_name(),
            PaymentMethod::CheckoutButton(kind) => kind.display_name(),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.code() == s)
            .ok_or_else(|| format!("unknown payment method code: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Complete,
    Failed,
    Refunded,
    Inreview,
    PreAuthenticationPending,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Complete => "complete",
            ChargeStatus::Failed => "failed",
            ChargeStatus::Refunded => "refunded",
            ChargeStatus::Inreview => "inreview",
            ChargeStatus::PreAuthenticationPending => "pre_authentication_pending",
            ChargeStatus::Cancelled => "cancelled",
            ChargeStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> ChargeStatus {
        match s {
            "pending" => ChargeStatus::Pending,
            "complete" => ChargeStatus::Complete,
            "failed" => ChargeStatus::Failed,
            "refunded" => ChargeStatus::Refunded,
            "inreview" => ChargeStatus::Inreview,
            "pre_authentication_pending" => ChargeStatus::PreAuthenticationPending,
            "cancelled" => ChargeStatus::Cancelled,
            _ => ChargeStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudStatus {
    Inreview,
    Complete,
    Failed,
    Declined,
    #[serde(other)]
    Unknown,
}

impl FraudStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudStatus::Inreview => "inreview",
            FraudStatus::Complete => "complete",
            FraudStatus::Failed => "failed",
            FraudStatus::Declined => "declined",
            FraudStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> FraudStatus {
        match s {
            "inreview" => FraudStatus::Inreview,
            "complete" => FraudStatus::Complete,
            "failed" => FraudStatus::Failed,
            "declined" => FraudStatus::Declined,
            _ => FraudStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultType {
    Session,
    Permanent,
}

impl VaultType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaultType::Session => "session",
            VaultType::Permanent => "permanent",
        }
    }

    pub fn parse(s: &str) -> Option<VaultType> {
        match s {
            "session" => Some(VaultType::Session),
            "permanent" => Some(VaultType::Permanent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CardSummary {
    pub holder: Option<String>,
    pub masked_number: Option<String>,
    pub scheme: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<i32>,
}

/// The gateway-specific payment record attached to a basket and later to its order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInstrument {
    pub id: Uuid,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub currency: String,
    pub token: Option<String>,
    pub vault_token: Option<String>,
    pub vault_type: Option<VaultType>,
    pub customer_id: Option<String>,
    pub charge_id: Option<String>,
    pub charge_status: Option<ChargeStatus>,
    pub captured_amount: Decimal,
    pub refunded_amount: Decimal,
    pub fraud_id: Option<String>,
    pub fraud_status: Option<FraudStatus>,
    pub three_ds_token: Option<String>,
    pub charge_3ds_token: Option<String>,
    pub card: Option<CardSummary>,
    pub card_details: Option<String>,
    pub gateway_type: Option<String>,
    pub transaction_id: Option<String>,
    pub capture: bool,
}

impl PaymentInstrument {
    pub fn new(method: PaymentMethod, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            amount,
            currency: currency.into(),
            token: None,
            vault_token: None,
            vault_type: None,
            customer_id: None,
            charge_id: None,
            charge_status: None,
            captured_amount: Decimal::ZERO,
            refunded_amount: Decimal::ZERO,
            fraud_id: None,
            fraud_status: None,
            three_ds_token: None,
            charge_3ds_token: None,
            card: None,
            card_details: None,
            gateway_type: None,
            transaction_id: None,
            capture: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    NotPaid,
    PartPaid,
    Paid,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::NotPaid => "NOT_PAID",
            OrderPaymentStatus::PartPaid => "PART_PAID",
            OrderPaymentStatus::Paid => "PAID",
        }
    }

    pub fn parse(s: &str) -> OrderPaymentStatus {
        match s {
            "PAID" => OrderPaymentStatus::Paid,
            "PART_PAID" => OrderPaymentStatus::PartPaid,
            _ => OrderPaymentStatus::NotPaid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    New,
    Open,
    Completed,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::New => "NEW",
            OrderStatus::Open => "OPEN",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> OrderStatus {
        match s {
            "NEW" => OrderStatus::New,
            "OPEN" => OrderStatus::Open,
            "COMPLETED" => OrderStatus::Completed,
            "CANCELLED" => OrderStatus::Cancelled,
            "FAILED" => OrderStatus::Failed,
            _ => OrderStatus::Created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Address {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state_code: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Option<String>,
    pub name: Option<String>,
    pub quantity: Option<u32>,
    pub adjusted_price: Option<Decimal>,
    pub product_url: Option<String>,
    pub image_url: Option<String>,
    pub brand: Option<String>,
}

impl LineItem {
    /// A line item missing product, name, quantity or price cannot be sent to the gateway.
    pub fn is_complete(&self) -> bool {
        self.product_id.is_some()
            && self.name.is_some()
            && self.quantity.is_some()
            && self.adjusted_price.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Shipment {
    pub address: Option<Address>,
    pub store_pickup: bool,
    pub has_shipping_method: bool,
    pub shipping_total: Option<Decimal>,
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CartTotals {
    pub gross_total: Decimal,
    pub adjusted_merchandise_total: Decimal,
    pub gift_certificate_total: Decimal,
    pub gift_certificate_redemptions: Vec<Decimal>,
}

/// Line-item container contents shared by baskets and orders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cart {
    pub currency: String,
    pub customer_email: Option<String>,
    pub billing_address: Option<Address>,
    pub shipment: Shipment,
    pub totals: CartTotals,
}

impl Cart {
    /// Amount left to charge through the gateway once gift certificates are redeemed.
    pub fn non_gift_certificate_amount(&self) -> Decimal {
        let redeemed: Decimal = self.totals.gift_certificate_redemptions.iter().copied().sum();
        let total = if self.totals.gross_total.is_zero() {
            self.totals.adjusted_merchandise_total + self.totals.gift_certificate_total
        } else {
            self.totals.gross_total
        };
        total - redeemed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredCustomer {
    pub customer_no: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomerRef {
    Guest,
    Registered(RegisteredCustomer),
}

impl CustomerRef {
    pub fn registered(&self) -> Option<&RegisteredCustomer> {
        match self {
            CustomerRef::Registered(c) => Some(c),
            CustomerRef::Guest => None,
        }
    }
}

/// A card saved in a registered customer's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCard {
    pub id: Uuid,
    pub customer_no: String,
    pub vault_token: String,
    pub customer_id: Option<String>,
    pub card_details: Option<String>,
    pub card: CardSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Basket {
    pub id: String,
    pub customer: CustomerRef,
    pub cart: Cart,
    pub instruments: Vec<PaymentInstrument>,
}

impl Basket {
    pub fn gateway_instrument(&self) -> Option<&PaymentInstrument> {
        self.instruments.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNote {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub subject: String,
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_no: String,
    pub token: String,
    pub customer: CustomerRef,
    pub cart: Cart,
    pub status: OrderStatus,
    pub confirmed: bool,
    pub payment_status: OrderPaymentStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub charge_id: Option<String>,
    pub fraud_id: Option<String>,
    pub captured: bool,
    pub refunded: bool,
    pub payment_method_name: Option<String>,
    pub cancel_code: Option<String>,
    pub cancel_description: Option<String>,
    pub instruments: Vec<PaymentInstrument>,
    pub notes: Vec<OrderNote>,
}

impl Order {
    pub fn gateway_instrument(&self) -> Option<&PaymentInstrument> {
        self.instruments.first()
    }

    pub fn gateway_instrument_mut(&mut self) -> Option<&mut PaymentInstrument> {
        self.instruments.first_mut()
    }

    pub fn add_note(&mut self, subject: &str, text: impl Into<String>) {
        self.notes.push(OrderNote {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            text: text.into(),
            created_at: chrono::Utc::now(),
        });
    }

    /// Capture-driven status changes never move the order backwards.
    pub fn advance_payment_status(&mut self, next: OrderPaymentStatus) {
        if next > self.payment_status {
            self.payment_status = next;
        }
    }
}

impl fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
