use crate::domain::payment::ChargeStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Capture,
    Refund,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Complete,
    Pending,
    Failed,
    #[serde(other)]
    Other,
}

/// One entry of a charge's transaction ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeTransaction {
    #[serde(rename = "type", default)]
    pub kind: Option<TransactionType>,
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl ChargeTransaction {
    pub fn is_complete(&self, kind: TransactionType) -> bool {
        self.kind == Some(kind) && self.status == Some(TransactionStatus::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ThreeDsData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaymentSourceInfo {
    #[serde(default)]
    pub gateway_name: Option<String>,
    #[serde(default)]
    pub gateway_type: Option<String>,
    #[serde(default)]
    pub wallet_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChargeCustomer {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub payment_source: Option<PaymentSourceInfo>,
}

/// Charge as reported by the gateway. Also the shape of fraud-check and 3DS results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Charge {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<ChargeStatus>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub transactions: Vec<ChargeTransaction>,
    #[serde(rename = "_3ds", default)]
    pub three_ds: Option<ThreeDsData>,
    #[serde(default)]
    pub customer: Option<ChargeCustomer>,
}

/// Result of vaulting a one-time card token.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VaultedSource {
    #[serde(default)]
    pub vault_token: Option<String>,
    #[serde(default)]
    pub vault_type: Option<String>,
    #[serde(default)]
    pub card_name: Option<String>,
    #[serde(default)]
    pub card_number_bin: Option<String>,
    #[serde(default)]
    pub card_number_last4: Option<String>,
    #[serde(default)]
    pub card_scheme: Option<String>,
    #[serde(default)]
    pub expire_month: Option<u32>,
    #[serde(default)]
    pub expire_year: Option<i32>,
}

impl VaultedSource {
    /// `bin-last4_MM/YYYY`, used to spot an already saved card.
    pub fn card_fingerprint(&self) -> Option<String> {
        match (
            &self.card_number_bin,
            &self.card_number_last4,
            self.expire_month,
            self.expire_year,
        ) {
            (Some(bin), Some(last4), Some(month), Some(year)) => {
                Some(format!("{bin}-{last4}_{month}/{year}"))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GatewayCustomer {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalletChargeSession {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub charge: Charge,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationSubscription {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub transaction_only: Option<bool>,
}
