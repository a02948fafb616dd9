use crate::domain::payment::WalletCard;
use serde::{Deserialize, Serialize};

/// Values produced by the card Handle phase that the Authorize phase depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutTransactionContext {
    pub fraud_in_review: bool,
    pub fraud_id: Option<String>,
    pub save_card: bool,
    pub three_ds_charge_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CardHandleInput {
    pub basket_id: String,
    pub token: String,
    pub save_card: bool,
    pub stored_card: Option<WalletCard>,
    pub browser_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct CardAuthorizeInput {
    pub order_no: String,
    /// 3DS token or charge id returned to the client after the challenge.
    pub three_ds_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_not_in_review() {
        let ctx = CheckoutTransactionContext::default();
        assert!(!ctx.fraud_in_review);
        assert!(ctx.fraud_id.is_none());
    }
}
