use rust_decimal::Decimal;

pub const GENERIC_CHECKOUT_ERROR: &str =
    "We were unable to process your payment. Please try again or use a different payment method.";
pub const PAYMENT_METHOD_MISCONFIGURED: &str = "This payment method is not configured correctly.";

/// A failed call to the hosted gateway API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    pub message: String,
    pub http_status: Option<u16>,
}

impl GatewayError {
    pub fn new(message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            http_status,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(message, None)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Declined(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl CheckoutError {
    /// Message shown to the shopper. Gateway text is only exposed when raw error messaging is on.
    pub fn user_message(&self, raw_error_messaging: bool) -> String {
        match self {
            CheckoutError::Configuration(msg) => msg.clone(),
            CheckoutError::Gateway(e) if raw_error_messaging => e.message.clone(),
            CheckoutError::Declined(msg) if raw_error_messaging => msg.clone(),
            _ => GENERIC_CHECKOUT_ERROR.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("malformed notification: {0}")]
    Malformed(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ChargeOperationError {
    #[error("Order number is missing")]
    MissingOrderNumber,
    #[error("Order token is missing")]
    MissingOrderToken,
    #[error("Order {0} not found")]
    OrderNotFound(String),
    #[error("Amount is missing")]
    MissingAmount,
    #[error("Amount is invalid")]
    InvalidAmount,
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Order has no gateway payment instrument")]
    NoGatewayInstrument,
    #[error("Gateway payment instrument has no charge ID")]
    MissingChargeId,
    #[error("Charge is not eligible for {0}")]
    NotEligible(&'static str),
    #[error("Amount exceeds the maximum of {0}")]
    AmountExceedsMaximum(Decimal),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Notification operation is missing")]
    MissingOperation,
    #[error("Notification operation is invalid: {0}")]
    InvalidOperation(String),
    #[error("Notification destination is not configured")]
    MissingDestination,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
