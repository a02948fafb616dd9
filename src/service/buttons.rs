use crate::config::GatewaySettings;
use crate::domain::charge::Charge;
use crate::domain::payment::{
    Basket, CardSummary, ChargeStatus, CheckoutButtonKind, Order, OrderPaymentStatus,
    PaymentInstrument, PaymentMethod, WalletKind,
};
use crate::error::{CheckoutError, PAYMENT_METHOD_MISCONFIGURED};
use crate::gateways::{ChargeRequest, FraudPayload, GatewayApi, WalletMeta};
use crate::repo::order_store::OrderStore;
use crate::service::reconciliation::apply_charge_details;
use std::sync::Arc;

/// What the storefront needs to render a wallet button for an opened charge session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    pub token: String,
    pub charge_id: String,
    pub gateway_name: Option<String>,
    pub gateway_type: Option<String>,
    pub wallet_type: Option<String>,
}

#[derive(Clone)]
pub struct ButtonCheckoutService {
    pub gateway: Arc<dyn GatewayApi>,
    pub store: Arc<dyn OrderStore>,
    pub settings: Arc<GatewaySettings>,
}

impl ButtonCheckoutService {
    /// Opens a wallet charge session for the basket and records it as the gateway instrument.
    pub async fn handle_wallet(&self, basket_id: &str, kind: WalletKind) -> Result<WalletSession, CheckoutError> {
        let basket = self.load_basket(basket_id).await?;
        let config = self.settings.wallet_config(kind);
        if !config.is_configured() {
            tracing::warn!(wallet = kind.display_name(), "wallet button has no gateway id");
            return Err(CheckoutError::Configuration(PAYMENT_METHOD_MISCONFIGURED.to_string()));
        }

        let amount = basket.cart.non_gift_certificate_amount();
        let mut request = ChargeRequest::new(amount, basket.cart.currency.clone());
        request.customer_mut().payment_source_mut().gateway_id = Some(config.gateway_id.clone());
        request.meta = Some(WalletMeta {
            store_id: self.settings.store_id.clone(),
            store_name: self.settings.store_name.clone(),
            success_url: self.settings.place_order_url.clone(),
            error_url: self.settings.place_order_url.clone(),
        });
        let mut request = request.with_cart_details(&basket.cart);
        if config.fraud_enabled {
            request.fraud = config
                .fraud_service_id
                .clone()
                .map(|service_id| FraudPayload { service_id });
        }

        let session = match self.gateway.wallet_charge(&request, config.charge_capture).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    gateway = self.gateway.name(),
                    gateway_id = %config.gateway_id,
                    operation = "wallet_charge",
                    error = %e,
                    "failed to initialize wallet charge"
                );
                return Err(e.into());
            }
        };

        let source = session
            .charge
            .customer
            .as_ref()
            .and_then(|c| c.payment_source.clone())
            .unwrap_or_default();
        let (Some(token), Some(charge_id)) = (session.token.clone(), session.charge.id.clone()) else {
            return Err(CheckoutError::Declined(format!(
                "{} could not be initialized",
                kind.display_name()
            )));
        };

        let mut pi = PaymentInstrument::new(PaymentMethod::WalletButton(kind), amount, basket.cart.currency.clone());
        pi.capture = config.charge_capture;
        pi.gateway_type = source.gateway_type.clone();
        pi.token = Some(token.clone());
        pi.charge_id = Some(charge_id.clone());
        self.store.replace_gateway_instrument(&basket.id, pi).await?;

        Ok(WalletSession {
            token,
            charge_id,
            gateway_name: source.gateway_name,
            gateway_type: source.gateway_type,
            wallet_type: source.wallet_type,
        })
    }

    /// Reads the wallet charge the shopper completed and applies it to the placed order.
    pub async fn authorize_wallet(&self, order_no: &str) -> Result<Charge, CheckoutError> {
        let mut order = self.load_order(order_no).await?;
        let pi = order
            .gateway_instrument()
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(format!("gateway instrument on order {order_no}")))?;
        let charge_id = pi
            .charge_id
            .clone()
            .ok_or_else(|| CheckoutError::NotFound(format!("wallet charge on order {order_no}")))?;

        let charge = self.gateway.get_charge(&charge_id).await.map_err(|e| {
            tracing::error!(
                gateway = self.gateway.name(),
                order_no,
                charge_id = %charge_id,
                operation = "get_charge",
                error = %e,
                "wallet authorize failed"
            );
            CheckoutError::from(e)
        })?;

        let failed = charge.status == Some(ChargeStatus::Failed);
        apply_button_charge(&mut order, &charge, pi.method, !failed);
        self.store.save_order(&order).await?;

        if failed {
            return Err(CheckoutError::Declined(format!("Charge {charge_id} failed")));
        }
        Ok(charge)
    }

    /// Checkout buttons create their charge only after the shopper returns, so Handle just
    /// records the instrument.
    pub async fn handle_checkout_button(&self, basket_id: &str, kind: CheckoutButtonKind) -> Result<(), CheckoutError> {
        let basket = self.load_basket(basket_id).await?;
        let config = self.settings.checkout_button_config(kind);
        let mut pi = PaymentInstrument::new(
            PaymentMethod::CheckoutButton(kind),
            basket.cart.non_gift_certificate_amount(),
            basket.cart.currency.clone(),
        );
        pi.capture = config.charge_capture;
        self.store.replace_gateway_instrument(&basket.id, pi).await?;
        Ok(())
    }

    /// Creates the BNPL charge from the payment-source token the shopper returned with.
    pub async fn authorize_checkout_button(
        &self,
        order_no: &str,
        payment_source_token: &str,
    ) -> Result<Charge, CheckoutError> {
        let mut order = self.load_order(order_no).await?;
        let pi = order
            .gateway_instrument()
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(format!("gateway instrument on order {order_no}")))?;
        let PaymentMethod::CheckoutButton(kind) = pi.method else {
            return Err(CheckoutError::Configuration(PAYMENT_METHOD_MISCONFIGURED.to_string()));
        };
        let config = self.settings.checkout_button_config(kind);

        let mut request = ChargeRequest::new(pi.amount, pi.currency.clone());
        request.reference = Some(order.order_no.clone());
        request.token = Some(payment_source_token.to_string());
        if config.fraud_enabled {
            request.fraud = config
                .fraud_service_id
                .clone()
                .map(|service_id| FraudPayload { service_id });
        }

        let result = match kind {
            CheckoutButtonKind::Afterpay => {
                let request = request.with_cart_details(&order.cart);
                self.gateway.create_charge(&request, false).await
            }
            CheckoutButtonKind::ZipMoney => self.gateway.create_charge(&request, pi.capture).await,
        };
        let charge = result.map_err(|e| {
            tracing::error!(
                gateway = self.gateway.name(),
                order_no,
                operation = "create_charge",
                button = kind.display_name(),
                error = %e,
                "checkout button charge failed"
            );
            CheckoutError::from(e)
        })?;

        if let Some(pi) = order.gateway_instrument_mut() {
            pi.token = Some(payment_source_token.to_string());
            if let Some(id) = &charge.id {
                pi.charge_id = Some(id.clone());
            }
        }
        if let Some(id) = &charge.id {
            order.charge_id = Some(id.clone());
        }
        apply_button_charge(&mut order, &charge, pi.method, true);
        self.store.save_order(&order).await?;

        if charge.status == Some(ChargeStatus::Failed) {
            return Err(CheckoutError::Declined(format!(
                "{} charge failed",
                kind.display_name()
            )));
        }
        Ok(charge)
    }

    async fn load_basket(&self, basket_id: &str) -> Result<Basket, CheckoutError> {
        self.store
            .load_basket(basket_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("basket {basket_id}")))
    }

    async fn load_order(&self, order_no: &str) -> Result<Order, CheckoutError> {
        self.store
            .load_order(order_no)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("order {order_no}")))
    }
}

fn apply_button_charge(order: &mut Order, charge: &Charge, method: PaymentMethod, reconcile: bool) {
    order.payment_method_name = Some(method.display_name().to_string());
    if let Some(pi) = order.gateway_instrument_mut() {
        pi.charge_status = charge.status;
        if let Some(id) = &charge.id {
            pi.transaction_id = Some(id.clone());
        }
        if let Some(customer) = &charge.customer {
            let holder = [customer.first_name.as_deref(), customer.last_name.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            if !holder.is_empty() {
                pi.card.get_or_insert_with(CardSummary::default).holder = Some(holder);
            }
            if let Some(gateway_type) = customer.payment_source.as_ref().and_then(|s| s.gateway_type.clone()) {
                pi.gateway_type = Some(gateway_type);
            }
        }
        if reconcile {
            apply_charge_details(pi, charge);
        }
    }
    if charge.status == Some(ChargeStatus::Complete) {
        order.advance_payment_status(OrderPaymentStatus::Paid);
    }
}
