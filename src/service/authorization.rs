use crate::config::{FraudType, GatewaySettings, SaveCardMethod, ThreeDsFlow, ThreeDsType};
use crate::domain::charge::{Charge, VaultedSource};
use crate::domain::context::{CardAuthorizeInput, CardHandleInput, CheckoutTransactionContext};
use crate::domain::payment::{
    Address, Basket, CardSummary, ChargeStatus, FraudStatus, Order, OrderPaymentStatus,
    PaymentInstrument, PaymentMethod, RegisteredCustomer, VaultType, WalletCard,
};
use crate::error::{CheckoutError, PAYMENT_METHOD_MISCONFIGURED};
use crate::gateways::{
    ChargeRequest, CustomerRequest, FraudPayload, GatewayApi, PaymentSourcePayload,
    ThreeDsAuthentication, ThreeDsPayload, VaultRequest,
};
use crate::repo::order_store::OrderStore;
use crate::service::reconciliation::apply_charge_details;
use std::sync::Arc;

const CHARGE_NOTE: &str = "Charge Notification";

#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizeOutcome {
    Charged(Charge),
    /// Standalone fraud review is pending; the charge is created by the approval webhook.
    DeferredForFraudReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FraudVerdict {
    Success,
    Flag,
}

/// Direct card checkout: Handle (before the order exists) and Authorize (after placement).
#[derive(Clone)]
pub struct CardAuthorizationService {
    pub gateway: Arc<dyn GatewayApi>,
    pub store: Arc<dyn OrderStore>,
    pub settings: Arc<GatewaySettings>,
}

impl CardAuthorizationService {
    pub async fn handle(&self, input: &CardHandleInput) -> Result<CheckoutTransactionContext, CheckoutError> {
        let basket = self
            .store
            .load_basket(&input.basket_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("basket {}", input.basket_id)))?;
        self.ensure_configured()?;

        let result = self.resolve_instrument(&basket, input).await;
        let (instrument, ctx) = match result {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(
                    gateway = self.gateway.name(),
                    basket_id = %basket.id,
                    operation = "card_handle",
                    error = %e,
                    "card handle failed"
                );
                return Err(e);
            }
        };

        self.store.replace_gateway_instrument(&basket.id, instrument).await?;
        Ok(ctx)
    }

    async fn resolve_instrument(
        &self,
        basket: &Basket,
        input: &CardHandleInput,
    ) -> Result<(PaymentInstrument, CheckoutTransactionContext), CheckoutError> {
        let s = &self.settings;
        let amount = basket.cart.non_gift_certificate_amount();
        let currency = basket.cart.currency.clone();
        let mut pi = PaymentInstrument::new(PaymentMethod::DirectCard, amount, currency.clone());
        pi.capture = s.charge_capture;
        let mut ctx = CheckoutTransactionContext::default();

        match (basket.customer.registered(), &input.stored_card) {
            (Some(_), Some(stored)) => {
                pi.vault_token = Some(stored.vault_token.clone());
                pi.vault_type = Some(VaultType::Permanent);
                pi.customer_id = stored.customer_id.clone();
                pi.card = Some(stored.card.clone());
                pi.card_details = stored.card_details.clone();
            }
            (Some(profile), None) if s.three_ds_flow == ThreeDsFlow::Vault => {
                let request = VaultRequest {
                    token: input.token.clone(),
                    vault_type: (!input.save_card).then_some(VaultType::Session),
                };
                let source = self.gateway.create_vault(&request).await?;
                ctx.save_card = input.save_card;
                fill_from_vault(&mut pi, &input.token, &source);

                if input.save_card
                    && s.fraud_type == FraudType::Disabled
                    && s.three_ds_type == ThreeDsType::Disabled
                    && s.save_card_method.creates_customer()
                {
                    let vault_token = pi.vault_token.clone().unwrap_or_default();
                    let request = self.customer_request(profile, basket.cart.billing_address.as_ref(), &vault_token);
                    let customer = self.gateway.create_customer(&request).await?;
                    pi.customer_id = customer.id;
                }
            }
            (Some(_), None) => {}
            (None, _) if s.three_ds_flow == ThreeDsFlow::Ott => {}
            (None, _) => {
                let request = VaultRequest {
                    token: input.token.clone(),
                    vault_type: Some(VaultType::Session),
                };
                let source = self.gateway.create_vault(&request).await?;
                fill_from_vault(&mut pi, &input.token, &source);
            }
        }

        let billing = basket.cart.billing_address.clone().unwrap_or_default();
        let vault_flow = s.three_ds_flow == ThreeDsFlow::Vault;

        if s.fraud_type == FraudType::Standalone && pi.customer_id.is_none() && vault_flow {
            let mut request = ChargeRequest::new(amount, currency.clone());
            request.fraud = Some(FraudPayload {
                service_id: self.fraud_service_id()?,
            });
            let customer = request.customer_mut();
            customer.first_name = billing.first_name.clone();
            customer.last_name = billing.last_name.clone();
            customer.payment_source_mut().vault_token = pi.vault_token.clone();
            let request = request.with_cart_details(&basket.cart);

            let fraud = self.gateway.fraud_check(&request).await?;
            ctx.fraud_id = fraud.id.clone();
            ctx.fraud_in_review = fraud.status == Some(ChargeStatus::Inreview);
            pi.fraud_id = fraud.id;
            pi.fraud_status = fraud.status.map(|st| FraudStatus::parse(st.as_str()));
        }

        if s.three_ds_type == ThreeDsType::Inbuilt && pi.customer_id.is_none() {
            let mut request = ChargeRequest::new(amount, currency.clone());
            let customer = request.customer_mut();
            customer.first_name = billing.first_name.clone();
            customer.last_name = billing.last_name.clone();
            customer.payment_source_mut().gateway_id = Some(s.gateway_id.clone());
            request.three_ds = Some(ThreeDsPayload {
                browser_details: input.browser_details.clone(),
                ..ThreeDsPayload::default()
            });
            if vault_flow {
                request.customer_mut().payment_source_mut().vault_token = pi.vault_token.clone();
            } else {
                request.token = Some(input.token.clone());
            }
            let request = request.with_cart_details(&basket.cart);

            let pre_auth = self.gateway.pre_auth_3ds(&request).await?;
            ctx.three_ds_charge_id = pre_auth.id;
            pi.three_ds_token = pre_auth.three_ds.and_then(|t| t.token);
        }

        if !vault_flow && s.three_ds_type != ThreeDsType::Inbuilt {
            pi.token = Some(input.token.clone());
        }

        if s.three_ds_type == ThreeDsType::Standalone && pi.customer_id.is_none() && vault_flow {
            let mut request = ChargeRequest::new(amount, currency);
            let customer = request.customer_mut();
            customer.first_name = billing.first_name.clone();
            customer.last_name = billing.last_name.clone();
            customer.phone = billing.phone.clone();
            let source = customer.payment_source_mut();
            source.vault_token = pi.vault_token.clone();
            source.gateway_id = Some(s.gateway_id.clone());
            request.three_ds = Some(ThreeDsPayload {
                service_id: Some(self.three_ds_service_id()?),
                authentication: Some(ThreeDsAuthentication {
                    kind: "01".to_string(),
                    date: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                }),
                ..ThreeDsPayload::default()
            });

            let standalone = self.gateway.standalone_3ds(&request).await?;
            let three_ds = standalone.three_ds.unwrap_or_default();
            ctx.three_ds_charge_id = three_ds.id;
            pi.three_ds_token = three_ds.token;
        }

        Ok((pi, ctx))
    }

    pub async fn authorize(
        &self,
        input: &CardAuthorizeInput,
        ctx: &CheckoutTransactionContext,
    ) -> Result<AuthorizeOutcome, CheckoutError> {
        let mut order = self
            .store
            .load_order(&input.order_no)
            .await?
            .ok_or_else(|| CheckoutError::NotFound(format!("order {}", input.order_no)))?;
        if let Some(pi) = order.gateway_instrument_mut() {
            if let Some(token) = input.three_ds_token.clone().filter(|t| !t.is_empty()) {
                pi.charge_3ds_token = Some(token);
            }
        }
        let pi = order
            .gateway_instrument()
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound(format!("gateway instrument on order {}", order.order_no)))?;

        let charge = match self.issue_charge(&mut order, &pi, input, ctx).await {
            Ok(charge) => charge,
            Err(e) => {
                tracing::error!(
                    gateway = self.gateway.name(),
                    order_no = %order.order_no,
                    operation = "card_authorize",
                    error = %e,
                    "card authorize failed"
                );
                return Err(e);
            }
        };

        if charge.is_some() {
            self.follow_up_charge(&mut order, &pi, ctx).await;
        }
        self.store.save_order(&order).await?;

        match charge {
            Some(charge) => {
                tracing::info!(
                    gateway = self.gateway.name(),
                    order_no = %order.order_no,
                    charge_id = charge.id.as_deref().unwrap_or_default(),
                    status = charge.status.map(|st| st.as_str()).unwrap_or("unknown"),
                    "card charge created"
                );
                Ok(AuthorizeOutcome::Charged(charge))
            }
            None => {
                tracing::info!(
                    gateway = self.gateway.name(),
                    order_no = %order.order_no,
                    fraud_id = ctx.fraud_id.as_deref().unwrap_or_default(),
                    "charge deferred until fraud review completes"
                );
                Ok(AuthorizeOutcome::DeferredForFraudReview)
            }
        }
    }

    /// Creates the gateway charge and persists it on the order before anything else can fail.
    async fn issue_charge(
        &self,
        order: &mut Order,
        pi: &PaymentInstrument,
        input: &CardAuthorizeInput,
        ctx: &CheckoutTransactionContext,
    ) -> Result<Option<Charge>, CheckoutError> {
        let s = &self.settings;
        let request = if order.customer.registered().is_some()
            && pi.customer_id.is_some()
            && s.save_card_method.creates_customer()
        {
            let mut request = ChargeRequest::new(pi.amount, pi.currency.clone());
            request.reference = Some(order.order_no.clone());
            request.customer_id = pi.customer_id.clone();
            if s.save_card_method == SaveCardMethod::CustomerWithoutGatewayId {
                request.customer_mut().payment_source_mut().gateway_id = Some(s.gateway_id.clone());
            }
            request.with_cart_details(&order.cart)
        } else if ctx.fraud_in_review {
            return Ok(None);
        } else {
            self.card_charge_request(order, pi, input)
        };

        let charge = self.gateway.create_charge(&request, s.charge_capture).await?;
        record_charge(order, &charge, pi.method.display_name());
        self.store.save_order(order).await?;
        Ok(Some(charge))
    }

    fn card_charge_request(&self, order: &Order, pi: &PaymentInstrument, input: &CardAuthorizeInput) -> ChargeRequest {
        let s = &self.settings;
        let vault_flow = s.three_ds_flow == ThreeDsFlow::Vault;
        let billing = order.cart.billing_address.clone().unwrap_or_default();
        let mut request = ChargeRequest::new(pi.amount, pi.currency.clone());
        request.reference = Some(order.order_no.clone());
        let customer = request.customer_mut();
        customer.first_name = billing.first_name.clone();
        customer.last_name = billing.last_name.clone();
        customer.email = order.cart.customer_email.clone();
        let source = customer.payment_source_mut();
        source.gateway_id = Some(s.gateway_id.clone());
        source.vault_token = pi.vault_token.clone();

        if s.three_ds_type == ThreeDsType::Inbuilt {
            request.three_ds = Some(ThreeDsPayload {
                id: input.three_ds_token.clone(),
                ..ThreeDsPayload::default()
            });
        }
        if !vault_flow && s.three_ds_type != ThreeDsType::Inbuilt {
            request.token = pi.token.clone();
        }
        if s.three_ds_type == ThreeDsType::Standalone && vault_flow {
            request.three_ds_charge_id = input.three_ds_token.clone();
        }
        if s.fraud_type == FraudType::Inbuilt {
            request.fraud = s
                .fraud_service_id
                .clone()
                .map(|service_id| FraudPayload { service_id });
        }
        request.with_cart_details(&order.cart)
    }

    /// Steps after a charge exists. Failures here are noted on the order; the charge stands.
    async fn follow_up_charge(&self, order: &mut Order, pi: &PaymentInstrument, ctx: &CheckoutTransactionContext) {
        let s = &self.settings;
        let vault_flow = s.three_ds_flow == ThreeDsFlow::Vault;

        if s.fraud_type == FraudType::Standalone && vault_flow {
            if let (Some(charge_id), Some(fraud_id)) = (order.charge_id.clone(), &ctx.fraud_id) {
                if let Err(e) = self.gateway.attach_fraud(&charge_id, fraud_id).await {
                    tracing::error!(
                        gateway = self.gateway.name(),
                        order_no = %order.order_no,
                        charge_id = %charge_id,
                        operation = "attach_fraud",
                        error = %e,
                        "attaching fraud result failed"
                    );
                    order.add_note(CHARGE_NOTE, format!("Fraud attach failed.\n{}", e.message));
                }
            }
        }

        let Some(profile) = order.customer.registered().cloned() else {
            return;
        };
        let checks_enabled = s.fraud_type != FraudType::Disabled || s.three_ds_type != ThreeDsType::Disabled;
        if !(checks_enabled && ctx.save_card && s.save_card_method.creates_customer()) {
            return;
        }
        let vault_token = pi.vault_token.clone().unwrap_or_default();
        if let Err(e) = self.create_wallet_customer(order, &profile, &vault_token).await {
            tracing::error!(
                gateway = self.gateway.name(),
                order_no = %order.order_no,
                operation = "create_customer",
                error = %e,
                "customer creation after charge failed"
            );
            order.add_note(CHARGE_NOTE, format!("Customer creation failed.\n{e}"));
        }
    }

    async fn create_wallet_customer(
        &self,
        order: &Order,
        profile: &RegisteredCustomer,
        vault_token: &str,
    ) -> Result<(), CheckoutError> {
        let request = self.customer_request(profile, order.cart.billing_address.as_ref(), vault_token);
        let customer = self.gateway.create_customer(&request).await?;
        if let Some(customer_id) = customer.id {
            let attached = self
                .store
                .attach_customer_to_wallet_card(&profile.customer_no, vault_token, &customer_id)
                .await?;
            if !attached {
                tracing::warn!(
                    order_no = %order.order_no,
                    "no saved wallet card matches the vault token"
                );
            }
        }
        Ok(())
    }

    /// Stores a newly vaulted card in the registered customer's wallet, replacing a card
    /// with the same fingerprint.
    pub async fn save_payment_information(&self, input: &CardHandleInput) -> Result<Option<WalletCard>, CheckoutError> {
        if !input.save_card || input.stored_card.is_some() {
            return Ok(None);
        }
        let Some(basket) = self.store.load_basket(&input.basket_id).await? else {
            return Ok(None);
        };
        let Some(profile) = basket.customer.registered() else {
            return Ok(None);
        };
        let Some(pi) = basket.gateway_instrument() else {
            return Ok(None);
        };
        if pi.method != PaymentMethod::DirectCard {
            return Ok(None);
        }
        let Some(vault_token) = pi.vault_token.clone() else {
            return Ok(None);
        };

        let card = WalletCard {
            id: uuid::Uuid::new_v4(),
            customer_no: profile.customer_no.clone(),
            vault_token,
            customer_id: pi.customer_id.clone(),
            card_details: pi.card_details.clone(),
            card: pi.card.clone().unwrap_or_default(),
        };
        self.store.save_wallet_card(card.clone()).await?;
        Ok(Some(card))
    }

    /// Orders that are only authorized are held for manual review.
    pub fn fraud_detection(&self, order: &Order) -> FraudVerdict {
        if order.gateway_instrument().is_some() && !self.settings.charge_capture {
            FraudVerdict::Flag
        } else {
            FraudVerdict::Success
        }
    }

    fn ensure_configured(&self) -> Result<(), CheckoutError> {
        if self.settings.gateway_id.is_empty() {
            return Err(CheckoutError::Configuration(PAYMENT_METHOD_MISCONFIGURED.to_string()));
        }
        Ok(())
    }

    fn fraud_service_id(&self) -> Result<String, CheckoutError> {
        self.settings
            .fraud_service_id
            .clone()
            .ok_or_else(|| CheckoutError::Configuration(PAYMENT_METHOD_MISCONFIGURED.to_string()))
    }

    fn three_ds_service_id(&self) -> Result<String, CheckoutError> {
        self.settings
            .three_ds_service_id
            .clone()
            .ok_or_else(|| CheckoutError::Configuration(PAYMENT_METHOD_MISCONFIGURED.to_string()))
    }

    fn customer_request(
        &self,
        profile: &RegisteredCustomer,
        billing: Option<&Address>,
        vault_token: &str,
    ) -> CustomerRequest {
        let billing = billing.cloned().unwrap_or_default();
        let gateway_id = (self.settings.save_card_method == SaveCardMethod::CustomerWithGatewayId)
            .then(|| self.settings.gateway_id.clone());
        CustomerRequest {
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.clone(),
            phone: billing.phone.clone(),
            payment_source: PaymentSourcePayload {
                gateway_id,
                vault_token: Some(vault_token.to_string()),
                address_line2: billing.address2.clone().or_else(|| billing.address1.clone()),
                address_line1: billing.address1,
                address_city: billing.city,
                address_state: Some(billing.state_code.unwrap_or_default()),
                address_postcode: billing.postal_code,
                address_country: billing.country_code,
            },
        }
    }
}

fn fill_from_vault(pi: &mut PaymentInstrument, token: &str, source: &VaultedSource) {
    pi.token = Some(token.to_string());
    pi.vault_token = source.vault_token.clone();
    pi.vault_type = source.vault_type.as_deref().and_then(VaultType::parse);
    pi.card_details = source.card_fingerprint();
    pi.card = Some(CardSummary {
        holder: source.card_name.clone(),
        masked_number: source
            .card_number_last4
            .as_ref()
            .map(|last4| format!("**** **** **** {last4}")),
        scheme: source.card_scheme.as_deref().map(capitalize),
        exp_month: source.expire_month,
        exp_year: source.expire_year,
    });
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Copies a freshly created charge onto the order and its gateway instrument.
pub(crate) fn record_charge(order: &mut Order, charge: &Charge, method_name: &str) {
    if let Some(charge_id) = &charge.id {
        order.charge_id = Some(charge_id.clone());
        order.payment_method_name = Some(method_name.to_string());
    }
    if let Some(pi) = order.gateway_instrument_mut() {
        pi.charge_status = charge.status;
        if let Some(charge_id) = &charge.id {
            pi.charge_id = Some(charge_id.clone());
            pi.transaction_id = Some(charge_id.clone());
        }
        apply_charge_details(pi, charge);
    }
    if charge.status == Some(ChargeStatus::Complete) {
        order.advance_payment_status(OrderPaymentStatus::Paid);
    }
}
