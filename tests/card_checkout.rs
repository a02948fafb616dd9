mod common;

use common::{basket, money, settings, shopper, Harness};
use gateway_checkout::config::{FraudType, SaveCardMethod, ThreeDsFlow, ThreeDsType};
use gateway_checkout::domain::context::{CardAuthorizeInput, CardHandleInput};
use gateway_checkout::domain::payment::{
    ChargeStatus, CustomerRef, FraudStatus, OrderPaymentStatus, VaultType,
};
use gateway_checkout::error::{CheckoutError, GatewayError};
use gateway_checkout::gateways::mock::GatewayCall;
use gateway_checkout::repo::order_store::OrderStore;
use gateway_checkout::service::authorization::{AuthorizeOutcome, CardAuthorizationService};
use gateway_checkout::service::notifications::{parse_notification, NotificationProcessor, ProcessOutcome};
use serde_json::json;
use std::sync::Arc;

fn service(h: &Harness, s: gateway_checkout::config::GatewaySettings) -> CardAuthorizationService {
    CardAuthorizationService {
        gateway: h.gateway.clone(),
        store: h.store.clone(),
        settings: Arc::new(s),
    }
}

fn handle_input(basket_id: &str, save_card: bool) -> CardHandleInput {
    CardHandleInput {
        basket_id: basket_id.to_string(),
        token: "ott_123".to_string(),
        save_card,
        stored_card: None,
        browser_details: None,
    }
}

#[tokio::test]
async fn guest_one_time_token_checkout_charges_on_authorize() {
    let h = Harness::new();
    let mut s = settings();
    s.three_ds_flow = ThreeDsFlow::Ott;
    let svc = service(&h, s);
    h.store.save_basket(&basket("b1", CustomerRef::Guest, 5000)).await.unwrap();

    let ctx = svc.handle(&handle_input("b1", false)).await.unwrap();
    assert!(h.gateway.calls().is_empty());
    assert!(!ctx.fraud_in_review);

    let basket = h.store.load_basket("b1").await.unwrap().unwrap();
    assert_eq!(basket.instruments.len(), 1);
    assert_eq!(basket.instruments[0].token.as_deref(), Some("ott_123"));

    h.store.place_order("b1", "00001").await.unwrap();
    let outcome = svc
        .authorize(
            &CardAuthorizeInput {
                order_no: "00001".to_string(),
                three_ds_token: None,
            },
            &ctx,
        )
        .await
        .unwrap();
    assert!(matches!(outcome, AuthorizeOutcome::Charged(_)));

    let charges = h.gateway.calls_to("create_charge");
    let [GatewayCall::CreateCharge { request, capture }] = charges.as_slice() else {
        panic!("expected one charge, got {charges:?}");
    };
    assert!(*capture);
    assert_eq!(request.token.as_deref(), Some("ott_123"));
    assert_eq!(request.amount, Some(money(5000)));
    assert_eq!(request.reference.as_deref(), Some("00001"));

    let order = h.order("00001").await;
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(order.payment_method_name.as_deref(), Some("Credit Card"));
    let pi = order.gateway_instrument().unwrap();
    assert_eq!(pi.charge_status, Some(ChargeStatus::Complete));
    assert_eq!(pi.captured_amount, money(5000));
    assert_eq!(order.charge_id, pi.charge_id);
}

#[tokio::test]
async fn registered_vault_checkout_saves_card_with_customer() {
    let h = Harness::new();
    let mut s = settings();
    s.save_card_method = SaveCardMethod::CustomerWithGatewayId;
    let svc = service(&h, s);
    h.store
        .save_basket(&basket("b2", CustomerRef::Registered(shopper()), 12000))
        .await
        .unwrap();

    let input = handle_input("b2", true);
    let ctx = svc.handle(&input).await.unwrap();
    assert_eq!(h.gateway.operations(), vec!["create_vault", "create_customer"]);
    let GatewayCall::CreateVault(vault) = &h.gateway.calls()[0] else {
        panic!("vault call expected");
    };
    assert_eq!(vault.vault_type, None, "saved cards are vaulted permanently");
    assert!(ctx.save_card);

    let saved = svc.save_payment_information(&input).await.unwrap().unwrap();
    assert_eq!(saved.customer_no, "C0001");
    assert_eq!(saved.card_details.as_deref(), Some("411111-1111_12/2030"));
    assert_eq!(saved.card.masked_number.as_deref(), Some("**** **** **** 1111"));
    assert_eq!(saved.card.scheme.as_deref(), Some("Visa"));
    assert!(saved.customer_id.is_some());

    h.store.place_order("b2", "00002").await.unwrap();
    svc.authorize(
        &CardAuthorizeInput {
            order_no: "00002".to_string(),
            three_ds_token: None,
        },
        &ctx,
    )
    .await
    .unwrap();

    let charges = h.gateway.calls_to("create_charge");
    let [GatewayCall::CreateCharge { request, .. }] = charges.as_slice() else {
        panic!("expected one charge");
    };
    assert_eq!(request.customer_id, saved.customer_id);
    assert_eq!(h.store.wallet_cards("C0001").await.unwrap().len(), 1);
}

#[tokio::test]
async fn handling_twice_leaves_a_single_gateway_instrument() {
    let h = Harness::new();
    let svc = service(&h, settings());
    h.store.save_basket(&basket("b3", CustomerRef::Guest, 1000)).await.unwrap();

    svc.handle(&handle_input("b3", false)).await.unwrap();
    svc.handle(&handle_input("b3", false)).await.unwrap();

    let basket = h.store.load_basket("b3").await.unwrap().unwrap();
    assert_eq!(basket.instruments.len(), 1);
    assert_eq!(basket.instruments[0].vault_token.as_deref(), Some("vault_2"));
    assert_eq!(basket.instruments[0].vault_type, Some(VaultType::Session));
}

#[tokio::test]
async fn customer_is_created_during_handle_only_without_checks() {
    for save_card in [false, true] {
        for fraud in [FraudType::Disabled, FraudType::Standalone] {
            for three_ds in [ThreeDsType::Disabled, ThreeDsType::Inbuilt] {
                let h = Harness::new();
                let mut s = settings();
                s.save_card_method = SaveCardMethod::CustomerWithoutGatewayId;
                s.fraud_type = fraud;
                s.fraud_service_id = Some("fraud_svc".to_string());
                s.three_ds_type = three_ds;
                let svc = service(&h, s);
                h.store
                    .save_basket(&basket("b", CustomerRef::Registered(shopper()), 2000))
                    .await
                    .unwrap();

                svc.handle(&handle_input("b", save_card)).await.unwrap();

                let expected = save_card && fraud == FraudType::Disabled && three_ds == ThreeDsType::Disabled;
                assert_eq!(
                    h.gateway.calls_to("create_customer").len(),
                    usize::from(expected),
                    "save_card={save_card} fraud={fraud:?} three_ds={three_ds:?}"
                );
            }
        }
    }
}

#[tokio::test]
async fn missing_gateway_id_is_a_configuration_error() {
    let h = Harness::new();
    let mut s = settings();
    s.gateway_id.clear();
    let svc = service(&h, s);
    h.store.save_basket(&basket("b4", CustomerRef::Guest, 1000)).await.unwrap();

    let err = svc.handle(&handle_input("b4", false)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Configuration(_)));
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn fraud_review_defers_charge_until_standalone_approval() {
    let h = Harness::new();
    let mut s = settings();
    s.fraud_type = FraudType::Standalone;
    s.fraud_service_id = Some("fraud_svc".to_string());
    let s = Arc::new(s);
    let svc = CardAuthorizationService {
        gateway: h.gateway.clone(),
        store: h.store.clone(),
        settings: s.clone(),
    };
    h.gateway
        .script("fraud_check", Ok(json!({"_id": "fraud_77", "status": "inreview"})));
    h.store.save_basket(&basket("b5", CustomerRef::Guest, 8000)).await.unwrap();

    let ctx = svc.handle(&handle_input("b5", false)).await.unwrap();
    assert!(ctx.fraud_in_review);
    assert_eq!(ctx.fraud_id.as_deref(), Some("fraud_77"));

    h.store.place_order("b5", "00005").await.unwrap();
    let outcome = svc
        .authorize(
            &CardAuthorizeInput {
                order_no: "00005".to_string(),
                three_ds_token: None,
            },
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(outcome, AuthorizeOutcome::DeferredForFraudReview);
    assert!(h.gateway.calls_to("create_charge").is_empty());
    let order = h.order("00005").await;
    assert_eq!(order.payment_status, OrderPaymentStatus::NotPaid);
    assert_eq!(order.gateway_instrument().unwrap().fraud_status, Some(FraudStatus::Inreview));

    let processor = NotificationProcessor {
        gateway: h.gateway.clone(),
        store: h.store.clone(),
        settings: s,
    };
    let webhook = parse_notification(
        br#"{"event":"standalone_fraud_check_in_review_approved","data":{"_id":"fraud_77","status":"complete"}}"#,
    )
    .unwrap();
    let outcome = processor.process(&webhook).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Applied {
            order_no: "00005".to_string()
        }
    );

    let charges = h.gateway.calls_to("create_charge");
    let [GatewayCall::CreateCharge { request, capture }] = charges.as_slice() else {
        panic!("approval must create exactly one charge");
    };
    assert!(*capture);
    assert_eq!(request.amount, Some(money(8000)));
    let attach = h.gateway.calls_to("attach_fraud");
    let [GatewayCall::AttachFraud { fraud_charge_id, .. }] = attach.as_slice() else {
        panic!("fraud result must be attached");
    };
    assert_eq!(fraud_charge_id, "fraud_77");

    let order = h.order("00005").await;
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    assert!(order.charge_id.is_some());
    let pi = order.gateway_instrument().unwrap();
    assert_eq!(pi.fraud_status, Some(FraudStatus::Complete));
    assert_eq!(pi.captured_amount, money(8000));
    assert!(order.notes.iter().any(|n| n.subject == "PowerBoard charge succeeded"));

    // A redelivered approval must not charge twice.
    processor.process(&webhook).await.unwrap();
    assert_eq!(h.gateway.calls_to("create_charge").len(), 1);
}

#[tokio::test]
async fn failed_fraud_link_keeps_the_deferred_charge() {
    let h = Harness::new();
    let mut s = settings();
    s.fraud_type = FraudType::Standalone;
    s.fraud_service_id = Some("fraud_svc".to_string());
    let s = Arc::new(s);
    let svc = CardAuthorizationService {
        gateway: h.gateway.clone(),
        store: h.store.clone(),
        settings: s.clone(),
    };
    h.gateway
        .script("fraud_check", Ok(json!({"_id": "fraud_88", "status": "inreview"})));
    h.store.save_basket(&basket("b6", CustomerRef::Guest, 3000)).await.unwrap();
    let ctx = svc.handle(&handle_input("b6", false)).await.unwrap();
    h.store.place_order("b6", "00006").await.unwrap();
    svc.authorize(
        &CardAuthorizeInput {
            order_no: "00006".to_string(),
            three_ds_token: None,
        },
        &ctx,
    )
    .await
    .unwrap();

    h.gateway
        .script("attach_fraud", Err(GatewayError::new("attach down", Some(503))));
    let processor = NotificationProcessor {
        gateway: h.gateway.clone(),
        store: h.store.clone(),
        settings: s,
    };
    let webhook = parse_notification(
        br#"{"event":"standalone_fraud_check_in_review_approved","data":{"_id":"fraud_88","status":"complete"}}"#,
    )
    .unwrap();

    processor.process(&webhook).await.unwrap();
    let order = h.order("00006").await;
    let charge_id = order.charge_id.clone().expect("charge recorded despite the failed link");
    assert_eq!(order.gateway_instrument().unwrap().charge_id.as_ref(), Some(&charge_id));
    assert!(order.notes.iter().any(|n| n.text.starts_with("Fraud attach failed.")));

    processor.process(&webhook).await.unwrap();
    assert_eq!(h.gateway.calls_to("create_charge").len(), 1);
    assert!(h.store.find_order_by_charge_id(&charge_id).await.unwrap().is_some());
}

#[tokio::test]
async fn failed_fraud_link_on_authorize_still_records_the_charge() {
    let h = Harness::new();
    let mut s = settings();
    s.fraud_type = FraudType::Standalone;
    s.fraud_service_id = Some("fraud_svc".to_string());
    let svc = service(&h, s);
    h.store.save_basket(&basket("b7", CustomerRef::Guest, 2000)).await.unwrap();
    let ctx = svc.handle(&handle_input("b7", false)).await.unwrap();
    assert!(!ctx.fraud_in_review);
    h.store.place_order("b7", "00007").await.unwrap();

    h.gateway
        .script("attach_fraud", Err(GatewayError::new("attach down", Some(503))));
    let outcome = svc
        .authorize(
            &CardAuthorizeInput {
                order_no: "00007".to_string(),
                three_ds_token: None,
            },
            &ctx,
        )
        .await
        .unwrap();
    let AuthorizeOutcome::Charged(charge) = outcome else {
        panic!("charge expected");
    };

    let order = h.order("00007").await;
    assert_eq!(order.charge_id, charge.id);
    assert_eq!(h.gateway.calls_to("attach_fraud").len(), 1);
    assert!(order.notes.iter().any(|n| n.text == "Fraud attach failed.\nattach down"));
}
