pub mod config;
pub mod domain {
    pub mod charge;
    pub mod context;
    pub mod payment;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod charge_operations;
        pub mod notifications;
        pub mod ops;
        pub mod subscriptions;
    }
    pub mod middleware {
        pub mod admin_auth;
    }
    pub mod routes;
}
pub mod repo {
    pub mod memory_store;
    pub mod order_store;
    pub mod pg_store;
}
pub mod service {
    pub mod authorization;
    pub mod buttons;
    pub mod charge_operations;
    pub mod notifications;
    pub mod reconciliation;
    pub mod subscriptions;
    pub mod sweep;
}

use config::GatewaySettings;
use gateways::GatewayApi;
use repo::order_store::OrderStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<GatewaySettings>,
    pub store: Arc<dyn OrderStore>,
    pub notifications: service::notifications::NotificationProcessor,
    pub charge_operations: service::charge_operations::ChargeOperationsService,
    pub subscriptions: service::subscriptions::SubscriptionService,
}

impl AppState {
    pub fn new(gateway: Arc<dyn GatewayApi>, store: Arc<dyn OrderStore>, settings: GatewaySettings) -> Self {
        let settings = Arc::new(settings);
        Self {
            notifications: service::notifications::NotificationProcessor {
                gateway: gateway.clone(),
                store: store.clone(),
                settings: settings.clone(),
            },
            charge_operations: service::charge_operations::ChargeOperationsService {
                gateway: gateway.clone(),
                store: store.clone(),
                settings: settings.clone(),
            },
            subscriptions: service::subscriptions::SubscriptionService {
                gateway,
                settings: settings.clone(),
            },
            settings,
            store,
        }
    }
}
