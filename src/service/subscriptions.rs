use crate::config::GatewaySettings;
use crate::domain::charge::NotificationSubscription;
use crate::error::SubscriptionError;
use crate::gateways::{GatewayApi, NotificationQuery, NotificationSubscriptionRequest};
use crate::service::notifications::NotificationEvent;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOperation {
    Search,
    Create,
    Delete,
}

impl SubscriptionOperation {
    pub fn parse(raw: Option<&str>) -> Result<Self, SubscriptionError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Err(SubscriptionError::MissingOperation),
            Some("search") => Ok(SubscriptionOperation::Search),
            Some("create") => Ok(SubscriptionOperation::Create),
            Some("delete") => Ok(SubscriptionOperation::Delete),
            Some(other) => Err(SubscriptionError::InvalidOperation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionReport {
    pub created_notifications_for: Vec<String>,
    pub existing_already_notifications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubscriptionResult {
    Found(Vec<NotificationSubscription>),
    Created(SubscriptionReport),
    Deleted(Vec<String>),
}

/// Keeps the gateway's webhook subscriptions for this store's notification endpoint in sync.
#[derive(Clone)]
pub struct SubscriptionService {
    pub gateway: Arc<dyn GatewayApi>,
    pub settings: Arc<GatewaySettings>,
}

impl SubscriptionService {
    pub async fn handle(&self, operation: Option<&str>) -> Result<SubscriptionResult, SubscriptionError> {
        let result = match SubscriptionOperation::parse(operation)? {
            SubscriptionOperation::Search => SubscriptionResult::Found(self.search().await?),
            SubscriptionOperation::Create => SubscriptionResult::Created(self.create_missing().await?),
            SubscriptionOperation::Delete => SubscriptionResult::Deleted(self.delete_all().await?),
        };
        Ok(result)
    }

    pub async fn search(&self) -> Result<Vec<NotificationSubscription>, SubscriptionError> {
        let found = self
            .gateway
            .search_notifications(&NotificationQuery::all_webhooks())
            .await
            .map_err(|e| {
                tracing::error!(gateway = self.gateway.name(), operation = "search_notifications", error = %e, "notification search failed");
                e
            })?;
        Ok(found)
    }

    /// Subscribes every supported event at the destination that is not subscribed yet.
    pub async fn create_missing(&self) -> Result<SubscriptionReport, SubscriptionError> {
        let destination = self.destination()?;
        let existing: HashSet<String> = self
            .search()
            .await?
            .into_iter()
            .filter(|sub| sub.destination.as_deref() == Some(destination))
            .filter_map(|sub| sub.event)
            .collect();

        let mut report = SubscriptionReport::default();
        for event in NotificationEvent::ALL {
            let name = event.as_str().to_string();
            if existing.contains(&name) {
                report.existing_already_notifications.push(name);
                continue;
            }
            let request = NotificationSubscriptionRequest {
                kind: "webhook".to_string(),
                destination: destination.to_string(),
                event: name.clone(),
                transaction_only: false,
            };
            self.gateway.create_notification(&request).await.map_err(|e| {
                tracing::error!(
                    gateway = self.gateway.name(),
                    event = %name,
                    operation = "create_notification",
                    error = %e,
                    "notification subscription failed"
                );
                e
            })?;
            report.created_notifications_for.push(name);
        }

        tracing::info!(
            created = report.created_notifications_for.len(),
            existing = report.existing_already_notifications.len(),
            "notification subscriptions synced"
        );
        Ok(report)
    }

    /// Removes every subscription pointing at the destination. Returns the removed ids.
    pub async fn delete_all(&self) -> Result<Vec<String>, SubscriptionError> {
        let destination = self.destination()?;
        let mut deleted = Vec::new();
        for sub in self.search().await? {
            if sub.destination.as_deref() != Some(destination) {
                continue;
            }
            let Some(id) = sub.id else { continue };
            self.gateway.delete_notification(&id).await?;
            deleted.push(id);
        }
        tracing::info!(deleted = deleted.len(), "notification subscriptions removed");
        Ok(deleted)
    }

    fn destination(&self) -> Result<&str, SubscriptionError> {
        let url = self.settings.notification_url.trim();
        if url.is_empty() {
            return Err(SubscriptionError::MissingDestination);
        }
        Ok(url)
    }
}
