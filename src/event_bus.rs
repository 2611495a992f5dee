use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::DeliveryError;
use crate::transport::{post_with_retry, RetryOptions};
use crate::types::Event;

/// Default ingress endpoint of the event bus.
pub const DEFAULT_EVENT_BUS_URL: &str = "https://eg-ingress.adobe.io/api/events";

/// Deterministic provider id scoping events to one organization and client.
pub fn provider_id(org_id: &str, client_id: &str) -> String {
    format!("asset_compute_{}_{}", org_id, client_id)
}

/// A provider-scoped message for the event bus.
#[derive(Debug, Clone, Serialize)]
pub struct EventBusMessage {
    pub code: String,
    pub payload: Event,
}

/// Client for the durable event bus.
///
/// Implementations retry according to `retry` and return an error only
/// after the policy is exhausted.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn send_event(&self, message: EventBusMessage, retry: &RetryOptions) -> Result<(), DeliveryError>;
}

/// Credentials the event bus client is built from.
#[derive(Clone)]
pub struct EventBusCredentials {
    pub access_token: String,
    pub org_id: String,
    pub client_id: String,
    pub provider_id: String,
}

impl fmt::Debug for EventBusCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusCredentials")
            .field("access_token", &"<redacted>")
            .field("org_id", &self.org_id)
            .field("client_id", &self.client_id)
            .field("provider_id", &self.provider_id)
            .finish()
    }
}

/// Event bus client publishing over HTTP.
pub struct HttpEventBus {
    credentials: EventBusCredentials,
    url: String,
    client: reqwest::Client,
}

impl HttpEventBus {
    pub fn new(credentials: EventBusCredentials, url: impl Into<String>) -> Self {
        Self {
            credentials,
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.credentials.provider_id
    }
}

#[async_trait]
impl EventBus for HttpEventBus {
    async fn send_event(&self, message: EventBusMessage, retry: &RetryOptions) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(&message.payload)?;
        let headers = [
            ("Authorization", format!("Bearer {}", self.credentials.access_token)),
            ("x-api-key", self.credentials.client_id.clone()),
            ("x-ims-org-id", self.credentials.org_id.clone()),
            ("x-adobe-event-code", message.code.clone()),
            ("x-adobe-event-provider-id", self.credentials.provider_id.clone()),
            ("Content-Type", "application/json".to_string()),
        ];

        let response = post_with_retry(&self.client, &self.url, &headers, &body, retry).await?;
        if !response.is_success() {
            return Err(DeliveryError::Status {
                status: response.status,
                status_text: response.status_text,
            });
        }

        debug!(provider_id = %self.credentials.provider_id, code = %message.code, "event published");
        Ok(())
    }
}
