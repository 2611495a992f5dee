use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::counters::{metric_inc, metric_inc_labeled};
use crate::error::DeliveryError;
use crate::event_bus::{provider_id, EventBus, EventBusCredentials, EventBusMessage, HttpEventBus, DEFAULT_EVENT_BUS_URL};
use crate::reporter::{MetricFields, MetricsReporter};
use crate::signing::{decode_private_key, sign, SIGNATURE_HEADER};
use crate::transport::{post_with_retry, RetryOptions};
use crate::types::{ActivationContext, AuthConfig, Event, WebhookConfig};

/// Event code every event is published under.
pub const EVENT_CODE: &str = "asset_compute";

/// Error metric location for event bus failures.
pub const IO_EVENTS_LOCATION: &str = "IOEvents";
/// Error metric location for webhook failures.
pub const WEBHOOK_EVENTS_LOCATION: &str = "WebhookEvents";
/// Error metric location for failures writing test events to disk.
pub const FILESYSTEM_EVENTS_LOCATION: &str = "FilesystemEvents";

pub const ORG_ID_HEADER: &str = "x-ims-org-id";
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Environment variable naming the test output directory.
pub const TEST_OUTPUT_ENV: &str = "ASSET_COMPUTE_UNIT_TEST_OUT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatcherConfig {
    pub auth: AuthConfig,
    pub webhook: Option<WebhookConfig>,

    /// When set, events are written below `<dir>/events/` instead of sent.
    pub test_output_dir: Option<PathBuf>,

    pub event_bus_url: String,
    pub retry: RetryOptions,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            webhook: None,
            test_output_dir: None,
            event_bus_url: DEFAULT_EVENT_BUS_URL.to_string(),
            retry: RetryOptions::default(),
        }
    }
}

impl DispatcherConfig {
    /// Defaults with the test output directory taken from the environment.
    pub fn from_env_defaults() -> Self {
        Self {
            test_output_dir: std::env::var_os(TEST_OUTPUT_ENV)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_webhook(mut self, webhook: WebhookConfig) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn with_test_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.test_output_dir = Some(dir.into());
        self
    }

    pub fn with_event_bus_url(mut self, url: impl Into<String>) -> Self {
        self.event_bus_url = url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }
}

/// Webhook destination resolved from configuration.
///
/// Missing pieces are kept as `None` so a send can refuse with a
/// configuration error instead of silently switching transports.
#[derive(Clone)]
pub struct WebhookTarget {
    pub url: String,
    pub org_id: Option<String>,
    pub client_id: Option<String>,
    pub private_key: Option<String>,
}

impl fmt::Debug for WebhookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookTarget")
            .field("url", &self.url)
            .field("org_id", &self.org_id)
            .field("client_id", &self.client_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where events of one dispatcher go.
#[derive(Debug, Clone)]
pub enum DeliveryTarget {
    Filesystem { dir: PathBuf },
    Webhook(WebhookTarget),
    EventBus(EventBusCredentials),
    None,
}

/// Discriminant of [`DeliveryTarget`], for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Filesystem,
    Webhook,
    EventBus,
    None,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl DeliveryTarget {
    /// Pick the transport, in priority order: filesystem, webhook,
    /// event bus, none.
    pub fn resolve(config: &DispatcherConfig) -> Self {
        if let Some(ref dir) = config.test_output_dir {
            return DeliveryTarget::Filesystem {
                dir: dir.join("events"),
            };
        }

        if let Some(webhook) = config.webhook.as_ref().filter(|w| !w.url.is_empty()) {
            return DeliveryTarget::Webhook(WebhookTarget {
                url: webhook.url.clone(),
                org_id: present(&config.auth.org_id).map(str::to_string),
                client_id: present(&config.auth.client_id).map(str::to_string),
                private_key: present(&webhook.private_key).map(str::to_string),
            });
        }

        let auth = &config.auth;
        if let (Some(access_token), Some(org_id), Some(client_id)) =
            (present(&auth.access_token), present(&auth.org_id), present(&auth.client_id))
        {
            return DeliveryTarget::EventBus(EventBusCredentials {
                access_token: access_token.to_string(),
                org_id: org_id.to_string(),
                client_id: client_id.to_string(),
                provider_id: provider_id(org_id, client_id),
            });
        }

        DeliveryTarget::None
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            DeliveryTarget::Filesystem { .. } => TargetKind::Filesystem,
            DeliveryTarget::Webhook(_) => TargetKind::Webhook,
            DeliveryTarget::EventBus(_) => TargetKind::EventBus,
            DeliveryTarget::None => TargetKind::None,
        }
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    user_guid: &'a str,
    event_code: &'a str,
    event: &'a Event,
}

/// Sends business events for one activation.
///
/// Delivery is best effort: [`send_event`](Self::send_event) never fails.
/// Failures are logged and, when a [`MetricsReporter`] was supplied,
/// reported as `error` metrics.
pub struct EventDispatcher {
    target: DeliveryTarget,
    context: ActivationContext,
    metrics: Option<MetricsReporter>,
    event_bus: Option<Arc<dyn EventBus>>,
    http_client: reqwest::Client,
    retry: RetryOptions,
    /// Index of the next event file; advances only on a successful write.
    next_file: Mutex<usize>,
}

impl EventDispatcher {
    pub fn new(config: &DispatcherConfig, context: ActivationContext, metrics: Option<MetricsReporter>) -> Self {
        let target = DeliveryTarget::resolve(config);
        let event_bus: Option<Arc<dyn EventBus>> = match target {
            DeliveryTarget::EventBus(ref credentials) => Some(Arc::new(HttpEventBus::new(
                credentials.clone(),
                config.event_bus_url.clone(),
            ))),
            _ => None,
        };

        debug!(transport = ?target.kind(), "event dispatcher created");

        Self {
            target,
            context,
            metrics,
            event_bus,
            http_client: reqwest::Client::new(),
            retry: config.retry.clone(),
            next_file: Mutex::new(0),
        }
    }

    /// Replace the event bus client used by the event bus target.
    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn target(&self) -> &DeliveryTarget {
        &self.target
    }

    pub fn context(&self) -> &ActivationContext {
        &self.context
    }

    /// Build an event from `payload` and deliver it to the resolved target.
    ///
    /// `payload` must serialize to a JSON object (or `null`).
    pub async fn send_event<P>(&self, event_type: &str, payload: &P)
    where
        P: Serialize + ?Sized,
    {
        let (location, result) = match self.target {
            DeliveryTarget::None => {
                info!(event_type, "no event target configured, event not sent");
                return;
            }
            DeliveryTarget::Filesystem { ref dir } => (
                FILESYSTEM_EVENTS_LOCATION,
                self.write_event(dir, event_type, payload).await,
            ),
            DeliveryTarget::Webhook(ref target) => (
                WEBHOOK_EVENTS_LOCATION,
                self.post_webhook(target, event_type, payload).await,
            ),
            DeliveryTarget::EventBus(_) => (
                IO_EVENTS_LOCATION,
                self.publish(event_type, payload).await,
            ),
        };

        self.settle(location, event_type, result).await;
    }

    fn build_event<P>(&self, event_type: &str, payload: &P) -> Result<Event, DeliveryError>
    where
        P: Serialize + ?Sized,
    {
        let fields = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(DeliveryError::Serialization(<serde_json::Error as serde::ser::Error>::custom(
                    "event payload must be a JSON object",
                )))
            }
        };
        Ok(Event::new(event_type, fields, &self.context, Utc::now()))
    }

    async fn write_event<P>(&self, dir: &Path, event_type: &str, payload: &P) -> Result<(), DeliveryError>
    where
        P: Serialize + ?Sized,
    {
        let event = self.build_event(event_type, payload)?;
        let json = serde_json::to_vec(&event)?;

        tokio::fs::create_dir_all(dir).await?;
        let mut next_file = self.next_file.lock().await;
        let path = dir.join(format!("event{}.json", *next_file));
        tokio::fs::write(&path, json).await?;
        *next_file += 1;

        debug!(path = %path.display(), "event written");
        Ok(())
    }

    async fn post_webhook<P>(&self, target: &WebhookTarget, event_type: &str, payload: &P) -> Result<(), DeliveryError>
    where
        P: Serialize + ?Sized,
    {
        let Some(ref encoded_key) = target.private_key else {
            return Err(DeliveryError::Configuration(
                "webhook delivery requires a signing key".to_string(),
            ));
        };
        let org_id = target.org_id.as_deref().ok_or_else(|| {
            DeliveryError::Configuration("webhook delivery requires an org id".to_string())
        })?;
        let client_id = target.client_id.as_deref().ok_or_else(|| {
            DeliveryError::Configuration("webhook delivery requires a client id".to_string())
        })?;

        let event = self.build_event(event_type, payload)?;
        let body = serde_json::to_vec(&WebhookBody {
            user_guid: org_id,
            event_code: EVENT_CODE,
            event: &event,
        })?;

        // The signature covers exactly these bytes; nothing may re-serialize them.
        let private_key = decode_private_key(encoded_key)?;
        let signature = sign(&body, &private_key)?;

        let headers = [
            (ORG_ID_HEADER, org_id.to_string()),
            (CLIENT_ID_HEADER, client_id.to_string()),
            (SIGNATURE_HEADER, signature),
            ("Content-Type", "application/json".to_string()),
        ];

        let response = post_with_retry(&self.http_client, &target.url, &headers, &body, &self.retry).await?;
        if !matches!(response.status, 200 | 202) {
            return Err(DeliveryError::Status {
                status: response.status,
                status_text: response.status_text,
            });
        }
        Ok(())
    }

    async fn publish<P>(&self, event_type: &str, payload: &P) -> Result<(), DeliveryError>
    where
        P: Serialize + ?Sized,
    {
        let Some(ref event_bus) = self.event_bus else {
            return Err(DeliveryError::Configuration(
                "event bus client is not configured".to_string(),
            ));
        };

        let event = self.build_event(event_type, payload)?;
        let message = EventBusMessage {
            code: EVENT_CODE.to_string(),
            payload: event,
        };
        event_bus.send_event(message, &self.retry).await
    }

    /// Turn the outcome of a delivery attempt into logs and metrics.
    async fn settle(&self, location: &'static str, event_type: &str, result: Result<(), DeliveryError>) {
        match result {
            Ok(()) => {
                metric_inc("asset_compute.events.sent");
                info!(event_type, transport = ?self.target.kind(), "event sent");
            }
            Err(err) => {
                metric_inc_labeled("asset_compute.events.failed", "location", location);
                error!(event_type, location, error = %err, "failed to send event");

                if let Some(ref metrics) = self.metrics {
                    let mut extra = MetricFields::new();
                    extra.insert("eventName".to_string(), Value::String(event_type.to_string()));
                    metrics
                        .send_error_metrics(location, &format!("Error sending event: {}", err), extra)
                        .await;
                }
            }
        }
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("target", &self.target)
            .field("context", &self.context)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
