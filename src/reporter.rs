use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action::ActionEnvironment;
use crate::classify::ErrorClassification;
use crate::counters::{metric_inc, metric_inc_labeled};
use crate::error::MetricsError;
use crate::transport::{post_with_retry, RetryOptions};
use crate::types::{ActivationContext, Source};

pub const ERROR_EVENT: &str = "error";
pub const CLIENT_ERROR_EVENT: &str = "client_error";
pub const ACTIVATION_EVENT: &str = "activation";
pub const TIMEOUT_EVENT: &str = "timeout";

/// Location used when neither the error nor the caller names one and the
/// action name is unknown.
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Environment variable naming the analytics events endpoint.
pub const EVENTS_URL_ENV: &str = "NEW_RELIC_EVENTS_URL";
/// Environment variable holding the analytics insert key.
pub const API_KEY_ENV: &str = "NEW_RELIC_API_KEY";

pub type MetricFields = Map<String, Value>;

/// One outbound analytics event: defaults, custom fields, `eventType` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord {
    fields: MetricFields,
}

impl MetricRecord {
    pub fn new(event_type: &str, defaults: &MetricFields, custom: MetricFields) -> Self {
        let mut fields = defaults.clone();
        fields.extend(custom);
        fields.insert("eventType".to_string(), Value::String(event_type.to_string()));
        fields.insert("timestamp".to_string(), Value::from(Utc::now().timestamp_millis()));
        Self { fields }
    }

    pub fn event_type(&self) -> &str {
        self.fields
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &MetricFields {
        &self.fields
    }
}

/// Sink for analytics events.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn send(&self, record: &MetricRecord) -> Result<(), MetricsError>;

    /// Release anything buffered for the activation. Must be idempotent.
    fn activation_finished(&self) {}
}

/// Analytics settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,

    /// How long before the deadline the timeout guard fires.
    pub timeout_margin: Duration,

    pub retry: RetryOptions,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            api_key: None,
            timeout_margin: Duration::from_millis(100),
            retry: RetryOptions::default().with_max_retries(2),
        }
    }
}

impl MetricsConfig {
    pub fn new(endpoint_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint_url: Some(endpoint_url.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Defaults with endpoint and key taken from the process environment.
    pub fn from_env_defaults() -> Self {
        Self {
            endpoint_url: std::env::var(EVENTS_URL_ENV).ok().filter(|v| !v.is_empty()),
            api_key: std::env::var(API_KEY_ENV).ok().filter(|v| !v.is_empty()),
            ..Self::default()
        }
    }

    pub fn with_timeout_margin(mut self, margin: Duration) -> Self {
        self.timeout_margin = margin;
        self
    }

    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }
}

impl fmt::Debug for MetricsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_margin", &self.timeout_margin)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Analytics backend that posts insights events over HTTP.
pub struct InsightsBackend {
    url: String,
    api_key: String,
    retry: RetryOptions,
    client: reqwest::Client,
}

impl InsightsBackend {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, retry: RetryOptions) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            retry,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AnalyticsBackend for InsightsBackend {
    async fn send(&self, record: &MetricRecord) -> Result<(), MetricsError> {
        let body = serde_json::to_vec(&[record])?;
        let headers = [
            ("X-Insert-Key", self.api_key.clone()),
            ("Content-Type", "application/json".to_string()),
        ];

        let response = post_with_retry(&self.client, &self.url, &headers, &body, &self.retry)
            .await
            .map_err(|e| MetricsError::Transport(e.to_string()))?;

        if !response.is_success() {
            return Err(MetricsError::Status {
                status: response.status,
                status_text: response.status_text,
            });
        }
        Ok(())
    }
}

/// Overrides applied by [`MetricsReporter::handle_error`].
#[derive(Debug, Clone, Default)]
pub struct HandleErrorOptions {
    pub location: Option<String>,
    pub message: Option<String>,
    pub metrics: MetricFields,
}

impl HandleErrorOptions {
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metrics(mut self, metrics: MetricFields) -> Self {
        self.metrics = metrics;
        self
    }
}

struct ReporterInner {
    backend: Option<Arc<dyn AnalyticsBackend>>,
    defaults: Arc<MetricFields>,
    environment: ActionEnvironment,
    timeout_margin: Duration,
    started_at: Instant,
    finished: AtomicBool,
    guard: Mutex<Option<JoinHandle<()>>>,
}

impl ReporterInner {
    async fn send(&self, event_type: &str, custom: MetricFields) {
        let Some(ref backend) = self.backend else {
            debug!(event_type, "metrics backend not configured, skipping");
            return;
        };

        let record = MetricRecord::new(event_type, &self.defaults, custom);
        match backend.send(&record).await {
            Ok(()) => {
                metric_inc_labeled("asset_compute.metrics.sent", "event_type", event_type);
                debug!(event_type, "metrics sent");
            }
            Err(err) => {
                metric_inc("asset_compute.metrics.failed");
                error!(event_type, error = %err, "failed to send metrics");
            }
        }
    }

    fn duration_fields(&self) -> MetricFields {
        let mut fields = MetricFields::new();
        fields.insert(
            "duration".to_string(),
            Value::from(millis(self.started_at.elapsed())),
        );
        fields
    }

    fn default_location(&self) -> String {
        let name = self.environment.action.short_name();
        if name.is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            name.to_string()
        }
    }
}

/// Forwards metrics for one activation to an analytics backend.
///
/// Cloning is cheap; clones share the frozen default fields and the
/// finished flag.
#[derive(Clone)]
pub struct MetricsReporter {
    inner: Arc<ReporterInner>,
}

impl MetricsReporter {
    /// Build a reporter; without endpoint and key every send is a no-op.
    pub fn new(config: &MetricsConfig, context: &ActivationContext, environment: ActionEnvironment) -> Self {
        let backend: Option<Arc<dyn AnalyticsBackend>> = match (&config.endpoint_url, &config.api_key) {
            (Some(url), Some(key)) => Some(Arc::new(InsightsBackend::new(
                url.clone(),
                key.clone(),
                config.retry.clone(),
            ))),
            _ => {
                warn!("analytics credentials missing, metrics will not be sent");
                None
            }
        };
        Self::with_backend(config, backend, context, environment)
    }

    pub fn with_backend(
        config: &MetricsConfig,
        backend: Option<Arc<dyn AnalyticsBackend>>,
        context: &ActivationContext,
        environment: ActionEnvironment,
    ) -> Self {
        let defaults = default_fields(context, &environment);
        Self {
            inner: Arc::new(ReporterInner {
                backend,
                defaults: Arc::new(defaults),
                environment,
                timeout_margin: config.timeout_margin,
                started_at: Instant::now(),
                finished: AtomicBool::new(false),
                guard: Mutex::new(None),
            }),
        }
    }

    /// The frozen fields merged into every record.
    pub fn default_fields(&self) -> Arc<MetricFields> {
        Arc::clone(&self.inner.defaults)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Arm the timeout guard if the activation has a known deadline.
    ///
    /// The guard fires `timeout_margin` before the deadline and sends a
    /// `timeout` metric unless the activation finished first.
    pub async fn start(&self) {
        if self.is_finished() {
            return;
        }
        let Some(remaining) = self.inner.environment.remaining(Utc::now()) else {
            debug!("no deadline known, timeout guard not armed");
            return;
        };

        let mut guard = self.inner.guard.lock().await;
        if guard.is_some() {
            return;
        }

        let delay = remaining.saturating_sub(self.inner.timeout_margin);
        let inner = Arc::clone(&self.inner);
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner
                .finished
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            warn!(
                action = %inner.environment.action.package_qualified(),
                "activation is about to hit its deadline"
            );
            metric_inc("asset_compute.metrics.timeout");
            let fields = inner.duration_fields();
            inner.send(TIMEOUT_EVENT, fields).await;
            if let Some(ref backend) = inner.backend {
                backend.activation_finished();
            }
        }));
        debug!(delay_ms = millis(delay), "timeout guard armed");
    }

    /// Send `custom` merged over the default fields. Never fails.
    pub async fn send_metrics(&self, event_type: &str, custom: MetricFields) {
        self.inner.send(event_type, custom).await;
    }

    pub async fn send_error_metrics(&self, location: &str, message: &str, extra: MetricFields) {
        let mut fields = MetricFields::new();
        fields.insert("location".to_string(), Value::String(location.to_string()));
        fields.insert("message".to_string(), Value::String(message.to_string()));
        fields.extend(extra);
        self.send_metrics(ERROR_EVENT, fields).await;
    }

    pub async fn send_client_error_metrics(&self, reason: &str, message: &str, extra: MetricFields) {
        let mut fields = MetricFields::new();
        fields.insert("reason".to_string(), Value::String(reason.to_string()));
        fields.insert("message".to_string(), Value::String(message.to_string()));
        fields.extend(extra);
        self.send_metrics(CLIENT_ERROR_EVENT, fields).await;
    }

    /// Classify `error` and report it as a client error or an error metric.
    pub async fn handle_error(&self, error: &(dyn StdError + 'static), options: HandleErrorOptions) {
        let HandleErrorOptions {
            location,
            message: message_override,
            metrics: mut extra,
        } = options;

        match ErrorClassification::of(error) {
            ErrorClassification::Client { reason, message } => {
                let message = message_override.unwrap_or(message);
                self.send_client_error_metrics(reason.as_str(), &message, extra).await;
            }
            ErrorClassification::Generic {
                location: own_location,
                message,
            } => {
                let location = own_location
                    .or(location)
                    .unwrap_or_else(|| self.inner.default_location());
                let message = message_override.unwrap_or(message);
                self.send_error_metrics(&location, &message, extra).await;
            }
            ErrorClassification::Unclassified { message, status_code } => {
                let location = location.unwrap_or_else(|| self.inner.default_location());
                let message = message_override.unwrap_or(message);
                if let Some(code) = status_code {
                    extra.insert("statusCode".to_string(), Value::from(code));
                }
                self.send_error_metrics(&location, &message, extra).await;
            }
        }
    }

    /// Finish the activation: optionally send the `activation` metric and
    /// disarm the timeout guard. Only the first call has any effect.
    pub async fn activation_finished(&self, extra: MetricFields, send_activation: bool) {
        if self
            .inner
            .finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("activation already finished");
            return;
        }

        if let Some(handle) = self.inner.guard.lock().await.take() {
            handle.abort();
        }

        if send_activation {
            let mut fields = self.inner.duration_fields();
            fields.extend(extra);
            self.send_metrics(ACTIVATION_EVENT, fields).await;
        }

        if let Some(ref backend) = self.inner.backend {
            backend.activation_finished();
        }
        info!("activation finished");
    }

    /// Disarm the timeout guard without sending an `activation` metric.
    pub async fn close(&self) {
        self.activation_finished(MetricFields::new(), false).await;
    }
}

impl fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("enabled", &self.inner.backend.is_some())
            .field("defaults", &self.inner.defaults)
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_fields(context: &ActivationContext, environment: &ActionEnvironment) -> MetricFields {
    let mut fields = MetricFields::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            fields.insert(key.to_string(), value);
        }
    };

    let text = |value: &Option<String>| value.clone().map(Value::String);
    let non_empty = |value: &str| (!value.is_empty()).then(|| Value::String(value.to_string()));

    put("requestId", text(&context.request_id));
    put("ingestionId", text(&context.ingestion_id));
    put("orgId", text(&context.org_id));
    put("clientId", text(&context.client_id));
    put("appName", text(&context.app_name));

    if let Some(asset) = context.source.as_ref().and_then(Source::asset) {
        put("sourceName", text(&asset.name));
        put("sourceMimetype", text(&asset.mimetype));
        put("sourceSize", asset.size.map(Value::from));
    }

    let action = &environment.action;
    put("actionName", non_empty(action.package_qualified().as_str()));
    put("namespace", non_empty(action.namespace.as_str()));
    put("package", non_empty(action.package.as_str()));
    put("activationId", text(&environment.activation_id));

    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceAsset;
    use httpmock::prelude::*;
    use serde_json::json;

    fn object(value: Value) -> MetricFields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn config_deserializes_from_partial_params() {
        let config: MetricsConfig =
            serde_json::from_value(json!({"endpointUrl": "https://insights", "apiKey": "k"})).unwrap();

        assert_eq!(config.endpoint_url.as_deref(), Some("https://insights"));
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.timeout_margin, Duration::from_millis(100));
        assert_eq!(config.retry, MetricsConfig::default().retry);
    }

    #[test]
    fn default_fields_collect_context_and_identity() {
        let context = ActivationContext::new("req-1")
            .with_ingestion_id("ing-1")
            .with_source(Source::Asset(SourceAsset {
                url: Some("https://example.com/a.png".to_string()),
                name: Some("a.png".to_string()),
                mimetype: Some("image/png".to_string()),
                size: Some(42),
            }));
        let env = ActionEnvironment::new("/ns/pkg/worker").with_activation_id("act-1");

        let fields = default_fields(&context, &env);
        assert_eq!(
            Value::Object(fields),
            json!({
                "requestId": "req-1",
                "ingestionId": "ing-1",
                "sourceName": "a.png",
                "sourceMimetype": "image/png",
                "sourceSize": 42,
                "actionName": "pkg/worker",
                "namespace": "ns",
                "package": "pkg",
                "activationId": "act-1",
            })
        );
    }

    #[test]
    fn record_fields_override_defaults_but_not_event_type() {
        let defaults = object(json!({"requestId": "req-1", "orgId": "org"}));
        let custom = object(json!({"orgId": "override", "eventType": "spoofed", "size": 3}));

        let record = MetricRecord::new("rendition", &defaults, custom);
        assert_eq!(record.event_type(), "rendition");
        assert_eq!(record.get("orgId"), Some(&json!("override")));
        assert_eq!(record.get("requestId"), Some(&json!("req-1")));
        assert_eq!(record.get("size"), Some(&json!(3)));
        assert!(record.get("timestamp").and_then(Value::as_i64).is_some());
    }

    #[tokio::test]
    async fn insights_backend_posts_array_with_insert_key() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/events")
                    .header("X-Insert-Key", "key")
                    .body_contains("\"eventType\":\"activation\"");
                then.status(200);
            })
            .await;

        let backend = InsightsBackend::new(server.url("/events"), "key", RetryOptions::none());
        let record = MetricRecord::new(ACTIVATION_EVENT, &MetricFields::new(), MetricFields::new());
        backend.send(&record).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn reporter_swallows_backend_failures() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/events");
                then.status(500);
            })
            .await;

        let config = MetricsConfig::new(server.url("/events"), "key").with_retry(RetryOptions::none());
        let reporter = MetricsReporter::new(&config, &ActivationContext::new("req-1"), ActionEnvironment::default());

        reporter.send_metrics("rendition", MetricFields::new()).await;
        mock.assert_hits_async(1).await;
    }

    #[test]
    fn config_debug_hides_api_key() {
        let config = MetricsConfig::new("https://insights", "super-secret");
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
