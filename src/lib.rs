//! Support library for serverless asset compute actions.
//!
//! This crate provides **best-effort** event and metrics dispatch
//! for a single activation of a serverless action.
//!
//! ## Guarantees
//! - Event and metric sends never fail the caller
//! - Webhook bodies are signed (RSA-SHA256) over the exact bytes sent
//! - One delivery transport per dispatcher, resolved once
//! - A `timeout` metric is emitted if the activation nears its deadline
//!   without finishing
//!
//! ## Non-Guarantees
//! - Delivery (failures are logged and reported as metrics, not retried forever)
//! - Ordering across dispatcher or reporter instances
//! - Durability of anything except test-mode event files
//!
//! Typical use: build a [`MetricsReporter`], hand a clone of it to an
//! [`EventDispatcher`], call [`EventDispatcher::send_event`] as work
//! progresses and finish with [`MetricsReporter::activation_finished`].

mod action;
mod classify;
mod counters;
mod dispatcher;
mod error;
mod event_bus;
mod redact;
mod reporter;
mod signing;
mod transport;
mod types;

pub use action::{ActionEnvironment, ActionName, ACTION_NAME_ENV, ACTIVATION_ID_ENV, DEADLINE_ENV};
pub use classify::{ClientError, ErrorClassification, GenericError, HttpStatusError, Reason};
pub use dispatcher::{
    DeliveryTarget,
    DispatcherConfig,
    EventDispatcher,
    TargetKind,
    WebhookTarget,
    CLIENT_ID_HEADER,
    EVENT_CODE,
    FILESYSTEM_EVENTS_LOCATION,
    IO_EVENTS_LOCATION,
    ORG_ID_HEADER,
    TEST_OUTPUT_ENV,
    WEBHOOK_EVENTS_LOCATION,
};
pub use error::{DeliveryError, MetricsError, SigningError, VerificationError};
pub use event_bus::{provider_id, EventBus, EventBusCredentials, EventBusMessage, HttpEventBus, DEFAULT_EVENT_BUS_URL};
pub use redact::{redact, redact_url, redact_url_value, redacted, Redaction, DEFAULT_REDACTED_FIELDS, REDACTED};
pub use reporter::{
    AnalyticsBackend,
    HandleErrorOptions,
    InsightsBackend,
    MetricFields,
    MetricRecord,
    MetricsConfig,
    MetricsReporter,
    ACTIVATION_EVENT,
    API_KEY_ENV,
    CLIENT_ERROR_EVENT,
    ERROR_EVENT,
    EVENTS_URL_ENV,
    TIMEOUT_EVENT,
    UNKNOWN_LOCATION,
};
pub use signing::{
    decode_private_key,
    parse_signature_header,
    sign,
    verify,
    verify_webhook_body,
    verify_webhook_request,
    SIGNATURE_HEADER,
};
pub use transport::{post_with_retry, PostResponse, RetryOptions};
pub use types::{ActivationContext, AuthConfig, Event, Source, SourceAsset, WebhookConfig};
