use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Credentials identifying the calling organization and client.
///
/// Secrets are omitted from the `Debug` output.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    pub access_token: Option<String>,
    pub org_id: Option<String>,
    pub client_id: Option<String>,
    pub app_name: Option<String>,
}

impl AuthConfig {
    pub fn new(org_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            org_id: Some(org_id.into()),
            client_id: Some(client_id.into()),
            ..Default::default()
        }
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("org_id", &self.org_id)
            .field("client_id", &self.client_id)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Webhook delivery settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,

    /// RSA private key in PEM form, base64-encoded for transport.
    pub private_key: Option<String>,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            private_key: None,
        }
    }

    pub fn with_private_key(mut self, encoded_pem: impl Into<String>) -> Self {
        self.private_key = Some(encoded_pem.into());
        self
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Descriptor of the asset an activation works on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceAsset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// The source as supplied by the caller: a bare reference or a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Reference(String),
    Asset(SourceAsset),
}

impl Source {
    /// Flattened form used in events: the URL when there is one,
    /// otherwise the raw value.
    pub fn to_event_value(&self) -> Value {
        match self {
            Source::Reference(reference) => Value::String(reference.clone()),
            Source::Asset(SourceAsset { url: Some(url), .. }) => Value::String(url.clone()),
            Source::Asset(asset) => serde_json::to_value(asset).unwrap_or(Value::Null),
        }
    }

    pub fn asset(&self) -> Option<&SourceAsset> {
        match self {
            Source::Asset(asset) => Some(asset),
            Source::Reference(_) => None,
        }
    }
}

/// Identity of the current unit of work.
///
/// Captured once when a reporter or dispatcher is built and never
/// changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationContext {
    pub request_id: Option<String>,
    pub ingestion_id: Option<String>,
    pub org_id: Option<String>,
    pub client_id: Option<String>,
    pub app_name: Option<String>,
    pub source: Option<Source>,
    pub user_data: Option<Value>,
}

impl ActivationContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Default::default()
        }
    }

    /// Copy the organization, client and application name from credentials.
    pub fn with_auth(mut self, auth: &AuthConfig) -> Self {
        self.org_id = auth.org_id.clone();
        self.client_id = auth.client_id.clone();
        self.app_name = auth.app_name.clone();
        self
    }

    pub fn with_ingestion_id(mut self, ingestion_id: impl Into<String>) -> Self {
        self.ingestion_id = Some(ingestion_id.into());
        self
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_user_data(mut self, user_data: Value) -> Self {
        self.user_data = Some(user_data);
        self
    }
}

/// A typed occurrence ready to be delivered.
///
/// Serializes as a single flat JSON object: the caller's payload with
/// `type`, `date`, `requestId`, `source` and `userData` written over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    pub fn new(
        event_type: &str,
        payload: Map<String, Value>,
        context: &ActivationContext,
        date: DateTime<Utc>,
    ) -> Self {
        let mut fields = payload;
        fields.insert("type".to_string(), Value::String(event_type.to_string()));
        fields.insert(
            "date".to_string(),
            Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        if let Some(ref request_id) = context.request_id {
            fields.insert("requestId".to_string(), Value::String(request_id.clone()));
        }
        if let Some(ref source) = context.source {
            fields.insert("source".to_string(), source.to_event_value());
        }
        if let Some(ref user_data) = context.user_data {
            fields.insert("userData".to_string(), user_data.clone());
        }
        Self { fields }
    }

    pub fn event_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_date() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T10:00:00.123Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn event_context_overrides_payload() {
        let context = ActivationContext::new("req-1").with_user_data(json!({"job": 7}));
        let payload = json!({"type": "spoofed", "rendition": {"name": "thumb.png"}});
        let Value::Object(payload) = payload else { unreachable!() };

        let event = Event::new("rendition_created", payload, &context, fixed_date());

        assert_eq!(
            Value::Object(event.fields().clone()),
            json!({
                "type": "rendition_created",
                "date": "2024-05-01T10:00:00.123Z",
                "requestId": "req-1",
                "userData": {"job": 7},
                "rendition": {"name": "thumb.png"},
            })
        );
        assert_eq!(event.event_type(), Some("rendition_created"));
    }

    #[test]
    fn source_flattens_to_url() {
        let with_url = Source::Asset(SourceAsset {
            url: Some("https://example.com/a.jpg".to_string()),
            name: Some("a.jpg".to_string()),
            ..Default::default()
        });
        assert_eq!(with_url.to_event_value(), json!("https://example.com/a.jpg"));

        let reference = Source::Reference("s3://bucket/a.jpg".to_string());
        assert_eq!(reference.to_event_value(), json!("s3://bucket/a.jpg"));

        let bare = Source::Asset(SourceAsset {
            name: Some("a.jpg".to_string()),
            ..Default::default()
        });
        assert_eq!(bare.to_event_value(), json!({"name": "a.jpg"}));
    }

    #[test]
    fn source_deserializes_from_string_or_object() {
        let source: Source = serde_json::from_value(json!("https://example.com/a.jpg")).unwrap();
        assert!(matches!(source, Source::Reference(_)));

        let source: Source =
            serde_json::from_value(json!({"url": "https://example.com/a.jpg", "size": 12})).unwrap();
        assert_eq!(source.asset().and_then(|a| a.size), Some(12));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let auth = AuthConfig::new("org", "client").with_access_token("secret-token");
        let webhook = WebhookConfig::new("https://hook").with_private_key("c2VjcmV0");
        assert!(!format!("{:?}", auth).contains("secret-token"));
        assert!(!format!("{:?}", webhook).contains("c2VjcmV0"));
    }
}
