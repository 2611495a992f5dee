use asset_compute_commons::{
    ActionEnvironment, ActivationContext, AuthConfig, DispatcherConfig, EventDispatcher, GenericError,
    HandleErrorOptions, MetricFields, MetricsConfig, MetricsReporter, Source,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("asset_compute_commons=debug".parse().unwrap()))
        .init();

    let auth = AuthConfig::new("org@AdobeOrg", "my-client").with_app_name("demo");
    let context = ActivationContext::new("req-123")
        .with_auth(&auth)
        .with_source(Source::Reference("https://example.com/photo.jpg".to_string()));

    let environment = ActionEnvironment::from_env();
    let metrics = MetricsReporter::new(&MetricsConfig::from_env_defaults(), &context, environment);
    metrics.start().await;

    let out_dir = std::env::temp_dir().join("asset-compute-demo");
    let config = DispatcherConfig::from_env_defaults()
        .with_auth(auth)
        .with_test_output_dir(&out_dir);
    let dispatcher = EventDispatcher::new(&config, context, Some(metrics.clone()));

    dispatcher
        .send_event("rendition_created", &json!({"rendition": {"fmt": "png"}}))
        .await;

    let err = GenericError::new("thumbnail step failed").with_location("thumbnail");
    metrics.handle_error(&err, HandleErrorOptions::default()).await;

    metrics.activation_finished(MetricFields::new(), true).await;
    println!("events written to {}", out_dir.join("events").display());
}
