use std::path::PathBuf;

use asset_compute_commons::{
    ActionEnvironment, DeliveryTarget, DispatcherConfig, MetricsConfig, TargetKind, ACTION_NAME_ENV,
    ACTIVATION_ID_ENV, API_KEY_ENV, DEADLINE_ENV, EVENTS_URL_ENV, TEST_OUTPUT_ENV,
};

// All environment mutation lives in this one test; the variables are process-wide.
#[test]
fn loaders_read_platform_environment() {
    std::env::set_var(ACTION_NAME_ENV, "/ns/pkg/worker");
    std::env::set_var(ACTIVATION_ID_ENV, "act-42");
    std::env::set_var(DEADLINE_ENV, " 1700000000000 ");
    std::env::set_var(TEST_OUTPUT_ENV, "/tmp/asset-compute-out");
    std::env::set_var(EVENTS_URL_ENV, "https://insights.example/events");
    std::env::set_var(API_KEY_ENV, "insert-key");

    let environment = ActionEnvironment::from_env();
    assert_eq!(environment.action.namespace, "ns");
    assert_eq!(environment.action.package_qualified(), "pkg/worker");
    assert_eq!(environment.activation_id.as_deref(), Some("act-42"));
    assert_eq!(environment.deadline_ms, Some(1_700_000_000_000));
    assert!(environment.deadline().is_some());

    let dispatcher = DispatcherConfig::from_env_defaults();
    assert_eq!(
        dispatcher.test_output_dir,
        Some(PathBuf::from("/tmp/asset-compute-out"))
    );
    assert_eq!(DeliveryTarget::resolve(&dispatcher).kind(), TargetKind::Filesystem);

    let metrics = MetricsConfig::from_env_defaults();
    assert_eq!(metrics.endpoint_url.as_deref(), Some("https://insights.example/events"));
    assert_eq!(metrics.api_key.as_deref(), Some("insert-key"));

    std::env::set_var(ACTIVATION_ID_ENV, "");
    std::env::set_var(DEADLINE_ENV, "soon");
    std::env::set_var(TEST_OUTPUT_ENV, "");
    std::env::set_var(API_KEY_ENV, "");

    let environment = ActionEnvironment::from_env();
    assert_eq!(environment.activation_id, None);
    assert_eq!(environment.deadline_ms, None);
    assert_eq!(environment.deadline(), None);

    let dispatcher = DispatcherConfig::from_env_defaults();
    assert_eq!(dispatcher.test_output_dir, None);
    assert_eq!(DeliveryTarget::resolve(&dispatcher).kind(), TargetKind::None);

    let metrics = MetricsConfig::from_env_defaults();
    assert_eq!(metrics.api_key, None);

    std::env::remove_var(ACTION_NAME_ENV);
    std::env::remove_var(DEADLINE_ENV);

    let environment = ActionEnvironment::from_env();
    assert_eq!(environment, ActionEnvironment::default());
}
