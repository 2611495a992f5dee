#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use asset_compute_commons::{
    ActionEnvironment, ActivationContext, AnalyticsBackend, MetricRecord, MetricsConfig, MetricsError,
    MetricsReporter,
};
use async_trait::async_trait;

pub const PRIVATE_KEY: &str = include_str!("../fixtures/private_key.pem");
pub const PUBLIC_KEY: &str = include_str!("../fixtures/public_key.pem");

/// Analytics backend that keeps every record in memory.
#[derive(Default)]
pub struct RecordingBackend {
    records: Mutex<Vec<MetricRecord>>,
    finished_calls: AtomicUsize,
}

impl RecordingBackend {
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<MetricRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event_type() == event_type)
            .collect()
    }

    pub fn finished_calls(&self) -> usize {
        self.finished_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalyticsBackend for RecordingBackend {
    async fn send(&self, record: &MetricRecord) -> Result<(), MetricsError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn activation_finished(&self) {
        self.finished_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn recording_reporter(
    context: &ActivationContext,
    environment: ActionEnvironment,
) -> (MetricsReporter, Arc<RecordingBackend>) {
    recording_reporter_with(&MetricsConfig::default(), context, environment)
}

pub fn recording_reporter_with(
    config: &MetricsConfig,
    context: &ActivationContext,
    environment: ActionEnvironment,
) -> (MetricsReporter, Arc<RecordingBackend>) {
    let backend = Arc::new(RecordingBackend::default());
    let shared: Arc<dyn AnalyticsBackend> = backend.clone();
    let reporter = MetricsReporter::with_backend(config, Some(shared), context, environment);
    (reporter, backend)
}
