//! Local process counters, compiled in with the `metrics` feature.

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc(_name: &'static str) {}

#[cfg(feature = "metrics")]
pub(crate) fn metric_inc_labeled(name: &'static str, label: &'static str, value: &str) {
    metrics::increment_counter!(name, label => value.to_string());
}

#[cfg(not(feature = "metrics"))]
pub(crate) fn metric_inc_labeled(_name: &'static str, _label: &'static str, _value: &str) {}
