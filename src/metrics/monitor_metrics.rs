//! Config monitor metrics using OpenTelemetry.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::sync::Arc;
use std::time::Instant;

/// Metrics collector for config monitor parse cycles.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_policy::metrics::MonitorMetrics;
/// use opentelemetry::global;
///
/// let metrics = MonitorMetrics::new(global::meter("hotswap-policy"));
///
/// let timer = metrics.start_parse();
/// // ... decode and extract ...
/// metrics.record_parse_success(timer);
///
/// // Between parses, refresh the age gauge yourself
/// metrics.update_config_age();
/// ```
#[derive(Clone)]
pub struct MonitorMetrics {
    parse_attempts: Counter<u64>,
    parse_success: Counter<u64>,
    parse_failures: Counter<u64>,
    parse_duration: Histogram<f64>,
    config_age_seconds: Gauge<i64>,
    registered_callbacks: Gauge<i64>,
    callback_panics: Counter<u64>,
    last_update: Arc<parking_lot::Mutex<Instant>>,
}

impl MonitorMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let parse_attempts = meter
            .u64_counter("hotswap_policy.parse.attempts")
            .with_description("Total number of parse attempts")
            .build();

        let parse_success = meter
            .u64_counter("hotswap_policy.parse.success")
            .with_description("Number of parses that replaced the stored config")
            .build();

        let parse_failures = meter
            .u64_counter("hotswap_policy.parse.failures")
            .with_description("Number of parses that kept the previous config")
            .build();

        let parse_duration = meter
            .f64_histogram("hotswap_policy.parse.duration")
            .with_description("Duration of parse cycles including callbacks in seconds")
            .with_unit("s")
            .build();

        let config_age_seconds = meter
            .i64_gauge("hotswap_policy.age")
            .with_description("Time since the stored config was last replaced in seconds")
            .with_unit("s")
            .build();

        let registered_callbacks = meter
            .i64_gauge("hotswap_policy.callbacks.registered")
            .with_description("Number of callbacks registered on the monitor")
            .build();

        let callback_panics = meter
            .u64_counter("hotswap_policy.callbacks.panics")
            .with_description("Number of callbacks that panicked")
            .build();

        Self {
            parse_attempts,
            parse_success,
            parse_failures,
            parse_duration,
            config_age_seconds,
            registered_callbacks,
            callback_panics,
            last_update: Arc::new(parking_lot::Mutex::new(Instant::now())),
        }
    }

    /// Start a parse timer.
    ///
    /// Pass the returned `Instant` to `record_parse_success` or
    /// `record_parse_failure`.
    pub fn start_parse(&self) -> Instant {
        self.parse_attempts.add(1, &[]);
        Instant::now()
    }

    /// Record a parse that replaced the stored config.
    pub fn record_parse_success(&self, start: Instant) {
        self.parse_success.add(1, &[]);
        self.parse_duration.record(start.elapsed().as_secs_f64(), &[]);
        *self.last_update.lock() = Instant::now();
        self.update_config_age();
    }

    /// Record a parse that left the previous config in place.
    pub fn record_parse_failure(&self, start: Instant) {
        self.parse_failures.add(1, &[]);
        self.parse_duration.record(start.elapsed().as_secs_f64(), &[]);
        self.update_config_age();
    }

    /// Record a callback that panicked.
    pub fn record_callback_panic(&self) {
        self.callback_panics.add(1, &[]);
    }

    /// Update the number of registered callbacks.
    pub fn update_callback_count(&self, count: i64) {
        self.registered_callbacks.record(count, &[]);
    }

    /// Update the config age metric.
    ///
    /// Every recorded parse refreshes the gauge. Between file changes nothing
    /// does, so call this periodically (e.g. from a tokio interval) to track
    /// how stale the stored config is.
    pub fn update_config_age(&self) {
        let age_secs = self.last_update.lock().elapsed().as_secs() as i64;
        self.config_age_seconds.record(age_secs, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::global;

    #[test]
    fn test_metrics_creation() {
        let metrics = MonitorMetrics::new(global::meter("test"));

        let timer = metrics.start_parse();
        metrics.record_parse_success(timer);

        let timer = metrics.start_parse();
        metrics.record_parse_failure(timer);

        metrics.record_callback_panic();
        metrics.update_callback_count(3);
        metrics.update_config_age();
    }

    #[test]
    fn test_parse_success_resets_age() {
        let metrics = MonitorMetrics::new(global::meter("test"));
        *metrics.last_update.lock() = Instant::now() - std::time::Duration::from_secs(60);

        let timer = metrics.start_parse();
        metrics.record_parse_failure(timer);
        assert!(metrics.last_update.lock().elapsed().as_secs() >= 60);

        let timer = metrics.start_parse();
        metrics.record_parse_success(timer);
        assert!(metrics.last_update.lock().elapsed().as_secs() < 60);
    }

    #[test]
    fn test_metrics_clone() {
        let metrics = MonitorMetrics::new(global::meter("test"));
        let metrics2 = metrics.clone();

        let timer1 = metrics.start_parse();
        let timer2 = metrics2.start_parse();

        metrics.record_parse_success(timer1);
        metrics2.record_parse_failure(timer2);
    }
}
