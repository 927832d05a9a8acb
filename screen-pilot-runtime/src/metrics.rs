//! Metrics instrumentation for the agent loop.

use std::time::Instant;

pub const MODEL_INVOKE_LATENCY: &str = "model_invoke_latency";
pub const ACTION_EXECUTE_LATENCY: &str = "action_execute_latency";
pub const SCREENSHOT_LATENCY: &str = "screenshot_latency";

/// Record model call latency.
pub fn record_model_latency(duration_ms: f64) {
    metrics::histogram!("model_invoke_latency", duration_ms);
}

/// Record action execution latency.
pub fn record_action_latency(duration_ms: f64) {
    metrics::histogram!("action_execute_latency", duration_ms);
}

/// Record screenshot capture latency.
pub fn record_screenshot_latency(duration_ms: f64) {
    metrics::histogram!("screenshot_latency", duration_ms);
}

/// Increment invalid or failed screenshot counter.
pub fn increment_screenshot_failures() {
    metrics::counter!("screenshot_failures", 1);
}

/// Increment loop iteration counter.
pub fn increment_loop_iterations() {
    metrics::counter!("loop_iterations", 1);
}

/// RAII timer for automatic metric recording.
pub struct MetricTimer {
    start: Instant,
    metric_name: &'static str,
}

impl MetricTimer {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }
}

impl Drop for MetricTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        match self.metric_name {
            MODEL_INVOKE_LATENCY => record_model_latency(duration_ms),
            ACTION_EXECUTE_LATENCY => record_action_latency(duration_ms),
            SCREENSHOT_LATENCY => record_screenshot_latency(duration_ms),
            _ => {}
        }
    }
}
