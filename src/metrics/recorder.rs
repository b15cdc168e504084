//! Metrics recording implementation using Prometheus.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_with_registry, CounterVec, Encoder,
    Histogram, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::error;

/// Trait for recording application metrics.
pub trait MetricsRecorder: Clone + Send + Sync + 'static {
    /// Records a request the gateway proxied (or failed to proxy) for a route.
    fn record_gateway_request(&self, route: &str, status: u16);

    /// Records one auth gate outcome and how long the round trip took.
    fn record_gate_decision(&self, decision: &str, duration_secs: f64);

    /// Records a handler that ran past its deadline.
    fn record_handler_timeout(&self, service: &str);

    /// Records a login attempt with its outcome.
    fn record_login_attempt(&self, result: &str);
}

/// Prometheus metrics collector.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Gateway metrics
    gateway_requests_total: CounterVec,
    auth_gate_decisions_total: CounterVec,
    auth_gate_duration_seconds: Histogram,

    // Backend metrics
    handler_timeouts_total: CounterVec,
    login_attempts_total: CounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new metrics instance with a Prometheus registry.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let gateway_requests_total = register_counter_vec_with_registry!(
            Opts::new(
                "gateway_requests_total",
                "Total number of requests dispatched by the gateway"
            ),
            &["route", "status"],
            registry.clone()
        )
        .expect("Failed to register gateway_requests_total");

        let auth_gate_decisions_total = register_counter_vec_with_registry!(
            Opts::new(
                "auth_gate_decisions_total",
                "Total auth gate decisions by outcome"
            ),
            &["decision"],
            registry.clone()
        )
        .expect("Failed to register auth_gate_decisions_total");

        let auth_gate_duration_seconds = register_histogram_with_registry!(
            "auth_gate_duration_seconds",
            "Round trip to the auth service in seconds",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            registry.clone()
        )
        .expect("Failed to register auth_gate_duration_seconds");

        let handler_timeouts_total = register_counter_vec_with_registry!(
            Opts::new(
                "handler_timeouts_total",
                "Total handlers answered with 408 after their deadline"
            ),
            &["service"],
            registry.clone()
        )
        .expect("Failed to register handler_timeouts_total");

        let login_attempts_total = register_counter_vec_with_registry!(
            Opts::new("login_attempts_total", "Total login attempts by outcome"),
            &["result"],
            registry.clone()
        )
        .expect("Failed to register login_attempts_total");

        Metrics {
            registry,
            gateway_requests_total,
            auth_gate_decisions_total,
            auth_gate_duration_seconds,
            handler_timeouts_total,
            login_attempts_total,
        }
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl MetricsRecorder for Metrics {
    fn record_gateway_request(&self, route: &str, status: u16) {
        self.gateway_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    fn record_gate_decision(&self, decision: &str, duration_secs: f64) {
        self.auth_gate_decisions_total
            .with_label_values(&[decision])
            .inc();
        self.auth_gate_duration_seconds.observe(duration_secs);
    }

    fn record_handler_timeout(&self, service: &str) {
        self.handler_timeouts_total
            .with_label_values(&[service])
            .inc();
    }

    fn record_login_attempt(&self, result: &str) {
        self.login_attempts_total.with_label_values(&[result]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = Metrics::new();
        metrics.record_gateway_request("todos", 200);
        metrics.record_gate_decision("denied", 0.01);
        metrics.record_handler_timeout("todo");
        metrics.record_login_attempt("success");

        let text = metrics.render();
        assert!(text.contains("gateway_requests_total{route=\"todos\",status=\"200\"} 1"));
        assert!(text.contains("auth_gate_decisions_total{decision=\"denied\"} 1"));
        assert!(text.contains("auth_gate_duration_seconds_count 1"));
        assert!(text.contains("handler_timeouts_total{service=\"todo\"} 1"));
        assert!(text.contains("login_attempts_total{result=\"success\"} 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = Metrics::new();
        let b = Metrics::new();
        a.record_login_attempt("success");
        assert!(!b.render().contains("login_attempts_total{"));
    }
}
