//! Prometheus metrics exposition
//!
//! - `auth_requests_total` (counter): labels `flow`, `outcome`
//! - `auth_rate_limited_total` (counter): label `class`
//!
//! `flow` is the endpoint group (register, login, forgot, reset, ...),
//! `outcome` is "ok" or a low-cardinality error category, and `class` is
//! the rate limit class that rejected the request.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// The handle's `render()` method produces the Prometheus text exposition
/// format suitable for serving on a `/metrics` endpoint.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed request with its flow and outcome labels.
pub fn record_flow(flow: &'static str, outcome: &'static str) {
    metrics::counter!("auth_requests_total", "flow" => flow, "outcome" => outcome).increment(1);
}

/// Record a request rejected by the rate limiter.
pub fn record_rate_limited(class: &'static str) {
    metrics::counter!("auth_rate_limited_total", "class" => class).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // When no recorder is installed, metrics calls are no-ops.
        record_flow("login", "ok");
        record_rate_limited("auth");
    }

    /// Create an isolated recorder/handle pair for unit tests.
    /// Uses build_recorder() instead of install_recorder() to avoid the
    /// global recorder singleton constraint — only one global recorder can
    /// exist per process, and install_recorder() panics on a second call.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_flow_increments_labeled_counter() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_flow("login", "ok");
        record_flow("login", "unauthorized");

        let output = handle.render();
        assert!(output.contains("auth_requests_total"));
        assert!(output.contains("flow=\"login\""));
        assert!(output.contains("outcome=\"ok\""));
        assert!(output.contains("outcome=\"unauthorized\""));
    }

    #[test]
    fn record_rate_limited_carries_class_label() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_rate_limited("auth");
        record_rate_limited("register");

        let output = handle.render();
        assert!(output.contains("auth_rate_limited_total"));
        assert!(output.contains("class=\"auth\""));
        assert!(output.contains("class=\"register\""));
    }
}
