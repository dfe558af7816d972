//! Prometheus metrics for the gateway.

use std::sync::Arc;

use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

/// Metrics collection for the gateway.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub inference_requests: CounterVec,
    pub request_duration: HistogramVec,
    pub batch_jobs_submitted: CounterVec,
    pub throttled_requests: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let inference_requests = CounterVec::new(
            Opts::new(
                "modelmesh_inference_requests_total",
                "Total number of inference requests",
            ),
            &["model", "version", "type", "status"],
        )
        .expect("failed to create inference_requests counter");

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "modelmesh_inference_request_duration_seconds",
                "Inference request latency in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["model", "version", "type"],
        )
        .expect("failed to create request_duration histogram");

        let batch_jobs_submitted = CounterVec::new(
            Opts::new(
                "modelmesh_batch_jobs_submitted_total",
                "Total number of batch jobs submitted",
            ),
            &["model", "version"],
        )
        .expect("failed to create batch_jobs_submitted counter");

        let throttled_requests = Counter::new(
            "modelmesh_throttled_requests_total",
            "Requests rejected by the rate limiter",
        )
        .expect("failed to create throttled_requests counter");

        registry
            .register(Box::new(inference_requests.clone()))
            .expect("failed to register inference_requests");
        registry
            .register(Box::new(request_duration.clone()))
            .expect("failed to register request_duration");
        registry
            .register(Box::new(batch_jobs_submitted.clone()))
            .expect("failed to register batch_jobs_submitted");
        registry
            .register(Box::new(throttled_requests.clone()))
            .expect("failed to register throttled_requests");

        Self {
            registry: Arc::new(registry),
            inference_requests,
            request_duration,
            batch_jobs_submitted,
            throttled_requests,
        }
    }

    /// Record one routed inference request.
    pub fn record_inference(
        &self,
        model: &str,
        version: &str,
        kind: &str,
        status: &str,
        latency_secs: f64,
    ) {
        self.inference_requests
            .with_label_values(&[model, version, kind, status])
            .inc();
        self.request_duration
            .with_label_values(&[model, version, kind])
            .observe(latency_secs);
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_series() {
        let metrics = Metrics::new();
        metrics.record_inference("m", "1", "realtime", "ok", 0.05);
        metrics.batch_jobs_submitted.with_label_values(&["m", "1"]).inc();
        metrics.throttled_requests.inc();

        let text = metrics.gather();
        assert!(text.contains("modelmesh_inference_requests_total"));
        assert!(text.contains("modelmesh_inference_request_duration_seconds"));
        assert!(text.contains("modelmesh_batch_jobs_submitted_total"));
        assert!(text.contains("modelmesh_throttled_requests_total"));
    }

    #[test]
    fn test_gather_on_empty_registry() {
        let metrics = Metrics::new();
        // Unobserved vectors produce no series, but gathering must not fail.
        let _ = metrics.gather();
    }
}
