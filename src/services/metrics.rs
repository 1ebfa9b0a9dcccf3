use serde::Serialize;

/// One outbound request as reported to a [`MetricsSink`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSample {
    pub method: &'static str,
    pub path: String,
    /// `0` when no response was received.
    pub status_code: u16,
    pub duration_ms: u64,
}

/// Write-only collector fed once per delivery attempt.
pub trait MetricsSink: Send + Sync {
    fn record(&self, delivery_id: &str, sample: RequestSample);
}

/// Forwards samples to the `tracing` pipeline at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, delivery_id: &str, sample: RequestSample) {
        tracing::debug!(
            target: "webhook_metrics",
            delivery_id,
            method = sample.method,
            path = %sample.path,
            status_code = sample.status_code,
            duration_ms = sample.duration_ms,
            "Webhook request"
        );
    }
}

/// Path component of a subscription URL, for metric labels.
pub fn url_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}
