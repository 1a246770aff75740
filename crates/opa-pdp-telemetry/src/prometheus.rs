//! OpenMetrics text for the `/metrics` endpoint.

use crate::MetricsRegistry;
use prometheus_client::encoding::text::encode;

pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encoding into a `String` only fails on a formatter error; whatever was
/// written before that point is returned.
pub fn render_metrics(registry: &MetricsRegistry) -> String {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &registry.registry) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    buffer
}
