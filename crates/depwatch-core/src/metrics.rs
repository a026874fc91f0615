//! The contract between check loops and a metrics exporter.

use std::time::Duration;

use crate::state::EndpointMeta;
use crate::status::StatusCategory;

/// Receives check results as metric updates.
///
/// Called concurrently from every check loop. Series are keyed by the
/// endpoint plus its dependency metadata.
pub trait MetricsSink: Send + Sync {
    /// Set the health gauge to 1 (healthy) or 0.
    fn set_health(&self, meta: &EndpointMeta, healthy: bool);

    /// Record one check's latency.
    fn observe_latency(&self, meta: &EndpointMeta, latency: Duration);

    /// Publish the status one-hot: `category` is 1, every other member of
    /// [`StatusCategory::ALL`] is 0.
    fn set_status(&self, meta: &EndpointMeta, category: StatusCategory);

    /// Publish the detail series. The previous detail series for this
    /// endpoint must be deleted when the value changes.
    fn set_status_detail(&self, meta: &EndpointMeta, detail: &str);

    /// Drop every series for this endpoint: health, latency, all status
    /// series and the current detail series.
    fn delete_metrics(&self, meta: &EndpointMeta);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_health(&self, _: &EndpointMeta, _: bool) {}
    fn observe_latency(&self, _: &EndpointMeta, _: Duration) {}
    fn set_status(&self, _: &EndpointMeta, _: StatusCategory) {}
    fn set_status_detail(&self, _: &EndpointMeta, _: &str) {}
    fn delete_metrics(&self, _: &EndpointMeta) {}
}
