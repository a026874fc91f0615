//! depwatch-metrics: Prometheus exposition of dependency health.
//!
//! [`PrometheusExporter`] is a [`MetricsSink`](depwatch_core::MetricsSink)
//! that keeps the current value of every series in memory and renders them
//! in the Prometheus text format on demand.
//!
//! # Series
//!
//! ```text
//! app_dependency_health            gauge      1 healthy, 0 unhealthy
//! app_dependency_latency_seconds   histogram  per-check latency
//! app_dependency_status            gauge      one-hot over the status categories
//! app_dependency_status_detail     gauge      1 for the current detail only
//! ```
//!
//! Every series carries `name, dependency, type, host, port, critical`
//! followed by the exporter's custom label names in sorted order.

pub mod exporter;
pub mod prometheus;

pub use exporter::{LATENCY_BUCKETS, PrometheusExporter};
pub use prometheus::CONTENT_TYPE;
