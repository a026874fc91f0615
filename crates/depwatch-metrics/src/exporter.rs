//! In-memory series store behind the [`MetricsSink`] contract.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use depwatch_core::dependency::validate_label_name;
use depwatch_core::{EndpointMeta, MetricsSink, StatusCategory, ValidationError};
use tracing::debug;

use crate::prometheus;

/// Histogram bucket upper bounds in seconds.
pub const LATENCY_BUCKETS: [f64; 8] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Label names present on every series, in order.
pub(crate) const REQUIRED_LABELS: [&str; 6] =
    ["name", "dependency", "type", "host", "port", "critical"];

/// Names used as the extra label of the status and detail series, or by
/// the histogram.
const SERIES_LABELS: [&str; 3] = ["status", "detail", "le"];

/// Label values in the order of [`PrometheusExporter::label_names`].
pub(crate) type LabelValues = Vec<String>;

#[derive(Debug, Clone)]
pub(crate) struct Histogram {
    /// Cumulative count per entry of [`LATENCY_BUCKETS`].
    pub buckets: [u64; LATENCY_BUCKETS.len()],
    pub sum: f64,
    pub count: u64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            buckets: [0; LATENCY_BUCKETS.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        for (bound, bucket) in LATENCY_BUCKETS.iter().zip(self.buckets.iter_mut()) {
            if value <= *bound {
                *bucket += 1;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

/// Current value of every live series.
#[derive(Debug, Default)]
pub(crate) struct Series {
    pub health: BTreeMap<LabelValues, bool>,
    pub latency: BTreeMap<LabelValues, Histogram>,
    /// The category that is 1; every other category renders as 0.
    pub status: BTreeMap<LabelValues, StatusCategory>,
    /// Only the current detail of an endpoint is kept.
    pub detail: BTreeMap<LabelValues, String>,
    /// Last detail published per endpoint key, so the old series can be
    /// dropped when the detail changes.
    prev_details: HashMap<String, (LabelValues, String)>,
}

/// Prometheus exporter for dependency health.
///
/// Safe to share between any number of check loops.
#[derive(Debug)]
pub struct PrometheusExporter {
    instance_name: String,
    /// Sorted, validated custom label names.
    custom_labels: Vec<String>,
    series: Mutex<Series>,
}

impl PrometheusExporter {
    /// Create an exporter whose series carry `name="<instance_name>"`.
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            custom_labels: Vec::new(),
            series: Mutex::new(Series::default()),
        }
    }

    /// Add custom label names, taken from each endpoint's labels.
    ///
    /// Names are validated and sorted; an endpoint missing one renders `""`.
    pub fn with_custom_labels<I, S>(mut self, names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        for name in &names {
            validate_label_name(name)?;
            if SERIES_LABELS.contains(&name.as_str()) {
                return Err(ValidationError::ReservedLabel(name.clone()));
            }
        }
        names.sort();
        names.dedup();
        self.custom_labels = names;
        Ok(self)
    }

    /// Every label name on the base series, in render order.
    pub fn label_names(&self) -> Vec<&str> {
        REQUIRED_LABELS
            .iter()
            .copied()
            .chain(self.custom_labels.iter().map(String::as_str))
            .collect()
    }

    /// Render all live series in the Prometheus text format.
    pub fn render(&self) -> String {
        let series = self.lock();
        prometheus::render(&self.label_names(), &series)
    }

    fn labels(&self, meta: &EndpointMeta) -> LabelValues {
        let mut values = Vec::with_capacity(REQUIRED_LABELS.len() + self.custom_labels.len());
        values.push(self.instance_name.clone());
        values.push(meta.name.clone());
        values.push(meta.dep_type.as_str().to_string());
        values.push(meta.endpoint.host().to_string());
        values.push(meta.endpoint.port().to_string());
        values.push(if meta.critical { "yes" } else { "no" }.to_string());
        for name in &self.custom_labels {
            values.push(meta.endpoint.labels().get(name).cloned().unwrap_or_default());
        }
        values
    }

    fn lock(&self) -> MutexGuard<'_, Series> {
        // The store holds plain values; a panic mid-update cannot break an invariant.
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsSink for PrometheusExporter {
    fn set_health(&self, meta: &EndpointMeta, healthy: bool) {
        let labels = self.labels(meta);
        self.lock().health.insert(labels, healthy);
    }

    fn observe_latency(&self, meta: &EndpointMeta, latency: Duration) {
        let labels = self.labels(meta);
        self.lock()
            .latency
            .entry(labels)
            .or_insert_with(Histogram::new)
            .observe(latency.as_secs_f64());
    }

    fn set_status(&self, meta: &EndpointMeta, category: StatusCategory) {
        let labels = self.labels(meta);
        self.lock().status.insert(labels, category);
    }

    fn set_status_detail(&self, meta: &EndpointMeta, detail: &str) {
        let labels = self.labels(meta);
        let mut series = self.lock();
        let previous = series
            .prev_details
            .insert(meta.key(), (labels.clone(), detail.to_string()));
        if let Some((prev_labels, prev_detail)) = previous {
            if prev_labels != labels || prev_detail != detail {
                series.detail.remove(&prev_labels);
            }
        }
        series.detail.insert(labels, detail.to_string());
    }

    fn delete_metrics(&self, meta: &EndpointMeta) {
        let labels = self.labels(meta);
        let mut series = self.lock();
        series.health.remove(&labels);
        series.latency.remove(&labels);
        series.status.remove(&labels);
        if let Some((prev_labels, _)) = series.prev_details.remove(&meta.key()) {
            series.detail.remove(&prev_labels);
        }
        series.detail.remove(&labels);
        debug!(key = %meta.key(), "metrics deleted");
    }
}
