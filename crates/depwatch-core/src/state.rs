//! Per-endpoint mutable state and its read-only snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::CheckConfig;
use crate::dependency::{DependencyType, Endpoint, endpoint_key};
use crate::status::{CheckResult, StatusCategory};
use crate::tracker::{HealthTracker, Transition};

/// Static identity of a monitored endpoint: what metrics are labeled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMeta {
    pub name: String,
    pub dep_type: DependencyType,
    pub critical: bool,
    pub endpoint: Endpoint,
}

impl EndpointMeta {
    /// `"<dependency>:<host>:<port>"`.
    pub fn key(&self) -> String {
        endpoint_key(&self.name, self.endpoint.host(), self.endpoint.port())
    }
}

struct Observation {
    tracker: HealthTracker,
    status: StatusCategory,
    detail: String,
    latency: Duration,
    checked_at: Option<DateTime<Utc>>,
}

/// Health state of one endpoint.
///
/// Written only by that endpoint's check loop; read by snapshots. Each
/// instance has its own lock.
pub struct EndpointState {
    meta: EndpointMeta,
    inner: Mutex<Observation>,
}

impl EndpointState {
    pub fn new(meta: EndpointMeta, config: &CheckConfig) -> Self {
        Self {
            meta,
            inner: Mutex::new(Observation {
                tracker: HealthTracker::new(config),
                status: StatusCategory::Unknown,
                detail: StatusCategory::Unknown.as_str().to_string(),
                latency: Duration::ZERO,
                checked_at: None,
            }),
        }
    }

    pub fn meta(&self) -> &EndpointMeta {
        &self.meta
    }

    /// Apply one classified outcome and store it as the last observation.
    pub async fn record(&self, result: &CheckResult, latency: Duration) -> Transition {
        let mut obs = self.inner.lock().await;
        let transition = obs.tracker.record(result.is_ok());
        obs.status = result.category;
        obs.detail.clone_from(&result.detail);
        obs.latency = latency;
        obs.checked_at = Some(Utc::now());
        transition
    }

    /// Current health flag; `None` before the first check.
    pub async fn healthy(&self) -> Option<bool> {
        self.inner.lock().await.tracker.healthy()
    }

    /// Owned copy of everything known about this endpoint.
    pub async fn snapshot(&self) -> EndpointStatus {
        let obs = self.inner.lock().await;
        EndpointStatus {
            healthy: obs.tracker.healthy(),
            status: obs.status,
            detail: obs.detail.clone(),
            latency: obs.latency,
            dep_type: self.meta.dep_type,
            name: self.meta.name.clone(),
            host: self.meta.endpoint.host().to_string(),
            port: self.meta.endpoint.port().to_string(),
            critical: self.meta.critical,
            last_checked_at: obs.checked_at,
            labels: self.meta.endpoint.labels().clone(),
        }
    }
}

/// Detailed view of one endpoint as returned by `health_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub healthy: Option<bool>,
    pub status: StatusCategory,
    pub detail: String,
    #[serde(rename = "latency_ms", with = "latency_millis")]
    pub latency: Duration,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    pub name: String,
    pub host: String,
    pub port: String,
    pub critical: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
}

mod latency_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_nanos() as f64 / 1e6)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom(format!("invalid latency_ms {ms}")));
        }
        Ok(Duration::from_nanos((ms * 1e6).round() as u64))
    }
}
