//! depwatch-core: dependency health monitoring.
//!
//! Runs a periodic check against every endpoint of every registered
//! dependency, debounces raw outcomes into a health flag, classifies failures
//! into a fixed status taxonomy, and publishes the results to a metrics sink.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── Per-endpoint check loop (tokio task, own CancellationToken)
//!   │   ├── Checker::check() under a timeout
//!   │   ├── classify() → CheckResult
//!   │   ├── EndpointState (HealthTracker + last observation)
//!   │   └── MetricsSink (health, latency, status, detail)
//!   └── add / remove / update endpoints while running
//! ```
//!
//! # Hysteresis
//!
//! The first outcome sets the flag directly. Afterwards `failure_threshold`
//! consecutive failures are needed to leave healthy and `success_threshold`
//! consecutive successes to leave unhealthy.

pub mod checker;
pub mod classify;
pub mod config;
pub mod dependency;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod tracker;

pub use checker::{BoxError, CheckError, Checker};
pub use classify::{classify, classify_error};
pub use config::{CheckConfig, CheckConfigBuilder, parse_duration};
pub use dependency::{Dependency, DependencyBuilder, DependencyType, Endpoint, endpoint_key};
pub use error::{SchedulerError, SchedulerResult, ValidationError};
pub use metrics::{MetricsSink, NoopMetrics};
pub use scheduler::Scheduler;
pub use state::{EndpointMeta, EndpointState, EndpointStatus};
pub use status::{CheckResult, StatusCategory};
pub use tracker::{HealthTracker, Transition};
