//! depwatchd: the depwatch daemon.
//!
//! Loads a TOML file, builds one checker per dependency, runs the scheduler
//! and serves the results over HTTP.
//!
//! ```text
//! Settings::plan()
//!   └── assemble()
//!         ├── PrometheusExporter (custom labels from every endpoint)
//!         ├── Scheduler (one loop per endpoint)
//!         └── ApiState → build_router()
//! ```

pub mod api;
pub mod settings;

use std::sync::Arc;

use depwatch_core::Scheduler;
use depwatch_metrics::PrometheusExporter;
use tracing::info;

use crate::api::ApiState;
use crate::settings::Plan;

/// Build the exporter and scheduler and register every planned dependency.
///
/// The scheduler is returned unstarted.
pub async fn assemble(plan: Plan) -> anyhow::Result<ApiState> {
    let exporter = Arc::new(
        PrometheusExporter::new(plan.instance.clone()).with_custom_labels(plan.custom_labels)?,
    );
    let scheduler = Arc::new(Scheduler::new(exporter.clone(), plan.config));

    for planned in plan.dependencies {
        info!(
            dependency = %planned.dependency.name(),
            dep_type = %planned.dependency.dep_type(),
            endpoints = planned.dependency.endpoints().len(),
            critical = planned.dependency.critical(),
            "registering dependency"
        );
        scheduler.register(planned.dependency, planned.checker).await?;
    }

    Ok(ApiState {
        scheduler,
        exporter,
    })
}
