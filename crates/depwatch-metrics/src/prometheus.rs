//! Prometheus text exposition format.
//!
//! Renders the exporter's series for scraping by a Prometheus server or
//! compatible agent.

use std::fmt::Write as _;

use depwatch_core::StatusCategory;

use crate::exporter::{LATENCY_BUCKETS, Series};

/// Content type of [`render`]'s output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render every series. HELP and TYPE lines are always present.
pub(crate) fn render(label_names: &[&str], series: &Series) -> String {
    let mut out = String::new();

    out.push_str("# HELP app_dependency_health Health status of a dependency (1 = healthy, 0 = unhealthy).\n");
    out.push_str("# TYPE app_dependency_health gauge\n");
    for (values, healthy) in &series.health {
        let labels = label_set(label_names, values, None);
        let _ = writeln!(out, "app_dependency_health{{{labels}}} {}", u8::from(*healthy));
    }

    out.push_str("# HELP app_dependency_latency_seconds Latency of dependency health check in seconds.\n");
    out.push_str("# TYPE app_dependency_latency_seconds histogram\n");
    for (values, histogram) in &series.latency {
        for (bound, count) in LATENCY_BUCKETS.iter().zip(histogram.buckets) {
            let labels = label_set(label_names, values, Some(("le", &bound.to_string())));
            let _ = writeln!(out, "app_dependency_latency_seconds_bucket{{{labels}}} {count}");
        }
        let labels = label_set(label_names, values, Some(("le", "+Inf")));
        let _ = writeln!(
            out,
            "app_dependency_latency_seconds_bucket{{{labels}}} {}",
            histogram.count
        );

        let labels = label_set(label_names, values, None);
        let _ = writeln!(out, "app_dependency_latency_seconds_sum{{{labels}}} {}", histogram.sum);
        let _ = writeln!(
            out,
            "app_dependency_latency_seconds_count{{{labels}}} {}",
            histogram.count
        );
    }

    out.push_str("# HELP app_dependency_status Category of the last check result.\n");
    out.push_str("# TYPE app_dependency_status gauge\n");
    for (values, current) in &series.status {
        for category in StatusCategory::ALL {
            let labels = label_set(label_names, values, Some(("status", category.as_str())));
            let _ = writeln!(
                out,
                "app_dependency_status{{{labels}}} {}",
                u8::from(category == *current)
            );
        }
    }

    out.push_str("# HELP app_dependency_status_detail Detailed reason of the last check result.\n");
    out.push_str("# TYPE app_dependency_status_detail gauge\n");
    for (values, detail) in &series.detail {
        let labels = label_set(label_names, values, Some(("detail", detail)));
        let _ = writeln!(out, "app_dependency_status_detail{{{labels}}} 1");
    }

    out
}

/// `name="value",...` with an optional trailing extra label.
fn label_set(names: &[&str], values: &[String], extra: Option<(&str, &str)>) -> String {
    let mut out = String::new();
    let pairs = names
        .iter()
        .copied()
        .zip(values.iter().map(String::as_str))
        .chain(extra);
    for (i, (name, value)) in pairs.enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{name}=\"{}\"", escape(value));
    }
    out
}

/// Escape a label value: backslash, double quote and newline.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}
