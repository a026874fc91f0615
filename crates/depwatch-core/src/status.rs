//! The fixed status taxonomy for check outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a check outcome.
///
/// [`StatusCategory::Unknown`] only describes an endpoint that has not been
/// checked yet; it is never published as a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    Ok,
    Timeout,
    ConnectionError,
    DnsError,
    AuthError,
    TlsError,
    Unhealthy,
    Error,
    Unknown,
}

impl StatusCategory {
    /// Every category a check can produce, in metric order.
    pub const ALL: [StatusCategory; 8] = [
        Self::Ok,
        Self::Timeout,
        Self::ConnectionError,
        Self::DnsError,
        Self::AuthError,
        Self::TlsError,
        Self::Unhealthy,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Timeout => "timeout",
            Self::ConnectionError => "connection_error",
            Self::DnsError => "dns_error",
            Self::AuthError => "auth_error",
            Self::TlsError => "tls_error",
            Self::Unhealthy => "unhealthy",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified outcome of one check: a category plus a free-form detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub category: StatusCategory,
    pub detail: String,
}

impl CheckResult {
    pub fn new(category: StatusCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }

    /// The success result: `ok` / `ok`.
    pub fn ok() -> Self {
        Self::new(StatusCategory::Ok, "ok")
    }

    /// Result whose detail is the category name itself.
    pub fn plain(category: StatusCategory) -> Self {
        Self::new(category, category.as_str())
    }

    pub fn is_ok(&self) -> bool {
        self.category == StatusCategory::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_excludes_unknown() {
        assert_eq!(StatusCategory::ALL.len(), 8);
        assert!(!StatusCategory::ALL.contains(&StatusCategory::Unknown));
    }

    #[test]
    fn serde_uses_metric_names() {
        for c in StatusCategory::ALL {
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json, format!("\"{}\"", c.as_str()));
        }
        assert_eq!(
            serde_json::to_string(&StatusCategory::Unknown).unwrap(),
            "\"unknown\""
        );
    }

    #[test]
    fn plain_result_uses_category_as_detail() {
        let r = CheckResult::plain(StatusCategory::DnsError);
        assert_eq!(r.detail, "dns_error");
        assert!(!r.is_ok());
        assert!(CheckResult::ok().is_ok());
    }
}
