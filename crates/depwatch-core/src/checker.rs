//! The probe contract every protocol checker implements.

use std::error::Error as StdError;
use std::fmt::Write as _;

use async_trait::async_trait;
use thiserror::Error;

use crate::dependency::Endpoint;
use crate::status::{CheckResult, StatusCategory};

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A failed probe.
///
/// Checkers that know exactly what went wrong return [`CheckError::Classified`];
/// anything else is inferred by [`classify`](crate::classify::classify).
#[derive(Debug, Error)]
pub enum CheckError {
    /// Failure already mapped onto the taxonomy by the checker.
    #[error("{message}")]
    Classified {
        category: StatusCategory,
        detail: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("health check timed out")]
    Timeout,

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("dependency unhealthy: {0}")]
    Unhealthy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CheckError {
    pub fn classified(
        category: StatusCategory,
        detail: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Classified {
            category,
            detail: detail.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause to a classified error. Other variants are returned as-is.
    pub fn with_source(self, cause: impl Into<BoxError>) -> Self {
        match self {
            Self::Classified {
                category,
                detail,
                message,
                ..
            } => Self::Classified {
                category,
                detail,
                message,
                source: Some(cause.into()),
            },
            other => other,
        }
    }

    /// The explicit classification carried by this error, if any.
    pub fn classification(&self) -> Option<CheckResult> {
        match self {
            Self::Classified {
                category, detail, ..
            } => Some(CheckResult::new(*category, detail.clone())),
            _ => None,
        }
    }

    /// Message followed by every underlying cause, for logs.
    pub fn describe(&self) -> String {
        if let Self::Other(e) = self {
            return format!("{e:#}");
        }
        let mut msg = self.to_string();
        let mut cause = self.source();
        while let Some(err) = cause {
            let _ = write!(msg, ": {err}");
            cause = err.source();
        }
        msg
    }
}

/// Performs one bounded probe of an endpoint.
///
/// The scheduler imposes the timeout and may drop the future at any await
/// point; implementations must not rely on running to completion.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> Result<(), CheckError>;
}
