//! Threshold debouncing of raw check outcomes.
//!
//! The first outcome sets the health flag unconditionally. After that the
//! flag only flips once `threshold` consecutive opposite outcomes have been
//! seen, and any outcome resets the opposite counter.

use crate::config::CheckConfig;

/// Health flag before and after one recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub before: Option<bool>,
    pub after: Option<bool>,
}

impl Transition {
    /// Became healthy from unknown or unhealthy.
    pub fn recovered(&self) -> bool {
        self.before != Some(true) && self.after == Some(true)
    }

    /// Went from healthy to unhealthy.
    pub fn became_unhealthy(&self) -> bool {
        self.before == Some(true) && self.after == Some(false)
    }
}

/// Tracks consecutive outcomes for a single endpoint.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    /// `None` until the first outcome.
    healthy: Option<bool>,
    consecutive_successes: u32,
    consecutive_failures: u32,
    /// Failures needed to leave healthy.
    failure_threshold: u32,
    /// Successes needed to leave unhealthy.
    success_threshold: u32,
}

impl HealthTracker {
    /// Create a tracker from a check config.
    pub fn new(config: &CheckConfig) -> Self {
        Self::with_thresholds(config.failure_threshold(), config.success_threshold())
    }

    /// Create a tracker with explicit thresholds.
    pub fn with_thresholds(failure_threshold: u32, success_threshold: u32) -> Self {
        Self {
            healthy: None,
            consecutive_successes: 0,
            consecutive_failures: 0,
            failure_threshold,
            success_threshold,
        }
    }

    /// Record one outcome and report the flag before and after.
    pub fn record(&mut self, success: bool) -> Transition {
        let before = self.healthy;

        if success {
            self.consecutive_failures = 0;
            self.consecutive_successes += 1;
            match self.healthy {
                None => self.healthy = Some(true),
                Some(false) if self.consecutive_successes >= self.success_threshold => {
                    self.healthy = Some(true);
                }
                _ => {}
            }
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures += 1;
            match self.healthy {
                None => self.healthy = Some(false),
                Some(true) if self.consecutive_failures >= self.failure_threshold => {
                    self.healthy = Some(false);
                }
                _ => {}
            }
        }

        Transition {
            before,
            after: self.healthy,
        }
    }

    pub fn healthy(&self) -> Option<bool> {
        self.healthy
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
