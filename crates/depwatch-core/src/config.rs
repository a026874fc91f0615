//! Check timing and threshold configuration.
//!
//! A [`CheckConfig`] can only be obtained through [`CheckConfigBuilder::build`]
//! (or [`Default`]), so every value in circulation has passed validation.

use std::time::Duration;

use crate::error::ValidationError;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 1;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 1;

pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_INITIAL_DELAY: Duration = Duration::from_secs(5 * 60);
pub const MIN_THRESHOLD: u32 = 1;
pub const MAX_THRESHOLD: u32 = 10;

/// Validated scheduling parameters for one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckConfig {
    interval: Duration,
    timeout: Duration,
    initial_delay: Duration,
    failure_threshold: u32,
    success_threshold: u32,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            initial_delay: DEFAULT_INITIAL_DELAY,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
        }
    }
}

impl CheckConfig {
    /// Start a builder seeded with the defaults.
    pub fn builder() -> CheckConfigBuilder {
        CheckConfigBuilder::from(Self::default())
    }

    /// Start a builder seeded with this config's values, for overrides.
    pub fn to_builder(&self) -> CheckConfigBuilder {
        CheckConfigBuilder::from(*self)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }
}

/// Collects config values; nothing is checked until [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct CheckConfigBuilder {
    interval: Duration,
    timeout: Duration,
    initial_delay: Duration,
    failure_threshold: u32,
    success_threshold: u32,
}

impl From<CheckConfig> for CheckConfigBuilder {
    fn from(c: CheckConfig) -> Self {
        Self {
            interval: c.interval,
            timeout: c.timeout,
            initial_delay: c.initial_delay,
            failure_threshold: c.failure_threshold,
            success_threshold: c.success_threshold,
        }
    }
}

impl CheckConfigBuilder {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Validate every field and produce the config.
    ///
    /// Fails on the first offending field; nothing is clamped.
    pub fn build(self) -> Result<CheckConfig, ValidationError> {
        check_duration("interval", self.interval, MIN_INTERVAL, MAX_INTERVAL)?;
        check_duration("timeout", self.timeout, MIN_TIMEOUT, MAX_TIMEOUT)?;
        if self.timeout >= self.interval {
            return Err(ValidationError::TimeoutNotBelowInterval {
                timeout: format!("{:?}", self.timeout),
                interval: format!("{:?}", self.interval),
            });
        }
        check_duration(
            "initial_delay",
            self.initial_delay,
            Duration::ZERO,
            MAX_INITIAL_DELAY,
        )?;
        check_threshold("failure_threshold", self.failure_threshold)?;
        check_threshold("success_threshold", self.success_threshold)?;

        Ok(CheckConfig {
            interval: self.interval,
            timeout: self.timeout,
            initial_delay: self.initial_delay,
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
        })
    }
}

fn check_duration(
    field: &'static str,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            value: format!("{value:?}"),
            min: format!("{min:?}"),
            max: format!("{max:?}"),
        });
    }
    Ok(())
}

fn check_threshold(field: &'static str, value: u32) -> Result<(), ValidationError> {
    if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value: value.to_string(),
            min: MIN_THRESHOLD.to_string(),
            max: MAX_THRESHOLD.to_string(),
        });
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ValidationError> {
    let trimmed = s.trim();
    let invalid = || ValidationError::InvalidDuration(s.to_string());

    let parsed = if let Some(ms) = trimmed.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = trimmed.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = trimmed.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        trimmed.parse::<u64>().ok().map(Duration::from_secs)
    };

    parsed.ok_or_else(invalid)
}
