//! Monitor configuration.

use std::time::Duration;

use crate::controller::{DEFAULT_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use crate::error::{MonitorError, MonitorResult};
use crate::poller::RetryPolicy;

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Minutes between automatic refreshes while training runs.
    pub refresh_interval_minutes: u32,
    /// Backoff for summary and image fetches.
    pub retry: RetryPolicy,
    /// Period of the elapsed-time ticker.
    pub elapsed_tick: Duration,
    /// Extra delay per image download.
    pub image_stagger: Duration,
    /// Whether the chart view is shown initially.
    pub charts_visible: bool,
    /// Stop the event loop once training is done and nothing is in flight.
    pub exit_when_done: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            retry: RetryPolicy::default(),
            elapsed_tick: Duration::from_millis(500),
            image_stagger: Duration::from_millis(10),
            charts_visible: true,
            exit_when_done: false,
        }
    }
}

impl MonitorConfig {
    pub fn with_interval(mut self, minutes: u32) -> Self {
        self.refresh_interval_minutes = minutes;
        self
    }

    pub fn with_exit_when_done(mut self, exit: bool) -> Self {
        self.exit_when_done = exit;
        self
    }

    pub fn with_charts_visible(mut self, visible: bool) -> Self {
        self.charts_visible = visible;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> MonitorResult<()> {
        if !(MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&self.refresh_interval_minutes) {
            return Err(MonitorError::InvalidConfig(format!(
                "refresh interval must be {MIN_INTERVAL_MINUTES}-{MAX_INTERVAL_MINUTES} minutes, got {}",
                self.refresh_interval_minutes
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(MonitorError::InvalidConfig(
                "retry attempts must be at least 1".into(),
            ));
        }
        if self.elapsed_tick.is_zero() {
            return Err(MonitorError::InvalidConfig(
                "elapsed tick must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_interval_minutes, 5);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_interval_out_of_range() {
        let err = MonitorConfig::default().with_interval(0).validate().unwrap_err();
        assert!(err.to_string().contains("1-60 minutes, got 0"));
        assert!(MonitorConfig::default().with_interval(61).validate().is_err());
        assert!(MonitorConfig::default().with_interval(60).validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = MonitorConfig {
            retry: RetryPolicy::with_max_attempts(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
