//! Per-extension health and usage metrics, updated on every command run.

use marginalia_types::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    /// At least one recent failure, below the threshold.
    Warning,
    /// The consecutive-failure threshold was reached.
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionHealth {
    pub status: HealthStatus,
    pub execution_count: u64,
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_executed: Option<Timestamp>,
}

impl ExtensionHealth {
    pub fn record_success(&mut self, now: Timestamp) {
        self.execution_count += 1;
        self.consecutive_failures = 0;
        self.status = HealthStatus::Healthy;
        self.last_executed = Some(now);
    }

    pub fn record_failure(&mut self, error: impl Into<String>, now: Timestamp, threshold: u32) {
        self.execution_count += 1;
        self.error_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.into());
        self.last_executed = Some(now);
        self.status = if self.consecutive_failures >= threshold.max(1) {
            HealthStatus::Error
        } else {
            HealthStatus::Warning
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionMetrics {
    pub usage_count: u64,
    /// Running mean over every execution.
    pub average_execution_time_ms: f64,
    pub last_used: Option<Timestamp>,
}

impl ExtensionMetrics {
    pub fn record(&mut self, elapsed: Duration, now: Timestamp) {
        self.usage_count += 1;
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.average_execution_time_ms +=
            (sample - self.average_execution_time_ms) / self.usage_count as f64;
        self.last_used = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_escalate_at_threshold() {
        let mut health = ExtensionHealth::default();
        let now = Timestamp::from_millis(1);

        health.record_failure("boom", now, 3);
        assert_eq!(health.status, HealthStatus::Warning);
        health.record_failure("boom", now, 3);
        assert_eq!(health.status, HealthStatus::Warning);
        health.record_failure("boom", now, 3);
        assert_eq!(health.status, HealthStatus::Error);
        assert_eq!(health.error_count, 3);
        assert_eq!(health.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn success_resets_streak() {
        let mut health = ExtensionHealth::default();
        let now = Timestamp::from_millis(1);
        health.record_failure("boom", now, 2);
        health.record_failure("boom", now, 2);
        assert_eq!(health.status, HealthStatus::Error);

        health.record_success(now);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.error_count, 2);
        assert_eq!(health.execution_count, 3);
    }

    #[test]
    fn threshold_zero_acts_as_one() {
        let mut health = ExtensionHealth::default();
        health.record_failure("boom", Timestamp::from_millis(1), 0);
        assert_eq!(health.status, HealthStatus::Error);
    }

    #[test]
    fn metrics_running_average() {
        let mut metrics = ExtensionMetrics::default();
        let now = Timestamp::from_millis(5);
        metrics.record(Duration::from_millis(10), now);
        metrics.record(Duration::from_millis(30), now);
        assert_eq!(metrics.usage_count, 2);
        assert!((metrics.average_execution_time_ms - 20.0).abs() < 1e-9);
        assert_eq!(metrics.last_used, Some(now));
    }
}
