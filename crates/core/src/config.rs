//! Loop configuration, loaded once at startup.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::blocker::Severity;

/// Largest accepted backoff multiplier.
const MAX_MULTIPLIER: f64 = 10.0;
/// Largest accepted single backoff delay (one hour).
const MAX_DELAY_MS: u64 = 3_600_000;
/// Largest accepted adapter call timeout (one hour).
const MAX_TIMEOUT_SECS: u64 = 3_600;
/// Largest accepted window in hours (thirty days).
const MAX_WINDOW_HOURS: i64 = 720;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Value out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Retry policy for external adapter calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Attempts before a call counts as a missed contact
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay_ms: u64,
    /// Backoff growth factor
    pub multiplier: f64,
    /// Cap on a single delay
    pub max_delay_ms: u64,
    /// Timeout for one call
    pub timeout_secs: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            timeout_secs: 30,
        }
    }
}

impl AdapterConfig {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Never panics, whatever the policy holds: growth saturates at the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self.max_delay_ms.min(MAX_DELAY_MS);
        let multiplier = if self.multiplier.is_finite() {
            self.multiplier.clamp(1.0, MAX_MULTIPLIER)
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let millis = (self.base_delay_ms as f64 * multiplier.powi(exponent)).min(cap as f64);
        Duration::from_millis(millis as u64)
    }

    /// Timeout for one call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("adapter.max_attempts must be at least 1".into()));
        }
        if !self.multiplier.is_finite() || !(1.0..=MAX_MULTIPLIER).contains(&self.multiplier) {
            return Err(ConfigError::Invalid(format!(
                "adapter.multiplier must be within [1, {MAX_MULTIPLIER}], got {}",
                self.multiplier
            )));
        }
        if self.max_delay_ms > MAX_DELAY_MS || self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "adapter delays must satisfy base <= max <= {MAX_DELAY_MS} ms"
            )));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "adapter.timeout_secs must be within [1, {MAX_TIMEOUT_SECS}], got {}",
                self.timeout_secs
            )));
        }
        Ok(())
    }
}

/// Organizational values used to score proposed actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuesConfig {
    /// Stated priorities, e.g. "ship customer value"
    pub priorities: Vec<String>,
    /// Behaviour the organization wants to avoid
    pub anti_patterns: Vec<String>,
    /// Actions that must not run at immediate authority
    pub require_approval_for: Vec<String>,
    /// Highest severity the loop may handle at immediate authority
    pub immediate_max_severity: Severity,
    /// Prefer async channels over meetings
    pub prefer_async: bool,
    /// Meetings only when nothing else works
    pub meeting_as_last_resort: bool,
    /// Decision principles, matched against action descriptions
    pub principles: Vec<String>,
}

impl Default for ValuesConfig {
    fn default() -> Self {
        Self {
            priorities: vec!["unblock people quickly".to_string()],
            anti_patterns: vec!["blame".to_string()],
            require_approval_for: vec!["reassign".to_string()],
            immediate_max_severity: Severity::Medium,
            prefer_async: true,
            meeting_as_last_resort: false,
            principles: Vec::new(),
        }
    }
}

/// Configuration for the resolution loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArlConfig {
    /// Minimum classification/routing confidence to advance
    pub confidence_floor: f64,
    /// Minimum alignment score for an action to run unattended
    pub alignment_threshold: f64,
    /// Time allowed for both parties to confirm a resolution
    pub verification_timeout_hours: i64,
    /// When the second verification prompt goes out
    pub verification_reminder_hours: i64,
    /// Ticker period
    pub tick_interval_secs: u64,
    /// Time without progress before a task counts as stalled
    pub stall_threshold_hours: i64,
    /// Adapter retry policy
    pub adapter: AdapterConfig,
    /// Pattern memory smoothing factor
    pub pattern_smoothing: f64,
    /// Values model
    pub values: ValuesConfig,
}

impl Default for ArlConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.3,
            alignment_threshold: 0.6,
            verification_timeout_hours: 24,
            verification_reminder_hours: 12,
            tick_interval_secs: 60,
            stall_threshold_hours: 72,
            adapter: AdapterConfig::default(),
            pattern_smoothing: 0.2,
            values: ValuesConfig::default(),
        }
    }
}

impl ArlConfig {
    /// Load from a JSON file; missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: ArlConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {v}")))
            }
        };
        unit("confidence_floor", self.confidence_floor)?;
        unit("alignment_threshold", self.alignment_threshold)?;
        unit("pattern_smoothing", self.pattern_smoothing)?;
        if self.pattern_smoothing == 0.0 {
            return Err(ConfigError::Invalid("pattern_smoothing must be above 0".into()));
        }
        self.adapter.validate()?;

        let window = |name: &str, hours: i64| {
            if (1..=MAX_WINDOW_HOURS).contains(&hours) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be within [1, {MAX_WINDOW_HOURS}] hours, got {hours}"
                )))
            }
        };
        window("verification_timeout_hours", self.verification_timeout_hours)?;
        window("verification_reminder_hours", self.verification_reminder_hours)?;
        window("stall_threshold_hours", self.stall_threshold_hours)?;
        if self.verification_reminder_hours >= self.verification_timeout_hours {
            return Err(ConfigError::Invalid(
                "verification_reminder_hours must be below verification_timeout_hours".into(),
            ));
        }
        if self.tick_interval_secs == 0 || self.tick_interval_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "tick_interval_secs must be within [1, {MAX_TIMEOUT_SECS}], got {}",
                self.tick_interval_secs
            )));
        }
        Ok(())
    }

    /// Set the confidence floor.
    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.confidence_floor = floor;
        self
    }

    /// Set the alignment threshold.
    pub fn with_alignment_threshold(mut self, threshold: f64) -> Self {
        self.alignment_threshold = threshold;
        self
    }

    /// Set the adapter retry policy.
    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = adapter;
        self
    }

    /// Set the values model.
    pub fn with_values(mut self, values: ValuesConfig) -> Self {
        self.values = values;
        self
    }

    /// Verification timeout.
    pub fn verification_timeout(&self) -> chrono::Duration {
        Self::window(self.verification_timeout_hours)
    }

    /// Delay before the second verification prompt.
    pub fn verification_reminder(&self) -> chrono::Duration {
        Self::window(self.verification_reminder_hours)
    }

    /// Time without progress before a task counts as stalled.
    pub fn stall_threshold(&self) -> chrono::Duration {
        Self::window(self.stall_threshold_hours)
    }

    /// Ticker period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.clamp(1, MAX_TIMEOUT_SECS))
    }

    // Unvalidated configs built in code still yield durations that are safe to add to a timestamp
    fn window(hours: i64) -> chrono::Duration {
        chrono::Duration::hours(hours.clamp(1, MAX_WINDOW_HOURS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = ArlConfig::default();
        assert_eq!(c.adapter.max_attempts, 3);
        assert_eq!(c.alignment_threshold, 0.6);
        assert_eq!(c.verification_timeout_hours, 24);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"confidence_floor": 0.5, "adapter": {{"max_attempts": 5}}}}"#).unwrap();
        let c = ArlConfig::load(file.path()).unwrap();
        assert_eq!(c.confidence_floor, 0.5);
        assert_eq!(c.adapter.max_attempts, 5);
        assert_eq!(c.adapter.base_delay_ms, 500);
        assert_eq!(c.pattern_smoothing, 0.2);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let c = ArlConfig::default().with_alignment_threshold(1.5);
        assert!(matches!(c.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let a = AdapterConfig {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 300,
            ..Default::default()
        };
        assert_eq!(a.backoff(1), Duration::from_millis(100));
        assert_eq!(a.backoff(2), Duration::from_millis(200));
        assert_eq!(a.backoff(3), Duration::from_millis(300));
    }

    #[test]
    fn test_unbounded_values_rejected() {
        let huge_multiplier = ArlConfig::default().with_adapter(AdapterConfig {
            multiplier: 1e308,
            ..Default::default()
        });
        assert!(matches!(huge_multiplier.validate(), Err(ConfigError::Invalid(_))));

        let nan_multiplier = ArlConfig::default().with_adapter(AdapterConfig {
            multiplier: f64::NAN,
            ..Default::default()
        });
        assert!(nan_multiplier.validate().is_err());

        let mut huge_timeout = ArlConfig::default();
        huge_timeout.verification_timeout_hours = i64::MAX;
        assert!(huge_timeout.validate().is_err());

        let mut reminder_after_timeout = ArlConfig::default();
        reminder_after_timeout.verification_reminder_hours = 48;
        assert!(reminder_after_timeout.validate().is_err());

        let mut zero_smoothing = ArlConfig::default();
        zero_smoothing.pattern_smoothing = 0.0;
        assert!(zero_smoothing.validate().is_err());
    }

    #[test]
    fn test_file_with_huge_values_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"verification_timeout_hours": 9223372036854775807, "adapter": {{"multiplier": 1e308}}}}"#
        )
        .unwrap();
        assert!(matches!(ArlConfig::load(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unvalidated_values_do_not_panic() {
        let a = AdapterConfig {
            base_delay_ms: 500,
            multiplier: 1e308,
            max_delay_ms: u64::MAX,
            timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(a.backoff(40), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(a.backoff(u32::MAX), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(a.timeout(), Duration::from_secs(MAX_TIMEOUT_SECS));

        let nan = AdapterConfig {
            multiplier: f64::NAN,
            ..Default::default()
        };
        assert_eq!(nan.backoff(3), Duration::from_millis(500));

        let mut c = ArlConfig::default();
        c.verification_timeout_hours = i64::MAX;
        c.verification_reminder_hours = i64::MIN;
        let now = chrono::Utc::now();
        assert_eq!(now + c.verification_timeout(), now + chrono::Duration::hours(MAX_WINDOW_HOURS));
        assert_eq!(now + c.verification_reminder(), now + chrono::Duration::hours(1));
    }
}
