//! Blocker signals - raw reports that something is stuck.

use serde::{Deserialize, Serialize};
use crate::blocker::Severity;
use crate::id::{EmployeeId, TaskId};
use crate::Time;

/// Where a blocker report came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Structured stand-up / check-in response
    CheckIn,
    /// Automated monitor (overdue or stalled task, failing pipeline)
    Monitor,
    /// Explicit report by a person
    Report,
}

impl SourceKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::CheckIn => "check_in",
            SourceKind::Monitor => "monitor",
            SourceKind::Report => "report",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "check_in" | "checkin" => Ok(SourceKind::CheckIn),
            "monitor" => Ok(SourceKind::Monitor),
            "report" => Ok(SourceKind::Report),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// An immutable detection record.
///
/// Fields are private so the record cannot be mutated after construction;
/// use the accessors to read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockerSignal {
    source: SourceKind,
    reporter: EmployeeId,
    description: String,
    detected_at: Time,
    related_tasks: Vec<TaskId>,
    confidence: f64,
    #[serde(default)]
    severity_floor: Option<Severity>,
}

impl BlockerSignal {
    /// Create a new signal. Confidence is clamped into `[0, 1]`.
    pub fn new(
        source: SourceKind,
        reporter: impl Into<EmployeeId>,
        description: impl Into<String>,
        detected_at: Time,
    ) -> Self {
        Self {
            source,
            reporter: reporter.into(),
            description: description.into(),
            detected_at,
            related_tasks: Vec::new(),
            confidence: 1.0,
            severity_floor: None,
        }
    }

    /// Attach the tasks this signal is about.
    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = TaskId>) -> Self {
        self.related_tasks = tasks.into_iter().collect();
        self
    }

    /// Set the detector's confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        self
    }

    /// Set the lowest severity classification may assign.
    pub fn with_severity_floor(mut self, severity: Severity) -> Self {
        self.severity_floor = Some(severity);
        self
    }

    /// Source kind.
    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Who reported the blocker.
    pub fn reporter(&self) -> &EmployeeId {
        &self.reporter
    }

    /// Free-text description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// When the blocker was detected.
    pub fn detected_at(&self) -> Time {
        self.detected_at
    }

    /// Tasks named by the reporter.
    pub fn related_tasks(&self) -> &[TaskId] {
        &self.related_tasks
    }

    /// Detector confidence in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Severity the detector already knows applies, if any.
    pub fn severity_floor(&self) -> Option<Severity> {
        self.severity_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_confidence_is_clamped() {
        let s = BlockerSignal::new(SourceKind::Report, "alice", "stuck", Utc::now())
            .with_confidence(1.7);
        assert_eq!(s.confidence(), 1.0);

        let s = s.with_confidence(-0.2);
        assert_eq!(s.confidence(), 0.0);
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("check-in".parse::<SourceKind>().unwrap(), SourceKind::CheckIn);
        assert_eq!("Monitor".parse::<SourceKind>().unwrap(), SourceKind::Monitor);
        assert!("pager".parse::<SourceKind>().is_err());
    }
}
