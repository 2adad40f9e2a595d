//! Classified blockers - type, severity and impact.

use serde::{Deserialize, Serialize};
use crate::id::{EmployeeId, ProjectId, TaskId};
use crate::signal::BlockerSignal;
use crate::Time;

/// Five categories of organizational blockers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerType {
    Dependency,
    Resource,
    Technical,
    Knowledge,
    Organizational,
}

impl BlockerType {
    /// All variants, in declaration order.
    pub const ALL: [BlockerType; 5] = [
        BlockerType::Dependency,
        BlockerType::Resource,
        BlockerType::Technical,
        BlockerType::Knowledge,
        BlockerType::Organizational,
    ];

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockerType::Dependency => "dependency",
            BlockerType::Resource => "resource",
            BlockerType::Technical => "technical",
            BlockerType::Knowledge => "knowledge",
            BlockerType::Organizational => "organizational",
        }
    }
}

impl std::str::FromStr for BlockerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockerType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown blocker type: {s}"))
    }
}

/// Blocker severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All variants, least severe first.
    pub const ALL: [Severity; 4] = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    /// Raise by exactly one tier; critical stays critical.
    pub fn escalate(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|v| v.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown severity: {s}"))
    }
}

/// Everything transitively waiting on a blocked task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlastRadius {
    /// Affected downstream tasks (origin excluded)
    pub affected_tasks: Vec<TaskId>,
    /// Distinct assignees of affected tasks
    pub affected_employees: Vec<EmployeeId>,
    /// Distinct projects of affected tasks
    pub affected_projects: Vec<ProjectId>,
}

impl BlastRadius {
    /// Number of affected tasks.
    pub fn task_count(&self) -> usize {
        self.affected_tasks.len()
    }

    /// Merge another radius in, keeping ids distinct and sorted.
    pub fn merge(&mut self, other: BlastRadius) {
        fn union<T: Ord>(into: &mut Vec<T>, from: Vec<T>) {
            into.extend(from);
            into.sort();
            into.dedup();
        }
        union(&mut self.affected_tasks, other.affected_tasks);
        union(&mut self.affected_employees, other.affected_employees);
        union(&mut self.affected_projects, other.affected_projects);
    }
}

/// A signal after classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedBlocker {
    /// The original detection record
    pub signal: BlockerSignal,

    /// Blocker category
    pub blocker_type: BlockerType,

    /// Current severity (raised on verification failure)
    pub severity: Severity,

    /// Classification confidence
    pub confidence: f64,

    /// Tasks directly blocked
    pub affected_tasks: Vec<TaskId>,

    /// Downstream impact, recomputed on every classification
    pub blast_radius: BlastRadius,

    /// When classification completed; the escalation clock starts here
    pub classified_at: Time,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_escalates_one_tier() {
        assert_eq!(Severity::Low.escalate(), Severity::Medium);
        assert_eq!(Severity::Medium.escalate(), Severity::High);
        assert_eq!(Severity::High.escalate(), Severity::Critical);
        assert_eq!(Severity::Critical.escalate(), Severity::Critical);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
    }

    #[test]
    fn test_blast_radius_merge_dedups() {
        let mut a = BlastRadius {
            affected_tasks: vec!["t2".into(), "t1".into()],
            affected_employees: vec!["bob".into()],
            affected_projects: vec![],
        };
        a.merge(BlastRadius {
            affected_tasks: vec!["t1".into(), "t3".into()],
            affected_employees: vec!["bob".into(), "carol".into()],
            affected_projects: vec!["p".into()],
        });
        assert_eq!(a.task_count(), 3);
        assert_eq!(a.affected_employees.len(), 2);
        assert_eq!(a.affected_projects, vec![ProjectId::new("p")]);
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!("Technical".parse::<BlockerType>().unwrap(), BlockerType::Technical);
        assert!("weather".parse::<BlockerType>().is_err());
    }
}
