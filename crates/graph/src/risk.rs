//! Schedule risk - unfinished tasks that are past due or not moving.

use chrono::Duration;
use unblock_core::{EmployeeId, Severity, TaskId, TaskStatus, Time};
use crate::store::DependencyGraph;

/// Days past due after which an overdue task is critical.
const CRITICAL_OVERDUE_DAYS: i64 = 7;

/// Why a task looks stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskKind {
    /// Past its due date, or its project's deadline
    Overdue,
    /// No progress for longer than the stall threshold
    Stalled,
}

/// A task nobody reported as blocked but that looks stuck.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRisk {
    /// The task
    pub task: TaskId,
    /// Who owns it
    pub assignee: Option<EmployeeId>,
    /// Overdue or stalled
    pub kind: RiskKind,
    /// Time past due, or time without progress
    pub age: Duration,
}

impl TaskRisk {
    /// Severity the detector assigns.
    pub fn severity(&self) -> Severity {
        match self.kind {
            RiskKind::Overdue if self.age.num_days() > CRITICAL_OVERDUE_DAYS => Severity::Critical,
            RiskKind::Overdue => Severity::High,
            RiskKind::Stalled => Severity::Medium,
        }
    }

    /// One-line description for the blocker signal.
    pub fn describe(&self) -> String {
        match self.kind {
            RiskKind::Overdue => format!("Task {} is overdue by {} day(s)", self.task, self.age.num_days()),
            RiskKind::Stalled => format!("Task {} has made no progress for {} day(s)", self.task, self.age.num_days()),
        }
    }
}

impl DependencyGraph {
    /// Unfinished tasks past their due date, most overdue first.
    ///
    /// A task without its own due date inherits its project's deadline.
    pub fn overdue_tasks(&self, now: Time) -> Vec<TaskRisk> {
        let mut out: Vec<TaskRisk> = self
            .tasks()
            .filter(|t| t.status != TaskStatus::Done)
            .filter_map(|t| {
                let due = t.due.or_else(|| {
                    t.project
                        .as_ref()
                        .and_then(|p| self.project(p))
                        .and_then(|p| p.deadline)
                })?;
                (due < now).then(|| TaskRisk {
                    task: t.id.clone(),
                    assignee: t.assignee.clone(),
                    kind: RiskKind::Overdue,
                    age: now - due,
                })
            })
            .collect();
        out.sort_by(|a, b| b.age.cmp(&a.age).then_with(|| a.task.cmp(&b.task)));
        out
    }

    /// Unfinished tasks without progress for longer than `threshold`, longest first.
    pub fn stalled_tasks(&self, now: Time, threshold: Duration) -> Vec<TaskRisk> {
        let mut out: Vec<TaskRisk> = self
            .tasks()
            .filter(|t| t.status != TaskStatus::Done)
            .filter_map(|t| {
                let since = t.stalled_since?;
                (now - since > threshold).then(|| TaskRisk {
                    task: t.id.clone(),
                    assignee: t.assignee.clone(),
                    kind: RiskKind::Stalled,
                    age: now - since,
                })
            })
            .collect();
        out.sort_by(|a, b| b.age.cmp(&a.age).then_with(|| a.task.cmp(&b.task)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use unblock_core::{Project, ProjectId, Task};
    use crate::store::Node;

    fn now() -> Time {
        Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_overdue_severity_turns_critical_after_a_week() {
        let mut g = DependencyGraph::new();
        g.add_node(Node::Task(Task::new("late").due_by(now() - Duration::days(2)))).unwrap();
        g.add_node(Node::Task(Task::new("very-late").due_by(now() - Duration::days(9)))).unwrap();
        g.add_node(Node::Task(Task::new("on-time").due_by(now() + Duration::days(1)))).unwrap();
        g.add_node(Node::Task(
            Task::new("shipped")
                .due_by(now() - Duration::days(30))
                .with_status(TaskStatus::Done),
        ))
        .unwrap();

        let overdue = g.overdue_tasks(now());
        let ids: Vec<&str> = overdue.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(ids, vec!["very-late", "late"]);
        assert_eq!(overdue[0].severity(), Severity::Critical);
        assert_eq!(overdue[1].severity(), Severity::High);
        assert_eq!(overdue[1].describe(), "Task late is overdue by 2 day(s)");
    }

    #[test]
    fn test_seven_days_overdue_is_still_high() {
        let mut g = DependencyGraph::new();
        g.add_node(Node::Task(Task::new("t").due_by(now() - Duration::days(7)))).unwrap();
        assert_eq!(g.overdue_tasks(now())[0].severity(), Severity::High);
    }

    #[test]
    fn test_project_deadline_applies_without_task_due() {
        let mut g = DependencyGraph::new();
        g.add_node(Node::Project(Project {
            id: ProjectId::from("launch"),
            team: "platform".into(),
            deadline: Some(now() - Duration::days(1)),
        }))
        .unwrap();
        g.add_node(Node::Task(Task::new("t").in_project("launch").assigned_to("ann"))).unwrap();

        let overdue = g.overdue_tasks(now());
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].assignee.as_ref().map(|a| a.as_str()), Some("ann"));
    }

    #[test]
    fn test_stalled_needs_more_than_threshold() {
        let mut g = DependencyGraph::new();
        let threshold = Duration::days(3);
        g.add_node(Node::Task(
            Task::new("exactly")
                .with_status(TaskStatus::InProgress)
                .with_stall(now() - threshold),
        ))
        .unwrap();
        g.add_node(Node::Task(
            Task::new("stuck")
                .with_status(TaskStatus::InProgress)
                .with_stall(now() - Duration::days(5)),
        ))
        .unwrap();
        g.add_node(Node::Task(Task::new("moving").with_status(TaskStatus::InProgress))).unwrap();

        let stalled = g.stalled_tasks(now(), threshold);
        assert_eq!(stalled.len(), 1);
        assert_eq!(stalled[0].task.as_str(), "stuck");
        assert_eq!(stalled[0].severity(), Severity::Medium);
    }
}
