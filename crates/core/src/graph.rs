//! Organizational graph model - employees, projects, tasks and waits-on edges.

use serde::{Deserialize, Serialize};
use crate::id::{EmployeeId, ProjectId, TaskId};
use crate::Time;

/// A team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Unique identifier
    pub id: EmployeeId,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Team
    #[serde(default)]
    pub team: String,

    /// Role
    #[serde(default)]
    pub role: String,

    /// Direct manager
    #[serde(default)]
    pub manager: Option<EmployeeId>,
}

/// A project grouping tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,

    /// Owning team
    #[serde(default)]
    pub team: String,

    /// Deadline
    #[serde(default)]
    pub deadline: Option<Time>,
}

/// Task status as reported by the task system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A unit of work that can wait on other tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning project
    #[serde(default)]
    pub project: Option<ProjectId>,

    /// Assignee
    #[serde(default)]
    pub assignee: Option<EmployeeId>,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Whether the task is currently blocked
    #[serde(default)]
    pub blocked: bool,

    /// The task it is blocked by, if known
    #[serde(default)]
    pub blocking_task: Option<TaskId>,

    /// Due date; the project deadline applies when unset
    #[serde(default)]
    pub due: Option<Time>,

    /// When progress last stopped, as reported by the tracker
    #[serde(default)]
    pub stalled_since: Option<Time>,
}

impl Task {
    /// Create a bare task.
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            project: None,
            assignee: None,
            status: TaskStatus::Todo,
            blocked: false,
            blocking_task: None,
            due: None,
            stalled_since: None,
        }
    }

    /// Set the assignee.
    pub fn assigned_to(mut self, assignee: impl Into<EmployeeId>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    /// Set the project.
    pub fn in_project(mut self, project: impl Into<ProjectId>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the due date.
    pub fn due_by(mut self, due: Time) -> Self {
        self.due = Some(due);
        self
    }

    /// Mark the task as without progress since `since`.
    pub fn with_stall(mut self, since: Time) -> Self {
        self.stalled_since = Some(since);
        self
    }
}

/// Kinds of waits-on relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Needs the output of the blocking task
    #[default]
    Dependency,
    /// Needs a review or approval
    Approval,
    /// Needs a resource the blocking task holds
    Resource,
    /// Hand-off between teams
    Handoff,
}

/// `source` waits on `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Blocked task
    pub source: TaskId,

    /// Blocking task
    pub target: TaskId,

    /// Relationship kind
    #[serde(default, rename = "type")]
    pub edge_type: EdgeType,

    /// When the edge was recorded
    pub created_at: Time,

    /// When the blocking task was done and the edge stopped counting
    #[serde(default)]
    pub resolved_at: Option<Time>,

    /// Extra delay added when a slip propagates along this edge
    #[serde(default)]
    pub lag_hours: f64,
}

impl DependencyEdge {
    /// Create an unresolved dependency edge.
    pub fn new(source: impl Into<TaskId>, target: impl Into<TaskId>, created_at: Time) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: EdgeType::Dependency,
            created_at,
            resolved_at: None,
            lag_hours: 0.0,
        }
    }

    /// Set the edge type.
    pub fn with_type(mut self, edge_type: EdgeType) -> Self {
        self.edge_type = edge_type;
        self
    }

    /// Set the propagation lag.
    pub fn with_lag(mut self, hours: f64) -> Self {
        self.lag_hours = hours.max(0.0);
        self
    }

    /// Whether the edge still counts in traversals.
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Serializable copy of the whole graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Employees
    #[serde(default)]
    pub employees: Vec<Employee>,
    /// Projects
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Tasks
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Edges, resolved ones included
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
}
