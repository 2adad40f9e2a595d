//! Graph errors.

use unblock_core::{EmployeeId, ProjectId, TaskId};

/// Errors raised by the graph store.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Edge or query references a task the graph does not know
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// Task references an employee the graph does not know
    #[error("unknown employee: {0}")]
    UnknownEmployee(EmployeeId),

    /// Task references a project the graph does not know
    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    /// A task cannot wait on itself
    #[error("task {0} cannot wait on itself")]
    SelfDependency(TaskId),

    /// No active edge between the two tasks
    #[error("no active edge {blocked} -> {blocking}")]
    NoSuchEdge {
        /// Blocked task
        blocked: TaskId,
        /// Blocking task
        blocking: TaskId,
    },

    /// Edge resolution requires the blocking task to be done
    #[error("blocking task {0} is not done")]
    BlockingTaskNotDone(TaskId),
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
