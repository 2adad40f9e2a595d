//! Orchestrator errors.

use unblock_core::{BlockerId, InvalidTransition, LoopState};
use unblock_graph::GraphError;
use unblock_storage::StorageError;

/// Errors raised by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// No blocker with this id
    #[error("unknown blocker: {0}")]
    UnknownBlocker(BlockerId),

    /// The operation does not apply in the blocker's current state
    #[error("blocker {id} is in {actual}, expected {expected}")]
    WrongState {
        /// Blocker
        id: BlockerId,
        /// State the operation needs
        expected: LoopState,
        /// State the blocker is in
        actual: LoopState,
    },

    /// The blocker was abandoned
    #[error("blocker {0} is abandoned")]
    Terminal(BlockerId),

    /// The blocker's loop finished and its pattern was stored
    #[error("blocker {0} already completed its loop")]
    Completed(BlockerId),

    /// Rejected state-machine transition
    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    /// Graph store error
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Persistence error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
