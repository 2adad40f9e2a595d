//! Views over blocker records: current state and the review queue.

use serde::Serialize;
use unblock_core::{
    BlockerId, BlockerRecord, BlockerType, CoordinationStep, EmployeeId, EscalationEntry,
    FlagReason, LoopState, Severity, Time,
};

/// Snapshot of one blocker for display.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentState {
    /// Blocker
    pub id: BlockerId,
    /// Loop state
    pub state: LoopState,
    /// Description as reported
    pub description: String,
    /// Category, once classified
    pub blocker_type: Option<BlockerType>,
    /// Severity, once classified
    pub severity: Option<Severity>,
    /// Downstream tasks affected
    pub blast_radius: usize,
    /// Primary resolver, once routed
    pub target: Option<EmployeeId>,
    /// Open review flag
    pub flag: Option<FlagReason>,
    /// Escalation entries still to fire
    pub pending_escalations: Vec<EscalationEntry>,
    /// Completed loop passes
    pub loops_completed: u32,
    /// Most recent audit step
    pub last_step: Option<CoordinationStep>,
    /// Last change
    pub updated_at: Time,
}

impl CurrentState {
    pub(crate) fn new(record: &BlockerRecord, pending: Vec<EscalationEntry>) -> Self {
        Self {
            id: record.id,
            state: record.state,
            description: record.signal.description().to_string(),
            blocker_type: record.classified.as_ref().map(|c| c.blocker_type),
            severity: record.severity(),
            blast_radius: record
                .classified
                .as_ref()
                .map_or(0, |c| c.blast_radius.task_count()),
            target: record.routing.as_ref().map(|r| r.target.clone()),
            flag: record.flag.as_ref().map(|f| f.reason),
            pending_escalations: pending,
            loops_completed: record.loops_completed,
            last_step: record.trail.last().cloned(),
            updated_at: record.updated_at,
        }
    }
}

/// Entry of the human review queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedBlocker {
    /// Blocker
    pub id: BlockerId,
    /// State it is held in
    pub state: LoopState,
    /// Why it needs a human
    pub reason: FlagReason,
    /// Detail
    pub detail: String,
    /// Severity, if known
    pub severity: Option<Severity>,
    /// When flagged
    pub raised_at: Time,
}

impl FlaggedBlocker {
    pub(crate) fn from_record(record: &BlockerRecord) -> Option<Self> {
        let flag = record.flag.as_ref()?;
        Some(Self {
            id: record.id,
            state: record.state,
            reason: flag.reason,
            detail: flag.detail.clone(),
            severity: record.severity(),
            raised_at: flag.raised_at,
        })
    }
}
