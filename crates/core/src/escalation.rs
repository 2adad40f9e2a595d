//! Escalation entries - scheduled contact attempts for a blocker.

use serde::{Deserialize, Serialize};
use crate::blocker::Severity;
use crate::id::BlockerId;
use crate::Time;

/// Stage of the escalation timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStage {
    FirstContact,
    FollowUp1,
    FollowUp2,
    ManagerEscalation,
    DirectorEscalation,
}

impl EscalationStage {
    /// Whether firing this stage widens the audience beyond the resolver.
    pub fn is_escalation(&self) -> bool {
        matches!(self, EscalationStage::ManagerEscalation | EscalationStage::DirectorEscalation)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStage::FirstContact => "first_contact",
            EscalationStage::FollowUp1 => "follow_up_1",
            EscalationStage::FollowUp2 => "follow_up_2",
            EscalationStage::ManagerEscalation => "manager_escalation",
            EscalationStage::DirectorEscalation => "director_escalation",
        }
    }
}

/// Lifecycle of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Fired,
    /// No longer needed (responded, rescheduled, or blocker abandoned)
    Superseded,
}

/// One scheduled contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEntry {
    /// Blocker this entry belongs to
    pub blocker_id: BlockerId,

    /// Severity the schedule was computed for
    pub severity: Severity,

    /// Stage
    pub stage: EscalationStage,

    /// When it becomes due
    pub due_at: Time,

    /// Current status
    pub status: EntryStatus,

    /// When it fired
    #[serde(default)]
    pub fired_at: Option<Time>,
}

impl EscalationEntry {
    /// Whether the entry is still waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }
}
