//! Blocker records - everything the loop knows about one blocker.

use serde::{Deserialize, Serialize};
use crate::blocker::{ClassifiedBlocker, Severity};
use crate::engagement::EngagementAction;
use crate::id::{BlockerId, EmployeeId, TaskId};
use crate::routing::{ResolutionAction, RoutingDecision};
use crate::signal::BlockerSignal;
use crate::state::LoopState;
use crate::step::AuditTrail;
use crate::verification::VerificationResult;
use crate::Time;

/// Why a blocker needs a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// Classification or routing confidence below the floor
    LowConfidence,
    /// The proposed action conflicts with organizational values
    AlignmentRejected,
    /// Every escalation fired without a response
    EscalationExhausted,
    /// An adapter kept failing
    MissedContact,
}

impl FlagReason {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagReason::LowConfidence => "low_confidence",
            FlagReason::AlignmentRejected => "alignment_rejected",
            FlagReason::EscalationExhausted => "escalation_exhausted",
            FlagReason::MissedContact => "missed_contact",
        }
    }

    /// Whether the loop must wait for a human before advancing.
    ///
    /// Missed contacts and exhausted escalation leave the timeline and
    /// incoming responses in charge.
    pub fn holds_state(&self) -> bool {
        matches!(self, FlagReason::LowConfidence | FlagReason::AlignmentRejected)
    }
}

/// Entry in the human review queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    /// Reason
    pub reason: FlagReason,
    /// Human-readable detail
    pub detail: String,
    /// When it was raised
    pub raised_at: Time,
}

/// A reply from someone contacted about the blocker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Responder
    pub from: EmployeeId,
    /// Reply text
    pub message: String,
    /// When it arrived
    pub received_at: Time,
}

/// Someone reported the blocker fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Who fixed it
    pub by: EmployeeId,
    /// What was done
    pub notes: String,
    /// When
    pub resolved_at: Time,
}

/// Persistent state of one blocker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockerRecord {
    /// Identifier
    pub id: BlockerId,

    /// Current loop state
    pub state: LoopState,

    /// Detection record
    pub signal: BlockerSignal,

    /// Latest classification
    #[serde(default)]
    pub classified: Option<ClassifiedBlocker>,

    /// Latest routing decision
    #[serde(default)]
    pub routing: Option<RoutingDecision>,

    /// Contact attempts, in order
    #[serde(default)]
    pub engagements: Vec<EngagementAction>,

    /// Replies received
    #[serde(default)]
    pub responses: Vec<Response>,

    /// Action executed in COORDINATE (after any fallback)
    #[serde(default)]
    pub action_taken: Option<ResolutionAction>,

    /// Reported fix
    #[serde(default)]
    pub resolution: Option<Resolution>,

    /// Current or last verification round
    #[serde(default)]
    pub verification: Option<VerificationResult>,

    /// When the current verification window opened
    #[serde(default)]
    pub verification_started_at: Option<Time>,

    /// Whether the second verification prompt has gone out
    #[serde(default)]
    pub verification_reminded: bool,

    /// Whether verification failed at least once
    #[serde(default)]
    pub recurred: bool,

    /// Open review flag
    #[serde(default)]
    pub flag: Option<ReviewFlag>,

    /// A human approved the pending action despite alignment
    #[serde(default)]
    pub approved: bool,

    /// Completed loop passes (incremented on LEARN)
    #[serde(default)]
    pub loops_completed: u32,

    /// Creation time
    pub created_at: Time,

    /// Last change
    pub updated_at: Time,

    /// Append-only coordination log
    #[serde(default)]
    pub trail: AuditTrail,
}

impl BlockerRecord {
    /// A freshly detected blocker.
    pub fn new(id: BlockerId, signal: BlockerSignal, at: Time) -> Self {
        Self {
            id,
            state: LoopState::Detect,
            signal,
            classified: None,
            routing: None,
            engagements: Vec::new(),
            responses: Vec::new(),
            action_taken: None,
            resolution: None,
            verification: None,
            verification_started_at: None,
            verification_reminded: false,
            recurred: false,
            flag: None,
            approved: false,
            loops_completed: 0,
            created_at: at,
            updated_at: at,
            trail: AuditTrail::new(),
        }
    }

    /// Tasks the blocker was reported against.
    pub fn related_tasks(&self) -> &[TaskId] {
        self.signal.related_tasks()
    }

    /// Current severity, if classified.
    pub fn severity(&self) -> Option<Severity> {
        self.classified.as_ref().map(|c| c.severity)
    }

    /// Whether the blocker waits in the review queue.
    pub fn is_flagged(&self) -> bool {
        self.flag.is_some()
    }

    /// Whether the loop is over: abandoned, or back in DETECT after LEARN.
    pub fn is_closed(&self) -> bool {
        self.state.is_terminal() || (self.state == LoopState::Detect && self.loops_completed > 0)
    }

    /// Whether a response arrived after the last contact.
    pub fn has_response(&self) -> bool {
        !self.responses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SourceKind;
    use chrono::Utc;

    #[test]
    fn test_new_record_starts_in_detect() {
        let now = Utc::now();
        let signal = BlockerSignal::new(SourceKind::CheckIn, "ann", "waiting on review", now)
            .with_tasks([TaskId::from("t1")]);
        let record = BlockerRecord::new(BlockerId::new(), signal, now);
        assert_eq!(record.state, LoopState::Detect);
        assert_eq!(record.related_tasks(), &[TaskId::from("t1")]);
        assert!(!record.is_flagged());
        assert!(record.severity().is_none());
        assert!(!record.is_closed());
    }

    #[test]
    fn test_completed_loop_is_closed() {
        let now = Utc::now();
        let signal = BlockerSignal::new(SourceKind::Report, "bob", "no access", now);
        let mut record = BlockerRecord::new(BlockerId::new(), signal, now);
        record.loops_completed = 1;
        assert!(record.is_closed());

        record.state = LoopState::Verify;
        assert!(!record.is_closed());
        record.state = LoopState::Abandoned;
        assert!(record.is_closed());
    }

    #[test]
    fn test_record_round_trips_with_missing_optionals() {
        let now = Utc::now();
        let signal = BlockerSignal::new(SourceKind::Report, "bob", "no access", now);
        let record = BlockerRecord::new(BlockerId::new(), signal, now);
        let json = serde_json::to_string(&record).unwrap();
        let back: BlockerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.trail, record.trail);
    }
}
