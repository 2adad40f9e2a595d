//! Coordination steps - the append-only audit trail of a blocker.

use serde::{Deserialize, Serialize};
use crate::state::LoopState;
use crate::Time;

/// Identifier for whoever performed a step (person, adapter, or the loop itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(pub String);

impl Actor {
    /// Create a new actor ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The resolution loop itself.
    pub fn system() -> Self {
        Self("system".to_string())
    }

    /// The escalation ticker.
    pub fn timeline() -> Self {
        Self("timeline".to_string())
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationStep {
    /// Position in the trail (0-based)
    pub seq: usize,

    /// What was done
    pub action: String,

    /// Who did it
    pub actor: Actor,

    /// When it started
    pub started_at: Time,

    /// When it finished, if it is a completed unit of work
    pub completed_at: Option<Time>,

    /// Result description
    pub outcome: Option<String>,

    /// What is expected to happen next
    pub next_step: Option<String>,

    /// Loop state after this step
    pub state: LoopState,
}

/// Append-only, timestamp-ordered log of coordination steps.
///
/// There is no way to edit or remove an entry once appended. A timestamp
/// earlier than the last entry is clamped up to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail {
    steps: Vec<CoordinationStep>,
}

/// Builder for a step about to be appended.
#[derive(Debug, Clone)]
pub struct StepDraft {
    action: String,
    actor: Actor,
    at: Time,
    completed: bool,
    outcome: Option<String>,
    next_step: Option<String>,
}

impl StepDraft {
    /// Start a draft.
    pub fn new(action: impl Into<String>, actor: Actor, at: Time) -> Self {
        Self {
            action: action.into(),
            actor,
            at,
            completed: false,
            outcome: None,
            next_step: None,
        }
    }

    /// Mark the step as completed at the same instant it started.
    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Record the outcome.
    pub fn outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    /// Record the expected next step.
    pub fn next(mut self, next: impl Into<String>) -> Self {
        self.next_step = Some(next.into());
        self
    }
}

impl AuditTrail {
    /// Create an empty trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step that leaves the blocker in `state`.
    pub fn append(&mut self, draft: StepDraft, state: LoopState) -> &CoordinationStep {
        let at = match self.steps.last() {
            Some(last) if last.started_at > draft.at => last.started_at,
            _ => draft.at,
        };
        let seq = self.steps.len();
        self.steps.push(CoordinationStep {
            seq,
            action: draft.action,
            actor: draft.actor,
            started_at: at,
            completed_at: draft.completed.then_some(at),
            outcome: draft.outcome,
            next_step: draft.next_step,
            state,
        });
        &self.steps[seq]
    }

    /// All steps, oldest first.
    pub fn steps(&self) -> &[CoordinationStep] {
        &self.steps
    }

    /// Most recent step.
    pub fn last(&self) -> Option<&CoordinationStep> {
        self.steps.last()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the trail is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_append_assigns_sequence() {
        let mut trail = AuditTrail::new();
        let now = Utc::now();
        trail.append(StepDraft::new("submitted", Actor::system(), now), LoopState::Detect);
        trail.append(
            StepDraft::new("identified", Actor::system(), now).completed(),
            LoopState::Classify,
        );
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.steps()[1].seq, 1);
        assert_eq!(trail.steps()[1].completed_at, Some(now));
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut trail = AuditTrail::new();
        let now = Utc::now();
        trail.append(StepDraft::new("a", Actor::system(), now), LoopState::Detect);
        let earlier = now - Duration::minutes(5);
        let step = trail.append(StepDraft::new("b", Actor::system(), earlier), LoopState::Classify);
        assert_eq!(step.started_at, now);
    }
}
