//! Loop states and the events that move a blocker between them.

use serde::{Deserialize, Serialize};

/// Phase of the resolution loop a blocker is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Detect,
    Classify,
    Route,
    Engage,
    Coordinate,
    Resolve,
    Verify,
    Learn,
    /// Terminal: deprioritized by someone with authority
    Abandoned,
}

impl LoopState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Abandoned)
    }

    /// Whether the escalation timeline is live in this state.
    pub fn is_engaging(&self) -> bool {
        matches!(self, LoopState::Engage | LoopState::Coordinate)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Detect => "DETECT",
            LoopState::Classify => "CLASSIFY",
            LoopState::Route => "ROUTE",
            LoopState::Engage => "ENGAGE",
            LoopState::Coordinate => "COORDINATE",
            LoopState::Resolve => "RESOLVE",
            LoopState::Verify => "VERIFY",
            LoopState::Learn => "LEARN",
            LoopState::Abandoned => "ABANDONED",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that trigger loop transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LoopEvent {
    BlockerIdentified,
    ClassificationComplete,
    RoutingDecided,
    EngagementSent,
    ActionCompleted,
    ResolutionRecorded,
    VerificationPassed,
    VerificationFailed,
    PatternStored,
    AuthorizedDeprioritization { by: String, reason: String },
}

impl LoopEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            LoopEvent::BlockerIdentified => "blocker_identified",
            LoopEvent::ClassificationComplete => "classification_complete",
            LoopEvent::RoutingDecided => "routing_decided",
            LoopEvent::EngagementSent => "engagement_sent",
            LoopEvent::ActionCompleted => "action_completed",
            LoopEvent::ResolutionRecorded => "resolution_recorded",
            LoopEvent::VerificationPassed => "verification_passed",
            LoopEvent::VerificationFailed => "verification_failed",
            LoopEvent::PatternStored => "pattern_stored",
            LoopEvent::AuthorizedDeprioritization { .. } => "authorized_deprioritization",
        }
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from {from} on {event}")]
pub struct InvalidTransition {
    /// State the blocker was in
    pub from: LoopState,
    /// Event that was applied
    pub event: &'static str,
}

impl LoopState {
    /// Resolve the target state for `event`, or reject it.
    pub fn next(self, event: &LoopEvent) -> Result<LoopState, InvalidTransition> {
        let target = match (self, event) {
            (from, LoopEvent::AuthorizedDeprioritization { .. }) if !from.is_terminal() => {
                LoopState::Abandoned
            }
            (LoopState::Detect, LoopEvent::BlockerIdentified) => LoopState::Classify,
            (LoopState::Classify, LoopEvent::ClassificationComplete) => LoopState::Route,
            (LoopState::Route, LoopEvent::RoutingDecided) => LoopState::Engage,
            (LoopState::Engage, LoopEvent::EngagementSent) => LoopState::Coordinate,
            (LoopState::Coordinate, LoopEvent::ActionCompleted) => LoopState::Resolve,
            (LoopState::Resolve, LoopEvent::ResolutionRecorded) => LoopState::Verify,
            (LoopState::Verify, LoopEvent::VerificationPassed) => LoopState::Learn,
            (LoopState::Verify, LoopEvent::VerificationFailed) => LoopState::Classify,
            (LoopState::Learn, LoopEvent::PatternStored) => LoopState::Detect,
            (from, event) => {
                return Err(InvalidTransition {
                    from,
                    event: event.event_type(),
                })
            }
        };
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_visits_every_phase() {
        let events = [
            LoopEvent::BlockerIdentified,
            LoopEvent::ClassificationComplete,
            LoopEvent::RoutingDecided,
            LoopEvent::EngagementSent,
            LoopEvent::ActionCompleted,
            LoopEvent::ResolutionRecorded,
            LoopEvent::VerificationPassed,
            LoopEvent::PatternStored,
        ];
        let mut state = LoopState::Detect;
        let mut seen = vec![state];
        for e in &events {
            state = state.next(e).unwrap();
            seen.push(state);
        }
        assert_eq!(state, LoopState::Detect);
        assert_eq!(seen.len(), 9);
        assert!(seen.contains(&LoopState::Learn));
    }

    #[test]
    fn test_verification_failure_reenters_classify() {
        assert_eq!(
            LoopState::Verify.next(&LoopEvent::VerificationFailed).unwrap(),
            LoopState::Classify
        );
    }

    #[test]
    fn test_deprioritization_from_any_non_terminal_state() {
        let event = LoopEvent::AuthorizedDeprioritization {
            by: "vp".into(),
            reason: "descoped".into(),
        };
        for s in [LoopState::Detect, LoopState::Coordinate, LoopState::Verify] {
            assert_eq!(s.next(&event).unwrap(), LoopState::Abandoned);
        }
        assert!(LoopState::Abandoned.next(&event).is_err());
    }

    #[test]
    fn test_out_of_order_event_rejected() {
        let err = LoopState::Detect.next(&LoopEvent::EngagementSent).unwrap_err();
        assert_eq!(err.from, LoopState::Detect);
        assert_eq!(err.event, "engagement_sent");
    }
}
