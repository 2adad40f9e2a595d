//! Routing decisions - who resolves a blocker and with what authority.

use serde::{Deserialize, Serialize};
use crate::id::EmployeeId;
use crate::Time;

/// Authority required to resolve a blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    /// The loop can act on its own
    Immediate,
    /// Needs team-lead approval
    Standard,
    /// Needs director/exec approval
    Elevated,
}

impl AuthorityLevel {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityLevel::Immediate => "immediate",
            AuthorityLevel::Standard => "standard",
            AuthorityLevel::Elevated => "elevated",
        }
    }
}

/// Actions the loop can take to resolve a blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    Notify,
    ScheduleMeeting,
    Reassign,
    Escalate,
    ProvideInfo,
    ConnectPeers,
}

impl ResolutionAction {
    /// Action to try when this one cannot be carried out.
    pub fn fallback(&self) -> Option<ResolutionAction> {
        match self {
            ResolutionAction::Escalate => Some(ResolutionAction::ScheduleMeeting),
            ResolutionAction::Reassign => Some(ResolutionAction::Notify),
            ResolutionAction::ScheduleMeeting => Some(ResolutionAction::Notify),
            ResolutionAction::ConnectPeers => Some(ResolutionAction::ProvideInfo),
            ResolutionAction::Notify | ResolutionAction::ProvideInfo => None,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::Notify => "notify",
            ResolutionAction::ScheduleMeeting => "schedule_meeting",
            ResolutionAction::Reassign => "reassign",
            ResolutionAction::Escalate => "escalate",
            ResolutionAction::ProvideInfo => "provide_info",
            ResolutionAction::ConnectPeers => "connect_peers",
        }
    }
}

impl std::str::FromStr for ResolutionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notify" => Ok(ResolutionAction::Notify),
            "schedule_meeting" => Ok(ResolutionAction::ScheduleMeeting),
            "reassign" => Ok(ResolutionAction::Reassign),
            "escalate" => Ok(ResolutionAction::Escalate),
            "provide_info" => Ok(ResolutionAction::ProvideInfo),
            "connect_peers" => Ok(ResolutionAction::ConnectPeers),
            other => Err(format!("unknown resolution action: {other}")),
        }
    }
}

/// The routing decision for one active blocker.
///
/// Superseded (never edited) when the blocker is re-routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Authority required
    pub authority: AuthorityLevel,

    /// Strategy to apply in COORDINATE
    pub action: ResolutionAction,

    /// Primary resolver
    pub target: EmployeeId,

    /// Backups, contacted in order; escalation appends to this list
    pub backups: Vec<EmployeeId>,

    /// Manager, then director, of the target
    pub escalation_chain: Vec<EmployeeId>,

    /// How long to wait for the target before following up
    pub max_wait: chrono::Duration,

    /// Routing confidence
    pub confidence: f64,

    /// When this decision was made
    pub decided_at: Time,
}

impl RoutingDecision {
    /// Every resolver currently in play: target first, then backups.
    pub fn resolvers(&self) -> Vec<EmployeeId> {
        let mut out = vec![self.target.clone()];
        for b in &self.backups {
            if !out.contains(b) {
                out.push(b.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_chain_terminates() {
        let mut action = ResolutionAction::Escalate;
        let mut hops = 0;
        while let Some(next) = action.fallback() {
            action = next;
            hops += 1;
        }
        assert_eq!(action, ResolutionAction::Notify);
        assert_eq!(hops, 2);
    }

    #[test]
    fn test_action_parse_matches_as_str() {
        for a in [
            ResolutionAction::Notify,
            ResolutionAction::ScheduleMeeting,
            ResolutionAction::Reassign,
            ResolutionAction::Escalate,
            ResolutionAction::ProvideInfo,
            ResolutionAction::ConnectPeers,
        ] {
            assert_eq!(a.as_str().parse::<ResolutionAction>().unwrap(), a);
        }
    }
}
