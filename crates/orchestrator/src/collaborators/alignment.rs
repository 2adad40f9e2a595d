//! Values alignment for proposed actions.

use unblock_core::{AuthorityLevel, ChannelId, ResolutionAction, Severity, ValuesConfig};

/// An action COORDINATE is about to take.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedAction {
    /// Strategy
    pub action: ResolutionAction,
    /// Authority the routing decision carries
    pub authority: AuthorityLevel,
    /// Blocker severity
    pub severity: Severity,
    /// Channel the action will use, if it sends anything
    pub channel: Option<ChannelId>,
    /// Human-readable description
    pub description: String,
}

/// Scores how well an action fits the organization's values.
pub trait AlignmentScorer: Send + Sync {
    /// Score in `[0, 1]`; below the configured threshold the action is held.
    fn alignment_score(&self, action: &ProposedAction, values: &ValuesConfig) -> f64;
}

/// Four-part additive scorer: authority, values, communication, principles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuesAlignment;

impl ValuesAlignment {
    fn authority(action: &ProposedAction, values: &ValuesConfig) -> f64 {
        if action.authority != AuthorityLevel::Immediate {
            return 0.3;
        }
        if values.require_approval_for.iter().any(|a| a == action.action.as_str()) {
            0.0
        } else if action.severity > values.immediate_max_severity {
            0.1
        } else {
            0.3
        }
    }

    fn values(action: &ProposedAction, values: &ValuesConfig) -> f64 {
        let text = action.description.to_lowercase();
        let mut score = 0.15;
        for priority in &values.priorities {
            score += 0.05
                * priority
                    .to_lowercase()
                    .split_whitespace()
                    .filter(|w| w.len() > 3 && text.contains(*w))
                    .count() as f64;
        }
        for anti in &values.anti_patterns {
            if text.contains(&anti.to_lowercase()) {
                score -= 0.1;
            }
        }
        score.clamp(0.0, 0.3)
    }

    fn communication(action: &ProposedAction, values: &ValuesConfig) -> f64 {
        let meeting = action.action == ResolutionAction::ScheduleMeeting;
        if values.prefer_async && meeting && values.meeting_as_last_resort {
            0.05
        } else if action.severity == Severity::Critical
            && action.channel.as_ref().is_some_and(|c| c.as_str() == "sms")
        {
            0.2
        } else {
            0.1
        }
    }

    fn principles(action: &ProposedAction, values: &ValuesConfig) -> f64 {
        if values.principles.is_empty() {
            return 0.1;
        }
        let text = action.description.to_lowercase();
        let matched = values
            .principles
            .iter()
            .filter(|p| {
                p.to_lowercase()
                    .split_whitespace()
                    .any(|w| w.len() > 3 && text.contains(w))
            })
            .count();
        0.2 * matched as f64 / values.principles.len() as f64
    }
}

impl AlignmentScorer for ValuesAlignment {
    fn alignment_score(&self, action: &ProposedAction, values: &ValuesConfig) -> f64 {
        let score = Self::authority(action, values)
            + Self::values(action, values)
            + Self::communication(action, values)
            + Self::principles(action, values);
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposed(action: ResolutionAction, authority: AuthorityLevel, severity: Severity) -> ProposedAction {
        ProposedAction {
            action,
            authority,
            severity,
            channel: Some(ChannelId::from("slack")),
            description: format!("{} to unblock people quickly", action.as_str()),
        }
    }

    #[test]
    fn test_routine_notify_passes_default_threshold() {
        let p = proposed(ResolutionAction::Notify, AuthorityLevel::Immediate, Severity::Low);
        let score = ValuesAlignment.alignment_score(&p, &ValuesConfig::default());
        // 0.3 authority + 0.3 values + 0.1 communication + 0.1 principles
        assert!((score - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_approval_required_action_scores_low() {
        let mut p = proposed(ResolutionAction::Reassign, AuthorityLevel::Immediate, Severity::Low);
        p.description = "reassign the task".to_string();
        let score = ValuesAlignment.alignment_score(&p, &ValuesConfig::default());
        assert!(score < 0.6, "score {score}");
    }

    #[test]
    fn test_anti_pattern_penalized() {
        let values = ValuesConfig::default();
        let clean = proposed(ResolutionAction::Escalate, AuthorityLevel::Elevated, Severity::High);
        let mut blaming = clean.clone();
        blaming.description = "escalate and blame the owner".to_string();
        assert!(
            ValuesAlignment.alignment_score(&blaming, &values)
                < ValuesAlignment.alignment_score(&clean, &values)
        );
    }

    #[test]
    fn test_meeting_as_last_resort() {
        let values = ValuesConfig {
            meeting_as_last_resort: true,
            ..ValuesConfig::default()
        };
        let p = proposed(ResolutionAction::ScheduleMeeting, AuthorityLevel::Standard, Severity::Medium);
        let with = ValuesAlignment.alignment_score(&p, &values);
        let without = ValuesAlignment.alignment_score(&p, &ValuesConfig::default());
        assert!(with < without);
    }
}
