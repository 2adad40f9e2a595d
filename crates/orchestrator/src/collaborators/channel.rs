//! Channel selection for outreach.

use std::collections::HashMap;
use unblock_core::{ChannelId, Severity};

/// How involved the conversation is likely to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Complexity {
    /// A quick question or nudge
    Simple,
    /// Needs some back and forth
    Medium,
    /// Needs detail or attachments
    Complex,
}

impl Complexity {
    /// Rough complexity implied by a blocker's severity.
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Low | Severity::Medium => Complexity::Simple,
            Severity::High => Complexity::Medium,
            Severity::Critical => Complexity::Complex,
        }
    }
}

/// Observed behaviour of one channel for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProfile {
    /// Channel
    pub channel: ChannelId,
    /// Fraction of messages answered
    pub response_rate: f64,
    /// Normalized response speed (1.0 = instant)
    pub speed: f64,
    /// Whether the recipient prefers this channel
    pub preferred: bool,
    /// Fit per urgency level
    pub urgency_fit: HashMap<Severity, f64>,
    /// Fit per complexity
    pub complexity_fit: HashMap<Complexity, f64>,
}

impl ChannelProfile {
    fn prior(
        channel: &str,
        response_rate: f64,
        speed: f64,
        urgency: [f64; 4],
        complexity: [f64; 3],
    ) -> Self {
        Self {
            channel: ChannelId::from(channel),
            response_rate,
            speed,
            preferred: false,
            urgency_fit: Severity::ALL.into_iter().zip(urgency).collect(),
            complexity_fit: [Complexity::Simple, Complexity::Medium, Complexity::Complex]
                .into_iter()
                .zip(complexity)
                .collect(),
        }
    }

    /// Default prior for chat.
    pub fn slack() -> Self {
        Self::prior("slack", 0.85, 0.80, [0.9, 0.85, 0.7, 0.5], [0.9, 0.7, 0.5])
    }

    /// Default prior for email.
    pub fn email() -> Self {
        Self::prior("email", 0.70, 0.40, [0.8, 0.7, 0.4, 0.2], [0.5, 0.8, 0.9])
    }

    /// Default prior for text messages.
    pub fn sms() -> Self {
        Self::prior("sms", 0.95, 0.95, [0.3, 0.5, 0.8, 1.0], [0.9, 0.4, 0.2])
    }

    /// Mark as the recipient's preferred channel.
    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }
}

/// Scores and picks a channel for a contact attempt.
pub trait ChannelSelector: Send + Sync {
    /// Score in `[0, 1]`.
    fn channel_score(&self, profile: &ChannelProfile, urgency: Severity, complexity: Complexity) -> f64;

    /// Candidates known for a recipient.
    fn candidates(&self) -> Vec<ChannelProfile>;

    /// Highest-scoring candidate; earlier candidates win ties.
    fn select_channel(
        &self,
        candidates: &[ChannelProfile],
        urgency: Severity,
        complexity: Complexity,
    ) -> Option<ChannelId> {
        let mut best: Option<(&ChannelProfile, f64)> = None;
        for profile in candidates {
            let score = self.channel_score(profile, urgency, complexity);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((profile, score));
            }
        }
        best.map(|(p, _)| p.channel.clone())
    }
}

/// Weighted urgency-match scoring over static priors.
#[derive(Debug, Clone)]
pub struct SeverityChannelSelector {
    profiles: Vec<ChannelProfile>,
}

impl SeverityChannelSelector {
    /// Selector over slack, email and sms priors.
    pub fn new() -> Self {
        Self {
            profiles: vec![ChannelProfile::slack(), ChannelProfile::email(), ChannelProfile::sms()],
        }
    }

    /// Selector over custom profiles.
    pub fn with_profiles(profiles: Vec<ChannelProfile>) -> Self {
        Self { profiles }
    }
}

impl Default for SeverityChannelSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelSelector for SeverityChannelSelector {
    fn channel_score(&self, profile: &ChannelProfile, urgency: Severity, complexity: Complexity) -> f64 {
        let preference = if profile.preferred { 1.0 } else { 0.3 };
        let urgency_fit = profile.urgency_fit.get(&urgency).copied().unwrap_or(0.5);
        let complexity_fit = profile.complexity_fit.get(&complexity).copied().unwrap_or(0.5);

        let score = 0.30 * profile.response_rate
            + 0.25 * profile.speed
            + 0.20 * preference
            + 0.15 * urgency_fit
            + 0.10 * complexity_fit;
        score.clamp(0.0, 1.0)
    }

    fn candidates(&self) -> Vec<ChannelProfile> {
        self.profiles.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_prefers_sms() {
        let selector = SeverityChannelSelector::new();
        let picked = selector.select_channel(&selector.candidates(), Severity::Critical, Complexity::Simple);
        assert_eq!(picked, Some(ChannelId::from("sms")));
    }

    #[test]
    fn test_preference_can_outweigh_priors() {
        let selector = SeverityChannelSelector::with_profiles(vec![
            ChannelProfile::sms(),
            ChannelProfile::slack().preferred(),
        ]);
        let picked = selector.select_channel(&selector.candidates(), Severity::Low, Complexity::Simple);
        assert_eq!(picked, Some(ChannelId::from("slack")));
    }

    #[test]
    fn test_scores_are_bounded() {
        let selector = SeverityChannelSelector::new();
        for profile in selector.candidates() {
            for severity in Severity::ALL {
                let s = selector.channel_score(&profile.clone().preferred(), severity, Complexity::Complex);
                assert!((0.0..=1.0).contains(&s));
            }
        }
        assert_eq!(selector.select_channel(&[], Severity::Low, Complexity::Simple), None);
    }
}
