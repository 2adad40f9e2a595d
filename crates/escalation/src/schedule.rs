//! Fixed escalation offsets per severity.

use chrono::Duration;
use unblock_core::{EscalationStage, Severity};

/// Offsets from the anchor for every stage scheduled at `severity`.
///
/// | Severity | First contact | Follow-up 1 | Follow-up 2 | Manager | Director |
/// |----------|---------------|-------------|-------------|---------|----------|
/// | critical | 0             | 1h          | 2h          | 4h      | 8h       |
/// | high     | 1h            | 4h          | 8h          | 24h     | 48h      |
/// | medium   | 4h            | 24h         | 48h         | 72h     | 1 week   |
/// | low      | 24h           | 48h         | 1 week      | 2 weeks | -        |
pub fn offsets(severity: Severity) -> Vec<(EscalationStage, Duration)> {
    use EscalationStage::*;

    let h = Duration::hours;
    let w = Duration::weeks;
    match severity {
        Severity::Critical => vec![
            (FirstContact, Duration::zero()),
            (FollowUp1, h(1)),
            (FollowUp2, h(2)),
            (ManagerEscalation, h(4)),
            (DirectorEscalation, h(8)),
        ],
        Severity::High => vec![
            (FirstContact, h(1)),
            (FollowUp1, h(4)),
            (FollowUp2, h(8)),
            (ManagerEscalation, h(24)),
            (DirectorEscalation, h(48)),
        ],
        Severity::Medium => vec![
            (FirstContact, h(4)),
            (FollowUp1, h(24)),
            (FollowUp2, h(48)),
            (ManagerEscalation, h(72)),
            (DirectorEscalation, w(1)),
        ],
        Severity::Low => vec![
            (FirstContact, h(24)),
            (FollowUp1, h(48)),
            (FollowUp2, w(1)),
            (ManagerEscalation, w(2)),
        ],
    }
}

/// How long a resolver has before the first follow-up goes out.
pub fn first_follow_up(severity: Severity) -> Duration {
    offsets(severity)
        .into_iter()
        .find(|(stage, _)| *stage == EscalationStage::FollowUp1)
        .map(|(_, offset)| offset)
        .unwrap_or_else(|| Duration::hours(24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_strictly_increase() {
        for severity in Severity::ALL {
            let offs = offsets(severity);
            assert!(offs.windows(2).all(|w| w[0].1 < w[1].1), "{severity:?}");
            assert_eq!(offs[0].0, EscalationStage::FirstContact);
        }
    }

    #[test]
    fn test_low_has_no_director() {
        assert!(offsets(Severity::Low)
            .iter()
            .all(|(s, _)| *s != EscalationStage::DirectorEscalation));
        assert_eq!(offsets(Severity::Medium).len(), 5);
    }

    #[test]
    fn test_first_follow_up() {
        assert_eq!(first_follow_up(Severity::Critical), Duration::hours(1));
        assert_eq!(first_follow_up(Severity::High), Duration::hours(4));
        assert_eq!(first_follow_up(Severity::Low), Duration::hours(48));
    }
}
