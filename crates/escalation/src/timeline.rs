//! Timeline engine - pending contact attempts across all blockers.

use tracing::{debug, info};
use unblock_core::{BlockerId, EntryStatus, EscalationEntry, EscalationStage, Severity, Time};
use crate::schedule::offsets;

/// Every scheduled contact attempt, fired or not.
#[derive(Debug, Clone, Default)]
pub struct EscalationTimeline {
    entries: Vec<EscalationEntry>,
}

impl EscalationTimeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from persisted entries.
    pub fn from_entries(entries: Vec<EscalationEntry>) -> Self {
        Self { entries }
    }

    /// Schedule the full sequence for `blocker_id` from `anchor`.
    ///
    /// Pending entries left over from an earlier schedule for the same
    /// blocker are superseded first.
    pub fn schedule(
        &mut self,
        blocker_id: BlockerId,
        severity: Severity,
        anchor: Time,
    ) -> Vec<EscalationEntry> {
        let replaced = self.cancel(blocker_id);
        if replaced > 0 {
            debug!(blocker = %blocker_id, replaced, "Rescheduling escalation");
        }

        let scheduled: Vec<EscalationEntry> = offsets(severity)
            .into_iter()
            .map(|(stage, offset)| EscalationEntry {
                blocker_id,
                severity,
                stage,
                due_at: anchor + offset,
                status: EntryStatus::Pending,
                fired_at: None,
            })
            .collect();
        info!(
            blocker = %blocker_id,
            severity = severity.as_str(),
            stages = scheduled.len(),
            "Escalation scheduled"
        );
        self.entries.extend(scheduled.iter().cloned());
        scheduled
    }

    /// Fire every pending entry due at or before `now`, oldest first.
    ///
    /// Calling again with the same `now` fires nothing.
    pub fn tick(&mut self, now: Time) -> Vec<EscalationEntry> {
        let mut fired: Vec<EscalationEntry> = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.is_pending() && entry.due_at <= now {
                entry.status = EntryStatus::Fired;
                entry.fired_at = Some(now);
                fired.push(entry.clone());
            }
        }
        fired.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.stage.cmp(&b.stage)));
        if !fired.is_empty() {
            debug!(fired = fired.len(), "Escalation tick");
        }
        fired
    }

    /// Return fired entries to pending so a later tick fires them again.
    ///
    /// Used when the blocker could not be handled at the time.
    pub fn rearm(&mut self, fired: &[EscalationEntry]) -> usize {
        let mut count = 0;
        for entry in self.entries.iter_mut() {
            let matches = fired.iter().any(|f| {
                f.blocker_id == entry.blocker_id && f.stage == entry.stage && f.due_at == entry.due_at
            });
            if matches && entry.status == EntryStatus::Fired {
                entry.status = EntryStatus::Pending;
                entry.fired_at = None;
                count += 1;
            }
        }
        count
    }

    /// Drop the fired and superseded entries of `blocker_id`. Pending ones stay.
    pub fn prune(&mut self, blocker_id: BlockerId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.blocker_id != blocker_id || e.is_pending());
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(blocker = %blocker_id, removed, "Pruned settled escalation entries");
        }
        removed
    }

    /// Supersede the pending entries of `blocker_id` whose stage matches.
    pub fn supersede_where(
        &mut self,
        blocker_id: BlockerId,
        mut matches: impl FnMut(EscalationStage) -> bool,
    ) -> usize {
        let mut count = 0;
        for entry in self.entries.iter_mut() {
            if entry.blocker_id == blocker_id && entry.is_pending() && matches(entry.stage) {
                entry.status = EntryStatus::Superseded;
                count += 1;
            }
        }
        count
    }

    /// The initial message went out; first contact no longer needs a timer.
    pub fn first_contact_made(&mut self, blocker_id: BlockerId) -> usize {
        self.supersede_where(blocker_id, |stage| stage == EscalationStage::FirstContact)
    }

    /// The resolver answered; nothing further needs to fire.
    pub fn responded(&mut self, blocker_id: BlockerId) -> usize {
        let count = self.cancel(blocker_id);
        if count > 0 {
            info!(blocker = %blocker_id, superseded = count, "Escalation stopped by response");
        }
        count
    }

    /// Drop every pending entry for `blocker_id`.
    pub fn cancel(&mut self, blocker_id: BlockerId) -> usize {
        self.supersede_where(blocker_id, |_| true)
    }

    /// Pending entries for one blocker, in due order.
    pub fn pending(&self, blocker_id: BlockerId) -> Vec<&EscalationEntry> {
        let mut out: Vec<&EscalationEntry> = self
            .for_blocker(blocker_id)
            .filter(|e| e.is_pending())
            .collect();
        out.sort_by_key(|e| e.due_at);
        out
    }

    /// All entries for one blocker.
    pub fn for_blocker(&self, blocker_id: BlockerId) -> impl Iterator<Item = &EscalationEntry> {
        self.entries.iter().filter(move |e| e.blocker_id == blocker_id)
    }

    /// Whether the blocker had a schedule and every entry in it has fired.
    pub fn is_exhausted(&self, blocker_id: BlockerId) -> bool {
        let mut any_fired = false;
        for entry in self.for_blocker(blocker_id) {
            match entry.status {
                EntryStatus::Pending => return false,
                EntryStatus::Fired => any_fired = true,
                EntryStatus::Superseded => {}
            }
        }
        any_fired
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<Time> {
        self.entries
            .iter()
            .filter(|e| e.is_pending())
            .map(|e| e.due_at)
            .min()
    }

    /// All entries, for persistence.
    pub fn entries(&self) -> &[EscalationEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t0() -> Time {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn stages(fired: &[EscalationEntry]) -> Vec<EscalationStage> {
        fired.iter().map(|e| e.stage).collect()
    }

    #[test]
    fn test_high_severity_never_fires_early() {
        let mut tl = EscalationTimeline::new();
        let id = BlockerId::new();
        tl.schedule(id, Severity::High, t0());

        assert_eq!(
            stages(&tl.tick(t0() + Duration::minutes(59))),
            Vec::<EscalationStage>::new()
        );
        assert_eq!(stages(&tl.tick(t0() + Duration::hours(1))), vec![EscalationStage::FirstContact]);
        assert!(tl.tick(t0() + Duration::hours(4) - Duration::seconds(1)).is_empty());
        assert_eq!(stages(&tl.tick(t0() + Duration::hours(4))), vec![EscalationStage::FollowUp1]);
        assert_eq!(stages(&tl.tick(t0() + Duration::hours(23))), vec![EscalationStage::FollowUp2]);
        assert_eq!(
            stages(&tl.tick(t0() + Duration::hours(24))),
            vec![EscalationStage::ManagerEscalation]
        );
    }

    #[test]
    fn test_critical_first_contact_is_immediate() {
        let mut tl = EscalationTimeline::new();
        let id = BlockerId::new();
        let scheduled = tl.schedule(id, Severity::Critical, t0());
        assert_eq!(scheduled[0].due_at, t0());

        let fired = tl.tick(t0() + Duration::hours(4));
        assert_eq!(
            stages(&fired),
            vec![
                EscalationStage::FirstContact,
                EscalationStage::FollowUp1,
                EscalationStage::FollowUp2,
                EscalationStage::ManagerEscalation,
            ]
        );
        assert_eq!(fired[3].due_at, t0() + Duration::hours(4));
    }

    #[test]
    fn test_tick_is_idempotent() {
        let mut tl = EscalationTimeline::new();
        let id = BlockerId::new();
        tl.schedule(id, Severity::Medium, t0());
        let now = t0() + Duration::hours(30);

        let first = tl.tick(now);
        assert_eq!(first.len(), 2);
        assert!(tl.tick(now).is_empty());
        assert!(first.iter().all(|e| e.fired_at == Some(now)));
    }

    #[test]
    fn test_response_supersedes_remaining() {
        let mut tl = EscalationTimeline::new();
        let id = BlockerId::new();
        let other = BlockerId::new();
        tl.schedule(id, Severity::High, t0());
        tl.schedule(other, Severity::High, t0());

        tl.first_contact_made(id);
        assert_eq!(tl.pending(id).len(), 4);
        assert_eq!(tl.responded(id), 4);
        assert!(tl.pending(id).is_empty());
        assert!(!tl.is_exhausted(id));

        let fired = tl.tick(t0() + Duration::weeks(4));
        assert!(fired.iter().all(|e| e.blocker_id == other));
        assert!(tl.is_exhausted(other));
    }

    #[test]
    fn test_reschedule_replaces_pending() {
        let mut tl = EscalationTimeline::new();
        let id = BlockerId::new();
        tl.schedule(id, Severity::Low, t0());
        tl.schedule(id, Severity::Critical, t0() + Duration::hours(1));

        let pending = tl.pending(id);
        assert_eq!(pending.len(), 5);
        assert!(pending.iter().all(|e| e.severity == Severity::Critical));
        assert_eq!(tl.next_due(), Some(t0() + Duration::hours(1)));
    }

    #[test]
    fn test_restore_keeps_status() {
        let mut tl = EscalationTimeline::new();
        let id = BlockerId::new();
        tl.schedule(id, Severity::Critical, t0());
        tl.tick(t0());

        let restored = EscalationTimeline::from_entries(tl.entries().to_vec());
        assert_eq!(restored.pending(id).len(), 4);
    }

    #[test]
    fn test_rearm_fires_again_later() {
        let mut tl = EscalationTimeline::new();
        let id = BlockerId::new();
        tl.schedule(id, Severity::High, t0());

        let fired = tl.tick(t0() + Duration::hours(1));
        assert_eq!(tl.rearm(&fired), 1);
        assert_eq!(tl.pending(id).len(), 5);

        let again = tl.tick(t0() + Duration::hours(2));
        assert_eq!(stages(&again), vec![EscalationStage::FirstContact]);
        assert_eq!(again[0].fired_at, Some(t0() + Duration::hours(2)));
    }

    #[test]
    fn test_prune_keeps_pending_and_other_blockers() {
        let mut tl = EscalationTimeline::new();
        let done = BlockerId::new();
        let live = BlockerId::new();
        tl.schedule(done, Severity::Critical, t0());
        tl.schedule(live, Severity::Critical, t0());
        tl.tick(t0() + Duration::hours(1));
        tl.cancel(done);

        assert_eq!(tl.prune(done), 5);
        assert_eq!(tl.for_blocker(done).count(), 0);
        assert_eq!(tl.for_blocker(live).count(), 5);
        assert_eq!(tl.prune(done), 0);

        // Repeated rounds stop growing the list once pruned
        for round in 0..10 {
            tl.schedule(done, Severity::Low, t0() + Duration::days(round));
            tl.cancel(done);
            tl.prune(done);
        }
        assert_eq!(tl.entries().len(), 5);
    }
}
