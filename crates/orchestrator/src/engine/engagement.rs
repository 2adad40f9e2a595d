//! Outreach: initial contact, follow-ups, escalations and verification prompts.
//!
//! Messages fired by the ticker are planned while the record is locked and
//! sent once the lock is released; the outcome is logged afterwards.

use tokio::task::JoinSet;
use tracing::{info, warn};
use unblock_core::{
    Actor, BlockerRecord, ChannelId, EmployeeId, EngagementAction, EngagementKind,
    EscalationEntry, EscalationStage, FlagReason, Severity, StepDraft, Time,
};
use crate::collaborators::{AdapterError, Complexity, OutboundMessage};
use crate::retry::with_retry;
use super::{Orchestrator, DEFAULT_CHANNEL};

/// A message planned for one blocker.
#[derive(Debug, Clone)]
pub(super) struct Outreach {
    /// Engagement to log once the send settles; `None` for verification prompts
    pub(super) kind: Option<EngagementKind>,
    pub(super) message: OutboundMessage,
}

impl Orchestrator {
    /// Send the first message to the routed resolver. Returns whether it was delivered.
    pub(super) async fn send_initial(&self, record: &mut BlockerRecord, now: Time) -> bool {
        let Some(outreach) = self.initial_outreach(record) else {
            return false;
        };
        let result = self.send(&outreach.message).await;
        let delivered = self
            .log_engagement(record, EngagementKind::Initial, &outreach.message, &result, now)
            .await;
        if delivered {
            self.timeline.lock().await.first_contact_made(record.id);
        }
        delivered
    }

    fn initial_outreach(&self, record: &BlockerRecord) -> Option<Outreach> {
        let routing = record.routing.as_ref()?;
        let severity = record.severity().unwrap_or(Severity::Medium);
        let radius = record
            .classified
            .as_ref()
            .map_or(0, |c| c.blast_radius.task_count());
        let body = format!(
            "{}\nSeverity: {} | downstream tasks: {} | proposed: {}",
            record.signal.description(),
            severity.as_str(),
            radius,
            routing.action.as_str()
        );
        let channel = self.choose_channel(severity);
        Some(self.outreach(record, EngagementKind::Initial, routing.target.clone(), channel, body))
    }

    /// Plan the contact for one fired escalation entry.
    ///
    /// Record changes that do not depend on delivery happen here; the send
    /// itself is left to the caller.
    pub(super) fn plan(&self, record: &mut BlockerRecord, entry: &EscalationEntry, now: Time) -> Option<Outreach> {
        let routing = record.routing.clone()?;
        match entry.stage {
            EscalationStage::FirstContact => {
                // Only a delivery in the current round counts; re-entry reclassifies
                let round_start = record.classified.as_ref().map(|c| c.classified_at);
                let delivered = record.engagements.iter().any(|e| {
                    e.kind == EngagementKind::Initial
                        && e.delivered
                        && round_start.map_or(true, |start| e.sent_at >= start)
                });
                if delivered {
                    None
                } else {
                    self.initial_outreach(record)
                }
            }
            EscalationStage::FollowUp1 | EscalationStage::FollowUp2 => {
                let channel = self.last_channel(record);
                let body = format!("Following up: {}", record.signal.description());
                Some(self.outreach(record, EngagementKind::FollowUp, routing.target, channel, body))
            }
            EscalationStage::ManagerEscalation | EscalationStage::DirectorEscalation => {
                let index = usize::from(entry.stage == EscalationStage::DirectorEscalation);
                let Some(recipient) = routing.escalation_chain.get(index).cloned() else {
                    warn!(blocker = %record.id, stage = entry.stage.as_str(), "No one to escalate to");
                    return None;
                };
                if let Some(r) = record.routing.as_mut() {
                    if r.target != recipient && !r.backups.contains(&recipient) {
                        r.backups.push(recipient.clone());
                    }
                }
                let channel = self.choose_channel(entry.severity);
                let body = format!(
                    "Escalation: {} has been blocked since {} without a response from {}",
                    record.signal.description(),
                    record.signal.detected_at(),
                    routing.target
                );
                let state = record.state;
                record.trail.append(
                    StepDraft::new(entry.stage.as_str(), Actor::timeline(), now)
                        .completed()
                        .outcome(format!("{recipient} added to resolvers")),
                    state,
                );
                info!(blocker = %record.id, stage = entry.stage.as_str(), to = %recipient, "Escalated");
                Some(self.outreach(record, EngagementKind::Escalation, recipient, channel, body))
            }
        }
    }

    fn outreach(
        &self,
        record: &BlockerRecord,
        kind: EngagementKind,
        recipient: EmployeeId,
        channel: ChannelId,
        body: String,
    ) -> Outreach {
        let severity = record.severity().unwrap_or(Severity::Medium);
        Outreach {
            kind: Some(kind),
            message: OutboundMessage {
                blocker_id: record.id,
                recipient,
                channel,
                subject: format!("[{}] blocker needs attention", severity.as_str()),
                body,
            },
        }
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), AdapterError> {
        let messaging = &self.collaborators.messaging;
        with_retry(&self.config.adapter, "send", move || messaging.send(message)).await
    }

    /// Send every planned message concurrently. Results come back in input order.
    pub(super) async fn dispatch(&self, outreach: &[Outreach]) -> Vec<Result<(), AdapterError>> {
        let mut sends = JoinSet::new();
        for (index, o) in outreach.iter().enumerate() {
            let messaging = self.collaborators.messaging.clone();
            let policy = self.config.adapter.clone();
            let message = o.message.clone();
            sends.spawn(async move {
                let messaging = &messaging;
                let message = &message;
                let result = with_retry(&policy, "send", move || messaging.send(message)).await;
                (index, result)
            });
        }

        let mut results: Vec<Result<(), AdapterError>> = outreach
            .iter()
            .map(|_| Err(AdapterError::Unavailable("send task did not finish".into())))
            .collect();
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = result,
                Err(e) => warn!(error = %e, "Send task failed"),
            }
        }
        results
    }

    /// Log a settled send as an engagement. Returns whether it was delivered.
    ///
    /// A failed send raises a missed-contact flag; a later delivery clears it.
    pub(super) async fn log_engagement(
        &self,
        record: &mut BlockerRecord,
        kind: EngagementKind,
        message: &OutboundMessage,
        result: &Result<(), AdapterError>,
        now: Time,
    ) -> bool {
        let delivered = match result {
            Ok(()) => true,
            Err(e) => {
                let detail = format!("could not reach {}: {e}", message.recipient);
                Self::raise_flag(record, FlagReason::MissedContact, detail, now);
                false
            }
        };
        if delivered
            && record.flag.as_ref().map(|f| f.reason) == Some(FlagReason::MissedContact)
        {
            record.flag = None;
        }

        let max_wait = record
            .routing
            .as_ref()
            .map_or_else(|| chrono::Duration::hours(4), |r| r.max_wait);
        let follow_ups = self
            .pending_entries(record.id)
            .await
            .into_iter()
            .filter(|e| matches!(e.stage, EscalationStage::FollowUp1 | EscalationStage::FollowUp2))
            .map(|e| e.due_at)
            .collect();
        record.engagements.push(EngagementAction {
            kind,
            channel: message.channel.clone(),
            recipient: message.recipient.clone(),
            message: message.body.clone(),
            sent_at: now,
            expected_response_by: now + max_wait,
            follow_ups,
            delivered,
        });
        delivered
    }

    /// Confirmation requests for the reporter and whoever resolved the blocker.
    pub(super) fn verification_outreach(&self, record: &BlockerRecord, subject: &str) -> Vec<Outreach> {
        let mut recipients = vec![record.signal.reporter().clone()];
        if let Some(r) = &record.resolution {
            if !recipients.contains(&r.by) {
                recipients.push(r.by.clone());
            }
        }
        let channel = self.last_channel(record);
        recipients
            .into_iter()
            .map(|recipient| Outreach {
                kind: None,
                message: OutboundMessage {
                    blocker_id: record.id,
                    recipient,
                    channel: channel.clone(),
                    subject: subject.to_string(),
                    body: record.signal.description().to_string(),
                },
            })
            .collect()
    }

    pub(super) async fn send_prompts(&self, prompts: &[Outreach]) {
        let results = self.dispatch(prompts).await;
        for (prompt, result) in prompts.iter().zip(results) {
            if let Err(e) = result {
                Self::prompt_missed(prompt, &e);
            }
        }
    }

    pub(super) fn prompt_missed(prompt: &Outreach, error: &AdapterError) {
        warn!(
            blocker = %prompt.message.blocker_id,
            to = %prompt.message.recipient,
            error = %error,
            "Verification prompt not delivered"
        );
    }

    pub(super) fn choose_channel(&self, severity: Severity) -> ChannelId {
        let selector = &self.collaborators.channels;
        selector
            .select_channel(&selector.candidates(), severity, Complexity::for_severity(severity))
            .unwrap_or_else(|| ChannelId::from(DEFAULT_CHANNEL))
    }

    pub(super) fn last_channel(&self, record: &BlockerRecord) -> ChannelId {
        record
            .engagements
            .iter()
            .rev()
            .find(|e| e.kind == EngagementKind::Initial)
            .map(|e| e.channel.clone())
            .unwrap_or_else(|| ChannelId::from(DEFAULT_CHANNEL))
    }
}
