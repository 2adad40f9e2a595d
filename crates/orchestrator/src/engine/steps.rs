//! Loop steps: one handler per state.

use tracing::warn;
use unblock_core::{
    Actor, BlastRadius, BlockerRecord, ClassifiedBlocker, FlagReason, LoopEvent, LoopState,
    ResolutionAction, Severity, StepDraft, Time,
};
use crate::collaborators::ProposedAction;
use crate::error::{OrchestratorError, Result};
use crate::executor::ActionPlan;
use crate::retry::with_retry;
use super::engagement::Outreach;
use super::{Orchestrator, StepOutcome};

impl Orchestrator {
    pub(super) async fn step(&self, record: &mut BlockerRecord, now: Time) -> Result<StepOutcome> {
        if record.state.is_terminal() {
            return Ok(StepOutcome::Terminal);
        }
        if let Some(flag) = &record.flag {
            if flag.reason.holds_state() {
                return Ok(StepOutcome::Flagged { reason: flag.reason });
            }
        }

        match record.state {
            LoopState::Detect => {
                if record.loops_completed > 0 {
                    return Ok(StepOutcome::Complete);
                }
                let (from, to) = Self::transition(
                    record,
                    LoopEvent::BlockerIdentified,
                    StepDraft::new("blocker_identified", Actor::system(), now).completed(),
                )?;
                Ok(StepOutcome::Advanced { from, to })
            }
            LoopState::Classify => self.classify(record, now).await,
            LoopState::Route => self.route(record, now).await,
            LoopState::Engage => self.engage(record, now).await,
            LoopState::Coordinate => self.coordinate(record, now).await,
            LoopState::Resolve => Ok(StepOutcome::Waiting { state: LoopState::Resolve }),
            LoopState::Verify => {
                let mut prompts = Vec::new();
                let outcome = self.check_verification(record, now, &mut prompts).await?;
                self.send_prompts(&prompts).await;
                Ok(outcome)
            }
            LoopState::Learn => self.learn(record, now).await,
            LoopState::Abandoned => Ok(StepOutcome::Terminal),
        }
    }

    async fn classify(&self, record: &mut BlockerRecord, now: Time) -> Result<StepOutcome> {
        let approved = std::mem::take(&mut record.approved);

        // Re-entry or a human classification keeps type and severity
        let existing = record
            .classified
            .as_ref()
            .map(|c| (c.blocker_type, c.severity, c.confidence));
        let (blocker_type, severity, confidence) = match existing {
            Some(kept) => kept,
            None => {
                let classifier = &self.collaborators.classifier;
                let signal = &record.signal;
                match with_retry(&self.config.adapter, "classify", move || classifier.classify(signal)).await {
                    Ok(c) => {
                        let severity = record
                            .signal
                            .severity_floor()
                            .map_or(c.severity, |floor| floor.max(c.severity));
                        (c.blocker_type, severity, c.confidence.min(record.signal.confidence()))
                    }
                    Err(e) => {
                        let detail = format!("classification unavailable: {e}");
                        return Ok(self.hold(record, FlagReason::LowConfidence, detail, now));
                    }
                }
            }
        };

        if confidence < self.config.confidence_floor && !approved {
            let detail = format!(
                "classified {} with confidence {confidence:.2} (floor {:.2})",
                blocker_type.as_str(),
                self.config.confidence_floor
            );
            return Ok(self.hold(record, FlagReason::LowConfidence, detail, now));
        }

        let blast_radius = {
            let graph = self.graph.read().await;
            let mut radius = BlastRadius::default();
            for task in record.related_tasks() {
                match graph.blast_radius(task) {
                    Ok(r) => radius.merge(r),
                    Err(e) => warn!(blocker = %record.id, task = %task, error = %e, "No blast radius"),
                }
            }
            radius
        };

        let outcome = format!(
            "{} / {} / {} downstream tasks",
            blocker_type.as_str(),
            severity.as_str(),
            blast_radius.task_count()
        );
        record.classified = Some(ClassifiedBlocker {
            signal: record.signal.clone(),
            blocker_type,
            severity,
            confidence,
            affected_tasks: record.related_tasks().to_vec(),
            blast_radius,
            classified_at: now,
        });
        let (from, to) = Self::transition(
            record,
            LoopEvent::ClassificationComplete,
            StepDraft::new("classification_complete", Actor::system(), now)
                .completed()
                .outcome(outcome)
                .next("route"),
        )?;
        Ok(StepOutcome::Advanced { from, to })
    }

    async fn route(&self, record: &mut BlockerRecord, now: Time) -> Result<StepOutcome> {
        let approved = std::mem::take(&mut record.approved);
        let classified = Self::classified(record)?.clone();
        let tags = Self::context_tags(record, &*self.graph.read().await);
        let pattern = self.patterns.query(classified.blocker_type, tags).await;

        let decision = {
            let graph = self.graph.read().await;
            self.collaborators
                .router
                .route(&classified, &graph, pattern.as_ref(), now)
                .await
        };
        let decision = match decision {
            Ok(d) => d,
            Err(e) => {
                let detail = format!("routing unavailable: {e}");
                return Ok(self.hold(record, FlagReason::LowConfidence, detail, now));
            }
        };
        if decision.confidence < self.config.confidence_floor && !approved {
            let detail = format!(
                "no resolver found for {} (confidence {:.2})",
                record.id, decision.confidence
            );
            return Ok(self.hold(record, FlagReason::LowConfidence, detail, now));
        }

        let outcome = format!(
            "{} via {} at {} authority",
            decision.action.as_str(),
            decision.target,
            decision.authority.as_str()
        );
        record.routing = Some(decision);
        let (from, to) = Self::transition(
            record,
            LoopEvent::RoutingDecided,
            StepDraft::new("routing_decided", Actor::system(), now)
                .completed()
                .outcome(outcome)
                .next("engage resolver"),
        )?;

        // The escalation clock starts at classification
        self.timeline
            .lock()
            .await
            .schedule(record.id, classified.severity, classified.classified_at);
        self.persist_timeline().await?;
        Ok(StepOutcome::Advanced { from, to })
    }

    async fn engage(&self, record: &mut BlockerRecord, now: Time) -> Result<StepOutcome> {
        let delivered = self.send_initial(record, now).await;
        let outcome = if delivered {
            "initial contact delivered"
        } else {
            "initial contact missed; timeline will retry"
        };
        let (from, to) = Self::transition(
            record,
            LoopEvent::EngagementSent,
            StepDraft::new("engagement_sent", Actor::system(), now)
                .completed()
                .outcome(outcome)
                .next("coordinate"),
        )?;
        self.persist_timeline().await?;
        Ok(StepOutcome::Advanced { from, to })
    }

    async fn coordinate(&self, record: &mut BlockerRecord, now: Time) -> Result<StepOutcome> {
        if record.action_taken.is_none() {
            let approved = std::mem::take(&mut record.approved);
            let classified = Self::classified(record)?.clone();
            let Some(routing) = record.routing.clone() else {
                return Err(OrchestratorError::WrongState {
                    id: record.id,
                    expected: LoopState::Route,
                    actual: record.state,
                });
            };
            let channel = self.last_channel(record);
            let summary = record.signal.description().to_string();

            let proposed = ProposedAction {
                action: routing.action,
                authority: routing.authority,
                severity: classified.severity,
                channel: Some(channel.clone()),
                description: format!("{}: {}", routing.action.as_str(), summary),
            };
            let score = self
                .collaborators
                .alignment
                .alignment_score(&proposed, &self.config.values);
            if score < self.config.alignment_threshold && !approved {
                let detail = format!(
                    "{} scored {score:.2} against values (threshold {:.2})",
                    routing.action.as_str(),
                    self.config.alignment_threshold
                );
                return Ok(self.hold(record, FlagReason::AlignmentRejected, detail, now));
            }

            let mut participants = routing.resolvers();
            if routing.action == ResolutionAction::Escalate {
                if let Some(manager) = routing.escalation_chain.first() {
                    if !participants.contains(manager) {
                        participants.push(manager.clone());
                    }
                }
            }
            let plan = ActionPlan {
                blocker_id: record.id,
                action: routing.action,
                participants,
                channel,
                tasks: record.related_tasks().to_vec(),
                summary,
                now,
            };

            match self.executor.execute_with_fallback(&plan).await {
                Ok(executed) => {
                    record.action_taken = Some(executed.action);
                    let mut outcome = format!("{} executed (alignment {score:.2})", executed.action.as_str());
                    if !executed.skipped.is_empty() {
                        let skipped: Vec<&str> = executed.skipped.iter().map(|a| a.as_str()).collect();
                        outcome.push_str(&format!("; fell back from {}", skipped.join(", ")));
                    }
                    record.trail.append(
                        StepDraft::new("action_executed", Actor::system(), now)
                            .completed()
                            .outcome(outcome)
                            .next("await resolver response"),
                        LoopState::Coordinate,
                    );
                }
                Err(e) => {
                    let detail = format!("{} could not be carried out: {e}", routing.action.as_str());
                    Self::raise_flag(record, FlagReason::MissedContact, detail, now);
                    return Ok(StepOutcome::Waiting { state: LoopState::Coordinate });
                }
            }
        }

        if !record.has_response() {
            return Ok(StepOutcome::Waiting { state: LoopState::Coordinate });
        }
        let (from, to) = Self::transition(
            record,
            LoopEvent::ActionCompleted,
            StepDraft::new("action_completed", Actor::system(), now)
                .completed()
                .next("await resolution"),
        )?;
        Ok(StepOutcome::Advanced { from, to })
    }

    /// Evaluate the open verification round: pass, remind, time out, or wait.
    ///
    /// A due reminder is pushed onto `prompts` for the caller to send.
    pub(super) async fn check_verification(
        &self,
        record: &mut BlockerRecord,
        now: Time,
        prompts: &mut Vec<Outreach>,
    ) -> Result<StepOutcome> {
        let passed = record.verification.as_ref().is_some_and(|v| v.passed());
        if passed {
            let (from, to) = Self::transition(
                record,
                LoopEvent::VerificationPassed,
                StepDraft::new("verification_passed", Actor::system(), now)
                    .completed()
                    .next("store pattern"),
            )?;
            return Ok(StepOutcome::Advanced { from, to });
        }

        let started = record.verification_started_at.unwrap_or(record.updated_at);
        if now >= started + self.config.verification_timeout() {
            return self.fail_verification(record, now, "no confirmation before timeout").await;
        }
        if now >= started + self.config.verification_reminder() && !record.verification_reminded {
            record.verification_reminded = true;
            prompts.extend(self.verification_outreach(record, "Reminder: please confirm the blocker is resolved"));
            record.trail.append(
                StepDraft::new("verification_reminder", Actor::timeline(), now).completed(),
                LoopState::Verify,
            );
        }
        Ok(StepOutcome::Waiting { state: LoopState::Verify })
    }

    pub(super) async fn fail_verification(&self, record: &mut BlockerRecord, now: Time, why: &str) -> Result<StepOutcome> {
        let raised = match record.classified.as_mut() {
            Some(c) => {
                c.severity = c.severity.escalate();
                c.severity
            }
            None => Severity::Medium,
        };
        record.recurred = true;
        record.routing = None;
        record.action_taken = None;
        record.responses.clear();
        record.resolution = None;
        record.verification_started_at = None;
        record.verification_reminded = false;
        {
            let mut timeline = self.timeline.lock().await;
            timeline.cancel(record.id);
            timeline.prune(record.id);
        }

        let (from, to) = Self::transition(
            record,
            LoopEvent::VerificationFailed,
            StepDraft::new("verification_failed", Actor::system(), now)
                .completed()
                .outcome(format!("{why}; severity raised to {}", raised.as_str()))
                .next("reclassify"),
        )?;
        warn!(blocker = %record.id, severity = raised.as_str(), why, "Verification failed");
        Ok(StepOutcome::Advanced { from, to })
    }

    async fn learn(&self, record: &mut BlockerRecord, now: Time) -> Result<StepOutcome> {
        let classified = Self::classified(record)?.clone();
        let strategy = record
            .action_taken
            .or_else(|| record.routing.as_ref().map(|r| r.action))
            .unwrap_or(ResolutionAction::Notify);
        let resolved_at = record.resolution.as_ref().map_or(now, |r| r.resolved_at);
        let hours = (resolved_at - record.created_at).num_minutes().max(0) as f64 / 60.0;
        let tags = Self::context_tags(record, &*self.graph.read().await);

        let pattern = self
            .patterns
            .record(classified.blocker_type, tags, strategy, hours, record.recurred, now)
            .await;
        self.storage.save_pattern(&pattern).await?;

        record.loops_completed += 1;
        {
            let mut timeline = self.timeline.lock().await;
            timeline.cancel(record.id);
            timeline.prune(record.id);
        }
        self.persist_timeline().await?;
        let (from, to) = Self::transition(
            record,
            LoopEvent::PatternStored,
            StepDraft::new("pattern_stored", Actor::system(), now)
                .completed()
                .outcome(format!(
                    "{} after {hours:.1}h ({} occurrences)",
                    strategy.as_str(),
                    pattern.occurrences
                )),
        )?;
        Ok(StepOutcome::Advanced { from, to })
    }
}
