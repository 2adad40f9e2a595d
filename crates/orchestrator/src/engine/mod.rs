//! The resolution loop engine.
//!
//! Drives every blocker through:
//! ```text
//! DETECT → CLASSIFY → ROUTE → ENGAGE → COORDINATE → RESOLVE → VERIFY → LEARN → DETECT
//!                ↑                                               │
//!                └──────────── verification failed ──────────────┘
//! ```
//!
//! Each blocker record sits behind its own mutex, so steps for one blocker
//! are serialized while different blockers advance independently. Locks are
//! always taken in the order record, graph, timeline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use unblock_core::{
    Actor, ArlConfig, BlastRadius, BlockerId, BlockerRecord, BlockerSignal, BlockerType,
    ClassifiedBlocker, ConfirmingParty, EmployeeId, EngagementKind, EscalationEntry, FlagReason,
    GraphSnapshot, LoopEvent, LoopState, Resolution, Response, ReviewFlag, Severity, SourceKind,
    StepDraft, TaskId, TaskStatus, Time, VerificationResult,
};
use unblock_escalation::EscalationTimeline;
use unblock_graph::DependencyGraph;
use unblock_patterns::PatternMemory;
use unblock_storage::Storage;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{AdapterError, Collaborators};
use crate::error::{OrchestratorError, Result};
use crate::executor::ActionExecutor;
use crate::metrics::LoopMetrics;
use crate::retry::with_retry;
use crate::review::{CurrentState, FlaggedBlocker};

mod engagement;
mod steps;

use engagement::Outreach;

/// Graph shared between the orchestrator and its readers.
pub type SharedGraph = Arc<RwLock<DependencyGraph>>;

type RecordHandle = Arc<Mutex<BlockerRecord>>;

type SendResult = std::result::Result<(), AdapterError>;

const DEFAULT_CHANNEL: &str = "slack";

/// Upper bound on steps taken by [`Orchestrator::advance_until_waiting`].
const MAX_STEPS: usize = 16;

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The blocker moved to another state
    Advanced {
        /// State before
        from: LoopState,
        /// State after
        to: LoopState,
    },
    /// Nothing to do until a response, resolution, confirmation or timer
    Waiting {
        /// State the blocker waits in
        state: LoopState,
    },
    /// Held until a human approves or reclassifies
    Flagged {
        /// Why
        reason: FlagReason,
    },
    /// The loop finished and the pattern was stored
    Complete,
    /// The blocker was abandoned
    Terminal,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Escalation entries that fired
    pub fired: usize,
    /// Blockers whose escalation chain ran out
    pub exhausted: Vec<BlockerId>,
    /// Blockers sent back to CLASSIFY because verification timed out
    pub verification_failed: Vec<BlockerId>,
}

/// What one adapter poll found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollReport {
    /// Responses recorded
    pub responses: usize,
    /// Blockers opened for newly blocked tasks
    pub detected: Vec<BlockerId>,
}

/// The resolution loop orchestrator.
pub struct Orchestrator {
    config: ArlConfig,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    graph: SharedGraph,
    patterns: Arc<PatternMemory>,
    timeline: Mutex<EscalationTimeline>,
    blockers: RwLock<HashMap<BlockerId, RecordHandle>>,
    collaborators: Collaborators,
    executor: ActionExecutor,
}

impl Orchestrator {
    /// Create an orchestrator with default collaborators and an empty graph.
    pub fn new(config: ArlConfig, storage: Arc<dyn Storage>) -> Self {
        let collaborators = Collaborators::default();
        let executor = Self::executor_for(&collaborators, &config);
        Self {
            patterns: Arc::new(PatternMemory::new(config.pattern_smoothing)),
            config,
            storage,
            clock: Arc::new(SystemClock),
            graph: Arc::new(RwLock::new(DependencyGraph::new())),
            timeline: Mutex::new(EscalationTimeline::new()),
            blockers: RwLock::new(HashMap::new()),
            collaborators,
            executor,
        }
    }

    fn executor_for(collaborators: &Collaborators, config: &ArlConfig) -> ActionExecutor {
        ActionExecutor::new(
            collaborators.messaging.clone(),
            collaborators.calendar.clone(),
            collaborators.tasks.clone(),
            config.adapter.clone(),
        )
    }

    /// Use a different clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing graph.
    pub fn with_graph(mut self, graph: SharedGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Use an existing pattern memory.
    pub fn with_patterns(mut self, patterns: Arc<PatternMemory>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Replace the collaborators.
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.executor = Self::executor_for(&collaborators, &self.config);
        self.collaborators = collaborators;
        self
    }

    /// Rebuild in-memory state (graph, patterns, timeline, blockers) from storage.
    pub async fn restore(mut self) -> Result<Self> {
        if let Some(snapshot) = self.storage.load_graph().await? {
            self.graph = Arc::new(RwLock::new(DependencyGraph::from_snapshot(snapshot)?));
        }

        let patterns = self.storage.list_patterns().await?;
        self.patterns = Arc::new(PatternMemory::with_patterns(self.config.pattern_smoothing, patterns));

        let entries = self.storage.load_timeline().await?;
        self.timeline = Mutex::new(EscalationTimeline::from_entries(entries));

        let records = self.storage.list_blockers().await?;
        let count = records.len();
        self.blockers = RwLock::new(
            records
                .into_iter()
                .map(|r| (r.id, Arc::new(Mutex::new(r))))
                .collect(),
        );
        info!(blockers = count, "Orchestrator restored");
        Ok(self)
    }

    /// Loop configuration.
    pub fn config(&self) -> &ArlConfig {
        &self.config
    }

    /// Shared graph handle.
    pub fn graph(&self) -> SharedGraph {
        self.graph.clone()
    }

    /// Pattern memory handle.
    pub fn patterns(&self) -> Arc<PatternMemory> {
        self.patterns.clone()
    }

    /// Current time according to the orchestrator's clock.
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Register a newly detected blocker. It starts in DETECT.
    pub async fn submit(&self, signal: BlockerSignal) -> Result<BlockerId> {
        let now = self.clock.now();
        let id = BlockerId::new();
        let mut record = BlockerRecord::new(id, signal, now);
        record.trail.append(
            StepDraft::new("detected", Actor::new(record.signal.reporter().as_str()), now)
                .completed()
                .outcome(format!(
                    "{} via {}",
                    record.signal.description(),
                    record.signal.source().as_str()
                ))
                .next("classify"),
            LoopState::Detect,
        );
        self.storage.save_blocker(&record).await?;
        info!(blocker = %id, source = record.signal.source().as_str(), "Blocker submitted");

        self.blockers
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(record)));
        Ok(id)
    }

    /// Run one step of the loop for `id`.
    pub async fn advance(&self, id: BlockerId) -> Result<StepOutcome> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        let now = self.clock.now();

        let outcome = self.step(&mut record, now).await?;
        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        debug!(blocker = %id, outcome = ?outcome, "Advanced");
        Ok(outcome)
    }

    /// Advance until the blocker has to wait for input.
    pub async fn advance_until_waiting(&self, id: BlockerId) -> Result<StepOutcome> {
        let mut last = StepOutcome::Waiting { state: LoopState::Detect };
        for _ in 0..MAX_STEPS {
            last = self.advance(id).await?;
            if !matches!(last, StepOutcome::Advanced { .. }) {
                break;
            }
        }
        Ok(last)
    }

    /// Fire every escalation entry due at `now` and enforce verification timeouts.
    ///
    /// Record locks are only held while planning and while logging results;
    /// every message goes out concurrently in between. A blocker busy with
    /// another operation is skipped and its entries fire on a later tick.
    pub async fn tick(&self, now: Time) -> Result<TickReport> {
        let fired = self.timeline.lock().await.tick(now);
        let mut report = TickReport::default();

        let mut by_blocker: BTreeMap<BlockerId, Vec<EscalationEntry>> = BTreeMap::new();
        for entry in fired {
            by_blocker.entry(entry.blocker_id).or_default().push(entry);
        }

        let mut outreach: Vec<Outreach> = Vec::new();
        let mut escalated: Vec<(BlockerId, RecordHandle)> = Vec::new();
        for (id, entries) in by_blocker {
            let Ok(handle) = self.handle(id).await else {
                warn!(blocker = %id, "Escalation fired for unknown blocker");
                continue;
            };
            let Ok(mut record) = handle.try_lock() else {
                let deferred = self.timeline.lock().await.rearm(&entries);
                debug!(blocker = %id, deferred, "Blocker busy, escalation deferred");
                continue;
            };
            report.fired += entries.len();
            if !record.state.is_engaging() {
                debug!(blocker = %id, state = %record.state, "Ignoring escalation outside engagement");
                continue;
            }
            for entry in &entries {
                outreach.extend(self.plan(&mut record, entry, now));
            }
            record.updated_at = now;
            self.storage.save_blocker(&record).await?;
            drop(record);
            escalated.push((id, handle));
        }

        for handle in self.handles().await {
            let Ok(mut record) = handle.try_lock() else {
                continue;
            };
            if record.state != LoopState::Verify {
                continue;
            }
            self.check_verification(&mut record, now, &mut outreach).await?;
            if record.state == LoopState::Classify {
                report.verification_failed.push(record.id);
            }
            record.updated_at = now;
            self.storage.save_blocker(&record).await?;
        }

        let results = self.dispatch(&outreach).await;
        let mut settled: BTreeMap<BlockerId, Vec<(Outreach, SendResult)>> = BTreeMap::new();
        for (o, result) in outreach.into_iter().zip(results) {
            settled.entry(o.message.blocker_id).or_default().push((o, result));
        }

        for (id, handle) in escalated {
            let mut record = handle.lock().await;
            for (o, result) in settled.remove(&id).unwrap_or_default() {
                match o.kind {
                    Some(kind) => {
                        let delivered = self
                            .log_engagement(&mut record, kind, &o.message, &result, now)
                            .await;
                        if delivered && kind == EngagementKind::Initial {
                            self.timeline.lock().await.first_contact_made(id);
                        }
                    }
                    None => {
                        if let Err(e) = &result {
                            Self::prompt_missed(&o, e);
                        }
                    }
                }
            }
            if record.state.is_engaging()
                && !record.has_response()
                && self.timeline.lock().await.is_exhausted(id)
            {
                let detail = format!(
                    "every escalation stage fired without a response ({} attempts)",
                    record.engagements.len()
                );
                Self::raise_flag(&mut record, FlagReason::EscalationExhausted, detail, now);
                report.exhausted.push(id);
            }
            record.updated_at = now;
            self.storage.save_blocker(&record).await?;
        }
        for (o, result) in settled.into_values().flatten() {
            if let Err(e) = &result {
                Self::prompt_missed(&o, e);
            }
        }

        self.persist_timeline().await?;
        if report.fired > 0 || !report.verification_failed.is_empty() {
            info!(
                fired = report.fired,
                exhausted = report.exhausted.len(),
                verification_failed = report.verification_failed.len(),
                "Tick"
            );
        }
        Ok(report)
    }

    /// Record a reply from someone contacted about the blocker.
    ///
    /// Stops the escalation timeline for the blocker.
    pub async fn record_response(&self, id: BlockerId, from: EmployeeId, message: impl Into<String>) -> Result<()> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        Self::ensure_live(&record)?;
        let now = self.clock.now();
        let message = message.into();

        self.timeline.lock().await.responded(id);
        if matches!(
            record.flag.as_ref().map(|f| f.reason),
            Some(FlagReason::EscalationExhausted | FlagReason::MissedContact)
        ) {
            record.flag = None;
        }
        let state = record.state;
        record.trail.append(
            StepDraft::new("response_received", Actor::new(from.as_str()), now)
                .completed()
                .outcome(message.clone()),
            state,
        );
        record.responses.push(Response {
            from,
            message,
            received_at: now,
        });
        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        self.persist_timeline().await?;
        info!(blocker = %id, "Response recorded");
        Ok(())
    }

    /// Record that the blocker was fixed; opens verification.
    ///
    /// Accepted in RESOLVE, or in COORDINATE once the action has run.
    pub async fn record_resolution(&self, id: BlockerId, by: EmployeeId, notes: impl Into<String>) -> Result<StepOutcome> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        Self::ensure_live(&record)?;
        let now = self.clock.now();
        let notes = notes.into();

        if record.state == LoopState::Coordinate && record.action_taken.is_some() {
            Self::transition(
                &mut record,
                LoopEvent::ActionCompleted,
                StepDraft::new("action_completed", Actor::new(by.as_str()), now).completed(),
            )?;
        }
        Self::expect_state(&record, LoopState::Resolve)?;

        record.resolution = Some(Resolution {
            by: by.clone(),
            notes: notes.clone(),
            resolved_at: now,
        });
        record.verification = Some(VerificationResult {
            blocker_id: id,
            reporter_confirmed: false,
            resolver_confirmed: false,
            verified_at: now,
            returned: false,
            notes: String::new(),
        });
        record.verification_started_at = Some(now);
        record.verification_reminded = false;
        self.timeline.lock().await.cancel(id);

        let (from, to) = Self::transition(
            &mut record,
            LoopEvent::ResolutionRecorded,
            StepDraft::new("resolution_recorded", Actor::new(by.as_str()), now)
                .completed()
                .outcome(notes)
                .next("confirm with reporter and resolver"),
        )?;
        let prompts = self.verification_outreach(&record, "Please confirm the blocker is resolved");
        self.send_prompts(&prompts).await;

        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        self.persist_timeline().await?;
        Ok(StepOutcome::Advanced { from, to })
    }

    /// One party confirms the resolution. Both confirmations pass verification.
    pub async fn confirm(&self, id: BlockerId, party: ConfirmingParty) -> Result<StepOutcome> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        Self::ensure_live(&record)?;
        Self::expect_state(&record, LoopState::Verify)?;
        let now = self.clock.now();

        if let Some(v) = record.verification.as_mut() {
            match party {
                ConfirmingParty::Reporter => v.reporter_confirmed = true,
                ConfirmingParty::Resolver => v.resolver_confirmed = true,
            }
            v.verified_at = now;
        }
        let state = record.state;
        record.trail.append(
            StepDraft::new("confirmation", Actor::system(), now)
                .completed()
                .outcome(format!("{party:?} confirmed")),
            state,
        );

        let mut prompts = Vec::new();
        let outcome = self.check_verification(&mut record, now, &mut prompts).await?;
        self.send_prompts(&prompts).await;
        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        self.persist_timeline().await?;
        Ok(outcome)
    }

    /// The blocker came back during verification.
    pub async fn report_returned(&self, id: BlockerId, notes: impl Into<String>) -> Result<StepOutcome> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        Self::ensure_live(&record)?;
        Self::expect_state(&record, LoopState::Verify)?;
        let now = self.clock.now();

        if let Some(v) = record.verification.as_mut() {
            v.returned = true;
            v.notes = notes.into();
            v.verified_at = now;
        }
        let outcome = self.fail_verification(&mut record, now, "blocker returned").await?;
        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        self.persist_timeline().await?;
        Ok(outcome)
    }

    /// A human clears the blocker's review flag.
    ///
    /// For low-confidence and alignment holds, the next step proceeds with
    /// the held decision once.
    pub async fn approve(&self, id: BlockerId, by: EmployeeId) -> Result<()> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        Self::ensure_live(&record)?;
        let now = self.clock.now();

        let Some(flag) = record.flag.take() else {
            debug!(blocker = %id, "Nothing to approve");
            return Ok(());
        };
        record.approved = flag.reason.holds_state();
        let state = record.state;
        record.trail.append(
            StepDraft::new("approved", Actor::new(by.as_str()), now)
                .completed()
                .outcome(format!("cleared {}", flag.reason.as_str())),
            state,
        );
        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        info!(blocker = %id, reason = flag.reason.as_str(), by = %by, "Flag approved");
        Ok(())
    }

    /// A human supplies the classification. Only valid in CLASSIFY.
    pub async fn reclassify(
        &self,
        id: BlockerId,
        blocker_type: BlockerType,
        severity: Severity,
        by: EmployeeId,
    ) -> Result<()> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        Self::ensure_live(&record)?;
        Self::expect_state(&record, LoopState::Classify)?;
        let now = self.clock.now();

        record.classified = Some(ClassifiedBlocker {
            signal: record.signal.clone(),
            blocker_type,
            severity,
            confidence: 1.0,
            affected_tasks: record.related_tasks().to_vec(),
            blast_radius: BlastRadius::default(),
            classified_at: now,
        });
        record.flag = None;
        record.trail.append(
            StepDraft::new("reclassified", Actor::new(by.as_str()), now)
                .completed()
                .outcome(format!("{} / {}", blocker_type.as_str(), severity.as_str())),
            LoopState::Classify,
        );
        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        info!(blocker = %id, blocker_type = blocker_type.as_str(), severity = severity.as_str(), "Reclassified");
        Ok(())
    }

    /// Authorized deprioritization: abandon the blocker from any live state.
    pub async fn deprioritize(&self, id: BlockerId, by: EmployeeId, reason: impl Into<String>) -> Result<StepOutcome> {
        let handle = self.handle(id).await?;
        let mut record = handle.lock().await;
        Self::ensure_live(&record)?;
        let now = self.clock.now();
        let reason = reason.into();

        let cancelled = {
            let mut timeline = self.timeline.lock().await;
            let cancelled = timeline.cancel(id);
            timeline.prune(id);
            cancelled
        };
        record.flag = None;
        let (from, to) = Self::transition(
            &mut record,
            LoopEvent::AuthorizedDeprioritization {
                by: by.to_string(),
                reason: reason.clone(),
            },
            StepDraft::new("deprioritized", Actor::new(by.as_str()), now)
                .completed()
                .outcome(reason),
        )?;
        record.updated_at = now;
        self.storage.save_blocker(&record).await?;
        self.persist_timeline().await?;
        info!(blocker = %id, cancelled, "Blocker abandoned");
        Ok(StepOutcome::Advanced { from, to })
    }

    /// Current state of one blocker.
    pub async fn status(&self, id: BlockerId) -> Result<CurrentState> {
        let handle = self.handle(id).await?;
        let record = handle.lock().await;
        let pending = self.pending_entries(id).await;
        Ok(CurrentState::new(&record, pending))
    }

    /// Current state of every blocker, oldest first.
    pub async fn statuses(&self) -> Vec<CurrentState> {
        let mut out = Vec::new();
        for handle in self.handles().await {
            let record = handle.lock().await;
            let pending = self.pending_entries(record.id).await;
            out.push((record.created_at, CurrentState::new(&record, pending)));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        out.into_iter().map(|(_, s)| s).collect()
    }

    /// Full record of one blocker, audit trail included.
    pub async fn record(&self, id: BlockerId) -> Result<BlockerRecord> {
        let handle = self.handle(id).await?;
        let record = handle.lock().await;
        Ok(record.clone())
    }

    /// The human review queue, oldest flag first.
    pub async fn flagged(&self) -> Vec<FlaggedBlocker> {
        let mut out = Vec::new();
        for handle in self.handles().await {
            if let Some(f) = FlaggedBlocker::from_record(&*handle.lock().await) {
                out.push(f);
            }
        }
        out.sort_by(|a, b| a.raised_at.cmp(&b.raised_at).then(a.id.cmp(&b.id)));
        out
    }

    /// Loop counters over every known blocker.
    pub async fn metrics(&self) -> LoopMetrics {
        let mut metrics = LoopMetrics::default();
        for handle in self.handles().await {
            metrics.observe(&*handle.lock().await);
        }
        metrics
    }

    /// Blockers reported against `task`, from storage.
    pub async fn blockers_for_task(&self, task: &TaskId) -> Result<Vec<BlockerRecord>> {
        Ok(self.storage.list_blockers_for_task(task).await?)
    }

    /// Replace the graph with `snapshot` and persist it.
    pub async fn import_graph(&self, snapshot: GraphSnapshot) -> Result<()> {
        let graph = DependencyGraph::from_snapshot(snapshot)?;
        let saved = graph.snapshot();
        *self.graph.write().await = graph;
        self.storage.save_graph(&saved).await?;
        info!(
            tasks = saved.tasks.len(),
            edges = saved.edges.len(),
            "Graph imported"
        );
        Ok(())
    }

    /// Update a task's status. Finishing a task resolves the edges waiting on it.
    ///
    /// Returns the tasks no longer waiting on anything.
    pub async fn set_task_status(&self, task: &TaskId, status: TaskStatus) -> Result<Vec<TaskId>> {
        let now = self.clock.now();
        let (unblocked, snapshot) = {
            let mut graph = self.graph.write().await;
            graph.set_task_status(task, status)?;
            let unblocked = if status == TaskStatus::Done {
                graph.resolve_edges_into(task, now)?
            } else {
                Vec::new()
            };
            (unblocked, graph.snapshot())
        };
        self.storage.save_graph(&snapshot).await?;

        let adapter = &self.collaborators.tasks;
        if let Err(e) = with_retry(&self.config.adapter, "update_status", move || {
            adapter.update_status(task, status)
        })
        .await
        {
            warn!(task = %task, error = %e, "Task tracker not updated");
        }
        Ok(unblocked)
    }

    /// Pull responses for engaged blockers and newly blocked tasks from the adapters.
    pub async fn poll_adapters(&self) -> Result<PollReport> {
        let mut report = PollReport::default();

        for handle in self.handles().await {
            let (id, since) = {
                let record = handle.lock().await;
                if !record.state.is_engaging() {
                    continue;
                }
                let since = record
                    .responses
                    .last()
                    .map(|r| r.received_at)
                    .or_else(|| record.engagements.first().map(|e| e.sent_at))
                    .unwrap_or(record.created_at);
                (record.id, since)
            };
            let messaging = &self.collaborators.messaging;
            match with_retry(&self.config.adapter, "fetch_responses", move || {
                messaging.fetch_responses(id, since)
            })
            .await
            {
                Ok(responses) => {
                    for r in responses.into_iter().filter(|r| r.received_at > since) {
                        self.record_response(id, r.from, r.message).await?;
                        report.responses += 1;
                    }
                }
                Err(e) => warn!(blocker = %id, error = %e, "Could not fetch responses"),
            }
        }

        let tasks = &self.collaborators.tasks;
        match with_retry(&self.config.adapter, "fetch_blocked_tasks", move || tasks.fetch_blocked_tasks()).await {
            Ok(blocked) => {
                for task in blocked {
                    if self.has_live_blocker(&task.id).await {
                        continue;
                    }
                    let reporter = task
                        .assignee
                        .clone()
                        .unwrap_or_else(|| EmployeeId::from("monitor"));
                    let signal = BlockerSignal::new(
                        SourceKind::Monitor,
                        reporter,
                        format!("Task {} is marked blocked", task.id),
                        self.clock.now(),
                    )
                    .with_tasks([task.id.clone()]);
                    report.detected.push(self.submit(signal).await?);
                }
            }
            Err(e) => warn!(error = %e, "Could not fetch blocked tasks"),
        }

        report.detected.extend(self.detect_task_risks().await?);
        Ok(report)
    }

    /// Open blockers for overdue and stalled tasks nobody has reported yet.
    ///
    /// Overdue tasks come first, so a task that is both is raised once, as overdue.
    pub async fn detect_task_risks(&self) -> Result<Vec<BlockerId>> {
        let now = self.clock.now();
        let risks = {
            let graph = self.graph.read().await;
            let mut risks = graph.overdue_tasks(now);
            risks.extend(graph.stalled_tasks(now, self.config.stall_threshold()));
            risks
        };

        let mut detected = Vec::new();
        for risk in risks {
            if self.has_live_blocker(&risk.task).await {
                continue;
            }
            let reporter = risk
                .assignee
                .clone()
                .unwrap_or_else(|| EmployeeId::from("monitor"));
            let signal = BlockerSignal::new(SourceKind::Monitor, reporter, risk.describe(), now)
                .with_tasks([risk.task.clone()])
                .with_severity_floor(risk.severity());
            let id = self.submit(signal).await?;
            info!(
                blocker = %id,
                task = %risk.task,
                severity = risk.severity().as_str(),
                "Task risk detected"
            );
            detected.push(id);
        }
        Ok(detected)
    }

    fn transition(
        record: &mut BlockerRecord,
        event: LoopEvent,
        draft: StepDraft,
    ) -> Result<(LoopState, LoopState)> {
        let from = record.state;
        let to = from.next(&event)?;
        record.state = to;
        record.trail.append(draft, to);
        info!(blocker = %record.id, %from, %to, event = event.event_type(), "Transition");
        Ok((from, to))
    }

    fn raise_flag(record: &mut BlockerRecord, reason: FlagReason, detail: String, now: Time) {
        warn!(blocker = %record.id, reason = reason.as_str(), %detail, "Flagged for review");
        let state = record.state;
        record.trail.append(
            StepDraft::new(format!("flagged_{}", reason.as_str()), Actor::system(), now)
                .completed()
                .outcome(detail.clone()),
            state,
        );
        record.flag = Some(ReviewFlag {
            reason,
            detail,
            raised_at: now,
        });
    }

    fn hold(&self, record: &mut BlockerRecord, reason: FlagReason, detail: String, now: Time) -> StepOutcome {
        if reason == FlagReason::LowConfidence {
            warn!(blocker = %record.id, state = %record.state, "Degraded confidence, holding");
        }
        Self::raise_flag(record, reason, detail, now);
        StepOutcome::Flagged { reason }
    }

    fn classified(record: &BlockerRecord) -> Result<&ClassifiedBlocker> {
        record.classified.as_ref().ok_or(OrchestratorError::WrongState {
            id: record.id,
            expected: LoopState::Classify,
            actual: record.state,
        })
    }

    fn context_tags(record: &BlockerRecord, graph: &DependencyGraph) -> Vec<String> {
        let mut tags = vec![format!("source:{}", record.signal.source().as_str())];
        if let Some(team) = graph
            .employee(record.signal.reporter())
            .map(|e| e.team.as_str())
            .filter(|t| !t.is_empty())
        {
            tags.push(format!("team:{team}"));
        }
        tags
    }

    fn ensure_live(record: &BlockerRecord) -> Result<()> {
        if record.state.is_terminal() {
            return Err(OrchestratorError::Terminal(record.id));
        }
        if record.is_closed() {
            return Err(OrchestratorError::Completed(record.id));
        }
        Ok(())
    }

    fn expect_state(record: &BlockerRecord, expected: LoopState) -> Result<()> {
        if record.state != expected {
            return Err(OrchestratorError::WrongState {
                id: record.id,
                expected,
                actual: record.state,
            });
        }
        Ok(())
    }

    async fn handle(&self, id: BlockerId) -> Result<RecordHandle> {
        self.blockers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(OrchestratorError::UnknownBlocker(id))
    }

    async fn handles(&self) -> Vec<RecordHandle> {
        self.blockers.read().await.values().cloned().collect()
    }

    async fn has_live_blocker(&self, task: &TaskId) -> bool {
        for handle in self.handles().await {
            let record = handle.lock().await;
            if !record.is_closed() && record.related_tasks().contains(task) {
                return true;
            }
        }
        false
    }

    async fn pending_entries(&self, id: BlockerId) -> Vec<EscalationEntry> {
        self.timeline
            .lock()
            .await
            .pending(id)
            .into_iter()
            .cloned()
            .collect()
    }

    async fn persist_timeline(&self) -> Result<()> {
        let entries = self.timeline.lock().await.entries().to_vec();
        self.storage.save_timeline(&entries).await?;
        Ok(())
    }
}
