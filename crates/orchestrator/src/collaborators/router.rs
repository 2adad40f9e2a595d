//! Routing: who resolves a blocker, how, and with what authority.

use async_trait::async_trait;
use tracing::debug;
use unblock_core::{
    AuthorityLevel, BlockerType, ClassifiedBlocker, EmployeeId, ResolutionAction,
    ResolutionPattern, RoutingDecision, Severity, TaskId, Time,
};
use unblock_escalation::first_follow_up;
use unblock_graph::DependencyGraph;
use unblock_patterns::reliable_strategy;
use super::AdapterError;

/// Turns a classified blocker into a routing decision.
#[async_trait]
pub trait RoutingPolicy: Send + Sync {
    /// Route one blocker. `pattern` is the exact-match pattern, if any.
    async fn route(
        &self,
        blocker: &ClassifiedBlocker,
        graph: &DependencyGraph,
        pattern: Option<&ResolutionPattern>,
        now: Time,
    ) -> Result<RoutingDecision, AdapterError>;
}

/// Fixed (type, severity) routing table.
#[derive(Debug, Clone, Copy)]
pub struct TableRouter {
    max_authority: AuthorityLevel,
}

impl TableRouter {
    /// Router that may route up to elevated authority.
    pub fn new() -> Self {
        Self {
            max_authority: AuthorityLevel::Elevated,
        }
    }

    /// Cap the authority this router hands out.
    ///
    /// Actions above the cap are replaced by their fallback.
    pub fn with_max_authority(mut self, max: AuthorityLevel) -> Self {
        self.max_authority = max;
        self
    }

    /// Table lookup.
    pub fn table(blocker_type: BlockerType, severity: Severity) -> (ResolutionAction, AuthorityLevel) {
        use AuthorityLevel::*;
        use ResolutionAction::*;
        use Severity::*;

        match (blocker_type, severity) {
            (BlockerType::Dependency, Low | Medium) => (Notify, Immediate),
            (BlockerType::Dependency, High) => (ScheduleMeeting, Standard),
            (BlockerType::Dependency, Critical) => (Escalate, Elevated),

            (BlockerType::Resource, Low) => (Notify, Immediate),
            (BlockerType::Resource, Medium | High) => (Reassign, Standard),
            (BlockerType::Resource, Critical) => (Escalate, Elevated),

            (BlockerType::Technical, Low) => (ProvideInfo, Immediate),
            (BlockerType::Technical, Medium) => (ConnectPeers, Immediate),
            (BlockerType::Technical, High) => (ScheduleMeeting, Standard),
            (BlockerType::Technical, Critical) => (Escalate, Elevated),

            (BlockerType::Knowledge, Low | Medium) => (ProvideInfo, Immediate),
            (BlockerType::Knowledge, High) => (ConnectPeers, Standard),
            (BlockerType::Knowledge, Critical) => (ScheduleMeeting, Standard),

            (BlockerType::Organizational, Low) => (Notify, Immediate),
            (BlockerType::Organizational, Medium) => (ScheduleMeeting, Standard),
            (BlockerType::Organizational, High | Critical) => (Escalate, Elevated),
        }
    }

    /// Assignees of the tasks the blocked tasks wait on, in task order.
    fn blocking_assignees(blocker: &ClassifiedBlocker, graph: &DependencyGraph) -> Vec<EmployeeId> {
        let mut blocking: Vec<TaskId> = Vec::new();
        for task in &blocker.affected_tasks {
            blocking.extend(graph.dependencies(task).unwrap_or_default());
            if let Some(t) = graph.task(task).and_then(|t| t.blocking_task.clone()) {
                blocking.push(t);
            }
        }

        let mut out: Vec<EmployeeId> = Vec::new();
        for id in blocking {
            if let Some(assignee) = graph.task(&id).and_then(|t| t.assignee.clone()) {
                if !out.contains(&assignee) {
                    out.push(assignee);
                }
            }
        }
        out
    }
}

impl Default for TableRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoutingPolicy for TableRouter {
    async fn route(
        &self,
        blocker: &ClassifiedBlocker,
        graph: &DependencyGraph,
        pattern: Option<&ResolutionPattern>,
        now: Time,
    ) -> Result<RoutingDecision, AdapterError> {
        let (mut action, mut authority) = Self::table(blocker.blocker_type, blocker.severity);
        if authority > self.max_authority {
            action = action.fallback().unwrap_or(action);
            authority = self.max_authority;
        }
        if let Some(learned) = pattern.and_then(reliable_strategy) {
            debug!(table = action.as_str(), learned = learned.as_str(), "Pattern overrides routing");
            action = learned;
        }

        let reporter = blocker.signal.reporter();
        let mut candidates = Self::blocking_assignees(blocker, graph);
        candidates.retain(|e| e != reporter);

        let (target, backups, confidence) = if candidates.is_empty() {
            match graph.manager_of(reporter) {
                Some(manager) => (manager.id.clone(), Vec::new(), 1.0),
                None => (reporter.clone(), Vec::new(), 0.0),
            }
        } else {
            let target = candidates.remove(0);
            (target, candidates, 1.0)
        };

        let escalation_chain: Vec<EmployeeId> = [graph.manager_of(&target), graph.director_of(&target)]
            .into_iter()
            .flatten()
            .map(|e| e.id.clone())
            .collect();

        Ok(RoutingDecision {
            authority,
            action,
            target,
            backups,
            escalation_chain,
            max_wait: first_follow_up(blocker.severity),
            confidence,
            decided_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use unblock_core::{
        BlastRadius, BlockerSignal, DependencyEdge, Employee, PatternKey, SourceKind, Task,
    };
    use unblock_graph::Node;

    fn employee(id: &str, manager: Option<&str>) -> Node {
        Node::Employee(Employee {
            id: EmployeeId::from(id),
            name: id.to_string(),
            team: "infra".to_string(),
            role: String::new(),
            manager: manager.map(EmployeeId::from),
        })
    }

    fn graph() -> DependencyGraph {
        let now = Utc::now();
        let mut g = DependencyGraph::new();
        for node in [
            employee("dana", None),
            employee("mia", Some("dana")),
            employee("ops", Some("mia")),
            employee("ann", Some("mia")),
        ] {
            g.add_node(node).unwrap();
        }
        g.add_node(Node::Task(Task::new("migrate").assigned_to("ann"))).unwrap();
        g.add_node(Node::Task(Task::new("cloud").assigned_to("ops"))).unwrap();
        g.add_node(Node::Task(Task::new("solo").assigned_to("ann"))).unwrap();
        g.add_edge(DependencyEdge::new("migrate", "cloud", now)).unwrap();
        g
    }

    fn blocker(task: &str, blocker_type: BlockerType, severity: Severity) -> ClassifiedBlocker {
        let now = Utc::now();
        let signal = BlockerSignal::new(SourceKind::Monitor, "ann", "stuck", now)
            .with_tasks([TaskId::from(task)]);
        ClassifiedBlocker {
            signal,
            blocker_type,
            severity,
            confidence: 0.9,
            affected_tasks: vec![TaskId::from(task)],
            blast_radius: BlastRadius::default(),
            classified_at: now,
        }
    }

    #[tokio::test]
    async fn test_routes_to_blocking_assignee() {
        let b = blocker("migrate", BlockerType::Dependency, Severity::Critical);
        let d = TableRouter::new().route(&b, &graph(), None, Utc::now()).await.unwrap();
        assert_eq!(d.target, EmployeeId::from("ops"));
        assert_eq!(d.action, ResolutionAction::Escalate);
        assert_eq!(d.authority, AuthorityLevel::Elevated);
        assert_eq!(d.escalation_chain, vec![EmployeeId::from("mia"), EmployeeId::from("dana")]);
        assert_eq!(d.max_wait, Duration::hours(1));
        assert_eq!(d.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_falls_back_to_reporters_manager() {
        let b = blocker("solo", BlockerType::Knowledge, Severity::Low);
        let d = TableRouter::new().route(&b, &graph(), None, Utc::now()).await.unwrap();
        assert_eq!(d.target, EmployeeId::from("mia"));
        assert_eq!(d.action, ResolutionAction::ProvideInfo);
    }

    #[tokio::test]
    async fn test_unknown_task_has_no_resolver() {
        let b = blocker("ghost", BlockerType::Technical, Severity::Medium);
        let d = TableRouter::new().route(&b, &DependencyGraph::new(), None, Utc::now()).await.unwrap();
        assert_eq!(d.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_authority_cap_uses_fallback() {
        let b = blocker("migrate", BlockerType::Dependency, Severity::Critical);
        let router = TableRouter::new().with_max_authority(AuthorityLevel::Standard);
        let d = router.route(&b, &graph(), None, Utc::now()).await.unwrap();
        assert_eq!(d.action, ResolutionAction::ScheduleMeeting);
        assert_eq!(d.authority, AuthorityLevel::Standard);
    }

    #[tokio::test]
    async fn test_reliable_pattern_overrides_table() {
        let b = blocker("migrate", BlockerType::Dependency, Severity::Low);
        let pattern = ResolutionPattern {
            key: PatternKey::new(BlockerType::Dependency, ["source:monitor"]),
            successful_strategy: ResolutionAction::ConnectPeers,
            avg_resolution_hours: 2.0,
            recurrence_rate: 0.1,
            last_seen: Utc::now(),
            occurrences: 3,
        };
        let d = TableRouter::new().route(&b, &graph(), Some(&pattern), Utc::now()).await.unwrap();
        assert_eq!(d.action, ResolutionAction::ConnectPeers);

        let flaky = ResolutionPattern { recurrence_rate: 0.7, ..pattern };
        let d = TableRouter::new().route(&b, &graph(), Some(&flaky), Utc::now()).await.unwrap();
        assert_eq!(d.action, ResolutionAction::Notify);
    }
}
