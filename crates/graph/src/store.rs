//! Graph store - nodes, waits-on edges and the adjacency indices over them.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use unblock_core::{
    DependencyEdge, Employee, EmployeeId, GraphSnapshot, Project, ProjectId, Task, TaskId,
    TaskStatus, Time,
};
use crate::error::{GraphError, Result};

/// A node to insert.
#[derive(Debug, Clone)]
pub enum Node {
    /// Team member
    Employee(Employee),
    /// Project
    Project(Project),
    /// Task
    Task(Task),
}

/// The organizational dependency graph.
///
/// Edges point from the blocked task to the blocking task. Two indices are
/// kept over the edge list: what each task waits on, and what waits on it.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    employees: BTreeMap<EmployeeId, Employee>,
    projects: BTreeMap<ProjectId, Project>,
    tasks: BTreeMap<TaskId, Task>,
    edges: Vec<DependencyEdge>,
    /// blocked task -> edge indices
    waits_on: HashMap<TaskId, Vec<usize>>,
    /// blocking task -> edge indices
    waited_by: HashMap<TaskId, Vec<usize>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from a snapshot, validating every reference.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = Self::new();
        for employee in snapshot.employees {
            graph.add_node(Node::Employee(employee))?;
        }
        for project in snapshot.projects {
            graph.add_node(Node::Project(project))?;
        }
        for task in snapshot.tasks {
            graph.add_node(Node::Task(task))?;
        }
        for edge in snapshot.edges {
            graph.insert_edge(edge)?;
        }
        Ok(graph)
    }

    /// Copy the whole graph out, resolved edges included.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            employees: self.employees.values().cloned().collect(),
            projects: self.projects.values().cloned().collect(),
            tasks: self.tasks.values().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    /// Insert or replace a node.
    ///
    /// A task may only reference employees and projects already present.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        match node {
            Node::Employee(employee) => {
                debug!(employee = %employee.id, "Upserting employee");
                self.employees.insert(employee.id.clone(), employee);
            }
            Node::Project(project) => {
                debug!(project = %project.id, "Upserting project");
                self.projects.insert(project.id.clone(), project);
            }
            Node::Task(task) => {
                if let Some(assignee) = &task.assignee {
                    if !self.employees.contains_key(assignee) {
                        return Err(GraphError::UnknownEmployee(assignee.clone()));
                    }
                }
                if let Some(project) = &task.project {
                    if !self.projects.contains_key(project) {
                        return Err(GraphError::UnknownProject(project.clone()));
                    }
                }
                debug!(task = %task.id, "Upserting task");
                self.tasks.insert(task.id.clone(), task);
            }
        }
        Ok(())
    }

    /// Record that `edge.source` waits on `edge.target`.
    ///
    /// Both tasks must exist. Adding an edge that is already active is a
    /// no-op returning the existing one.
    pub fn add_edge(&mut self, edge: DependencyEdge) -> Result<&DependencyEdge> {
        if edge.resolved_at.is_some() {
            warn!(source = %edge.source, target = %edge.target, "Adding an already resolved edge");
        }
        let index = self.insert_edge(edge)?;
        Ok(&self.edges[index])
    }

    fn insert_edge(&mut self, edge: DependencyEdge) -> Result<usize> {
        for id in [&edge.source, &edge.target] {
            if !self.tasks.contains_key(id) {
                return Err(GraphError::UnknownTask(id.clone()));
            }
        }
        if edge.source == edge.target {
            return Err(GraphError::SelfDependency(edge.source));
        }

        if edge.is_active() {
            if let Some(existing) = self.active_edge_index(&edge.source, &edge.target) {
                debug!(source = %edge.source, target = %edge.target, "Edge already present");
                return Ok(existing);
            }
        }

        let index = self.edges.len();
        self.waits_on.entry(edge.source.clone()).or_default().push(index);
        self.waited_by.entry(edge.target.clone()).or_default().push(index);
        self.edges.push(edge);
        Ok(index)
    }

    fn active_edge_index(&self, source: &TaskId, target: &TaskId) -> Option<usize> {
        self.waits_on
            .get(source)?
            .iter()
            .copied()
            .find(|&i| self.edges[i].target == *target && self.edges[i].is_active())
    }

    /// Mark the active edge `source -> target` resolved.
    ///
    /// The blocking task must be done. The edge stays in the graph but no
    /// traversal follows it afterwards.
    pub fn resolve_edge(&mut self, source: &TaskId, target: &TaskId, at: Time) -> Result<()> {
        let index = self
            .active_edge_index(source, target)
            .ok_or_else(|| GraphError::NoSuchEdge {
                blocked: source.clone(),
                blocking: target.clone(),
            })?;
        let blocking = self
            .tasks
            .get(target)
            .ok_or_else(|| GraphError::UnknownTask(target.clone()))?;
        if blocking.status != TaskStatus::Done {
            return Err(GraphError::BlockingTaskNotDone(target.clone()));
        }

        self.edges[index].resolved_at = Some(at);
        info!(source = %source, target = %target, "Edge resolved");
        self.refresh_blocked_flag(source);
        Ok(())
    }

    /// Resolve every active edge waiting on `blocking`, which must be done.
    ///
    /// Returns the tasks that were waiting on it.
    pub fn resolve_edges_into(&mut self, blocking: &TaskId, at: Time) -> Result<Vec<TaskId>> {
        let waiting = self.dependents(blocking)?;
        for source in &waiting {
            self.resolve_edge(source, blocking, at)?;
        }
        Ok(waiting)
    }

    /// Update a task's status.
    pub fn set_task_status(&mut self, id: &TaskId, status: TaskStatus) -> Result<()> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownTask(id.clone()))?;
        info!(task = %id, from = task.status.as_str(), to = status.as_str(), "Task status changed");
        task.status = status;
        Ok(())
    }

    fn refresh_blocked_flag(&mut self, id: &TaskId) {
        let still_blocked = self
            .waits_on
            .get(id)
            .is_some_and(|edges| edges.iter().any(|&i| self.edges[i].is_active()));
        if let Some(task) = self.tasks.get_mut(id) {
            task.blocked = still_blocked;
            if !still_blocked {
                task.blocking_task = None;
            }
        }
    }

    /// Look up a task.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Look up an employee.
    pub fn employee(&self, id: &EmployeeId) -> Option<&Employee> {
        self.employees.get(id)
    }

    /// Look up a project.
    pub fn project(&self, id: &ProjectId) -> Option<&Project> {
        self.projects.get(id)
    }

    /// Direct manager of an employee.
    pub fn manager_of(&self, id: &EmployeeId) -> Option<&Employee> {
        let manager = self.employees.get(id)?.manager.as_ref()?;
        self.employees.get(manager)
    }

    /// Manager's manager.
    pub fn director_of(&self, id: &EmployeeId) -> Option<&Employee> {
        self.manager_of(id).and_then(|m| self.manager_of(&m.id))
    }

    /// All tasks in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// All edges, resolved ones included.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Edges still counted by traversals.
    pub fn active_edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(|e| e.is_active())
    }

    /// Number of tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Tasks actively waiting on `id`.
    pub fn dependents(&self, id: &TaskId) -> Result<Vec<TaskId>> {
        self.require(id)?;
        Ok(self.active_neighbours(&self.waited_by, id, |e| &e.source))
    }

    /// Tasks `id` actively waits on.
    pub fn dependencies(&self, id: &TaskId) -> Result<Vec<TaskId>> {
        self.require(id)?;
        Ok(self.active_neighbours(&self.waits_on, id, |e| &e.target))
    }

    /// Active edges into the tasks waiting on `id`, with their lag.
    pub(crate) fn dependent_edges<'a>(
        &'a self,
        id: &TaskId,
    ) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.waited_by
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(|e| e.is_active())
    }

    /// Active edges `id` waits on.
    pub(crate) fn dependency_edges<'a>(
        &'a self,
        id: &TaskId,
    ) -> impl Iterator<Item = &'a DependencyEdge> + 'a {
        self.waits_on
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(|e| e.is_active())
    }

    fn active_neighbours(
        &self,
        index: &HashMap<TaskId, Vec<usize>>,
        id: &TaskId,
        pick: impl Fn(&DependencyEdge) -> &TaskId,
    ) -> Vec<TaskId> {
        let mut out: Vec<TaskId> = index
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
            .filter(|e| e.is_active())
            .map(|e| pick(e).clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub(crate) fn require(&self, id: &TaskId) -> Result<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| GraphError::UnknownTask(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unblock_core::EdgeType;

    fn employee(id: &str, manager: Option<&str>) -> Node {
        Node::Employee(Employee {
            id: id.into(),
            name: id.to_uppercase(),
            team: "platform".into(),
            role: "engineer".into(),
            manager: manager.map(Into::into),
        })
    }

    fn sample() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_node(employee("dir", None)).unwrap();
        g.add_node(employee("mgr", Some("dir"))).unwrap();
        g.add_node(employee("ann", Some("mgr"))).unwrap();
        g.add_node(Node::Task(Task::new("a").assigned_to("ann"))).unwrap();
        g.add_node(Node::Task(Task::new("b"))).unwrap();
        g.add_edge(DependencyEdge::new("b", "a", Utc::now())).unwrap();
        g
    }

    #[test]
    fn test_edge_to_unknown_task_rejected() {
        let mut g = sample();
        let err = g.add_edge(DependencyEdge::new("b", "ghost", Utc::now())).unwrap_err();
        assert!(matches!(err, GraphError::UnknownTask(id) if id.as_str() == "ghost"));
        assert_eq!(g.edges().len(), 1);
    }

    #[test]
    fn test_task_with_unknown_assignee_rejected() {
        let mut g = DependencyGraph::new();
        let err = g.add_node(Node::Task(Task::new("t").assigned_to("nobody"))).unwrap_err();
        assert!(matches!(err, GraphError::UnknownEmployee(_)));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut g = sample();
        assert!(matches!(
            g.add_edge(DependencyEdge::new("a", "a", Utc::now())),
            Err(GraphError::SelfDependency(_))
        ));
    }

    #[test]
    fn test_duplicate_active_edge_is_noop() {
        let mut g = sample();
        g.add_edge(DependencyEdge::new("b", "a", Utc::now()).with_type(EdgeType::Approval))
            .unwrap();
        assert_eq!(g.edges().len(), 1);
    }

    #[test]
    fn test_resolve_requires_done_blocking_task() {
        let mut g = sample();
        let (b, a) = (TaskId::from("b"), TaskId::from("a"));
        assert!(matches!(
            g.resolve_edge(&b, &a, Utc::now()),
            Err(GraphError::BlockingTaskNotDone(_))
        ));

        g.set_task_status(&a, TaskStatus::Done).unwrap();
        g.resolve_edge(&b, &a, Utc::now()).unwrap();
        assert!(g.dependents(&a).unwrap().is_empty());
        // Resolved edges stay in the graph.
        assert_eq!(g.edges().len(), 1);
        assert!(g.edges()[0].resolved_at.is_some());
        assert!(matches!(
            g.resolve_edge(&b, &a, Utc::now()),
            Err(GraphError::NoSuchEdge { .. })
        ));
    }

    #[test]
    fn test_resolve_edges_into_clears_all_waiters() {
        let mut g = sample();
        g.add_node(Node::Task(Task::new("c"))).unwrap();
        g.add_edge(DependencyEdge::new("c", "a", Utc::now())).unwrap();
        let a = TaskId::from("a");
        g.set_task_status(&a, TaskStatus::Done).unwrap();

        let waiting = g.resolve_edges_into(&a, Utc::now()).unwrap();
        assert_eq!(waiting, vec![TaskId::from("b"), TaskId::from("c")]);
        assert_eq!(g.active_edges().count(), 0);
    }

    #[test]
    fn test_management_chain() {
        let g = sample();
        let ann = EmployeeId::from("ann");
        assert_eq!(g.manager_of(&ann).map(|e| e.id.as_str()), Some("mgr"));
        assert_eq!(g.director_of(&ann).map(|e| e.id.as_str()), Some("dir"));
        assert!(g.director_of(&EmployeeId::from("mgr")).is_none());
    }

    #[test]
    fn test_snapshot_restores_resolved_edges() {
        let mut g = sample();
        let a = TaskId::from("a");
        g.set_task_status(&a, TaskStatus::Done).unwrap();
        g.resolve_edges_into(&a, Utc::now()).unwrap();

        let restored = DependencyGraph::from_snapshot(g.snapshot()).unwrap();
        assert_eq!(restored.snapshot(), g.snapshot());
        assert_eq!(restored.active_edges().count(), 0);
    }
}
