//! Impact queries: blast radius, cascade delay and structural checks.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use serde::Serialize;
use tracing::debug;
use unblock_core::{BlastRadius, TaskId};
use crate::error::Result;
use crate::store::DependencyGraph;

/// How a slip on one task spreads downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeDelay {
    /// Sum of downstream delays
    pub total_delay_hours: f64,
    /// Number of downstream tasks delayed
    pub tasks_delayed: usize,
    /// Largest single downstream delay
    pub max_chain_delay: f64,
    /// Delay per downstream task (origin excluded)
    pub per_task_delay: BTreeMap<TaskId, f64>,
}

impl DependencyGraph {
    /// Breadth-first order of every task reachable through dependents.
    ///
    /// The origin is excluded. Each task is expanded once.
    fn descendants(&self, origin: &TaskId) -> Vec<TaskId> {
        let mut visited: HashSet<TaskId> = HashSet::from([origin.clone()]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([origin.clone()]);

        while let Some(current) = queue.pop_front() {
            let mut next: Vec<&TaskId> = self.dependent_edges(&current).map(|e| &e.source).collect();
            next.sort();
            for dependent in next {
                if visited.insert(dependent.clone()) {
                    order.push(dependent.clone());
                    queue.push_back(dependent.clone());
                }
            }
        }
        order
    }

    /// Tasks, people and projects held up by `task`.
    pub fn blast_radius(&self, task: &TaskId) -> Result<BlastRadius> {
        self.require(task)?;
        let mut affected_tasks = self.descendants(task);
        let mut employees = BTreeSet::new();
        let mut projects = BTreeSet::new();
        for id in &affected_tasks {
            if let Some(t) = self.task(id) {
                employees.extend(t.assignee.clone());
                projects.extend(t.project.clone());
            }
        }
        affected_tasks.sort();
        debug!(task = %task, affected = affected_tasks.len(), "Blast radius computed");

        Ok(BlastRadius {
            affected_tasks,
            affected_employees: employees.into_iter().collect(),
            affected_projects: projects.into_iter().collect(),
        })
    }

    /// Propagate an `estimated_hours` slip on `task` to everything downstream.
    ///
    /// Delays flow in topological order over the descendants; a task takes
    /// the maximum of its predecessors' delays plus the edge lag. Members of
    /// a cycle are settled afterwards in discovery order.
    pub fn cascade_delay(&self, task: &TaskId, estimated_hours: f64) -> Result<CascadeDelay> {
        self.require(task)?;
        let descendants = self.descendants(task);
        if descendants.is_empty() {
            return Ok(CascadeDelay::default());
        }

        let members: HashSet<&TaskId> = descendants.iter().chain([task]).collect();
        let mut pending: HashMap<&TaskId, usize> = HashMap::new();
        for id in &descendants {
            let preds = self
                .dependencies(id)?
                .into_iter()
                .filter(|p| members.contains(p))
                .count();
            pending.insert(id, preds);
        }

        let mut delay: HashMap<TaskId, f64> = HashMap::from([(task.clone(), estimated_hours)]);
        let mut settled: HashSet<TaskId> = HashSet::from([task.clone()]);
        let mut ready = VecDeque::from([task.clone()]);

        while let Some(current) = ready.pop_front() {
            let base = delay.get(&current).copied().unwrap_or(0.0);
            for edge in self.dependent_edges(&current) {
                let child = &edge.source;
                if child == task || !members.contains(child) {
                    continue;
                }
                let candidate = base + edge.lag_hours;
                let slot = delay.entry(child.clone()).or_insert(candidate);
                *slot = slot.max(candidate);

                if let Some(left) = pending.get_mut(child) {
                    *left = left.saturating_sub(1);
                    if *left == 0 && settled.insert(child.clone()) {
                        ready.push_back(child.clone());
                    }
                }
            }
        }

        // Anything left sits on a cycle.
        for id in &descendants {
            if settled.contains(id) {
                continue;
            }
            let mut best = delay.get(id).copied();
            for edge in self.dependency_edges(id) {
                if let Some(&pred) = delay.get(&edge.target) {
                    let candidate = pred + edge.lag_hours;
                    best = Some(best.map_or(candidate, |b| b.max(candidate)));
                }
            }
            delay.insert(id.clone(), best.unwrap_or(estimated_hours));
            settled.insert(id.clone());
        }

        let per_task_delay: BTreeMap<TaskId, f64> = descendants
            .iter()
            .map(|id| (id.clone(), delay.get(id).copied().unwrap_or(0.0)))
            .collect();
        let total_delay_hours = per_task_delay.values().sum();
        let max_chain_delay = per_task_delay.values().copied().fold(0.0, f64::max);
        debug!(task = %task, delayed = per_task_delay.len(), total = total_delay_hours, "Cascade computed");

        Ok(CascadeDelay {
            total_delay_hours,
            tasks_delayed: per_task_delay.len(),
            max_chain_delay,
            per_task_delay,
        })
    }

    /// Tasks ordered so every blocking task precedes the tasks waiting on it.
    ///
    /// Returns `None` if the active edges contain a cycle.
    pub fn topological_order(&self) -> Option<Vec<TaskId>> {
        let mut waiting: HashMap<&TaskId, usize> = HashMap::new();
        for task in self.tasks() {
            let count = self.dependency_edges(&task.id).count();
            waiting.insert(&task.id, count);
        }

        let mut ready: BTreeSet<TaskId> = waiting
            .iter()
            .filter(|&(_, &n)| n == 0)
            .map(|(id, _)| (*id).clone())
            .collect();
        let mut sorted = Vec::with_capacity(waiting.len());

        while let Some(id) = ready.pop_first() {
            for edge in self.dependent_edges(&id) {
                if let Some(left) = waiting.get_mut(&edge.source) {
                    *left -= 1;
                    if *left == 0 {
                        ready.insert(edge.source.clone());
                    }
                }
            }
            sorted.push(id);
        }

        (sorted.len() == self.task_count()).then_some(sorted)
    }

    /// Whether the active edges contain a cycle.
    pub fn has_cycle(&self) -> bool {
        self.topological_order().is_none()
    }

    /// One waits-on cycle, if any exists.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut visited = HashSet::new();
        for task in self.tasks() {
            if !visited.contains(&task.id) {
                let mut on_path = HashSet::new();
                let mut path = Vec::new();
                if let Some(cycle) = self.cycle_from(&task.id, &mut visited, &mut on_path, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn cycle_from(
        &self,
        id: &TaskId,
        visited: &mut HashSet<TaskId>,
        on_path: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
    ) -> Option<Vec<TaskId>> {
        visited.insert(id.clone());
        on_path.insert(id.clone());
        path.push(id.clone());

        for edge in self.dependency_edges(id) {
            let next = &edge.target;
            if on_path.contains(next) {
                let start = path.iter().position(|p| p == next)?;
                return Some(path[start..].to_vec());
            }
            if !visited.contains(next) {
                if let Some(cycle) = self.cycle_from(next, visited, on_path, path) {
                    return Some(cycle);
                }
            }
        }

        on_path.remove(id);
        path.pop();
        None
    }

    /// Longest chain of active waits-on edges, blocking task first.
    ///
    /// Empty when the graph is empty or cyclic.
    pub fn critical_path(&self) -> Vec<TaskId> {
        let Some(order) = self.topological_order() else {
            return Vec::new();
        };

        let mut length: HashMap<&TaskId, usize> = HashMap::new();
        let mut parent: HashMap<&TaskId, &TaskId> = HashMap::new();
        for id in &order {
            let mut best = 1;
            for edge in self.dependency_edges(id) {
                let via = length.get(&edge.target).copied().unwrap_or(1) + 1;
                if via > best {
                    best = via;
                    parent.insert(id, &edge.target);
                }
            }
            length.insert(id, best);
        }

        let Some(mut end) = order
            .iter()
            .max_by(|a, b| length[a].cmp(&length[b]).then_with(|| b.cmp(a)))
        else {
            return Vec::new();
        };

        let mut path = vec![end.clone()];
        while let Some(prev) = parent.get(end) {
            path.push((*prev).clone());
            end = *prev;
        }
        path.reverse();
        path
    }

    /// Number of weakly connected components over active edges.
    pub fn component_count(&self) -> usize {
        let mut seen: HashSet<&TaskId> = HashSet::new();
        let mut components = 0;
        for task in self.tasks() {
            if !seen.insert(&task.id) {
                continue;
            }
            components += 1;
            let mut stack = vec![&task.id];
            while let Some(id) = stack.pop() {
                let neighbours = self
                    .dependency_edges(id)
                    .map(|e| &e.target)
                    .chain(self.dependent_edges(id).map(|e| &e.source));
                for next in neighbours {
                    if seen.insert(next) {
                        stack.push(next);
                    }
                }
            }
        }
        components
    }

    /// `0.0` when every task is connected, `1.0` when none are.
    pub fn isolation_score(&self) -> f64 {
        let n = self.task_count();
        if n <= 1 {
            return 0.0;
        }
        (self.component_count() - 1) as f64 / (n - 1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unblock_core::{DependencyEdge, Employee, EmployeeId, ProjectId, Task, TaskStatus};
    use crate::store::Node;

    fn graph(tasks: &[&str], edges: &[(&str, &str, f64)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for t in tasks {
            g.add_node(Node::Task(Task::new(*t))).unwrap();
        }
        for (s, t, lag) in edges {
            g.add_edge(DependencyEdge::new(*s, *t, Utc::now()).with_lag(*lag)).unwrap();
        }
        g
    }

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    #[test]
    fn test_blast_radius_counts_reachable_dependents() {
        // b, c wait on a; d waits on b; e waits on d.
        let g = graph(
            &["a", "b", "c", "d", "e", "x"],
            &[("b", "a", 0.0), ("c", "a", 0.0), ("d", "b", 0.0), ("e", "d", 0.0)],
        );
        let radius = g.blast_radius(&id("a")).unwrap();
        assert_eq!(radius.task_count(), 4);
        assert!(!radius.affected_tasks.contains(&id("a")));
        assert_eq!(g.blast_radius(&id("e")).unwrap().task_count(), 0);
    }

    #[test]
    fn test_blast_radius_collects_people_and_projects() {
        let mut g = DependencyGraph::new();
        for e in ["ann", "bob"] {
            g.add_node(Node::Employee(Employee {
                id: e.into(),
                name: e.into(),
                team: String::new(),
                role: String::new(),
                manager: None,
            }))
            .unwrap();
        }
        g.add_node(Node::Project(unblock_core::Project {
            id: "launch".into(),
            team: "web".into(),
            deadline: None,
        }))
        .unwrap();
        g.add_node(Node::Task(Task::new("a").assigned_to("ann"))).unwrap();
        g.add_node(Node::Task(Task::new("b").assigned_to("bob").in_project("launch"))).unwrap();
        g.add_edge(DependencyEdge::new("b", "a", Utc::now())).unwrap();

        let radius = g.blast_radius(&id("a")).unwrap();
        assert_eq!(radius.affected_employees, vec![EmployeeId::from("bob")]);
        assert_eq!(radius.affected_projects, vec![ProjectId::from("launch")]);
    }

    #[test]
    fn test_blast_radius_tolerates_cycles() {
        let g = graph(&["a", "b", "c"], &[("b", "a", 0.0), ("c", "b", 0.0), ("a", "c", 0.0)]);
        assert_eq!(g.blast_radius(&id("a")).unwrap().task_count(), 2);
    }

    #[test]
    fn test_blast_radius_skips_resolved_edges() {
        let mut g = graph(&["a", "b"], &[("b", "a", 0.0)]);
        g.set_task_status(&id("a"), TaskStatus::Done).unwrap();
        g.resolve_edge(&id("b"), &id("a"), Utc::now()).unwrap();
        assert_eq!(g.blast_radius(&id("a")).unwrap().task_count(), 0);
    }

    #[test]
    fn test_blast_radius_unknown_task() {
        let g = graph(&["a"], &[]);
        assert!(g.blast_radius(&id("nope")).is_err());
    }

    #[test]
    fn test_cascade_takes_max_at_join() {
        // o feeds p (3h) and q (5h); j waits on both.
        let g = graph(
            &["o", "p", "q", "j"],
            &[("p", "o", 0.0), ("q", "o", 2.0), ("j", "p", 0.0), ("j", "q", 0.0)],
        );
        let cascade = g.cascade_delay(&id("o"), 3.0).unwrap();
        assert_eq!(cascade.per_task_delay[&id("p")], 3.0);
        assert_eq!(cascade.per_task_delay[&id("q")], 5.0);
        assert_eq!(cascade.per_task_delay[&id("j")], 5.0);
        assert_eq!(cascade.tasks_delayed, 3);
        assert_eq!(cascade.total_delay_hours, 13.0);
        assert_eq!(cascade.max_chain_delay, 5.0);
    }

    #[test]
    fn test_cascade_without_descendants_is_zero() {
        let g = graph(&["a", "b"], &[("a", "b", 0.0)]);
        let cascade = g.cascade_delay(&id("a"), 8.0).unwrap();
        assert_eq!(cascade.tasks_delayed, 0);
        assert_eq!(cascade.total_delay_hours, 0.0);
        assert!(cascade.per_task_delay.is_empty());
    }

    #[test]
    fn test_cascade_settles_cycles() {
        let g = graph(&["o", "a", "b"], &[("a", "o", 0.0), ("b", "a", 1.0), ("a", "b", 0.0)]);
        let cascade = g.cascade_delay(&id("o"), 2.0).unwrap();
        assert_eq!(cascade.tasks_delayed, 2);
        assert_eq!(cascade.per_task_delay[&id("a")], 2.0);
        assert_eq!(cascade.per_task_delay[&id("b")], 3.0);
    }

    #[test]
    fn test_topological_order_blocking_first() {
        let g = graph(&["a", "b", "c"], &[("c", "b", 0.0), ("b", "a", 0.0)]);
        assert_eq!(g.topological_order(), Some(vec![id("a"), id("b"), id("c")]));
        assert!(!g.has_cycle());
    }

    #[test]
    fn test_cycle_detection() {
        let g = graph(&["a", "b", "c"], &[("a", "b", 0.0), ("b", "c", 0.0), ("c", "a", 0.0)]);
        assert!(g.has_cycle());
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle.len(), 3);
        assert!(g.critical_path().is_empty());
    }

    #[test]
    fn test_critical_path_is_longest_chain() {
        let g = graph(
            &["a", "b", "c", "d", "x"],
            &[("b", "a", 0.0), ("c", "b", 0.0), ("d", "c", 0.0), ("x", "a", 0.0)],
        );
        assert_eq!(g.critical_path(), vec![id("a"), id("b"), id("c"), id("d")]);
        assert!(DependencyGraph::new().critical_path().is_empty());
    }

    #[test]
    fn test_components_and_isolation() {
        let g = graph(&["a", "b", "c", "d"], &[("b", "a", 0.0)]);
        assert_eq!(g.component_count(), 3);
        assert!((g.isolation_score() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(DependencyGraph::new().isolation_score(), 0.0);
    }
}
