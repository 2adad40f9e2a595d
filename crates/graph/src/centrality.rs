//! Centrality measures and bottleneck ranking.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use serde::Serialize;
use tracing::debug;
use unblock_core::TaskId;
use crate::store::DependencyGraph;

const IN_DEGREE_WEIGHT: f64 = 0.6;
const BETWEENNESS_WEIGHT: f64 = 0.4;

/// A ranked bottleneck.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bottleneck {
    /// Task
    pub task: TaskId,
    /// Number of tasks actively waiting on it
    pub in_degree: usize,
    /// Normalized betweenness centrality
    pub betweenness: f64,
    /// Weighted score
    pub score: f64,
}

/// Index-addressed view of the active edges, in waits-on direction.
struct Adjacency {
    ids: Vec<TaskId>,
    out: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl Adjacency {
    fn build(graph: &DependencyGraph) -> Self {
        let ids: Vec<TaskId> = graph.tasks().map(|t| t.id.clone()).collect();
        let index: HashMap<&TaskId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut out = vec![Vec::new(); ids.len()];
        let mut in_degree = vec![0; ids.len()];
        for edge in graph.active_edges() {
            if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
                if !out[s].contains(&t) {
                    out[s].push(t);
                    in_degree[t] += 1;
                }
            }
        }
        Self { ids, out, in_degree }
    }

    fn out_degree(&self, v: usize) -> usize {
        self.out[v].len()
    }

    /// Brandes' algorithm over unweighted directed edges.
    fn betweenness(&self) -> Vec<f64> {
        let n = self.ids.len();
        let mut centrality = vec![0.0; n];

        for s in 0..n {
            let mut stack = Vec::with_capacity(n);
            let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
            let mut sigma = vec![0.0_f64; n];
            let mut dist: Vec<Option<usize>> = vec![None; n];
            sigma[s] = 1.0;
            dist[s] = Some(0);

            let mut queue = VecDeque::from([s]);
            while let Some(v) = queue.pop_front() {
                stack.push(v);
                let dv = dist[v].unwrap_or(0);
                for &w in &self.out[v] {
                    if dist[w].is_none() {
                        dist[w] = Some(dv + 1);
                        queue.push_back(w);
                    }
                    if dist[w] == Some(dv + 1) {
                        sigma[w] += sigma[v];
                        preds[w].push(v);
                    }
                }
            }

            let mut delta = vec![0.0_f64; n];
            while let Some(w) = stack.pop() {
                for &v in &preds[w] {
                    delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
                }
                if w != s {
                    centrality[w] += delta[w];
                }
            }
        }

        if n > 2 {
            let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
            for c in &mut centrality {
                *c *= scale;
            }
        }
        centrality
    }
}

fn max_or_one(values: impl Iterator<Item = usize>) -> f64 {
    values.max().filter(|&m| m > 0).unwrap_or(1) as f64
}

impl DependencyGraph {
    /// Normalized betweenness centrality of every task.
    pub fn betweenness(&self) -> BTreeMap<TaskId, f64> {
        let adj = Adjacency::build(self);
        let scores = adj.betweenness();
        adj.ids.into_iter().zip(scores).collect()
    }

    /// Rank tasks by how much work piles up behind them.
    ///
    /// Score is `0.6 * in_degree / max_in_degree + 0.4 * betweenness`.
    /// Ties sort by task id ascending.
    pub fn bottlenecks(&self, top_n: usize) -> Vec<Bottleneck> {
        let adj = Adjacency::build(self);
        let betweenness = adj.betweenness();
        let max_in = adj.in_degree.iter().copied().max().unwrap_or(0);

        let mut ranked: Vec<Bottleneck> = adj
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let normalized_in = if max_in == 0 {
                    0.0
                } else {
                    adj.in_degree[i] as f64 / max_in as f64
                };
                Bottleneck {
                    task: id.clone(),
                    in_degree: adj.in_degree[i],
                    betweenness: betweenness[i],
                    score: IN_DEGREE_WEIGHT * normalized_in + BETWEENNESS_WEIGHT * betweenness[i],
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.task.cmp(&b.task))
        });
        ranked.truncate(top_n);
        debug!(returned = ranked.len(), "Bottlenecks ranked");
        ranked
    }

    /// Per-task risk: mean of normalized in-degree, out-degree and betweenness.
    pub fn risk_scores(&self) -> BTreeMap<TaskId, f64> {
        let adj = Adjacency::build(self);
        let betweenness = adj.betweenness();
        let max_in = max_or_one(adj.in_degree.iter().copied());
        let max_out = max_or_one((0..adj.ids.len()).map(|v| adj.out_degree(v)));

        adj.ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let risk = (adj.in_degree[i] as f64 / max_in
                    + adj.out_degree(i) as f64 / max_out
                    + betweenness[i])
                    / 3.0;
                (id.clone(), risk)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unblock_core::{DependencyEdge, Task};
    use crate::store::Node;

    fn graph(tasks: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for t in tasks {
            g.add_node(Node::Task(Task::new(*t))).unwrap();
        }
        for (s, t) in edges {
            g.add_edge(DependencyEdge::new(*s, *t, Utc::now())).unwrap();
        }
        g
    }

    #[test]
    fn test_betweenness_of_chain_middle() {
        // c waits on b waits on a: only b lies between.
        let g = graph(&["a", "b", "c"], &[("c", "b"), ("b", "a")]);
        let bc = g.betweenness();
        assert_eq!(bc[&TaskId::from("a")], 0.0);
        assert!((bc[&TaskId::from("b")] - 0.5).abs() < 1e-9);
        assert_eq!(bc[&TaskId::from("c")], 0.0);
    }

    #[test]
    fn test_bottleneck_prefers_most_waited_on() {
        let g = graph(
            &["db", "api", "ui", "docs"],
            &[("api", "db"), ("ui", "db"), ("docs", "api")],
        );
        let ranked = g.bottlenecks(2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].task.as_str(), "db");
        assert_eq!(ranked[0].in_degree, 2);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_bottleneck_ties_sort_by_id() {
        let g = graph(&["z", "y", "m", "a"], &[("m", "z"), ("a", "y")]);
        let ranked = g.bottlenecks(4);
        let ids: Vec<_> = ranked.iter().map(|b| b.task.as_str()).collect();
        assert_eq!(ids, vec!["y", "z", "a", "m"]);
    }

    #[test]
    fn test_bottlenecks_without_edges_score_zero() {
        let g = graph(&["b", "a"], &[]);
        let ranked = g.bottlenecks(10);
        assert!(ranked.iter().all(|b| b.score == 0.0));
        assert_eq!(ranked[0].task.as_str(), "a");
    }

    #[test]
    fn test_risk_scores_bounded() {
        let g = graph(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);
        let risks = g.risk_scores();
        assert_eq!(risks.len(), 3);
        assert!(risks.values().all(|r| (0.0..=1.0).contains(r)));
        assert!(risks[&TaskId::from("b")] > risks[&TaskId::from("a")]);
    }
}
