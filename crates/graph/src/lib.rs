//! Unblock dependency graph.
//!
//! Holds the organizational graph (employees, projects, tasks and the
//! waits-on edges between tasks) and answers impact questions over it:
//! blast radius, bottleneck ranking and cascade delay. It also spots
//! unfinished tasks that are overdue or stalled.

#![warn(missing_docs)]

mod error;
mod store;
mod analysis;
mod centrality;
mod risk;

pub use error::{GraphError, Result};
pub use store::{DependencyGraph, Node};
pub use analysis::CascadeDelay;
pub use centrality::Bottleneck;
pub use risk::{RiskKind, TaskRisk};
