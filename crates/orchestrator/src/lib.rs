//! Unblock orchestrator.
//!
//! Runs the blocker resolution loop: classifies incoming signals, routes
//! them to resolvers, engages and escalates on a fixed timeline, verifies
//! fixes with both parties, and feeds outcomes back into pattern memory.

#![warn(missing_docs)]

mod error;
mod clock;
mod retry;
mod executor;
mod review;
mod metrics;
mod engine;
mod ticker;

pub mod collaborators;

pub use error::{OrchestratorError, Result};
pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::with_retry;
pub use executor::{ActionExecutor, ActionPlan, Executed};
pub use review::{CurrentState, FlaggedBlocker};
pub use metrics::LoopMetrics;
pub use engine::{Orchestrator, PollReport, SharedGraph, StepOutcome, TickReport};
pub use ticker::Ticker;
