//! Unblock core data models.
//!
//! This crate defines the records that flow through the blocker resolution
//! loop and the organizational graph it reasons over.

#![warn(missing_docs)]

// Core identities
mod id;

// Detection and classification
mod signal;
mod blocker;

// Loop records
mod state;
mod routing;
mod engagement;
mod step;
mod verification;
mod escalation;
mod pattern;
mod record;

// Organizational graph
mod graph;

// Configuration
mod config;

// Re-exports
pub use id::*;

pub use signal::{BlockerSignal, SourceKind};
pub use blocker::{BlastRadius, BlockerType, ClassifiedBlocker, Severity};

pub use state::{InvalidTransition, LoopEvent, LoopState};
pub use routing::{AuthorityLevel, ResolutionAction, RoutingDecision};
pub use engagement::{EngagementAction, EngagementKind};
pub use step::{Actor, AuditTrail, CoordinationStep, StepDraft};
pub use verification::{ConfirmingParty, VerificationResult};
pub use escalation::{EntryStatus, EscalationEntry, EscalationStage};
pub use pattern::{PatternKey, ResolutionPattern};
pub use record::{BlockerRecord, FlagReason, Resolution, Response, ReviewFlag};

pub use graph::{
    DependencyEdge, EdgeType, Employee, GraphSnapshot, Project, Task, TaskStatus,
};

pub use config::{AdapterConfig, ArlConfig, ConfigError, ValuesConfig};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
