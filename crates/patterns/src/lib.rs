//! Unblock pattern memory.
//!
//! Learns, per blocker type and context, which resolution strategy worked
//! and how long it took, so routing can prefer what worked before.

#![warn(missing_docs)]

mod memory;

pub use memory::{reliable_strategy, PatternMemory, RELIABLE_RECURRENCE};
