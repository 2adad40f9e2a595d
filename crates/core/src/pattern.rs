//! Resolution patterns learned from completed loops.

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::blocker::BlockerType;
use crate::routing::ResolutionAction;
use crate::Time;

/// Exact-match key of a pattern: blocker type plus a tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternKey {
    /// Blocker category
    pub blocker_type: BlockerType,
    /// Context tags (order-insensitive)
    pub tags: BTreeSet<String>,
}

impl PatternKey {
    /// Build a key from any tag iterator.
    pub fn new<I, S>(blocker_type: BlockerType, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocker_type,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Filesystem-safe rendering, stable for a given key.
    pub fn slug(&self) -> String {
        let mut out = self.blocker_type.as_str().to_string();
        for tag in &self.tags {
            out.push('_');
            out.extend(tag.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }));
        }
        out
    }
}

/// Aggregate statistics for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPattern {
    /// Pattern key
    pub key: PatternKey,

    /// Strategy that last resolved it without recurrence
    pub successful_strategy: ResolutionAction,

    /// Smoothed resolution time
    pub avg_resolution_hours: f64,

    /// Smoothed recurrence rate in `[0, 1]`
    pub recurrence_rate: f64,

    /// Last time the pattern was seen
    pub last_seen: Time,

    /// How many cycles fed this pattern
    pub occurrences: u64,
}
