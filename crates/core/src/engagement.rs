//! Engagement log - one entry per contact attempt.

use serde::{Deserialize, Serialize};
use crate::id::{ChannelId, EmployeeId};
use crate::Time;

/// Why a contact attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    /// First outreach to the routed resolver
    Initial,
    /// Reminder to the same resolver
    FollowUp,
    /// Outreach to a manager or director
    Escalation,
}

/// A single contact attempt. Appended, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementAction {
    /// Attempt kind
    pub kind: EngagementKind,

    /// Channel used
    pub channel: ChannelId,

    /// Who was contacted
    pub recipient: EmployeeId,

    /// Message body
    pub message: String,

    /// When it was sent
    pub sent_at: Time,

    /// When a response is due
    pub expected_response_by: Time,

    /// Scheduled follow-ups, in order
    pub follow_ups: Vec<Time>,

    /// Whether the adapter accepted the message
    pub delivered: bool,
}
