//! Unblock escalation timeline.
//!
//! Turns a severity and an anchor time into a fixed sequence of contact
//! attempts, and fires them as the clock passes their due times.

#![warn(missing_docs)]

mod schedule;
mod timeline;

pub use schedule::{first_follow_up, offsets};
pub use timeline::EscalationTimeline;
