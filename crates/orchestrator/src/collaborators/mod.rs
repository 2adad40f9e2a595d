//! Collaborators the loop consults or acts through.
//!
//! Every seam is an async trait with a default implementation, so the
//! orchestrator runs end to end without any external system configured.

mod adapters;
mod alignment;
mod channel;
mod classifier;
mod router;

pub use adapters::{
    AdapterError, CalendarAdapter, LoggingCalendar, LoggingMessenger, LoggingTasks, Meeting,
    MessagingAdapter, OutboundMessage, TaskAdapter,
};
pub use alignment::{AlignmentScorer, ProposedAction, ValuesAlignment};
pub use channel::{ChannelProfile, ChannelSelector, Complexity, SeverityChannelSelector};
pub use classifier::{Classification, Classifier, KeywordClassifier};
pub use router::{RoutingPolicy, TableRouter};

use std::sync::Arc;

/// The full set of collaborators an orchestrator works with.
#[derive(Clone)]
pub struct Collaborators {
    /// Signal classifier
    pub classifier: Arc<dyn Classifier>,
    /// Routing policy
    pub router: Arc<dyn RoutingPolicy>,
    /// Channel selection for outreach
    pub channels: Arc<dyn ChannelSelector>,
    /// Values alignment check before COORDINATE acts
    pub alignment: Arc<dyn AlignmentScorer>,
    /// Messaging system
    pub messaging: Arc<dyn MessagingAdapter>,
    /// Calendar system
    pub calendar: Arc<dyn CalendarAdapter>,
    /// Task tracker
    pub tasks: Arc<dyn TaskAdapter>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            classifier: Arc::new(KeywordClassifier::new()),
            router: Arc::new(TableRouter::new()),
            channels: Arc::new(SeverityChannelSelector::new()),
            alignment: Arc::new(ValuesAlignment),
            messaging: Arc::new(LoggingMessenger),
            calendar: Arc::new(LoggingCalendar),
            tasks: Arc::new(LoggingTasks),
        }
    }
}
