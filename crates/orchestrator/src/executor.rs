//! Carries out the routed action through the adapters.

use std::sync::Arc;
use chrono::Duration;
use tracing::{info, warn};
use unblock_core::{AdapterConfig, BlockerId, ChannelId, EmployeeId, ResolutionAction, TaskId, TaskStatus, Time};
use crate::collaborators::{
    AdapterError, CalendarAdapter, Meeting, MessagingAdapter, OutboundMessage, TaskAdapter,
};
use crate::retry::with_retry;

/// Everything needed to carry out one action.
#[derive(Debug, Clone)]
pub struct ActionPlan {
    /// Blocker the action is for
    pub blocker_id: BlockerId,
    /// Requested action
    pub action: ResolutionAction,
    /// People involved; the primary resolver first
    pub participants: Vec<EmployeeId>,
    /// Channel for messages
    pub channel: ChannelId,
    /// Tasks the blocker is about
    pub tasks: Vec<TaskId>,
    /// One-line summary used in messages and meeting titles
    pub summary: String,
    /// Current time
    pub now: Time,
}

/// Action that actually ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    /// Action that succeeded
    pub action: ResolutionAction,
    /// Actions tried before it, in order
    pub skipped: Vec<ResolutionAction>,
}

/// Maps resolution actions onto adapter calls.
#[derive(Clone)]
pub struct ActionExecutor {
    messaging: Arc<dyn MessagingAdapter>,
    calendar: Arc<dyn CalendarAdapter>,
    tasks: Arc<dyn TaskAdapter>,
    policy: AdapterConfig,
}

impl ActionExecutor {
    /// Create an executor.
    pub fn new(
        messaging: Arc<dyn MessagingAdapter>,
        calendar: Arc<dyn CalendarAdapter>,
        tasks: Arc<dyn TaskAdapter>,
        policy: AdapterConfig,
    ) -> Self {
        Self { messaging, calendar, tasks, policy }
    }

    /// Whether `plan` has enough people (and tasks) for `action`.
    pub fn can_execute(action: ResolutionAction, plan: &ActionPlan) -> bool {
        match action {
            ResolutionAction::Reassign => plan.participants.len() >= 2 && !plan.tasks.is_empty(),
            ResolutionAction::ConnectPeers => plan.participants.len() >= 2,
            ResolutionAction::ScheduleMeeting
            | ResolutionAction::Notify
            | ResolutionAction::ProvideInfo
            | ResolutionAction::Escalate => !plan.participants.is_empty(),
        }
    }

    /// Run the plan's action, walking the fallback chain on failure.
    pub async fn execute_with_fallback(&self, plan: &ActionPlan) -> Result<Executed, AdapterError> {
        let mut action = plan.action;
        let mut skipped = Vec::new();
        loop {
            let result = if Self::can_execute(action, plan) {
                self.execute(action, plan).await
            } else {
                Err(AdapterError::Rejected(format!(
                    "{} needs more participants",
                    action.as_str()
                )))
            };

            match result {
                Ok(()) => {
                    info!(blocker = %plan.blocker_id, action = action.as_str(), "Action executed");
                    return Ok(Executed { action, skipped });
                }
                Err(e) => match action.fallback() {
                    Some(next) => {
                        warn!(
                            blocker = %plan.blocker_id,
                            action = action.as_str(),
                            fallback = next.as_str(),
                            error = %e,
                            "Action failed, falling back"
                        );
                        skipped.push(action);
                        action = next;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn execute(&self, action: ResolutionAction, plan: &ActionPlan) -> Result<(), AdapterError> {
        match action {
            ResolutionAction::ScheduleMeeting => {
                let meeting = Meeting {
                    title: format!("Unblock: {}", plan.summary),
                    participants: plan.participants.clone(),
                    start: plan.now + Duration::hours(1),
                    duration_minutes: 30,
                };
                let calendar = &self.calendar;
                let meeting = &meeting;
                with_retry(&self.policy, "schedule_meeting", move || calendar.schedule_meeting(meeting))
                    .await
                    .map(|_| ())
            }
            ResolutionAction::Reassign => {
                let to = &plan.participants[1];
                for task in &plan.tasks {
                    let adapter = &self.tasks;
                    with_retry(&self.policy, "reassign", move || adapter.reassign(task, to)).await?;
                    with_retry(&self.policy, "update_status", move || {
                        adapter.update_status(task, TaskStatus::InProgress)
                    })
                    .await?;
                }
                Ok(())
            }
            ResolutionAction::Notify
            | ResolutionAction::ProvideInfo
            | ResolutionAction::ConnectPeers
            | ResolutionAction::Escalate => {
                let subject = match action {
                    ResolutionAction::ProvideInfo => format!("Information that may unblock: {}", plan.summary),
                    ResolutionAction::ConnectPeers => format!("Introduction: {}", plan.summary),
                    ResolutionAction::Escalate => format!("Escalated blocker: {}", plan.summary),
                    _ => format!("Blocker: {}", plan.summary),
                };
                let others: Vec<String> = plan.participants.iter().map(|p| p.to_string()).collect();
                for recipient in &plan.participants {
                    let message = OutboundMessage {
                        blocker_id: plan.blocker_id,
                        recipient: recipient.clone(),
                        channel: plan.channel.clone(),
                        subject: subject.clone(),
                        body: format!("{}\nInvolved: {}", plan.summary, others.join(", ")),
                    };
                    let messaging = &self.messaging;
                    let message = &message;
                    with_retry(&self.policy, "send", move || messaging.send(message)).await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use crate::collaborators::{LoggingCalendar, LoggingMessenger, LoggingTasks};
    use unblock_core::Response;

    #[derive(Default)]
    struct BrokenCalendar;

    #[async_trait]
    impl CalendarAdapter for BrokenCalendar {
        async fn fetch_meetings(&self, _: &EmployeeId, _: Time, _: Time) -> Result<Vec<Meeting>, AdapterError> {
            Ok(Vec::new())
        }

        async fn schedule_meeting(&self, _: &Meeting) -> Result<String, AdapterError> {
            Err(AdapterError::Rejected("calendar locked".into()))
        }
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessagingAdapter for RecordingMessenger {
        async fn send(&self, message: &OutboundMessage) -> Result<(), AdapterError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn fetch_responses(&self, _: BlockerId, _: Time) -> Result<Vec<Response>, AdapterError> {
            Ok(Vec::new())
        }
    }

    fn plan(action: ResolutionAction, participants: &[&str]) -> ActionPlan {
        ActionPlan {
            blocker_id: BlockerId::new(),
            action,
            participants: participants.iter().map(|p| EmployeeId::from(*p)).collect(),
            channel: ChannelId::from("slack"),
            tasks: vec![TaskId::from("t1")],
            summary: "waiting on cloud access".to_string(),
            now: Utc::now(),
        }
    }

    fn executor(messaging: Arc<dyn MessagingAdapter>, calendar: Arc<dyn CalendarAdapter>) -> ActionExecutor {
        ActionExecutor::new(messaging, calendar, Arc::new(LoggingTasks), AdapterConfig::default())
    }

    #[tokio::test]
    async fn test_connect_peers_needs_two_people() {
        let exec = executor(Arc::new(LoggingMessenger), Arc::new(LoggingCalendar));
        let done = exec
            .execute_with_fallback(&plan(ResolutionAction::ConnectPeers, &["ops"]))
            .await
            .unwrap();
        assert_eq!(done.action, ResolutionAction::ProvideInfo);
        assert_eq!(done.skipped, vec![ResolutionAction::ConnectPeers]);
    }

    #[tokio::test]
    async fn test_failed_meeting_falls_back_to_notify() {
        let messenger = Arc::new(RecordingMessenger::default());
        let exec = executor(messenger.clone(), Arc::new(BrokenCalendar));
        let done = exec
            .execute_with_fallback(&plan(ResolutionAction::Escalate, &["ops", "mia"]))
            .await
            .unwrap();
        assert_eq!(done.action, ResolutionAction::Escalate);
        assert_eq!(messenger.sent.lock().unwrap().len(), 2);

        let done = exec
            .execute_with_fallback(&plan(ResolutionAction::ScheduleMeeting, &["ops"]))
            .await
            .unwrap();
        assert_eq!(done.action, ResolutionAction::Notify);
    }

    #[tokio::test]
    async fn test_nobody_to_contact_is_an_error() {
        let exec = executor(Arc::new(LoggingMessenger), Arc::new(LoggingCalendar));
        let err = exec
            .execute_with_fallback(&plan(ResolutionAction::Notify, &[]))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
