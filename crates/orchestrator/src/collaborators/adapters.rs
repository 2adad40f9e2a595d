//! External system adapters: messaging, calendar and task tracking.

use std::time::Duration;
use async_trait::async_trait;
use tracing::info;
use unblock_core::{BlockerId, ChannelId, EmployeeId, Response, Task, TaskId, TaskStatus, Time};

/// Failure of an external call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    /// The system could not be reached; worth retrying
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish in time; worth retrying
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The system refused the request; retrying will not help
    #[error("rejected: {0}")]
    Rejected(String),
}

impl AdapterError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AdapterError::Rejected(_))
    }
}

/// A message to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Blocker the message is about
    pub blocker_id: BlockerId,
    /// Recipient
    pub recipient: EmployeeId,
    /// Channel
    pub channel: ChannelId,
    /// Subject line
    pub subject: String,
    /// Body
    pub body: String,
}

/// A calendar meeting.
#[derive(Debug, Clone, PartialEq)]
pub struct Meeting {
    /// Title
    pub title: String,
    /// Invitees
    pub participants: Vec<EmployeeId>,
    /// Start time
    pub start: Time,
    /// Length
    pub duration_minutes: u32,
}

/// Sends messages and reads replies.
#[async_trait]
pub trait MessagingAdapter: Send + Sync {
    /// Deliver one message.
    async fn send(&self, message: &OutboundMessage) -> Result<(), AdapterError>;

    /// Replies about `blocker_id` received after `since`.
    async fn fetch_responses(&self, blocker_id: BlockerId, since: Time) -> Result<Vec<Response>, AdapterError>;
}

/// Reads and books calendars.
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    /// Meetings involving `employee` between `from` and `to`.
    async fn fetch_meetings(&self, employee: &EmployeeId, from: Time, to: Time) -> Result<Vec<Meeting>, AdapterError>;

    /// Book a meeting; returns the calendar's id for it.
    async fn schedule_meeting(&self, meeting: &Meeting) -> Result<String, AdapterError>;
}

/// Reads and updates the task tracker.
#[async_trait]
pub trait TaskAdapter: Send + Sync {
    /// Tasks the tracker currently marks as blocked.
    async fn fetch_blocked_tasks(&self) -> Result<Vec<Task>, AdapterError>;

    /// Change a task's status.
    async fn update_status(&self, task: &TaskId, status: TaskStatus) -> Result<(), AdapterError>;

    /// Hand a task to someone else.
    async fn reassign(&self, task: &TaskId, to: &EmployeeId) -> Result<(), AdapterError>;
}

/// Messaging adapter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMessenger;

#[async_trait]
impl MessagingAdapter for LoggingMessenger {
    async fn send(&self, message: &OutboundMessage) -> Result<(), AdapterError> {
        info!(
            blocker = %message.blocker_id,
            to = %message.recipient,
            channel = %message.channel,
            "[message] {}",
            message.subject
        );
        Ok(())
    }

    async fn fetch_responses(&self, _blocker_id: BlockerId, _since: Time) -> Result<Vec<Response>, AdapterError> {
        Ok(Vec::new())
    }
}

/// Calendar adapter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCalendar;

#[async_trait]
impl CalendarAdapter for LoggingCalendar {
    async fn fetch_meetings(&self, _employee: &EmployeeId, _from: Time, _to: Time) -> Result<Vec<Meeting>, AdapterError> {
        Ok(Vec::new())
    }

    async fn schedule_meeting(&self, meeting: &Meeting) -> Result<String, AdapterError> {
        info!(
            participants = meeting.participants.len(),
            start = %meeting.start,
            "[calendar] {}",
            meeting.title
        );
        Ok(format!("meeting-{}", meeting.start.timestamp()))
    }
}

/// Task adapter that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTasks;

#[async_trait]
impl TaskAdapter for LoggingTasks {
    async fn fetch_blocked_tasks(&self) -> Result<Vec<Task>, AdapterError> {
        Ok(Vec::new())
    }

    async fn update_status(&self, task: &TaskId, status: TaskStatus) -> Result<(), AdapterError> {
        info!(task = %task, status = status.as_str(), "[tasks] status update");
        Ok(())
    }

    async fn reassign(&self, task: &TaskId, to: &EmployeeId) -> Result<(), AdapterError> {
        info!(task = %task, to = %to, "[tasks] reassigned");
        Ok(())
    }
}
