//! Notification outbox: lifecycle transitions emit [`NotificationEvent`]s, the
//! dispatcher resolves them to recipients after the transition is stored, and
//! the poller surfaces unread notifications to the signed-in user.

mod dispatcher;
mod poller;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::domain::RequestId;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use poller::{NotificationPoller, PollSnapshot, SessionProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Created,
    Assigned,
    Resolved,
    Reopened,
    Comment,
    DeadlineChanged,
    Reminder,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Resolved => "resolved",
            Self::Reopened => "reopened",
            Self::Comment => "comment",
            Self::DeadlineChanged => "deadline_changed",
            Self::Reminder => "reminder",
        }
    }
}

/// A fact surfaced to one user. Only `read` ever changes after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub message: String,
    pub kind: NotificationKind,
    pub request_id: Option<RequestId>,
    pub read: bool,
    pub created_at: NaiveDateTime,
}

/// Who should hear about a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    User(String),
    Admins { except: Option<String> },
}

/// Outbox entry produced by the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub audience: Audience,
    pub kind: NotificationKind,
    pub message: String,
    pub request_id: RequestId,
}

impl NotificationEvent {
    pub fn to_user(
        user_id: impl Into<String>,
        kind: NotificationKind,
        request_id: &RequestId,
        message: String,
    ) -> Self {
        Self {
            audience: Audience::User(user_id.into()),
            kind,
            message,
            request_id: request_id.clone(),
        }
    }

    pub fn to_admins(
        except: Option<&str>,
        kind: NotificationKind,
        request_id: &RequestId,
        message: String,
    ) -> Self {
        Self {
            audience: Audience::Admins {
                except: except.map(str::to_string),
            },
            kind,
            message,
            request_id: request_id.clone(),
        }
    }
}

/// Insert-only append into the notifications table.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Per-user read access to stored notifications.
#[async_trait]
pub trait NotificationInbox: Send + Sync {
    async fn list_for(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError>;

    async fn unread_for(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        let all = self.list_for(user_id).await?;
        Ok(all.into_iter().filter(|item| !item.read).collect())
    }

    async fn mark_read(&self, user_id: &str, notification_id: &str)
        -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
    #[error("notification {0} not found")]
    NotFound(String),
    #[error("notification store did not answer within {0:?}")]
    Timeout(Duration),
}
