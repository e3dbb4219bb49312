use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{Notification, NotificationInbox};
use crate::requests::domain::UserProfile;

/// Supplies the user signed in to the current session, if any.
pub trait SessionProvider: Send + Sync {
    fn current_user(&self) -> Option<UserProfile>;
}

/// Unread notifications observed for one user on one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSnapshot {
    pub user_id: String,
    pub unread: Vec<Notification>,
}

impl PollSnapshot {
    pub fn unread_count(&self) -> usize {
        self.unread.len()
    }
}

/// Fixed-interval unread notification poll for the signed-in user.
pub struct NotificationPoller<I, S> {
    inbox: Arc<I>,
    session: Arc<S>,
    interval: Duration,
    timeout: Duration,
}

impl<I, S> NotificationPoller<I, S>
where
    I: NotificationInbox + 'static,
    S: SessionProvider + 'static,
{
    pub fn new(inbox: Arc<I>, session: Arc<S>, interval: Duration, timeout: Duration) -> Self {
        Self {
            inbox,
            session,
            interval,
            timeout,
        }
    }

    /// Start polling. The task ends once the returned receiver is dropped.
    pub fn spawn(self) -> (JoinHandle<()>, mpsc::Receiver<PollSnapshot>) {
        let (sender, receiver) = mpsc::channel(8);
        let handle = tokio::spawn(self.run(sender));
        (handle, receiver)
    }

    async fn run(self, sender: mpsc::Sender<PollSnapshot>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if sender.is_closed() {
                break;
            }

            let Some(user) = self.session.current_user() else {
                debug!("no signed-in user; skipping notification poll");
                continue;
            };

            let unread =
                match tokio::time::timeout(self.timeout, self.inbox.unread_for(&user.id)).await {
                    Ok(Ok(unread)) => unread,
                    Ok(Err(err)) => {
                        warn!(user_id = %user.id, error = %err, "notification poll failed");
                        continue;
                    }
                    Err(_) => {
                        warn!(
                            user_id = %user.id,
                            timeout = ?self.timeout,
                            "notification poll timed out"
                        );
                        continue;
                    }
                };

            let snapshot = PollSnapshot {
                user_id: user.id,
                unread,
            };
            if sender.send(snapshot).await.is_err() {
                break;
            }
        }
    }
}
