use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Audience, Notification, NotificationEvent, NotificationSink};
use crate::requests::clock::Clock;
use crate::requests::domain::UserProfile;
use crate::requests::repository::UserDirectory;

/// Delivery tally for one batch of outbox events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Resolves outbox audiences to recipients and appends to the sink.
///
/// Runs after the primary write has been committed. Failures are logged and
/// counted, never returned.
pub struct NotificationDispatcher<N, D> {
    sink: Arc<N>,
    directory: Arc<D>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl<N, D> NotificationDispatcher<N, D>
where
    N: NotificationSink + 'static,
    D: UserDirectory + 'static,
{
    pub fn new(sink: Arc<N>, directory: Arc<D>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            sink,
            directory,
            clock,
            timeout,
        }
    }

    pub(crate) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub async fn dispatch(&self, events: Vec<NotificationEvent>) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut admins: Option<Vec<UserProfile>> = None;

        for event in events {
            let recipients = match &event.audience {
                Audience::User(id) => vec![id.clone()],
                Audience::Admins { except } => {
                    if admins.is_none() {
                        admins = Some(self.load_admins().await);
                    }
                    admins
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .filter(|admin| except.as_deref() != Some(admin.id.as_str()))
                        .map(|admin| admin.id.clone())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .collect()
                }
            };

            if recipients.is_empty() {
                debug!(
                    request_id = %event.request_id,
                    kind = event.kind.label(),
                    "notification has no recipients"
                );
                continue;
            }

            for recipient_id in recipients {
                let notification = Notification {
                    id: uuid::Uuid::new_v4().to_string(),
                    recipient_id,
                    message: event.message.clone(),
                    kind: event.kind,
                    request_id: Some(event.request_id.clone()),
                    read: false,
                    created_at: self.clock.now(),
                };

                if self.deliver(notification).await {
                    report.delivered += 1;
                } else {
                    report.dropped += 1;
                }
            }
        }

        report
    }

    async fn deliver(&self, notification: Notification) -> bool {
        let recipient = notification.recipient_id.clone();
        let kind = notification.kind.label();
        match tokio::time::timeout(self.timeout, self.sink.notify(notification)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(%recipient, kind, error = %err, "dropping notification");
                false
            }
            Err(_) => {
                warn!(
                    %recipient,
                    kind,
                    timeout = ?self.timeout,
                    "notification sink timed out; dropping notification"
                );
                false
            }
        }
    }

    async fn load_admins(&self) -> Vec<UserProfile> {
        match tokio::time::timeout(self.timeout, self.directory.admins()).await {
            Ok(Ok(admins)) => admins,
            Ok(Err(err)) => {
                warn!(error = %err, "unable to load administrators for notification fan-out");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    timeout = ?self.timeout,
                    "user directory timed out during notification fan-out"
                );
                Vec::new()
            }
        }
    }
}
