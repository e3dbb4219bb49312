use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::domain::{Assignee, NewAttachment, NewRequest, Request, RequestId, UserProfile};
use super::holidays::HolidayCalendar;
use super::lifecycle::{self, RequestAction, Transition, TransitionError};
use super::notifications::{
    DispatchReport, Notification, NotificationDispatcher, NotificationError, NotificationEvent,
    NotificationInbox, NotificationSink,
};
use super::repository::{
    ObjectStorage, RepositoryError, RequestRepository, StorageError, UserDirectory,
};
use super::views::{self, Page, ReportSummary, RequestQuery};
use crate::config::HelpdeskConfig;

const ID_ALLOCATION_ATTEMPTS: u32 = 3;

/// Tunables for store access and background sweeps.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub store_timeout: Duration,
    pub reminder_window: chrono::Duration,
    pub signed_url_ttl: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(15),
            reminder_window: chrono::Duration::hours(24),
            signed_url_ttl: Duration::from_secs(3600),
        }
    }
}

impl From<&HelpdeskConfig> for ServiceSettings {
    fn from(config: &HelpdeskConfig) -> Self {
        Self {
            store_timeout: config.store_timeout,
            reminder_window: config.reminder_window,
            signed_url_ttl: config.signed_url_ttl,
        }
    }
}

/// Service composing the lifecycle rules, repository, and notification outbox.
pub struct HelpdeskService<R, N, D> {
    repository: Arc<R>,
    inbox: Arc<N>,
    dispatcher: NotificationDispatcher<N, D>,
    storage: Option<Arc<dyn ObjectStorage>>,
    holidays: Arc<HolidayCalendar>,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl<R, N, D> HelpdeskService<R, N, D>
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifications: Arc<N>,
        directory: Arc<D>,
        holidays: HolidayCalendar,
        settings: ServiceSettings,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dispatcher = NotificationDispatcher::new(
            notifications.clone(),
            directory,
            clock.clone(),
            settings.store_timeout,
        );

        Self {
            repository,
            inbox: notifications,
            dispatcher,
            storage: None,
            holidays: Arc::new(holidays),
            clock,
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.dispatcher.set_clock(clock.clone());
        self.clock = clock;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn holidays(&self) -> &HolidayCalendar {
        &self.holidays
    }

    /// Submit a new request, computing its deadline once.
    pub async fn create(
        &self,
        actor: &UserProfile,
        draft: NewRequest,
    ) -> Result<Request, ServiceError> {
        let now = self.clock.now();
        let day = now.date();
        let mut sequence = self
            .bounded(self.repository.count_created_on(day))
            .await?
            + 1;

        let mut attempt = 1;
        loop {
            let id = RequestId::sequenced(day, sequence);
            let Transition { request, events, .. } =
                lifecycle::open(id, draft.clone(), actor, now, &self.holidays)?;

            match self.bounded(self.repository.insert(request)).await {
                Ok(stored) => {
                    info!(
                        request_id = %stored.id,
                        request_type = %stored.request_type,
                        priority = stored.priority.label(),
                        deadline_at = %stored.deadline_at,
                        "request created"
                    );
                    self.notify(events).await;
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict) if attempt < ID_ALLOCATION_ATTEMPTS => {
                    debug!(sequence, "request id already taken; trying the next one");
                    attempt += 1;
                    sequence += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Fetch a request visible to `actor`.
    pub async fn get(&self, actor: &UserProfile, id: &RequestId) -> Result<Request, ServiceError> {
        let request = self.load(id).await?;
        lifecycle::authorize_view(&request, actor)?;
        Ok(request)
    }

    /// Page through requests; requesters only ever see their own.
    pub async fn list(
        &self,
        actor: &UserProfile,
        query: &RequestQuery,
    ) -> Result<Page<Request>, ServiceError> {
        let requests = self.visible_to(actor).await?;
        Ok(views::select(requests, query, self.clock.now()))
    }

    pub async fn summary(
        &self,
        actor: &UserProfile,
        query: &RequestQuery,
    ) -> Result<ReportSummary, ServiceError> {
        let now = self.clock.now();
        let requests = self.visible_to(actor).await?;
        let mut scoped = query.clone();
        scoped.view = views::RequestView::All;
        Ok(ReportSummary::build(
            requests.iter().filter(|request| scoped.matches(request, now)),
            now,
        ))
    }

    pub async fn assign(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        assignee: Assignee,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Assign { assignee })
            .await
    }

    pub async fn start(
        &self,
        actor: &UserProfile,
        id: &RequestId,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Start).await
    }

    pub async fn resolve(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        resolution: Option<String>,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Resolve { resolution })
            .await
    }

    pub async fn close(
        &self,
        actor: &UserProfile,
        id: &RequestId,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Close).await
    }

    pub async fn reopen(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        reason: String,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Reopen { reason })
            .await
    }

    pub async fn approve(
        &self,
        actor: &UserProfile,
        id: &RequestId,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Approve).await
    }

    pub async fn reject(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        reason: Option<String>,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Reject { reason })
            .await
    }

    pub async fn comment(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        text: String,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::Comment { text })
            .await
    }

    /// Administrative override of the computed deadline.
    pub async fn change_deadline(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        deadline_at: NaiveDateTime,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::ChangeDeadline { deadline_at })
            .await
    }

    pub async fn add_attachment(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        attachment: NewAttachment,
    ) -> Result<Request, ServiceError> {
        self.transition(actor, id, RequestAction::AddAttachment { attachment })
            .await
    }

    /// Time-limited link for viewing an attachment.
    pub async fn attachment_url(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        attachment_id: &str,
    ) -> Result<String, ServiceError> {
        let storage = self.storage.as_ref().ok_or(ServiceError::StorageUnavailable)?;
        let request = self.get(actor, id).await?;
        let attachment = request
            .attachment(attachment_id)
            .ok_or_else(|| ServiceError::AttachmentNotFound(attachment_id.to_string()))?;

        let ttl = self.settings.signed_url_ttl;
        match tokio::time::timeout(
            self.settings.store_timeout,
            storage.signed_url(&attachment.storage_path, ttl),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(RepositoryError::Timeout(self.settings.store_timeout).into()),
        }
    }

    /// Remove a request permanently.
    pub async fn delete(&self, actor: &UserProfile, id: &RequestId) -> Result<(), ServiceError> {
        let request = self.load(id).await?;
        lifecycle::authorize_delete(&request, actor)?;
        self.bounded(self.repository.delete(id))
            .await
            .map_err(|err| not_found_or(err, id))?;
        info!(request_id = %id, actor = %actor.id, "request deleted");
        Ok(())
    }

    /// Apply any lifecycle action: fetch, run the pure transition, store, then notify.
    pub async fn transition(
        &self,
        actor: &UserProfile,
        id: &RequestId,
        action: RequestAction,
    ) -> Result<Request, ServiceError> {
        let current = self.load(id).await?;
        let action_name = action.name();
        let transition = lifecycle::apply(&current, actor, action, self.clock.now())
            .inspect_err(|err| {
                debug!(
                    request_id = %id,
                    actor = %actor.id,
                    action = action_name,
                    error = %err,
                    "transition refused"
                );
            })?;

        if !transition.changed {
            debug!(request_id = %id, action = action_name, "transition was a no-op");
            return Ok(transition.request);
        }

        self.bounded(self.repository.update(transition.request.clone()))
            .await
            .map_err(|err| not_found_or(err, id))?;
        info!(
            request_id = %id,
            actor = %actor.id,
            action = action_name,
            status = transition.request.status.label(),
            "request updated"
        );

        self.notify(transition.events).await;
        Ok(transition.request)
    }

    /// Send one reminder for each active request coming due inside the reminder window.
    pub async fn send_deadline_reminders(&self) -> Result<usize, ServiceError> {
        let now = self.clock.now();
        let requests = self.bounded(self.repository.list()).await?;
        let mut reminded = 0;

        // The listing only selects candidates; each write starts from a fresh read.
        let candidates = requests.into_iter().filter(|request| {
            lifecycle::remind(request, now, self.settings.reminder_window).is_some()
        });
        for candidate in candidates {
            let current = match self.load(&candidate.id).await {
                Ok(current) => current,
                Err(ServiceError::NotFound(id)) => {
                    debug!(request_id = %id, "request removed before its reminder");
                    continue;
                }
                Err(err) => {
                    warn!(
                        request_id = %candidate.id,
                        error = %err,
                        "unable to reload request for reminder"
                    );
                    continue;
                }
            };
            let Some(transition) =
                lifecycle::remind(&current, now, self.settings.reminder_window)
            else {
                continue;
            };
            match self
                .bounded(self.repository.update(transition.request))
                .await
            {
                Ok(()) => {
                    reminded += 1;
                    self.notify(transition.events).await;
                }
                Err(err) => {
                    warn!(
                        request_id = %current.id,
                        error = %err,
                        "unable to record deadline reminder"
                    );
                }
            }
        }

        Ok(reminded)
    }

    pub async fn notifications_for(
        &self,
        actor: &UserProfile,
    ) -> Result<Vec<Notification>, ServiceError> {
        let mut items = self.bounded_inbox(self.inbox.list_for(&actor.id)).await?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    pub async fn mark_notification_read(
        &self,
        actor: &UserProfile,
        notification_id: &str,
    ) -> Result<(), ServiceError> {
        self.bounded_inbox(self.inbox.mark_read(&actor.id, notification_id))
            .await?;
        Ok(())
    }

    async fn load(&self, id: &RequestId) -> Result<Request, ServiceError> {
        self.bounded(self.repository.fetch(id))
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))
    }

    async fn visible_to(&self, actor: &UserProfile) -> Result<Vec<Request>, ServiceError> {
        let requests = self.bounded(self.repository.list()).await?;
        if actor.is_admin() {
            return Ok(requests);
        }
        Ok(requests
            .into_iter()
            .filter(|request| request.is_owned_by(&actor.id))
            .collect())
    }

    async fn notify(&self, events: Vec<NotificationEvent>) -> DispatchReport {
        if events.is_empty() {
            return DispatchReport::default();
        }
        let report = self.dispatcher.dispatch(events).await;
        if report.dropped > 0 {
            warn!(
                delivered = report.delivered,
                dropped = report.dropped,
                "some notifications were dropped"
            );
        }
        report
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        let limit = self.settings.store_timeout;
        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?limit, "backing store call timed out");
                Err(RepositoryError::Timeout(limit))
            }
        }
    }

    async fn bounded_inbox<T, F>(&self, operation: F) -> Result<T, NotificationError>
    where
        F: Future<Output = Result<T, NotificationError>>,
    {
        let limit = self.settings.store_timeout;
        tokio::time::timeout(limit, operation)
            .await
            .unwrap_or(Err(NotificationError::Timeout(limit)))
    }
}

fn not_found_or(err: RepositoryError, id: &RequestId) -> ServiceError {
    match err {
        RepositoryError::NotFound => ServiceError::NotFound(id.clone()),
        other => ServiceError::Repository(other),
    }
}

/// Error raised by the helpdesk service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("attachment {0} not found")]
    AttachmentNotFound(String),
    #[error("object storage is not configured")]
    StorageUnavailable,
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
