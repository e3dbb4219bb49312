use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};
use helpdesk::requests::{
    HolidayCalendar, Notification, NotificationError, NotificationInbox, NotificationSink,
    ObjectStorage, Priority, RepositoryError, Request, RequestId, RequestRepository, RequestType,
    SessionProvider, StorageError, UserDirectory, UserProfile,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) holidays: Arc<HolidayCalendar>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestRepository {
    records: Arc<Mutex<HashMap<RequestId, Request>>>,
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn insert(&self, request: Request) -> Result<Request, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    async fn update(&self, request: Request) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&request.id) {
            guard.insert(request.id.clone(), request);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self) -> Result<Vec<Request>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    async fn count_created_on(&self, day: NaiveDate) -> Result<u32, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|request| request.created_at.date() == day)
            .count() as u32)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryNotifications {
    items: Arc<Mutex<Vec<Notification>>>,
}

#[async_trait]
impl NotificationSink for InMemoryNotifications {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut guard = self.items.lock().expect("notification mutex poisoned");
        guard.push(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationInbox for InMemoryNotifications {
    async fn list_for(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        let guard = self.items.lock().expect("notification mutex poisoned");
        Ok(guard
            .iter()
            .filter(|item| item.recipient_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> Result<(), NotificationError> {
        let mut guard = self.items.lock().expect("notification mutex poisoned");
        let item = guard
            .iter_mut()
            .find(|item| item.id == notification_id && item.recipient_id == user_id)
            .ok_or_else(|| NotificationError::NotFound(notification_id.to_string()))?;
        item.read = true;
        Ok(())
    }
}

/// Administrators listed in `HELPDESK_ADMINS`.
pub(crate) struct ConfiguredDirectory {
    admins: Vec<UserProfile>,
}

impl ConfiguredDirectory {
    pub(crate) fn new(admins: Vec<UserProfile>) -> Self {
        Self { admins }
    }
}

#[async_trait]
impl UserDirectory for ConfiguredDirectory {
    async fn admins(&self) -> Result<Vec<UserProfile>, RepositoryError> {
        Ok(self.admins.clone())
    }
}

/// Issues expiring links against a local file share standing in for the bucket.
pub(crate) struct LocalObjectStorage {
    base_url: String,
}

impl LocalObjectStorage {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn signed_url(&self, storage_path: &str, ttl: Duration) -> Result<String, StorageError> {
        let path = storage_path.trim_start_matches('/');
        if path.is_empty() {
            return Err(StorageError::MissingObject(storage_path.to_string()));
        }
        let expires = Local::now().timestamp() + ttl.as_secs() as i64;
        Ok(format!("{}/{}?expires={}", self.base_url, path, expires))
    }
}

/// Fixed signed-in user for CLI sessions.
pub(crate) struct StaticSession(pub(crate) Option<UserProfile>);

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<UserProfile> {
        self.0.clone()
    }
}

pub(crate) fn parse_datetime(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M", "%d/%m/%Y %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| format!("failed to parse '{raw}' as YYYY-MM-DDTHH:MM"))
}

pub(crate) fn parse_request_type(raw: &str) -> Result<RequestType, String> {
    if raw.trim().is_empty() {
        return Err("request type must not be empty".to_string());
    }
    Ok(RequestType::parse(raw))
}

pub(crate) fn parse_priority(raw: &str) -> Result<Priority, String> {
    raw.parse::<Priority>().map_err(|err| err.to_string())
}
