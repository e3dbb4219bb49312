use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::requests::clock::FixedClock;
use crate::requests::domain::{
    NewRequest, Priority, Request, RequestId, RequestType, UserProfile, UserRole,
};
use crate::requests::holidays::HolidayCalendar;
use crate::requests::lifecycle;
use crate::requests::notifications::{
    Notification, NotificationError, NotificationInbox, NotificationSink, SessionProvider,
};
use crate::requests::repository::{
    ObjectStorage, RepositoryError, RequestRepository, StorageError, UserDirectory,
};
use crate::requests::service::{HelpdeskService, ServiceSettings};

pub(super) type MemoryService =
    HelpdeskService<MemoryRepository, MemoryNotifications, StaticDirectory>;

pub(super) fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date")
        .and_hms_opt(h, min, 0)
        .expect("valid time")
}

/// Monday 2025-10-06 10:00, the reference "now" for service tests.
pub(super) fn monday_morning() -> NaiveDateTime {
    at(2025, 10, 6, 10, 0)
}

pub(super) fn admin() -> UserProfile {
    UserProfile {
        id: "admin-1".to_string(),
        name: "Ana Souza".to_string(),
        email: "ana@example.com".to_string(),
        role: UserRole::Admin,
    }
}

pub(super) fn second_admin() -> UserProfile {
    UserProfile {
        id: "admin-2".to_string(),
        name: "Bruno Lima".to_string(),
        email: "bruno@example.com".to_string(),
        role: UserRole::Admin,
    }
}

pub(super) fn requester() -> UserProfile {
    UserProfile {
        id: "user-1".to_string(),
        name: "Carla Dias".to_string(),
        email: "carla@example.com".to_string(),
        role: UserRole::Requester,
    }
}

pub(super) fn other_requester() -> UserProfile {
    UserProfile {
        id: "user-2".to_string(),
        name: "Diego Alves".to_string(),
        email: "diego@example.com".to_string(),
        role: UserRole::Requester,
    }
}

pub(super) fn draft(request_type: RequestType, priority: Priority) -> NewRequest {
    NewRequest {
        request_type,
        priority,
        title: Some("Printer on floor 2 is jammed".to_string()),
        description: "Paper jam every few pages since this morning.".to_string(),
        attachments: Vec::new(),
    }
}

/// Freshly opened request, without going through a repository.
pub(super) fn opened(request_type: RequestType, priority: Priority) -> Request {
    lifecycle::open(
        RequestId("061025-0001".to_string()),
        draft(request_type, priority),
        &requester(),
        monday_morning(),
        &HolidayCalendar::default(),
    )
    .expect("draft is valid")
    .request
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<MemoryRepository>,
    Arc<MemoryNotifications>,
    Arc<FixedClock>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let directory = Arc::new(StaticDirectory(vec![admin(), second_admin()]));
    let clock = Arc::new(FixedClock::new(monday_morning()));
    let service = HelpdeskService::new(
        repository.clone(),
        notifications.clone(),
        directory,
        HolidayCalendar::default(),
        ServiceSettings::default(),
    )
    .with_clock(clock.clone())
    .with_storage(Arc::new(MemoryStorage));
    (service, repository, notifications, clock)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<BTreeMap<RequestId, Request>>>,
}

impl MemoryRepository {
    pub(super) fn stored(&self, id: &RequestId) -> Option<Request> {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn seed(&self, request: Request) {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .insert(request.id.clone(), request);
    }
}

#[async_trait]
impl RequestRepository for MemoryRepository {
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
        if !guard.contains_key(&request.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(request.id.clone(), request);
        Ok(())
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
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
pub(super) struct MemoryNotifications {
    items: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifications {
    pub(super) fn all(&self) -> Vec<Notification> {
        self.items.lock().expect("notification mutex poisoned").clone()
    }

    pub(super) fn for_user(&self, user_id: &str) -> Vec<Notification> {
        self.all()
            .into_iter()
            .filter(|item| item.recipient_id == user_id)
            .collect()
    }

    pub(super) fn clear(&self) {
        self.items.lock().expect("notification mutex poisoned").clear();
    }
}

#[async_trait]
impl NotificationSink for MemoryNotifications {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.items
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationInbox for MemoryNotifications {
    async fn list_for(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.for_user(user_id))
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

/// Sink that refuses every notification; reads come back empty.
#[derive(Default)]
pub(super) struct FailingNotifications;

#[async_trait]
impl NotificationSink for FailingNotifications {
    async fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("notifications table offline".to_string()))
    }
}

#[async_trait]
impl NotificationInbox for FailingNotifications {
    async fn list_for(&self, _user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        Ok(Vec::new())
    }

    async fn mark_read(
        &self,
        _user_id: &str,
        notification_id: &str,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::NotFound(notification_id.to_string()))
    }
}

pub(super) struct StaticDirectory(pub(super) Vec<UserProfile>);

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn admins(&self) -> Result<Vec<UserProfile>, RepositoryError> {
        Ok(self
            .0
            .iter()
            .filter(|profile| profile.is_admin())
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

#[async_trait]
impl RequestRepository for UnavailableRepository {
    async fn insert(&self, _request: Request) -> Result<Request, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn update(&self, _request: Request) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn fetch(&self, _id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn delete(&self, _id: &RequestId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn list(&self) -> Result<Vec<Request>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    async fn count_created_on(&self, _day: NaiveDate) -> Result<u32, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Repository that never answers inside any reasonable timeout.
pub(super) struct SlowRepository;

impl SlowRepository {
    async fn stall() {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

#[async_trait]
impl RequestRepository for SlowRepository {
    async fn insert(&self, request: Request) -> Result<Request, RepositoryError> {
        Self::stall().await;
        Ok(request)
    }

    async fn update(&self, _request: Request) -> Result<(), RepositoryError> {
        Self::stall().await;
        Ok(())
    }

    async fn fetch(&self, _id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        Self::stall().await;
        Ok(None)
    }

    async fn delete(&self, _id: &RequestId) -> Result<(), RepositoryError> {
        Self::stall().await;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Request>, RepositoryError> {
        Self::stall().await;
        Ok(Vec::new())
    }

    async fn count_created_on(&self, _day: NaiveDate) -> Result<u32, RepositoryError> {
        Self::stall().await;
        Ok(0)
    }
}

pub(super) struct MemoryStorage;

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn signed_url(&self, storage_path: &str, ttl: Duration) -> Result<String, StorageError> {
        Ok(format!(
            "https://storage.test/{storage_path}?expires_in={}",
            ttl.as_secs()
        ))
    }
}

/// Session whose signed-in user can be swapped mid-test.
#[derive(Default)]
pub(super) struct SwitchableSession {
    user: Mutex<Option<UserProfile>>,
}

impl SwitchableSession {
    pub(super) fn sign_in(&self, user: UserProfile) {
        *self.user.lock().expect("session mutex poisoned") = Some(user);
    }

    pub(super) fn sign_out(&self) {
        *self.user.lock().expect("session mutex poisoned") = None;
    }
}

impl SessionProvider for SwitchableSession {
    fn current_user(&self) -> Option<UserProfile> {
        self.user.lock().expect("session mutex poisoned").clone()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

type Edit = Box<dyn Fn(&mut Request) + Send + Sync>;

/// Repository where another writer edits every record right after a listing is taken.
pub(super) struct RacingRepository {
    pub(super) inner: MemoryRepository,
    edit: Edit,
}

impl RacingRepository {
    pub(super) fn new(
        inner: MemoryRepository,
        edit: impl Fn(&mut Request) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            edit: Box::new(edit),
        }
    }
}

#[async_trait]
impl RequestRepository for RacingRepository {
    async fn insert(&self, request: Request) -> Result<Request, RepositoryError> {
        self.inner.insert(request).await
    }

    async fn update(&self, request: Request) -> Result<(), RepositoryError> {
        self.inner.update(request).await
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<Request>, RepositoryError> {
        let listed = self.inner.list().await?;
        let mut guard = self.inner.records.lock().expect("repository mutex poisoned");
        guard.values_mut().for_each(|request| (self.edit)(request));
        Ok(listed)
    }

    async fn count_created_on(&self, day: NaiveDate) -> Result<u32, RepositoryError> {
        self.inner.count_created_on(day).await
    }
}
