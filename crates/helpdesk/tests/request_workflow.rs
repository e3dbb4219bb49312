use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use helpdesk::requests::{
    FixedClock, HelpdeskService, Notification, NotificationError, NotificationInbox,
    NotificationKind, NotificationSink, Priority, Request, RequestId, RequestQuery,
    RequestRepository, RequestStatus, RequestType, RepositoryError, RequestView, ServiceSettings,
    UserDirectory, UserProfile, UserRole,
};
use helpdesk::requests::{Holiday, HolidayCalendar, NewRequest};

#[derive(Default)]
struct Store {
    requests: Mutex<HashMap<RequestId, Request>>,
}

#[async_trait]
impl RequestRepository for Store {
    async fn insert(&self, request: Request) -> Result<Request, RepositoryError> {
        let mut guard = self.requests.lock().expect("store mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    async fn update(&self, request: Request) -> Result<(), RepositoryError> {
        self.requests
            .lock()
            .expect("store mutex poisoned")
            .insert(request.id.clone(), request);
        Ok(())
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        Ok(self
            .requests
            .lock()
            .expect("store mutex poisoned")
            .get(id)
            .cloned())
    }

    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError> {
        self.requests
            .lock()
            .expect("store mutex poisoned")
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(&self) -> Result<Vec<Request>, RepositoryError> {
        Ok(self
            .requests
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn count_created_on(&self, day: NaiveDate) -> Result<u32, RepositoryError> {
        Ok(self
            .requests
            .lock()
            .expect("store mutex poisoned")
            .values()
            .filter(|request| request.created_at.date() == day)
            .count() as u32)
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for Outbox {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("outbox mutex poisoned")
            .push(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationInbox for Outbox {
    async fn list_for(&self, user_id: &str) -> Result<Vec<Notification>, NotificationError> {
        Ok(self
            .sent
            .lock()
            .expect("outbox mutex poisoned")
            .iter()
            .filter(|item| item.recipient_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_read(
        &self,
        _user_id: &str,
        notification_id: &str,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::NotFound(notification_id.to_string()))
    }
}

struct Admins(Vec<UserProfile>);

#[async_trait]
impl UserDirectory for Admins {
    async fn admins(&self) -> Result<Vec<UserProfile>, RepositoryError> {
        Ok(self.0.clone())
    }
}

fn profile(id: &str, name: &str, role: UserRole) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@example.com"),
        role,
    }
}

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date")
        .and_hms_opt(h, 0, 0)
        .expect("valid time")
}

#[tokio::test]
async fn friday_request_is_worked_through_a_holiday_weekend() {
    let admin = profile("it-lead", "Helena Prado", UserRole::Admin);
    let requester = profile("finance-3", "Igor Mendes", UserRole::Requester);
    let holidays = HolidayCalendar::new([Holiday {
        date: NaiveDate::from_ymd_opt(2025, 10, 13).expect("valid date"),
        name: "Bridge day".to_string(),
    }]);
    let clock = Arc::new(FixedClock::new(at(2025, 10, 10, 9)));
    let outbox = Arc::new(Outbox::default());
    let service = HelpdeskService::new(
        Arc::new(Store::default()),
        outbox.clone(),
        Arc::new(Admins(vec![admin.clone()])),
        holidays,
        ServiceSettings::default(),
    )
    .with_clock(clock.clone());

    let request = service
        .create(
            &requester,
            NewRequest {
                request_type: RequestType::General,
                priority: Priority::Low,
                title: None,
                description: "Need access to the shared finance drive".to_string(),
                attachments: Vec::new(),
            },
        )
        .await
        .expect("request created");
    assert_eq!(request.id.as_str(), "101025-0001");
    assert_eq!(request.deadline_at.date(), at(2025, 10, 15, 0).date());

    clock.set(at(2025, 10, 14, 10));
    let pending = service
        .list(&admin, &RequestQuery::view(RequestView::Pending))
        .await
        .expect("pending queue");
    assert_eq!(pending.total, 1);

    service
        .resolve(&admin, &request.id, Some("Granted read access".to_string()))
        .await
        .expect("resolved");
    service
        .close(&admin, &request.id)
        .await
        .expect("closed");

    let closed = service
        .get(&requester, &request.id)
        .await
        .expect("requester sees their request");
    assert_eq!(closed.status, RequestStatus::Closed);
    assert_eq!(closed.closed_at, Some(at(2025, 10, 14, 10)));

    let kinds: Vec<NotificationKind> = outbox
        .list_for(&requester.id)
        .await
        .expect("inbox")
        .into_iter()
        .map(|item| item.kind)
        .collect();
    assert_eq!(kinds, [NotificationKind::Created, NotificationKind::Resolved]);

    let summary = service
        .summary(&admin, &RequestQuery::default())
        .await
        .expect("summary");
    assert_eq!(summary.total, 1);
    assert_eq!(summary.by_status["closed"], 1);
    assert_eq!(summary.average_resolution_hours, Some(97.0));
}
