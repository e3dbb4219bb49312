use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{Assignee, NewAttachment, NewRequest, RequestId, UserProfile, UserRole};
use super::notifications::{NotificationError, NotificationInbox, NotificationSink};
use super::repository::{RepositoryError, RequestRepository, StorageError, UserDirectory};
use super::service::{HelpdeskService, ServiceError};
use super::views::RequestQuery;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Router builder exposing the request queue, reporting, and notification endpoints.
pub fn helpdesk_router<R, N, D>(service: Arc<HelpdeskService<R, N, D>>) -> Router
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/requests",
            post(create_handler::<R, N, D>).get(list_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id",
            get(get_handler::<R, N, D>).delete(delete_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/assign",
            post(assign_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/start",
            post(start_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/resolve",
            post(resolve_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/close",
            post(close_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/reopen",
            post(reopen_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/approve",
            post(approve_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/reject",
            post(reject_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/comments",
            post(comment_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/deadline",
            put(deadline_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/attachments",
            post(attachment_handler::<R, N, D>),
        )
        .route(
            "/api/v1/requests/:request_id/attachments/:attachment_id/url",
            get(attachment_url_handler::<R, N, D>),
        )
        .route("/api/v1/reports/summary", get(summary_handler::<R, N, D>))
        .route(
            "/api/v1/notifications",
            get(notifications_handler::<R, N, D>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(mark_read_handler::<R, N, D>),
        )
        .with_state(service)
}

/// Signed-in user as forwarded by the authenticating proxy.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub UserProfile);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let Some(id) = header(USER_ID_HEADER) else {
            let payload = json!({ "error": "missing authenticated user" });
            return Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response());
        };

        Ok(Self(UserProfile {
            name: header(USER_NAME_HEADER).unwrap_or_else(|| id.clone()),
            email: header(USER_EMAIL_HEADER).unwrap_or_default(),
            role: header(USER_ROLE_HEADER)
                .map(|role| UserRole::parse(&role))
                .unwrap_or(UserRole::Requester),
            id,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignPayload {
    #[serde(alias = "assigneeId")]
    pub assignee_id: String,
    #[serde(alias = "assigneeName")]
    pub assignee_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolvePayload {
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReopenPayload {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectPayload {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentPayload {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct DeadlinePayload {
    #[serde(alias = "deadlineAt")]
    pub deadline_at: NaiveDateTime,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

pub(crate) async fn create_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(draft): Json<NewRequest>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(StatusCode::CREATED, service.create(&actor, draft).await)
}

pub(crate) async fn list_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<RequestQuery>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(StatusCode::OK, service.list(&actor, &query).await)
}

pub(crate) async fn get_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.get(&actor, &RequestId(request_id)).await,
    )
}

pub(crate) async fn delete_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    match service.delete(&actor, &RequestId(request_id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn assign_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
    Json(payload): Json<AssignPayload>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    let assignee = Assignee {
        id: payload.assignee_id,
        name: payload.assignee_name,
    };
    respond(
        StatusCode::OK,
        service
            .assign(&actor, &RequestId(request_id), assignee)
            .await,
    )
}

pub(crate) async fn start_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.start(&actor, &RequestId(request_id)).await,
    )
}

pub(crate) async fn resolve_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
    payload: Option<Json<ResolvePayload>>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    let Json(payload) = payload.unwrap_or_default();
    respond(
        StatusCode::OK,
        service
            .resolve(&actor, &RequestId(request_id), payload.resolution)
            .await,
    )
}

pub(crate) async fn close_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.close(&actor, &RequestId(request_id)).await,
    )
}

pub(crate) async fn reopen_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
    Json(payload): Json<ReopenPayload>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service
            .reopen(&actor, &RequestId(request_id), payload.reason)
            .await,
    )
}

pub(crate) async fn approve_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service.approve(&actor, &RequestId(request_id)).await,
    )
}

pub(crate) async fn reject_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
    payload: Option<Json<RejectPayload>>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    let Json(payload) = payload.unwrap_or_default();
    respond(
        StatusCode::OK,
        service
            .reject(&actor, &RequestId(request_id), payload.reason)
            .await,
    )
}

pub(crate) async fn comment_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
    Json(payload): Json<CommentPayload>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::CREATED,
        service
            .comment(&actor, &RequestId(request_id), payload.text)
            .await,
    )
}

pub(crate) async fn deadline_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
    Json(payload): Json<DeadlinePayload>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::OK,
        service
            .change_deadline(&actor, &RequestId(request_id), payload.deadline_at)
            .await,
    )
}

pub(crate) async fn attachment_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(request_id): Path<String>,
    Json(attachment): Json<NewAttachment>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(
        StatusCode::CREATED,
        service
            .add_attachment(&actor, &RequestId(request_id), attachment)
            .await,
    )
}

pub(crate) async fn attachment_url_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path((request_id, attachment_id)): Path<(String, String)>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    let result = service
        .attachment_url(&actor, &RequestId(request_id), &attachment_id)
        .await
        .map(|url| json!({ "url": url }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn summary_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<RequestQuery>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    respond(StatusCode::OK, service.summary(&actor, &query).await)
}

pub(crate) async fn notifications_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<NotificationQuery>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    let result = service.notifications_for(&actor).await.map(|items| {
        items
            .into_iter()
            .filter(|item| !query.unread || !item.read)
            .collect::<Vec<_>>()
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn mark_read_handler<R, N, D>(
    State(service): State<Arc<HelpdeskService<R, N, D>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(notification_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    match service
        .mark_notification_read(&actor, &notification_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_)
            | ServiceError::AttachmentNotFound(_)
            | ServiceError::Repository(RepositoryError::NotFound)
            | ServiceError::Notification(NotificationError::NotFound(_))
            | ServiceError::Storage(StorageError::MissingObject(_)) => StatusCode::NOT_FOUND,
            ServiceError::Transition(err) if err.is_forbidden() => StatusCode::FORBIDDEN,
            ServiceError::Transition(err) if err.is_validation() => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Transition(_) | ServiceError::Repository(RepositoryError::Conflict) => {
                StatusCode::CONFLICT
            }
            ServiceError::StorageUnavailable
            | ServiceError::Repository(RepositoryError::Unavailable(_))
            | ServiceError::Repository(RepositoryError::Timeout(_))
            | ServiceError::Notification(NotificationError::Timeout(_))
            | ServiceError::Storage(StorageError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Notification(NotificationError::Transport(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        }
        let payload = json!({ "error": self.to_string() });
        (status, Json(payload)).into_response()
    }
}
