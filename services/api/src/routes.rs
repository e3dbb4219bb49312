use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Extension;
use axum::Json;
use chrono::{Local, NaiveDateTime};
use helpdesk::error::AppError;
use helpdesk::requests::{
    business_days_for, compute_deadline, helpdesk_router, HelpdeskService, Holiday,
    HolidayCalendar, NotificationInbox, NotificationSink, Priority, RequestRepository,
    RequestType, UserDirectory,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct DeadlinePreviewRequest {
    #[serde(rename = "type", alias = "request_type")]
    pub(crate) request_type: RequestType,
    pub(crate) priority: Priority,
    #[serde(default, alias = "createdAt")]
    pub(crate) created_at: Option<NaiveDateTime>,
    /// Replaces the configured calendar for this preview only.
    #[serde(default)]
    pub(crate) holidays_csv: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeadlinePreviewResponse {
    pub(crate) request_type: RequestType,
    pub(crate) priority: Priority,
    pub(crate) created_at: NaiveDateTime,
    pub(crate) business_days: u32,
    pub(crate) deadline_at: NaiveDateTime,
    pub(crate) holidays_skipped: Vec<Holiday>,
}

pub(crate) fn with_helpdesk_routes<R, N, D>(service: Arc<HelpdeskService<R, N, D>>) -> axum::Router
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    helpdesk_router(service)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/deadlines/preview", post(deadline_preview_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn deadline_preview_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<DeadlinePreviewRequest>,
) -> Result<Json<DeadlinePreviewResponse>, AppError> {
    let DeadlinePreviewRequest {
        request_type,
        priority,
        created_at,
        holidays_csv,
    } = payload;

    let uploaded = match holidays_csv {
        Some(csv) => Some(HolidayCalendar::from_reader(Cursor::new(csv.into_bytes()))?),
        None => None,
    };
    let holidays = uploaded.as_ref().unwrap_or(state.holidays.as_ref());

    let created_at = created_at.unwrap_or_else(|| Local::now().naive_local());
    let deadline_at = compute_deadline(&request_type, priority, created_at, holidays);
    let holidays_skipped = holidays
        .holidays()
        .filter(|holiday| holiday.date > created_at.date() && holiday.date <= deadline_at.date())
        .collect();

    Ok(Json(DeadlinePreviewResponse {
        business_days: business_days_for(&request_type, priority),
        request_type,
        priority,
        created_at,
        deadline_at,
        holidays_skipped,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{ConfiguredDirectory, InMemoryNotifications, InMemoryRequestRepository};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use helpdesk::requests::{ServiceSettings, UserProfile, UserRole};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app_state(ready: bool, holidays: HolidayCalendar) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
            holidays: Arc::new(holidays),
        }
    }

    fn friday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 10)
            .expect("valid date")
            .and_hms_opt(9, 0, 0)
            .expect("valid time")
    }

    fn app(state: AppState) -> axum::Router {
        let service = HelpdeskService::new(
            Arc::new(InMemoryRequestRepository::default()),
            Arc::new(InMemoryNotifications::default()),
            Arc::new(ConfiguredDirectory::new(vec![UserProfile {
                id: "admin-1".to_string(),
                name: "Ana Souza".to_string(),
                email: "ana@example.com".to_string(),
                role: UserRole::Admin,
            }])),
            state.holidays.as_ref().clone(),
            ServiceSettings::default(),
        );
        with_helpdesk_routes(Arc::new(service)).layer(Extension(state))
    }

    #[tokio::test]
    async fn deadline_preview_skips_uploaded_holidays() {
        let request = DeadlinePreviewRequest {
            request_type: RequestType::General,
            priority: Priority::Medium,
            created_at: Some(friday_morning()),
            holidays_csv: Some("date,name\n13/10/2025,Bridge day\n".to_string()),
        };

        let Json(body) = deadline_preview_endpoint(
            Extension(app_state(true, HolidayCalendar::default())),
            Json(request),
        )
        .await
        .expect("preview builds");

        assert_eq!(body.business_days, 1);
        assert_eq!(
            body.deadline_at,
            NaiveDate::from_ymd_opt(2025, 10, 14)
                .expect("valid date")
                .and_hms_opt(18, 0, 0)
                .expect("valid time")
        );
        assert_eq!(body.holidays_skipped.len(), 1);
        assert_eq!(body.holidays_skipped[0].name, "Bridge day");
    }

    #[tokio::test]
    async fn deadline_preview_rejects_unreadable_calendar() {
        let request = DeadlinePreviewRequest {
            request_type: RequestType::Systems,
            priority: Priority::High,
            created_at: Some(friday_morning()),
            holidays_csv: Some("date,name\nsometime,Bridge day\n".to_string()),
        };

        let err = deadline_preview_endpoint(
            Extension(app_state(true, HolidayCalendar::default())),
            Json(request),
        )
        .await
        .expect_err("invalid date rejected");

        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_bound() {
        let response = app(app_state(false, HolidayCalendar::default()))
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn request_routes_are_mounted_next_to_health_checks() {
        let holidays = HolidayCalendar::new([Holiday {
            date: NaiveDate::from_ymd_opt(2025, 10, 13).expect("valid date"),
            name: "Bridge day".to_string(),
        }]);
        let router = app(app_state(true, holidays));

        let health = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(health.status(), StatusCode::OK);

        let preview = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/deadlines/preview")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "type": "Geral",
                            "priority": "média",
                            "created_at": "2025-10-10T09:00:00",
                        })
                        .to_string(),
                    ))
                    .expect("request builds"),
            )
            .await
            .expect("route executes");
        assert_eq!(preview.status(), StatusCode::OK);

        let bytes = to_bytes(preview.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(payload["request_type"], json!("general"));
        assert_eq!(payload["deadline_at"], json!("2025-10-14T18:00:00"));
        assert_eq!(payload["holidays_skipped"][0]["name"], json!("Bridge day"));
    }
}
