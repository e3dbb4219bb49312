use crate::cli::ServeArgs;
use crate::infra::{
    AppState, ConfiguredDirectory, InMemoryNotifications, InMemoryRequestRepository,
    LocalObjectStorage,
};
use crate::routes::with_helpdesk_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use helpdesk::config::AppConfig;
use helpdesk::error::AppError;
use helpdesk::requests::{
    HelpdeskService, HolidayCalendar, NotificationInbox, NotificationSink, RequestRepository,
    ServiceSettings, UserDirectory,
};
use helpdesk::telemetry;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let holidays = load_holidays(config.helpdesk.holidays_csv.as_deref())?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        holidays: Arc::new(holidays.clone()),
    };

    if config.helpdesk.admins.is_empty() {
        warn!("HELPDESK_ADMINS is empty; admin notifications have no recipients");
    }

    let repository = Arc::new(InMemoryRequestRepository::default());
    let notifications = Arc::new(InMemoryNotifications::default());
    let directory = Arc::new(ConfiguredDirectory::new(config.helpdesk.admins.clone()));
    let mut service = HelpdeskService::new(
        repository,
        notifications,
        directory,
        holidays,
        ServiceSettings::from(&config.helpdesk),
    );
    match config.helpdesk.storage_base_url.clone() {
        Some(base_url) => {
            service = service.with_storage(Arc::new(LocalObjectStorage::new(base_url)));
        }
        None => warn!("HELPDESK_STORAGE_URL not set; attachment links are unavailable"),
    }
    let service = Arc::new(service);

    let sweeper = spawn_reminder_sweep(service.clone(), config.helpdesk.reminder_sweep_interval);

    let app = with_helpdesk_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "helpdesk service ready");

    let served = axum::serve(listener, app).await;
    sweeper.abort();
    served?;
    Ok(())
}

pub(crate) fn load_holidays(path: Option<&Path>) -> Result<HolidayCalendar, AppError> {
    let Some(path) = path else {
        return Ok(HolidayCalendar::default());
    };
    let calendar = HolidayCalendar::from_path(path)?;
    info!(path = %path.display(), holidays = calendar.len(), "holiday calendar loaded");
    Ok(calendar)
}

/// Periodically hands every request nearing its deadline to the reminder rules.
pub(crate) fn spawn_reminder_sweep<R, N, D>(
    service: Arc<HelpdeskService<R, N, D>>,
    every: Duration,
) -> JoinHandle<()>
where
    R: RequestRepository + 'static,
    N: NotificationSink + NotificationInbox + 'static,
    D: UserDirectory + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match service.send_deadline_reminders().await {
                Ok(0) => debug!("no deadlines inside the reminder window"),
                Ok(sent) => info!(sent, "deadline reminders sent"),
                Err(err) => warn!(error = %err, "deadline reminder sweep failed"),
            }
        }
    })
}
