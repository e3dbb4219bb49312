use crate::infra::{
    parse_datetime, parse_priority, parse_request_type, ConfiguredDirectory,
    InMemoryNotifications, InMemoryRequestRepository, LocalObjectStorage, StaticSession,
};
use crate::server::load_holidays;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use clap::Args;
use helpdesk::error::AppError;
use helpdesk::requests::{
    business_days_for, compute_deadline, Assignee, FixedClock, HelpdeskService, NewAttachment,
    NewRequest, NotificationPoller, Priority, Request, RequestQuery, RequestType,
    ServiceSettings, UserProfile, UserRole,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct DeadlineArgs {
    /// Request type (general, systems, stock-adjustment, equipment-request, preventive-maintenance)
    #[arg(long = "type", value_parser = parse_request_type)]
    pub(crate) request_type: RequestType,
    /// Priority (low, medium, high)
    #[arg(long, value_parser = parse_priority, default_value = "medium")]
    pub(crate) priority: Priority,
    /// Creation time (YYYY-MM-DDTHH:MM). Defaults to now.
    #[arg(long, value_parser = parse_datetime)]
    pub(crate) created_at: Option<NaiveDateTime>,
    /// Holiday calendar CSV (date,name) to exclude from business days
    #[arg(long)]
    pub(crate) holidays_csv: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Time the demo request is opened (YYYY-MM-DDTHH:MM). Defaults to now.
    #[arg(long, value_parser = parse_datetime)]
    pub(crate) start: Option<NaiveDateTime>,
    /// Holiday calendar CSV (date,name) to exclude from business days
    #[arg(long)]
    pub(crate) holidays_csv: Option<PathBuf>,
    /// Skip the notification polling step.
    #[arg(long)]
    pub(crate) skip_poll: bool,
}

pub(crate) fn run_deadline(args: DeadlineArgs) -> Result<(), AppError> {
    let DeadlineArgs {
        request_type,
        priority,
        created_at,
        holidays_csv,
    } = args;

    let holidays = load_holidays(holidays_csv.as_deref())?;
    let created_at = created_at.unwrap_or_else(|| Local::now().naive_local());
    let deadline = compute_deadline(&request_type, priority, created_at, &holidays);

    println!("Deadline preview");
    println!("  Type: {}", request_type);
    println!("  Priority: {}", priority.label());
    println!("  Opened: {}", created_at.format("%Y-%m-%d %H:%M"));
    println!(
        "  Business days: {}",
        business_days_for(&request_type, priority)
    );
    println!("  Due: {}", deadline.format("%A %Y-%m-%d %H:%M"));

    let skipped: Vec<_> = holidays
        .holidays()
        .filter(|holiday| holiday.date > created_at.date() && holiday.date <= deadline.date())
        .collect();
    if !skipped.is_empty() {
        println!("  Holidays skipped:");
        for holiday in skipped {
            println!("    - {} {}", holiday.date, holiday.name);
        }
    }

    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        start,
        holidays_csv,
        skip_poll,
    } = args;

    let holidays = load_holidays(holidays_csv.as_deref())?;
    let start = start.unwrap_or_else(|| Local::now().naive_local());
    let admin = demo_profile("it-admin", "Ana Souza", UserRole::Admin);
    let requester = demo_profile("finance-1", "Carla Dias", UserRole::Requester);

    let clock = Arc::new(FixedClock::new(start));
    let notifications = Arc::new(InMemoryNotifications::default());
    let service = HelpdeskService::new(
        Arc::new(InMemoryRequestRepository::default()),
        notifications.clone(),
        Arc::new(ConfiguredDirectory::new(vec![admin.clone()])),
        holidays,
        ServiceSettings::default(),
    )
    .with_clock(clock.clone())
    .with_storage(Arc::new(LocalObjectStorage::new("https://files.helpdesk.local")));

    println!("Helpdesk lifecycle demo");
    let request = service
        .create(
            &requester,
            NewRequest {
                request_type: RequestType::Systems,
                priority: Priority::High,
                title: Some("ERP login fails".to_string()),
                description: "The ERP rejects my password since this morning".to_string(),
                attachments: vec![NewAttachment {
                    file_name: "login-error.png".to_string(),
                    storage_path: "requests/erp/login-error.png".to_string(),
                }],
            },
        )
        .await?;
    render_step("opened", &request);
    println!(
        "  Due {} ({} business days)",
        request.deadline_at.format("%A %Y-%m-%d %H:%M"),
        business_days_for(&request.request_type, request.priority)
    );

    if let Some(attachment) = request.attachments.first() {
        let url = service
            .attachment_url(&admin, &request.id, &attachment.id)
            .await?;
        println!(
            "  Attachment {} ({}) -> {}",
            attachment.file_name, attachment.content_type, url
        );
    }

    if let Err(err) = service
        .assign(
            &admin,
            &request.id,
            Assignee {
                id: admin.id.clone(),
                name: admin.name.clone(),
            },
        )
        .await
    {
        println!("  Assignment refused before approval: {}", err);
    }

    clock.advance(ChronoDuration::hours(1));
    let request = service.approve(&admin, &request.id).await?;
    render_step("approved", &request);

    let request = service
        .assign(
            &admin,
            &request.id,
            Assignee {
                id: admin.id.clone(),
                name: admin.name.clone(),
            },
        )
        .await?;
    render_step("assigned", &request);

    let request = service.start(&admin, &request.id).await?;
    render_step("started", &request);

    clock.advance(ChronoDuration::hours(3));
    let request = service
        .resolve(&admin, &request.id, Some("Password reset".to_string()))
        .await?;
    render_step("resolved", &request);

    clock.advance(ChronoDuration::hours(2));
    let request = service
        .reopen(
            &requester,
            &request.id,
            "Still locked out after the reset".to_string(),
        )
        .await?;
    render_step("reopened", &request);

    clock.advance(ChronoDuration::hours(1));
    let request = service
        .comment(
            &admin,
            &request.id,
            "Account was also locked in the directory; unlocked now".to_string(),
        )
        .await?;
    let request = service.resolve(&admin, &request.id, None).await?;
    render_step("resolved again", &request);

    let request = service.close(&admin, &request.id).await?;
    render_step("closed", &request);

    let summary = service.summary(&admin, &RequestQuery::default()).await?;
    println!("\nReport summary");
    println!("  Total requests: {}", summary.total);
    for (status, count) in &summary.by_status {
        if *count > 0 {
            println!("  {}: {}", status, count);
        }
    }
    if let Some(hours) = summary.average_resolution_hours {
        println!("  Average resolution: {:.1} h", hours);
    }

    println!("\nNotifications for {}", requester.name);
    let inbox = service.notifications_for(&requester).await?;
    for item in &inbox {
        println!("  [{}] {}", item.kind.label(), item.message);
    }

    if !skip_poll {
        let poller = NotificationPoller::new(
            notifications,
            Arc::new(StaticSession(Some(requester.clone()))),
            Duration::from_secs(120),
            Duration::from_secs(5),
        );
        let (handle, mut snapshots) = poller.spawn();
        if let Some(snapshot) = snapshots.recv().await {
            println!(
                "\nUnread badge for {}: {}",
                snapshot.user_id,
                snapshot.unread_count()
            );
        }
        drop(snapshots);
        handle.abort();
    }

    Ok(())
}

fn demo_profile(id: &str, name: &str, role: UserRole) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@helpdesk.local"),
        role,
    }
}

fn render_step(step: &str, request: &Request) {
    let approval = request
        .approval_status
        .map(|status| status.label())
        .unwrap_or("n/a");
    println!(
        "- {:<15} {} status={} approval={}",
        step,
        request.id,
        request.status.label(),
        approval
    );
}
