//! Request lifecycle state machine.
//!
//! Transitions are pure: they take the stored request and return the updated
//! copy together with the notifications the transition owes. Nothing here
//! talks to storage, so a failed write simply discards the returned copy.

use chrono::{Duration, NaiveDateTime};

use super::deadline::compute_deadline;
use super::domain::{
    ApprovalStatus, Assignee, Comment, NewAttachment, NewRequest, Request, RequestId,
    RequestStatus, RequestType, Requester, UserProfile, REJECTION_MARKER, REOPEN_MARKER,
};
use super::holidays::HolidayCalendar;
use super::notifications::{NotificationEvent, NotificationKind};

/// Caller intent against an existing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    Assign { assignee: Assignee },
    Start,
    Resolve { resolution: Option<String> },
    Close,
    Reopen { reason: String },
    Approve,
    Reject { reason: Option<String> },
    Comment { text: String },
    ChangeDeadline { deadline_at: NaiveDateTime },
    AddAttachment { attachment: NewAttachment },
}

impl RequestAction {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::Start => "start",
            Self::Resolve { .. } => "resolve",
            Self::Close => "close",
            Self::Reopen { .. } => "reopen",
            Self::Approve => "approve",
            Self::Reject { .. } => "reject",
            Self::Comment { .. } => "comment",
            Self::ChangeDeadline { .. } => "change deadline",
            Self::AddAttachment { .. } => "add attachment",
        }
    }
}

/// Result of a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub request: Request,
    pub events: Vec<NotificationEvent>,
    /// False when the action was an idempotent repeat and nothing needs storing.
    pub changed: bool,
}

impl Transition {
    fn applied(request: Request, events: Vec<NotificationEvent>) -> Self {
        Self {
            request,
            events,
            changed: true,
        }
    }

    fn noop(request: &Request) -> Self {
        Self {
            request: request.clone(),
            events: Vec::new(),
            changed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{action} is not permitted: {reason}")]
    Forbidden {
        action: &'static str,
        reason: &'static str,
    },
    #[error("cannot {action} a request that is {}", .from.label())]
    InvalidTransition {
        action: &'static str,
        from: RequestStatus,
    },
    #[error("{0} requests must be approved first")]
    ApprovalRequired(RequestType),
    #[error("{0} requests do not go through approval")]
    ApprovalNotApplicable(RequestType),
    #[error("approval was already {}", .0.label())]
    ApprovalAlreadyDecided(ApprovalStatus),
    #[error("request was rejected and accepts no further {0}")]
    RequestRejected(&'static str),
    #[error("a reason is required to reopen a request")]
    MissingReason,
    #[error("comment text must not be empty")]
    EmptyComment,
    #[error("comments may not start with the reserved tag '{0}'")]
    ReservedCommentTag(&'static str),
    #[error("description must not be empty")]
    EmptyDescription,
    #[error("an assignee must be selected")]
    MissingAssignee,
    #[error("attachment needs a file name and storage path")]
    InvalidAttachment,
}

impl TransitionError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Input problems the caller can fix by resubmitting, as opposed to state conflicts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingReason
                | Self::EmptyComment
                | Self::ReservedCommentTag(_)
                | Self::EmptyDescription
                | Self::MissingAssignee
                | Self::InvalidAttachment
        )
    }
}

/// Build a freshly submitted request and the announcements it owes.
pub fn open(
    id: RequestId,
    draft: NewRequest,
    requester: &UserProfile,
    at: NaiveDateTime,
    holidays: &HolidayCalendar,
) -> Result<Transition, TransitionError> {
    let description = draft.description.trim().to_string();
    if description.is_empty() {
        return Err(TransitionError::EmptyDescription);
    }
    if draft
        .attachments
        .iter()
        .any(|attachment| !attachment_is_valid(attachment))
    {
        return Err(TransitionError::InvalidAttachment);
    }

    let deadline_at = compute_deadline(&draft.request_type, draft.priority, at, holidays);
    let approval_status = draft
        .request_type
        .requires_approval()
        .then_some(ApprovalStatus::Pending);
    let attachments = draft
        .attachments
        .into_iter()
        .map(|attachment| attachment.into_attachment(requester, at))
        .collect();
    let title = draft
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty());

    let request = Request {
        id,
        request_type: draft.request_type,
        priority: draft.priority,
        status: RequestStatus::New,
        approval_status,
        title,
        description,
        requester: Requester::from(requester),
        assigned_to: None,
        resolution: None,
        created_at: at,
        deadline_at,
        resolved_at: None,
        closed_at: None,
        reminder_sent_at: None,
        comments: Vec::new(),
        attachments,
    };

    let events = vec![
        NotificationEvent::to_admins(
            Some(&requester.id),
            NotificationKind::Created,
            &request.id,
            format!(
                "New {} request {} from {}: {}",
                request.request_type,
                request.id,
                requester.name,
                headline(&request)
            ),
        ),
        NotificationEvent::to_user(
            &requester.id,
            NotificationKind::Created,
            &request.id,
            format!(
                "Your request {} was received and is due by {}",
                request.id,
                format_timestamp(request.deadline_at)
            ),
        ),
    ];

    Ok(Transition::applied(request, events))
}

/// Apply `action` on behalf of `actor` at time `at`.
pub fn apply(
    request: &Request,
    actor: &UserProfile,
    action: RequestAction,
    at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    match action {
        RequestAction::Assign { assignee } => assign(request, actor, assignee),
        RequestAction::Start => start(request, actor),
        RequestAction::Resolve { resolution } => resolve(request, actor, resolution, at),
        RequestAction::Close => close(request, actor, at),
        RequestAction::Reopen { reason } => reopen(request, actor, reason, at),
        RequestAction::Approve => approve(request, actor),
        RequestAction::Reject { reason } => reject(request, actor, reason, at),
        RequestAction::Comment { text } => comment(request, actor, text, at),
        RequestAction::ChangeDeadline { deadline_at } => {
            change_deadline(request, actor, deadline_at)
        }
        RequestAction::AddAttachment { attachment } => {
            add_attachment(request, actor, attachment, at)
        }
    }
}

/// Viewing is limited to the requester and administrators.
pub fn authorize_view(request: &Request, actor: &UserProfile) -> Result<(), TransitionError> {
    if actor.is_admin() || request.is_owned_by(&actor.id) {
        Ok(())
    } else {
        Err(TransitionError::Forbidden {
            action: "view",
            reason: "only the requester or an administrator may see this request",
        })
    }
}

/// Deletion is irreversible and open to the requester or any administrator.
pub fn authorize_delete(request: &Request, actor: &UserProfile) -> Result<(), TransitionError> {
    if actor.is_admin() || request.is_owned_by(&actor.id) {
        Ok(())
    } else {
        Err(TransitionError::Forbidden {
            action: "delete",
            reason: "only the requester or an administrator may delete a request",
        })
    }
}

/// One-shot reminder for active requests coming due inside `window`.
pub fn remind(request: &Request, at: NaiveDateTime, window: Duration) -> Option<Transition> {
    if !request.is_active() || request.reminder_sent_at.is_some() {
        return None;
    }
    if request.deadline_at > at + window {
        return None;
    }

    let mut updated = request.clone();
    updated.reminder_sent_at = Some(at);

    let message = if request.deadline_at < at {
        format!(
            "Request {} is overdue since {}",
            request.id,
            format_timestamp(request.deadline_at)
        )
    } else {
        format!(
            "Request {} is due by {}",
            request.id,
            format_timestamp(request.deadline_at)
        )
    };
    let event = match &request.assigned_to {
        Some(assignee) => NotificationEvent::to_user(
            &assignee.id,
            NotificationKind::Reminder,
            &request.id,
            message,
        ),
        None => {
            NotificationEvent::to_admins(None, NotificationKind::Reminder, &request.id, message)
        }
    };

    Some(Transition::applied(updated, vec![event]))
}

fn require_admin(actor: &UserProfile, action: &'static str) -> Result<(), TransitionError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(TransitionError::Forbidden {
            action,
            reason: "administrator role required",
        })
    }
}

fn require_not_rejected(request: &Request, action: &'static str) -> Result<(), TransitionError> {
    if request.is_rejected() {
        Err(TransitionError::RequestRejected(action))
    } else {
        Ok(())
    }
}

fn require_approval_granted(request: &Request) -> Result<(), TransitionError> {
    if request.request_type.requires_approval()
        && request.approval_status != Some(ApprovalStatus::Approved)
    {
        Err(TransitionError::ApprovalRequired(request.request_type.clone()))
    } else {
        Ok(())
    }
}

fn assign(
    request: &Request,
    actor: &UserProfile,
    assignee: Assignee,
) -> Result<Transition, TransitionError> {
    const ACTION: &str = "assign";
    require_admin(actor, ACTION)?;
    require_not_rejected(request, ACTION)?;
    if assignee.id.trim().is_empty() {
        return Err(TransitionError::MissingAssignee);
    }

    let next_status = match request.status {
        RequestStatus::New | RequestStatus::Reopened | RequestStatus::Assigned => {
            RequestStatus::Assigned
        }
        RequestStatus::InProgress => RequestStatus::InProgress,
        from @ (RequestStatus::Resolved | RequestStatus::Closed) => {
            return Err(TransitionError::InvalidTransition {
                action: ACTION,
                from,
            })
        }
    };
    require_approval_granted(request)?;

    let same_assignee = request
        .assigned_to
        .as_ref()
        .is_some_and(|current| current.id == assignee.id);
    if same_assignee && next_status == request.status {
        return Ok(Transition::noop(request));
    }

    let mut updated = request.clone();
    updated.status = next_status;
    let message = format!(
        "Your request {} was assigned to {}",
        request.id, assignee.name
    );
    updated.assigned_to = Some(assignee);

    let event = NotificationEvent::to_user(
        &request.requester.id,
        NotificationKind::Assigned,
        &request.id,
        message,
    );
    Ok(Transition::applied(updated, vec![event]))
}

fn start(request: &Request, actor: &UserProfile) -> Result<Transition, TransitionError> {
    const ACTION: &str = "start";
    require_admin(actor, ACTION)?;
    require_not_rejected(request, ACTION)?;

    match request.status {
        RequestStatus::New | RequestStatus::Assigned | RequestStatus::Reopened => {}
        RequestStatus::InProgress => return Ok(Transition::noop(request)),
        from => {
            return Err(TransitionError::InvalidTransition {
                action: ACTION,
                from,
            })
        }
    }
    require_approval_granted(request)?;

    let mut updated = request.clone();
    updated.status = RequestStatus::InProgress;
    Ok(Transition::applied(updated, Vec::new()))
}

fn resolve(
    request: &Request,
    actor: &UserProfile,
    resolution: Option<String>,
    at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    const ACTION: &str = "resolve";
    require_admin(actor, ACTION)?;
    require_not_rejected(request, ACTION)?;

    match request.status {
        RequestStatus::Resolved => return Ok(Transition::noop(request)),
        RequestStatus::Closed => {
            return Err(TransitionError::InvalidTransition {
                action: ACTION,
                from: RequestStatus::Closed,
            })
        }
        _ => {}
    }
    require_approval_granted(request)?;

    let mut updated = request.clone();
    updated.status = RequestStatus::Resolved;
    updated.resolved_at = Some(at);
    if updated.resolution.is_none() {
        let note = resolution
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| format!("Resolved by {}", actor.name));
        updated.resolution = Some(note);
    }

    let event = NotificationEvent::to_user(
        &request.requester.id,
        NotificationKind::Resolved,
        &request.id,
        format!("Your request {} was resolved", request.id),
    );
    Ok(Transition::applied(updated, vec![event]))
}

fn close(
    request: &Request,
    actor: &UserProfile,
    at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    const ACTION: &str = "close";
    require_admin(actor, ACTION)?;

    match request.status {
        RequestStatus::Resolved => {}
        RequestStatus::Closed => return Ok(Transition::noop(request)),
        from => {
            return Err(TransitionError::InvalidTransition {
                action: ACTION,
                from,
            })
        }
    }

    let mut updated = request.clone();
    updated.status = RequestStatus::Closed;
    updated.closed_at = Some(at);
    Ok(Transition::applied(updated, Vec::new()))
}

fn reopen(
    request: &Request,
    actor: &UserProfile,
    reason: String,
    at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    const ACTION: &str = "reopen";
    if !request.is_owned_by(&actor.id) {
        return Err(TransitionError::Forbidden {
            action: ACTION,
            reason: "only the requester may reopen a request",
        });
    }
    if request.status != RequestStatus::Resolved {
        return Err(TransitionError::InvalidTransition {
            action: ACTION,
            from: request.status,
        });
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(TransitionError::MissingReason);
    }

    let mut updated = request.clone();
    updated.status = RequestStatus::Reopened;
    updated
        .comments
        .push(Comment::new(actor, format!("{REOPEN_MARKER}{reason}"), at));

    let message = format!(
        "Request {} was reopened by {}: {}",
        request.id, actor.name, reason
    );
    let event = match &request.assigned_to {
        Some(assignee) => NotificationEvent::to_user(
            &assignee.id,
            NotificationKind::Reopened,
            &request.id,
            message,
        ),
        None => NotificationEvent::to_admins(
            Some(&actor.id),
            NotificationKind::Reopened,
            &request.id,
            message,
        ),
    };
    Ok(Transition::applied(updated, vec![event]))
}

fn ensure_pending_approval(
    request: &Request,
    action: &'static str,
) -> Result<(), TransitionError> {
    if !request.request_type.requires_approval() {
        return Err(TransitionError::ApprovalNotApplicable(
            request.request_type.clone(),
        ));
    }
    match request.approval_status {
        Some(ApprovalStatus::Pending) | None => {}
        Some(decided) => return Err(TransitionError::ApprovalAlreadyDecided(decided)),
    }
    if request.status != RequestStatus::New {
        return Err(TransitionError::InvalidTransition {
            action,
            from: request.status,
        });
    }
    Ok(())
}

fn approve(request: &Request, actor: &UserProfile) -> Result<Transition, TransitionError> {
    const ACTION: &str = "approve";
    require_admin(actor, ACTION)?;
    ensure_pending_approval(request, ACTION)?;

    // Both approval-gated types wait in `new` for an explicit assignment.
    let mut updated = request.clone();
    updated.approval_status = Some(ApprovalStatus::Approved);
    Ok(Transition::applied(updated, Vec::new()))
}

fn reject(
    request: &Request,
    actor: &UserProfile,
    reason: Option<String>,
    at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    const ACTION: &str = "reject";
    require_admin(actor, ACTION)?;
    ensure_pending_approval(request, ACTION)?;

    let mut updated = request.clone();
    updated.approval_status = Some(ApprovalStatus::Rejected);
    if let Some(reason) = reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
    {
        updated
            .comments
            .push(Comment::new(actor, format!("{REJECTION_MARKER}{reason}"), at));
    }
    Ok(Transition::applied(updated, Vec::new()))
}

fn comment(
    request: &Request,
    actor: &UserProfile,
    text: String,
    at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    let is_requester = request.is_owned_by(&actor.id);
    if !actor.is_admin() && !is_requester {
        return Err(TransitionError::Forbidden {
            action: "comment",
            reason: "only the requester or an administrator may comment",
        });
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(TransitionError::EmptyComment);
    }
    if let Some(marker) = [REJECTION_MARKER, REOPEN_MARKER]
        .into_iter()
        .find(|marker| text.starts_with(marker.trim_end()))
    {
        return Err(TransitionError::ReservedCommentTag(marker.trim_end()));
    }

    let mut updated = request.clone();
    updated.comments.push(Comment::new(actor, text, at));

    let event = if actor.is_admin() {
        if is_requester {
            None
        } else {
            Some(NotificationEvent::to_user(
                &request.requester.id,
                NotificationKind::Comment,
                &request.id,
                format!("New comment from {} on your request {}", actor.name, request.id),
            ))
        }
    } else {
        Some(NotificationEvent::to_admins(
            Some(&actor.id),
            NotificationKind::Comment,
            &request.id,
            format!(
                "New comment from requester {} on request {}",
                actor.name, request.id
            ),
        ))
    };

    Ok(Transition::applied(updated, event.into_iter().collect()))
}

fn change_deadline(
    request: &Request,
    actor: &UserProfile,
    deadline_at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    require_admin(actor, "change deadline")?;
    if request.deadline_at == deadline_at {
        return Ok(Transition::noop(request));
    }

    let mut updated = request.clone();
    updated.deadline_at = deadline_at;
    updated.reminder_sent_at = None;

    let event = NotificationEvent::to_user(
        &request.requester.id,
        NotificationKind::DeadlineChanged,
        &request.id,
        format!(
            "The deadline for request {} changed to {}",
            request.id,
            format_timestamp(deadline_at)
        ),
    );
    Ok(Transition::applied(updated, vec![event]))
}

fn add_attachment(
    request: &Request,
    actor: &UserProfile,
    attachment: NewAttachment,
    at: NaiveDateTime,
) -> Result<Transition, TransitionError> {
    if !actor.is_admin() && !request.is_owned_by(&actor.id) {
        return Err(TransitionError::Forbidden {
            action: "add attachment",
            reason: "only the requester or an administrator may attach files",
        });
    }
    if !attachment_is_valid(&attachment) {
        return Err(TransitionError::InvalidAttachment);
    }

    let mut updated = request.clone();
    updated
        .attachments
        .push(attachment.into_attachment(actor, at));
    Ok(Transition::applied(updated, Vec::new()))
}

fn attachment_is_valid(attachment: &NewAttachment) -> bool {
    !attachment.file_name.trim().is_empty() && !attachment.storage_path.trim().is_empty()
}

fn headline(request: &Request) -> String {
    const MAX_CHARS: usize = 80;
    let source = request.title.as_deref().unwrap_or(&request.description);
    let mut headline: String = source.chars().take(MAX_CHARS).collect();
    if source.chars().count() > MAX_CHARS {
        headline.push('…');
    }
    headline
}

pub(crate) fn format_timestamp(value: NaiveDateTime) -> String {
    value.format("%d/%m/%Y %H:%M").to_string()
}
