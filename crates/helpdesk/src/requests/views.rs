use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::domain::{Priority, Request, RequestStatus, RequestType};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Canonical queue definitions shared by listings and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestView {
    #[default]
    All,
    Active,
    Pending,
    AwaitingApproval,
    Rejected,
    Resolved,
    Closed,
    Overdue,
}

impl RequestView {
    pub fn includes(self, request: &Request, now: NaiveDateTime) -> bool {
        match self {
            Self::All => true,
            Self::Active => request.is_active(),
            Self::Pending => {
                request.is_active()
                    && (matches!(
                        request.status,
                        RequestStatus::New | RequestStatus::Reopened
                    ) || request.awaiting_approval())
            }
            Self::AwaitingApproval => request.awaiting_approval(),
            Self::Rejected => request.is_rejected(),
            Self::Resolved => request.status == RequestStatus::Resolved && !request.is_rejected(),
            Self::Closed => request.status == RequestStatus::Closed && !request.is_rejected(),
            Self::Overdue => request.is_overdue(now),
        }
    }
}

/// Listing filter as submitted by the request table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestQuery {
    pub view: RequestView,
    #[serde(rename = "type")]
    pub request_type: Option<RequestType>,
    pub priority: Option<Priority>,
    pub status: Option<RequestStatus>,
    pub requester_id: Option<String>,
    pub assigned_to: Option<String>,
    pub search: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl RequestQuery {
    pub fn view(view: RequestView) -> Self {
        Self {
            view,
            ..Self::default()
        }
    }

    pub fn matches(&self, request: &Request, now: NaiveDateTime) -> bool {
        if !self.view.includes(request, now) {
            return false;
        }
        if self
            .request_type
            .as_ref()
            .is_some_and(|wanted| *wanted != request.request_type)
        {
            return false;
        }
        if self.priority.is_some_and(|wanted| wanted != request.priority) {
            return false;
        }
        if self.status.is_some_and(|wanted| wanted != request.status) {
            return false;
        }
        if self
            .requester_id
            .as_deref()
            .is_some_and(|wanted| wanted != request.requester.id)
        {
            return false;
        }
        if let Some(wanted) = self.assigned_to.as_deref() {
            let assigned = request
                .assigned_to
                .as_ref()
                .is_some_and(|assignee| assignee.id == wanted);
            if !assigned {
                return false;
            }
        }
        let created_on = request.created_at.date();
        if self.created_from.is_some_and(|from| created_on < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| created_on > to) {
            return false;
        }
        if let Some(needle) = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|needle| !needle.is_empty())
        {
            let needle = needle.to_lowercase();
            let haystacks = [
                Some(request.id.as_str()),
                request.title.as_deref(),
                Some(request.description.as_str()),
                Some(request.requester.name.as_str()),
            ];
            if !haystacks
                .into_iter()
                .flatten()
                .any(|haystack| haystack.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }

    fn page_number(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    fn page_size(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Filter, order newest first, and cut one page out of `requests`.
pub fn select(requests: Vec<Request>, query: &RequestQuery, now: NaiveDateTime) -> Page<Request> {
    let mut matching: Vec<Request> = requests
        .into_iter()
        .filter(|request| query.matches(request, now))
        .collect();
    matching.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let page = query.page_number();
    let per_page = query.page_size();
    let total = matching.len();
    let total_pages = total.div_ceil(per_page);
    let items = matching
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    Page {
        items,
        page,
        per_page,
        total,
        total_pages,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionEntry {
    pub request_id: String,
    pub reason: String,
}

/// Aggregate numbers behind the reporting dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub active: usize,
    pub pending: usize,
    pub awaiting_approval: usize,
    pub overdue: usize,
    pub rejected: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_resolution_hours: Option<f64>,
    pub rejection_reasons: Vec<RejectionEntry>,
}

impl ReportSummary {
    pub fn build<'a>(requests: impl IntoIterator<Item = &'a Request>, now: NaiveDateTime) -> Self {
        let mut summary = Self {
            total: 0,
            active: 0,
            pending: 0,
            awaiting_approval: 0,
            overdue: 0,
            rejected: 0,
            by_status: RequestStatus::ordered()
                .into_iter()
                .map(|status| (status.label(), 0))
                .collect(),
            by_type: BTreeMap::new(),
            by_priority: Priority::ordered()
                .into_iter()
                .map(|priority| (priority.label(), 0))
                .collect(),
            average_resolution_hours: None,
            rejection_reasons: Vec::new(),
        };
        let mut resolution_hours = Vec::new();

        for request in requests {
            summary.total += 1;
            *summary.by_type.entry(request.request_type.to_string()).or_default() += 1;
            *summary.by_priority.entry(request.priority.label()).or_default() += 1;

            if request.is_rejected() {
                summary.rejected += 1;
                if let Some(reason) = request.rejection_reason() {
                    summary.rejection_reasons.push(RejectionEntry {
                        request_id: request.id.to_string(),
                        reason: reason.to_string(),
                    });
                }
                continue;
            }

            *summary.by_status.entry(request.status.label()).or_default() += 1;
            if RequestView::Active.includes(request, now) {
                summary.active += 1;
            }
            if RequestView::Pending.includes(request, now) {
                summary.pending += 1;
            }
            if request.awaiting_approval() {
                summary.awaiting_approval += 1;
            }
            if request.is_overdue(now) {
                summary.overdue += 1;
            }
            if let Some(resolved_at) = request.resolved_at {
                if request.status.is_terminal() {
                    let minutes = (resolved_at - request.created_at).num_minutes();
                    resolution_hours.push(minutes as f64 / 60.0);
                }
            }
        }

        if !resolution_hours.is_empty() {
            let sum: f64 = resolution_hours.iter().sum();
            summary.average_resolution_hours = Some(sum / resolution_hours.len() as f64);
        }

        summary
    }
}
