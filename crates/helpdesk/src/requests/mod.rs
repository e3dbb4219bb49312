//! IT helpdesk request queue: deadline calculation, lifecycle transitions,
//! notification outbox, and reporting views.

pub mod clock;
pub mod deadline;
pub mod domain;
pub mod holidays;
pub mod lifecycle;
pub mod notifications;
pub mod repository;
pub mod router;
pub mod service;
pub mod views;
pub(crate) mod vocabulary;

#[cfg(test)]
mod tests;

pub use clock::{Clock, FixedClock, SystemClock};
pub use deadline::{base_business_days, business_days_for, compute_deadline, END_OF_BUSINESS_DAY};
pub use domain::{
    ApprovalStatus, Assignee, Attachment, Comment, NewAttachment, NewRequest, Priority, Request,
    RequestId, RequestStatus, RequestType, Requester, UserProfile, UserRole, REJECTION_MARKER,
    REOPEN_MARKER,
};
pub use holidays::{Holiday, HolidayCalendar, HolidayImportError};
pub use lifecycle::{RequestAction, Transition, TransitionError};
pub use notifications::{
    Audience, DispatchReport, Notification, NotificationDispatcher, NotificationError,
    NotificationEvent, NotificationInbox, NotificationKind, NotificationPoller, NotificationSink,
    PollSnapshot, SessionProvider,
};
pub use repository::{
    ObjectStorage, RepositoryError, RequestRepository, StorageError, UserDirectory,
};
pub use router::{helpdesk_router, AuthenticatedActor};
pub use service::{HelpdeskService, ServiceError, ServiceSettings};
pub use views::{Page, RejectionEntry, ReportSummary, RequestQuery, RequestView};
pub use vocabulary::VocabularyError;
