use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::vocabulary::{normalize_token, VocabularyError};

/// Prefix marking a comment that carries a requester's reopen justification.
pub const REOPEN_MARKER: &str = "[Reopened] ";
/// Prefix marking a comment that carries an administrator's rejection reason.
pub const REJECTION_MARKER: &str = "[Rejected] ";

/// Identifier wrapper for helpdesk requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Human readable `DDMMYY-NNNN` identifier for the `sequence`-th request of `day`.
    pub fn sequenced(day: NaiveDate, sequence: u32) -> Self {
        Self(format!(
            "{:02}{:02}{:02}-{:04}",
            day.day(),
            day.month(),
            day.year().rem_euclid(100),
            sequence
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request classification. Unknown or legacy values are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestType {
    General,
    Systems,
    StockAdjustment,
    EquipmentRequest,
    PreventiveMaintenance,
    Other(String),
}

impl RequestType {
    pub const fn known() -> [Self; 5] {
        [
            Self::General,
            Self::Systems,
            Self::StockAdjustment,
            Self::EquipmentRequest,
            Self::PreventiveMaintenance,
        ]
    }

    pub fn parse(raw: &str) -> Self {
        match normalize_token(raw).as_str() {
            "general" | "geral" => Self::General,
            "systems" | "system" | "sistemas" | "sistema" => Self::Systems,
            "stock-adjustment" | "ajuste-estoque" | "ajuste-de-estoque" => Self::StockAdjustment,
            "equipment-request"
            | "solicitacao-equipamento"
            | "solicitacao-de-equipamento"
            | "equipamento" => Self::EquipmentRequest,
            "preventive-maintenance" | "manutencao-preventiva" => Self::PreventiveMaintenance,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::General => "general",
            Self::Systems => "systems",
            Self::StockAdjustment => "stock-adjustment",
            Self::EquipmentRequest => "equipment-request",
            Self::PreventiveMaintenance => "preventive-maintenance",
            Self::Other(raw) => raw,
        }
    }

    /// Types whose assignment is gated behind an explicit approval decision.
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::EquipmentRequest | Self::Systems)
    }
}

impl From<String> for RequestType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<RequestType> for String {
    fn from(value: RequestType) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const fn ordered() -> [Self; 3] {
        [Self::Low, Self::Medium, Self::High]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "low" | "baixa" | "baixo" => Ok(Self::Low),
            "medium" | "media" | "medio" | "normal" => Ok(Self::Medium),
            "high" | "alta" | "alto" | "urgent" | "urgente" => Ok(Self::High),
            _ => Err(VocabularyError::new("priority", s)),
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = VocabularyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Priority> for String {
    fn from(value: Priority) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequestStatus {
    New,
    Assigned,
    InProgress,
    Resolved,
    Closed,
    Reopened,
}

impl RequestStatus {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::New,
            Self::Assigned,
            Self::InProgress,
            Self::Reopened,
            Self::Resolved,
            Self::Closed,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
        }
    }

    /// Resolved and closed requests only move again through a requester reopen.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl FromStr for RequestStatus {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "new" | "novo" | "nova" | "open" | "aberta" | "aberto" => Ok(Self::New),
            "assigned" | "atribuido" | "atribuida" => Ok(Self::Assigned),
            "in-progress" | "em-andamento" | "andamento" => Ok(Self::InProgress),
            "resolved" | "resolvido" | "resolvida" => Ok(Self::Resolved),
            "closed" | "fechado" | "fechada" => Ok(Self::Closed),
            "reopened" | "reaberto" | "reaberta" => Ok(Self::Reopened),
            _ => Err(VocabularyError::new("status", s)),
        }
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = VocabularyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RequestStatus> for String {
    fn from(value: RequestStatus) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "pending" | "pendente" => Ok(Self::Pending),
            "approved" | "aprovado" | "aprovada" => Ok(Self::Approved),
            "rejected" | "rejeitado" | "rejeitada" => Ok(Self::Rejected),
            _ => Err(VocabularyError::new("approval status", s)),
        }
    }
}

impl TryFrom<String> for ApprovalStatus {
    type Error = VocabularyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApprovalStatus> for String {
    fn from(value: ApprovalStatus) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserRole {
    Admin,
    Requester,
}

impl UserRole {
    /// Anything that is not explicitly an administrator gets requester rights.
    pub fn parse(raw: &str) -> Self {
        match normalize_token(raw).as_str() {
            "admin" | "administrator" | "administrador" => Self::Admin,
            _ => Self::Requester,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Requester => "requester",
        }
    }
}

impl From<String> for UserRole {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<UserRole> for String {
    fn from(value: UserRole) -> Self {
        value.label().to_string()
    }
}

/// Identity handed over by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&UserProfile> for Requester {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub created_at: NaiveDateTime,
}

impl Comment {
    pub fn new(author: &UserProfile, text: impl Into<String>, created_at: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: author.id.clone(),
            user_name: author.name.clone(),
            text: text.into(),
            created_at,
        }
    }

    /// Body of a tagged comment with the marker removed, if it carries `marker`.
    pub fn tagged(&self, marker: &str) -> Option<&str> {
        self.text.strip_prefix(marker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub uploaded_by: String,
    pub uploaded_at: NaiveDateTime,
}

/// Upload reference produced by the object storage client before it is linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttachment {
    pub file_name: String,
    pub storage_path: String,
}

impl NewAttachment {
    pub(crate) fn into_attachment(self, uploader: &UserProfile, at: NaiveDateTime) -> Attachment {
        let content_type = mime_guess::from_path(&self.file_name)
            .first()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM)
            .essence_str()
            .to_string();

        Attachment {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: self.file_name,
            storage_path: self.storage_path,
            content_type,
            uploaded_by: uploader.id.clone(),
            uploaded_at: at,
        }
    }
}

/// Submission payload collected by the request form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    #[serde(alias = "type", alias = "requestType")]
    pub request_type: RequestType,
    pub priority: Priority,
    #[serde(default)]
    pub title: Option<String>,
    pub description: String,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

/// The central helpdesk entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(alias = "type", alias = "requestType")]
    pub request_type: RequestType,
    pub priority: Priority,
    pub status: RequestStatus,
    #[serde(default, alias = "approvalStatus", alias = "approvalstatus")]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(default)]
    pub title: Option<String>,
    pub description: String,
    pub requester: Requester,
    #[serde(default, alias = "assignedTo")]
    pub assigned_to: Option<Assignee>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(alias = "createdAt", alias = "createdat")]
    pub created_at: NaiveDateTime,
    #[serde(alias = "deadlineAt", alias = "deadlineat", alias = "deadline")]
    pub deadline_at: NaiveDateTime,
    #[serde(default, alias = "resolvedAt", alias = "resolvedat")]
    pub resolved_at: Option<NaiveDateTime>,
    #[serde(default, alias = "closedAt", alias = "closedat")]
    pub closed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub reminder_sent_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Request {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.requester.id == user_id
    }

    /// Approval decisions only bind the gated types; a stray value elsewhere is ignored.
    pub fn is_rejected(&self) -> bool {
        self.request_type.requires_approval()
            && self.approval_status == Some(ApprovalStatus::Rejected)
    }

    pub fn awaiting_approval(&self) -> bool {
        self.request_type.requires_approval()
            && self.approval_status == Some(ApprovalStatus::Pending)
    }

    /// Open work that still counts toward queues: not resolved, closed, or rejected.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal() && !self.is_rejected()
    }

    pub fn is_overdue(&self, now: NaiveDateTime) -> bool {
        self.is_active() && self.deadline_at < now
    }

    /// The latest rejection reason. Tagged comments are the only record of it.
    pub fn rejection_reason(&self) -> Option<&str> {
        self.comments
            .iter()
            .rev()
            .find_map(|comment| comment.tagged(REJECTION_MARKER))
    }

    pub fn reopen_reasons(&self) -> Vec<&str> {
        self.comments
            .iter()
            .filter_map(|comment| comment.tagged(REOPEN_MARKER))
            .collect()
    }

    pub fn attachment(&self, attachment_id: &str) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|attachment| attachment.id == attachment_id)
    }
}
