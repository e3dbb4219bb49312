use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::domain::{Request, RequestId, UserProfile};

/// Storage abstraction over the hosted relational backend.
///
/// Every write is a single statement keyed by request id. Concurrent writers
/// race with last-write-wins semantics; no version token is carried.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn insert(&self, request: Request) -> Result<Request, RepositoryError>;
    async fn update(&self, request: Request) -> Result<(), RepositoryError>;
    async fn fetch(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;
    async fn delete(&self, id: &RequestId) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<Request>, RepositoryError>;
    /// Number of requests created on `day`, used to sequence new identifiers.
    async fn count_created_on(&self, day: NaiveDate) -> Result<u32, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("repository did not answer within {0:?}")]
    Timeout(Duration),
}

/// Read access to user profiles kept by the auth provider.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn admins(&self) -> Result<Vec<UserProfile>, RepositoryError>;
}

/// Object storage client. Attachments are opaque; only signed links are requested.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn signed_url(&self, storage_path: &str, ttl: Duration) -> Result<String, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object '{0}' does not exist")]
    MissingObject(String),
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
}
