//! Data store boundary for `contacts`, `contact_meta` and `user_profiles`.
//!
//! Row-level security lives in the hosted database; these traits only
//! describe the reads and writes the application performs.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use contacthub_auth::ProfileLookup;
use contacthub_core::{
    AppError, Contact, ContactId, ContactMeta, ContactPatch, ContactWithUploader, ErrorCode,
    UserId, UserProfile, readable_message,
};

pub use in_memory::{InMemoryStore, StoreOp};
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A table or view is absent (Postgres `42P01`).
    #[error("relation does not exist: {0}")]
    MissingRelation(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::not_found(msg),
            StoreError::Conflict(msg) => {
                AppError::new(ErrorCode::ValidationError, readable_message(&msg))
            }
            StoreError::PermissionDenied(msg) => AppError::authorization(readable_message(&msg)),
            StoreError::Unavailable(msg) => AppError::network(msg),
            StoreError::MissingRelation(msg) | StoreError::Backend(msg) => {
                AppError::new(ErrorCode::ServerError, readable_message(&msg))
            }
        }
    }
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Contacts joined with uploader info, newest first; `owner` restricts to one uploader.
    async fn list_with_uploader(
        &self,
        owner: Option<UserId>,
    ) -> Result<Vec<ContactWithUploader>, StoreError>;

    /// A contact with its meta row.
    async fn get(&self, id: ContactId) -> Result<Option<Contact>, StoreError>;

    /// Insert a contact and its meta row together.
    async fn insert(&self, contact: Contact, meta: ContactMeta) -> Result<Contact, StoreError>;

    async fn update(&self, id: ContactId, patch: &ContactPatch) -> Result<Contact, StoreError>;

    async fn delete(&self, id: ContactId) -> Result<(), StoreError>;

    /// Remove every contact owned by `owner`; returns how many were removed.
    async fn delete_by_owner(&self, owner: UserId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_by_user(&self, user_id: UserId) -> Result<Option<UserProfile>, StoreError>;

    async fn insert(&self, profile: UserProfile) -> Result<UserProfile, StoreError>;

    async fn delete_by_user(&self, user_id: UserId) -> Result<u64, StoreError>;
}

/// Display-name lookup for the session synchronizer, backed by `user_profiles`.
pub struct StoreProfileLookup {
    profiles: Arc<dyn ProfileStore>,
}

impl StoreProfileLookup {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl ProfileLookup for StoreProfileLookup {
    async fn full_name(&self, user_id: UserId) -> Result<Option<String>, AppError> {
        let profile = self.profiles.get_by_user(user_id).await?;
        Ok(profile.map(|p| p.full_name))
    }
}
