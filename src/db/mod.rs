pub mod memory;
pub mod postgres;
pub mod seed;

use crate::domain::models::{
    Complaint, ComplaintCategory, ComplaintStatus, GeoLocation, Notification, Petition,
    PetitionStatus, Poll, PollStatus, Priority, Sentiment, StatusChange, User, UserRole,
};
use crate::domain::workflow::Transition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate record")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error("status changed concurrently")]
    StaleStatus,
    #[error("record reassigned concurrently")]
    Reassigned,
    #[error("database error: {0}")]
    Backend(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Duplicate
            }
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
                StoreError::NotFound
            }
            _ => StoreError::Backend(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    /// `(latitude, longitude)`
    pub coordinates: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub category: ComplaintCategory,
    pub priority: Priority,
    pub location: GeoLocation,
    pub photo_url: Option<String>,
    pub admin_notes: Option<String>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub category: Option<ComplaintCategory>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<Uuid>,
    /// 1-based page; ignored when `limit` is `None`.
    pub page: i64,
    pub limit: Option<i64>,
}

impl ComplaintFilter {
    pub fn offset(&self) -> i64 {
        match self.limit {
            Some(limit) => (self.page.max(1) - 1).saturating_mul(limit.max(0)),
            None => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPetition {
    pub creator: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub title: String,
    pub options: Vec<String>,
    pub created_by: Uuid,
    pub target_location: String,
    pub status: PollStatus,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySubject {
    Complaint,
    Petition,
}

impl HistorySubject {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistorySubject::Complaint => "complaint",
            HistorySubject::Petition => "petition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSubject {
    Complaints,
    Petitions,
    Polls,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub total: i64,
}

/// Persistence boundary for every entity the API touches.
///
/// Uniqueness of votes, sentiments, signatures and emails is the store's job:
/// implementations report a violated constraint as [`StoreError::Duplicate`].
/// Status transitions apply only if the record is still in `Transition::from`,
/// otherwise they fail with [`StoreError::StaleStatus`].
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> StoreResult<User>;
    async fn set_password_hash(&self, id: Uuid, hash: &str) -> StoreResult<()>;
    async fn list_users_by_role(&self, role: UserRole) -> StoreResult<Vec<User>>;

    async fn revoke_token(&self, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()>;
    async fn is_token_revoked(&self, token_hash: &str) -> StoreResult<bool>;
    async fn store_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Marks an unused, unexpired reset token as used and returns its owner.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>>;
    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    async fn create_complaint(&self, complaint: NewComplaint) -> StoreResult<Complaint>;
    async fn find_complaint(&self, id: Uuid) -> StoreResult<Option<Complaint>>;
    async fn list_complaints(&self, filter: &ComplaintFilter)
        -> StoreResult<(Vec<Complaint>, i64)>;
    async fn set_complaint_photo(&self, id: Uuid, url: &str) -> StoreResult<Complaint>;
    async fn transition_complaint(
        &self,
        id: Uuid,
        transition: &Transition<ComplaintStatus>,
    ) -> StoreResult<Complaint>;
    async fn delete_complaint(&self, id: Uuid) -> StoreResult<bool>;
    async fn insert_sentiment(
        &self,
        complaint_id: Uuid,
        user_id: Uuid,
        sentiment: Sentiment,
    ) -> StoreResult<()>;
    async fn sentiment_counts(&self, complaint_id: Uuid) -> StoreResult<Vec<(String, i64)>>;

    async fn create_petition(&self, petition: NewPetition) -> StoreResult<Petition>;
    async fn find_petition(&self, id: Uuid) -> StoreResult<Option<Petition>>;
    async fn list_petitions(&self, location: Option<&str>) -> StoreResult<Vec<Petition>>;
    async fn list_petitions_assigned(&self, assignee: Uuid) -> StoreResult<Vec<Petition>>;
    async fn transition_petition(
        &self,
        id: Uuid,
        transition: &Transition<PetitionStatus>,
    ) -> StoreResult<Petition>;
    async fn delete_petition(&self, id: Uuid) -> StoreResult<bool>;
    async fn insert_signature(&self, petition_id: Uuid, user_id: Uuid) -> StoreResult<()>;
    async fn signature_count(&self, petition_id: Uuid) -> StoreResult<i64>;

    async fn status_history(
        &self,
        subject: HistorySubject,
        id: Uuid,
    ) -> StoreResult<Vec<StatusChange>>;

    async fn create_poll(&self, poll: NewPoll) -> StoreResult<Poll>;
    async fn find_poll(&self, id: Uuid) -> StoreResult<Option<Poll>>;
    async fn list_polls(&self, target_location: Option<&str>) -> StoreResult<Vec<Poll>>;
    async fn set_poll_status(&self, id: Uuid, status: PollStatus) -> StoreResult<Poll>;
    /// Closes active polls whose end date has passed; returns how many closed.
    async fn close_expired_polls(&self, now: DateTime<Utc>) -> StoreResult<u64>;
    async fn insert_poll_vote(&self, poll_id: Uuid, user_id: Uuid, option: &str)
        -> StoreResult<()>;
    async fn poll_vote_counts(&self, poll_id: Uuid) -> StoreResult<Vec<(String, i64)>>;

    async fn create_notification(&self, notification: NewNotification)
        -> StoreResult<Notification>;
    async fn list_notifications(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;
    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<Option<Notification>>;

    async fn status_counts(&self, subject: ReportSubject) -> StoreResult<Vec<StatusCount>>;
}
