use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Citizen,
    Official,
    Volunteer,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Citizen => "citizen",
            UserRole::Official => "official",
            UserRole::Volunteer => "volunteer",
            UserRole::Admin => "admin",
        }
    }
}

impl TryFrom<&str> for UserRole {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "citizen" => Ok(UserRole::Citizen),
            "official" => Ok(UserRole::Official),
            "volunteer" => Ok(UserRole::Volunteer),
            "admin" => Ok(UserRole::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "complaint_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplaintCategory {
    Infrastructure,
    Sanitation,
    Utilities,
    Safety,
    Environment,
    Water,
    Electricity,
    Roads,
    WasteManagement,
    Other,
}

impl ComplaintCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintCategory::Infrastructure => "infrastructure",
            ComplaintCategory::Sanitation => "sanitation",
            ComplaintCategory::Utilities => "utilities",
            ComplaintCategory::Safety => "safety",
            ComplaintCategory::Environment => "environment",
            ComplaintCategory::Water => "water",
            ComplaintCategory::Electricity => "electricity",
            ComplaintCategory::Roads => "roads",
            ComplaintCategory::WasteManagement => "waste_management",
            ComplaintCategory::Other => "other",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "complaint_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "complaint_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Received,
    InReview,
    Resolved,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "petition_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PetitionStatus {
    Active,
    Assigned,
    UnderReview,
    Responded,
    Closed,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "poll_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    #[default]
    Active,
    Closed,
    Draft,
}

impl PollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
            PollStatus::Draft => "draft",
        }
    }
}

/// Opinion a citizen records on a complaint.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "sentiment")]
pub enum Sentiment {
    Yes,
    No,
    Maybe,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Yes, Sentiment::No, Sentiment::Maybe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Yes => "Yes",
            Sentiment::No => "No",
            Sentiment::Maybe => "Maybe",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection of a user embedded in other payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    /// `[longitude, latitude]`
    pub coordinates: Option<[f64; 2]>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complaint {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ComplaintCategory,
    pub priority: Priority,
    pub location: GeoLocation,
    pub photo_url: Option<String>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub status: ComplaintStatus,
    pub admin_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Petition {
    pub id: Uuid,
    pub creator: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
    pub status: PetitionStatus,
    pub assigned_to: Option<Uuid>,
    pub official_response: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of the append-only audit log kept for complaints and petitions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct StatusChange {
    pub status: String,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<Uuid>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub options: Vec<String>,
    pub created_by: Uuid,
    pub target_location: String,
    pub status: PollStatus,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub link: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Grouped vote counts for a poll or complaint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Aggregate {
    pub counts: std::collections::BTreeMap<String, i64>,
    pub percentages: std::collections::BTreeMap<String, i64>,
    pub total: i64,
}
