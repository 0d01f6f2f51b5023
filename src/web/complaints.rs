use crate::db::{ComplaintFilter, HistorySubject, NewComplaint, StoreError};
use crate::domain::models::{
    Aggregate, Complaint, ComplaintStatus, GeoLocation, Priority, Sentiment, StatusChange,
    UserRole,
};
use crate::domain::permissions::Action;
use crate::domain::workflow::Transition;
use crate::error::{AppError, AppResult};
use crate::services::aggregation::sentiment_key;
use crate::services::images::{ImageUpload, MAX_IMAGE_BYTES};
use crate::services::mailer;
use crate::state::SharedState;
use crate::web::notifications::{deliver, notify};
use crate::web::extract::{Json, Path, Query};
use crate::web::session::AuthUser;
use crate::web::{check_len, deserialize_flag, parse_enum, success, Success};
use axum::{
    extract::{
        multipart::{Multipart, MultipartRejection},
        DefaultBodyLimit, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct CreateComplaintRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Option<String>,
    #[serde(default)]
    pub location: GeoLocation,
    pub photo_url: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ComplaintQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub volunteer_id: Uuid,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
    pub admin_notes: Option<String>,
    /// Status the caller last saw; defaults to the status read before the update.
    pub expected_status: Option<String>,
}

#[derive(Deserialize)]
pub struct SentimentRequest {
    pub sentiment: String,
}

#[derive(Deserialize, Default)]
pub struct FreshQuery {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub fresh: bool,
}

#[derive(Serialize)]
pub struct ComplaintResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: Complaint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_complaints: i64,
    pub limit: i64,
}

#[derive(Serialize)]
pub struct ComplaintPage {
    pub data: Vec<Complaint>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub data: Vec<StatusChange>,
}

#[derive(Serialize)]
pub struct AggregateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: Aggregate,
}

#[derive(Serialize)]
pub struct Deleted {
    pub message: &'static str,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(fetch).delete(remove))
        .route("/:id/assign", put(assign))
        .route("/:id/status", put(update_status))
        .route(
            "/:id/photo",
            post(upload_photo).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
        .route("/:id/history", get(history))
        .route("/:id/sentiment", post(submit_sentiment).get(sentiment))
        .with_state(state)
}

pub(crate) fn filter_from_query(query: ComplaintQuery) -> AppResult<ComplaintFilter> {
    Ok(ComplaintFilter {
        status: query
            .status
            .as_deref()
            .map(ComplaintStatus::try_from)
            .transpose()
            .map_err(AppError::Validation)?,
        category: query
            .category
            .as_deref()
            .map(|c| parse_enum("category", c))
            .transpose()?,
        priority: query
            .priority
            .as_deref()
            .map(|p| parse_enum("priority", p))
            .transpose()?,
        assigned_to: query.assigned_to,
        page: query.page.unwrap_or(1).max(1),
        limit: Some(query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)),
    })
}

pub(crate) async fn page_of(state: &SharedState, filter: ComplaintFilter) -> AppResult<ComplaintPage> {
    let (data, total) = state.store.list_complaints(&filter).await?;
    let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    Ok(ComplaintPage {
        data,
        pagination: Pagination {
            current_page: filter.page,
            total_pages: (total + limit - 1) / limit,
            total_complaints: total,
            limit,
        },
    })
}

async fn load(state: &SharedState, id: Uuid) -> AppResult<Complaint> {
    state
        .store
        .find_complaint(id)
        .await?
        .ok_or(AppError::NotFound("Complaint"))
}

fn validate_location(location: &GeoLocation) -> AppResult<()> {
    if let Some([lng, lat]) = location.coordinates {
        if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::validation(
                "Coordinates must be [longitude, latitude] within valid ranges",
            ));
        }
    }
    Ok(())
}

async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(payload): Json<CreateComplaintRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::CreateComplaint)?;

    check_len("Title", &payload.title, 5, 200)?;
    check_len("Description", &payload.description, 10, 2000)?;
    let category = parse_enum("category", &payload.category)?;
    let priority: Priority = match payload.priority.as_deref() {
        Some(raw) => parse_enum("priority", raw)?,
        None => Priority::default(),
    };
    validate_location(&payload.location)?;

    let complaint = state
        .store
        .create_complaint(NewComplaint {
            title: payload.title.trim().to_string(),
            description: payload.description.trim().to_string(),
            category,
            priority,
            location: payload.location,
            photo_url: payload.photo_url.filter(|u| !u.trim().is_empty()),
            admin_notes: None,
            created_by: auth.id(),
        })
        .await?;
    tracing::info!("Complaint {} filed by {}", complaint.id, auth.id());

    Ok((
        StatusCode::CREATED,
        success(ComplaintResponse {
            message: Some("Complaint submitted successfully"),
            data: complaint,
            warning: None,
        }),
    ))
}

async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<ComplaintQuery>,
) -> AppResult<Json<Success<ComplaintPage>>> {
    auth.require(Action::ListComplaints)?;
    let filter = filter_from_query(query)?;
    Ok(success(page_of(&state, filter).await?))
}

async fn fetch(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<ComplaintResponse>>> {
    Ok(success(ComplaintResponse {
        message: None,
        data: load(&state, id).await?,
        warning: None,
    }))
}

async fn remove(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<Deleted>>> {
    let complaint = load(&state, id).await?;
    if complaint.created_by != auth.id() && auth.role() != UserRole::Admin {
        return Err(AppError::Forbidden);
    }
    if !state.store.delete_complaint(id).await? {
        return Err(AppError::NotFound("Complaint"));
    }
    state
        .aggregates
        .cache()
        .invalidate(&sentiment_key(id))
        .await;
    tracing::info!("Complaint {} deleted by {}", id, auth.id());
    Ok(success(Deleted {
        message: "Complaint deleted successfully",
    }))
}

async fn assign(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<Json<Success<ComplaintResponse>>> {
    auth.require(Action::AssignComplaint)?;

    let volunteer = state
        .store
        .find_user(payload.volunteer_id)
        .await?
        .ok_or(AppError::NotFound("Volunteer"))?;
    if volunteer.role != UserRole::Volunteer {
        return Err(AppError::validation("User must have volunteer role"));
    }

    let complaint = load(&state, id).await?;
    let transition = Transition::new(complaint.status, ComplaintStatus::InReview, auth.id())
        .assigning(volunteer.id)
        .with_note(format!("Assigned to {}", volunteer.name));
    let complaint = state.store.transition_complaint(id, &transition).await?;
    tracing::info!("Complaint {} assigned to volunteer {}", id, volunteer.id);

    let link = format!("{}/complaints/{}", state.frontend_url, id);
    notify(
        &state,
        volunteer.id,
        "New complaint assigned",
        format!("You have been assigned: {}", complaint.title),
        link.clone(),
    )
    .await;
    let warning = deliver(
        &state,
        mailer::volunteer_assignment(&volunteer.email, &volunteer.name, &complaint.title, &link),
    )
    .await;

    Ok(success(ComplaintResponse {
        message: Some("Complaint assigned successfully"),
        data: complaint,
        warning,
    }))
}

async fn update_status(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<Success<ComplaintResponse>>> {
    let to = ComplaintStatus::try_from(payload.status.as_str()).map_err(AppError::Validation)?;
    if let Some(notes) = &payload.admin_notes {
        check_len("Admin notes", notes, 0, 500)?;
    }

    let complaint = load(&state, id).await?;
    auth.require_assigned(Action::UpdateComplaintStatus, complaint.assigned_to, "complaint")?;

    let from = match payload.expected_status.as_deref() {
        Some(raw) => ComplaintStatus::try_from(raw).map_err(AppError::Validation)?,
        None => complaint.status,
    };
    let mut transition = Transition::new(from, to, auth.id())
        .only_if_assigned_to(auth.assignment_pin(Action::UpdateComplaintStatus));
    if let Some(notes) = payload.admin_notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        transition = transition.with_note(notes.clone()).with_remark(notes);
    }

    let complaint = state.store.transition_complaint(id, &transition).await?;
    tracing::info!("Complaint {} moved to {} by {}", id, to.as_str(), auth.id());

    let link = format!("{}/complaints/{}", state.frontend_url, id);
    notify(
        &state,
        complaint.created_by,
        "Complaint status updated",
        format!("{} is now {}", complaint.title, to.as_str()),
        link,
    )
    .await;
    let warning = match state.store.find_user(complaint.created_by).await? {
        Some(creator) => {
            deliver(
                &state,
                mailer::status_update(&creator.email, &creator.name, &complaint.title, to.as_str()),
            )
            .await
        }
        None => None,
    };

    Ok(success(ComplaintResponse {
        message: Some("Complaint status updated successfully"),
        data: complaint,
        warning,
    }))
}

async fn upload_photo(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Success<ComplaintResponse>>> {
    let mut multipart = multipart
        .map_err(|e| AppError::validation(format!("Invalid upload: {}", e.body_text())))?;
    let complaint = load(&state, id).await?;
    if complaint.created_by != auth.id() && auth.role() != UserRole::Admin {
        return Err(AppError::Forbidden);
    }

    let multipart_error = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::validation(format!("Invalid upload: {}", e.body_text()))
        }
    };

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("photo") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("photo").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some(ImageUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }
    let upload = upload.ok_or_else(|| AppError::validation("No photo uploaded"))?;

    let url = state.images.upload(upload).await?;
    let complaint = state.store.set_complaint_photo(id, &url).await?;
    tracing::info!("Photo attached to complaint {}", id);

    Ok(success(ComplaintResponse {
        message: Some("Photo uploaded successfully"),
        data: complaint,
        warning: None,
    }))
}

async fn history(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<HistoryResponse>>> {
    load(&state, id).await?;
    let data = state
        .store
        .status_history(HistorySubject::Complaint, id)
        .await?;
    Ok(success(HistoryResponse { data }))
}

async fn submit_sentiment(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SentimentRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::SubmitSentiment)?;
    let sentiment: Sentiment = parse_enum("sentiment", &payload.sentiment)?;
    load(&state, id).await?;

    state
        .aggregates
        .record_sentiment(id, auth.id(), sentiment)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => AppError::Conflict(
                "You have already submitted a sentiment for this complaint".into(),
            ),
            StoreError::NotFound => AppError::NotFound("Complaint"),
            other => other.into(),
        })?;

    let data = state.aggregates.complaint_sentiment(id, true).await?;
    Ok((
        StatusCode::CREATED,
        success(AggregateResponse {
            message: Some("Sentiment recorded"),
            data,
        }),
    ))
}

async fn sentiment(
    State(state): State<SharedState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<FreshQuery>,
) -> AppResult<Json<Success<AggregateResponse>>> {
    load(&state, id).await?;
    let data = state.aggregates.complaint_sentiment(id, !query.fresh).await?;
    Ok(success(AggregateResponse {
        message: None,
        data,
    }))
}
