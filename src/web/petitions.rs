use crate::db::{HistorySubject, NewPetition, StoreError};
use crate::domain::models::{Petition, PetitionStatus, StatusChange, User, UserRole};
use crate::domain::permissions::Action;
use crate::domain::workflow::{official_response_line, response_status, volunteer_note_line, Transition};
use crate::error::{AppError, AppResult};
use crate::services::mailer;
use crate::state::SharedState;
use crate::web::notifications::{deliver, notify};
use crate::web::extract::{Json, Path};
use crate::web::session::AuthUser;
use crate::web::{check_len, success, Success};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreatePetitionRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: String,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub volunteer_id: Uuid,
}

#[derive(Deserialize)]
pub struct VolunteerUpdateRequest {
    pub progress_note: String,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub final_comment: String,
    #[serde(default)]
    pub close: bool,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
    pub expected_status: Option<String>,
}

#[derive(Serialize)]
pub struct PetitionResponse {
    pub message: &'static str,
    pub petition: Petition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
pub struct PetitionDetail {
    pub petition: Petition,
    pub signatures: i64,
}

#[derive(Serialize)]
pub struct PetitionList {
    pub count: usize,
    pub petitions: Vec<Petition>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub data: Vec<StatusChange>,
}

#[derive(Serialize)]
pub struct SignatureCount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub count: i64,
}

#[derive(Serialize)]
pub struct Deleted {
    pub message: &'static str,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/local", get(local))
        .route("/:id", get(fetch).delete(remove))
        .route("/:id/assign", put(assign))
        .route("/:id/volunteer-update", put(volunteer_update))
        .route("/:id/respond", put(respond))
        .route("/:id/status", put(update_status))
        .route("/:id/history", get(history))
        .route("/:id/sign", post(sign))
        .route("/:id/signatures", get(signatures))
        .with_state(state)
}

pub(crate) async fn load(state: &SharedState, id: Uuid) -> AppResult<Petition> {
    state
        .store
        .find_petition(id)
        .await?
        .ok_or(AppError::NotFound("Petition"))
}

/// Moves a petition and tells its creator, in-app and by email.
async fn apply_and_announce(
    state: &SharedState,
    petition: &Petition,
    transition: Transition<PetitionStatus>,
) -> AppResult<(Petition, Option<String>)> {
    let updated = state.store.transition_petition(petition.id, &transition).await?;
    tracing::info!(
        "Petition {} moved {} -> {} by {}",
        petition.id,
        transition.from.as_str(),
        transition.to.as_str(),
        transition.actor
    );

    let link = format!("{}/petitions/{}", state.frontend_url, petition.id);
    notify(
        state,
        updated.creator,
        "Petition status updated",
        format!("{} is now {}", updated.title, updated.status.as_str()),
        link,
    )
    .await;
    let warning = match state.store.find_user(updated.creator).await? {
        Some(creator) => {
            deliver(
                state,
                mailer::status_update(&creator.email, &creator.name, &updated.title, updated.status.as_str()),
            )
            .await
        }
        None => None,
    };
    Ok((updated, warning))
}

async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(payload): Json<CreatePetitionRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::CreatePetition)?;

    check_len("Title", &payload.title, 5, 200)?;
    check_len("Description", &payload.description, 10, usize::MAX)?;
    check_len("Category", &payload.category, 2, 100)?;
    check_len("Location", &payload.location, 5, 250)?;

    let petition = state
        .store
        .create_petition(NewPetition {
            creator: auth.id(),
            title: payload.title.trim().to_string(),
            description: payload.description.trim().to_string(),
            category: payload.category.trim().to_string(),
            location: payload.location.trim().to_string(),
        })
        .await?;
    tracing::info!("Petition {} created by {}", petition.id, auth.id());

    let warning = deliver(
        &state,
        mailer::petition_confirmation(&auth.user.email, &auth.user.name, &petition.title),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        success(PetitionResponse {
            message: "Petition created successfully",
            petition,
            warning,
        }),
    ))
}

async fn list(State(state): State<SharedState>) -> AppResult<Json<Success<PetitionList>>> {
    let petitions = state.store.list_petitions(None).await?;
    Ok(success(PetitionList {
        count: petitions.len(),
        petitions,
    }))
}

async fn local(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<Json<Success<PetitionList>>> {
    auth.require(Action::ViewLocalPetitions)?;
    let petitions = state
        .store
        .list_petitions(Some(auth.user.location.as_str()))
        .await?;
    Ok(success(PetitionList {
        count: petitions.len(),
        petitions,
    }))
}

async fn fetch(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<PetitionDetail>>> {
    let petition = load(&state, id).await?;
    let signatures = state.store.signature_count(id).await?;
    Ok(success(PetitionDetail {
        petition,
        signatures,
    }))
}

async fn remove(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<Deleted>>> {
    let petition = load(&state, id).await?;
    if petition.creator != auth.id() && auth.role() != UserRole::Admin {
        return Err(AppError::Forbidden);
    }
    if !state.store.delete_petition(id).await? {
        return Err(AppError::NotFound("Petition"));
    }
    tracing::info!("Petition {} deleted by {}", id, auth.id());
    Ok(success(Deleted {
        message: "Petition deleted successfully",
    }))
}

/// Shared by `PUT /petitions/:id/assign` and `POST /volunteers/assign`.
pub(crate) async fn assign_volunteer(
    state: &SharedState,
    auth: &AuthUser,
    petition: Petition,
    volunteer: User,
) -> AppResult<(Petition, Option<String>)> {
    auth.require(Action::AssignPetition)?;
    if volunteer.role != UserRole::Volunteer {
        return Err(AppError::validation("User must have volunteer role"));
    }

    let transition = Transition::new(petition.status, PetitionStatus::Assigned, auth.id())
        .assigning(volunteer.id)
        .with_note("Assigned to volunteer");
    let updated = state.store.transition_petition(petition.id, &transition).await?;
    tracing::info!("Petition {} assigned to volunteer {}", petition.id, volunteer.id);

    let link = format!("{}/petitions/{}", state.frontend_url, petition.id);
    notify(
        state,
        volunteer.id,
        "New petition assigned",
        format!("You have been assigned: {}", updated.title),
        link.clone(),
    )
    .await;
    let warning = deliver(
        state,
        mailer::volunteer_assignment(&volunteer.email, &volunteer.name, &updated.title, &link),
    )
    .await;
    Ok((updated, warning))
}

async fn assign(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<Json<Success<PetitionResponse>>> {
    auth.require(Action::AssignPetition)?;
    let petition = load(&state, id).await?;
    let volunteer = state
        .store
        .find_user(payload.volunteer_id)
        .await?
        .ok_or(AppError::NotFound("Volunteer"))?;

    let (petition, warning) = assign_volunteer(&state, &auth, petition, volunteer).await?;
    Ok(success(PetitionResponse {
        message: "Petition assigned to volunteer",
        petition,
        warning,
    }))
}

async fn volunteer_update(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VolunteerUpdateRequest>,
) -> AppResult<Json<Success<PetitionResponse>>> {
    if payload.progress_note.trim().chars().count() < 5 {
        return Err(AppError::validation("Progress note is too short"));
    }
    let petition = load(&state, id).await?;
    auth.require_assigned(Action::VolunteerUpdatePetition, petition.assigned_to, "petition")?;

    let note = payload.progress_note.trim();
    let transition = Transition::new(petition.status, PetitionStatus::UnderReview, auth.id())
        .with_note(note)
        .with_remark(volunteer_note_line(note))
        .only_if_assigned_to(auth.assignment_pin(Action::VolunteerUpdatePetition));
    let (petition, warning) = apply_and_announce(&state, &petition, transition).await?;

    Ok(success(PetitionResponse {
        message: "Volunteer progress note updated",
        petition,
        warning,
    }))
}

async fn respond(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondRequest>,
) -> AppResult<Json<Success<PetitionResponse>>> {
    auth.require(Action::RespondPetition)?;
    let comment = payload.final_comment.trim();
    if comment.chars().count() < 5 {
        return Err(AppError::validation("Comment too short"));
    }
    let petition = load(&state, id).await?;
    if petition.official_response.chars().count() + comment.chars().count() > 2000 {
        return Err(AppError::validation("Official response cannot exceed 2000 characters"));
    }

    let transition = Transition::new(petition.status, response_status(payload.close), auth.id())
        .with_note(comment)
        .with_remark(official_response_line(comment));
    let (petition, warning) = apply_and_announce(&state, &petition, transition).await?;

    Ok(success(PetitionResponse {
        message: if payload.close {
            "Petition closed"
        } else {
            "Official response recorded"
        },
        petition,
        warning,
    }))
}

async fn update_status(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<Success<PetitionResponse>>> {
    let to = PetitionStatus::try_from(payload.status.as_str()).map_err(AppError::Validation)?;
    let petition = load(&state, id).await?;
    auth.require_assigned(Action::UpdatePetitionStatus, petition.assigned_to, "petition")?;

    let from = match payload.expected_status.as_deref() {
        Some(raw) => PetitionStatus::try_from(raw).map_err(AppError::Validation)?,
        None => petition.status,
    };
    let transition = Transition::new(from, to, auth.id())
        .only_if_assigned_to(auth.assignment_pin(Action::UpdatePetitionStatus));
    let (petition, warning) = apply_and_announce(&state, &petition, transition).await?;

    Ok(success(PetitionResponse {
        message: "Petition status updated successfully",
        petition,
        warning,
    }))
}

async fn history(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<HistoryResponse>>> {
    load(&state, id).await?;
    let data = state
        .store
        .status_history(HistorySubject::Petition, id)
        .await?;
    Ok(success(HistoryResponse { data }))
}

async fn sign(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::SignPetition)?;
    let petition = load(&state, id).await?;
    if matches!(petition.status, PetitionStatus::Closed) {
        return Err(AppError::validation("This petition is closed"));
    }

    state
        .store
        .insert_signature(id, auth.id())
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => AppError::Conflict("You have already signed this petition".into()),
            other => other.into(),
        })?;
    let count = state.store.signature_count(id).await?;
    tracing::info!("Petition {} signed by {}", id, auth.id());

    Ok((
        StatusCode::CREATED,
        success(SignatureCount {
            message: Some("Petition signed"),
            count,
        }),
    ))
}

async fn signatures(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<SignatureCount>>> {
    load(&state, id).await?;
    let count = state.store.signature_count(id).await?;
    Ok(success(SignatureCount {
        message: None,
        count,
    }))
}

#[cfg(test)]
mod tests {
    use crate::domain::models::UserRole;
    use crate::web::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    async fn start_petition(app: &TestApp, token: &str) -> String {
        let (status, body) = app
            .call(
                Method::POST,
                "/api/petitions",
                Some(token),
                Some(json!({
                    "title": "Build a footbridge",
                    "description": "Pedestrians cross six lanes of traffic near the school",
                    "category": "infrastructure",
                    "location": "Bengaluru"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["petition"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn creation_sends_confirmation_and_lists_publicly() {
        let app = TestApp::new();
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        start_petition(&app, &citizen).await;

        assert_eq!(app.mailer.sent.lock().await[0].to, "c@example.com");

        let (status, body) = app.call(Method::GET, "/api/petitions", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["petitions"][0]["status"], "active");
    }

    #[tokio::test]
    async fn signing_twice_conflicts() {
        let app = TestApp::new();
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let id = start_petition(&app, &citizen).await;
        let uri = format!("/api/petitions/{id}/sign");

        let (status, body) = app.call(Method::POST, &uri, Some(&citizen), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["count"], 1);

        let (status, _) = app.call(Method::POST, &uri, Some(&citizen), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = app
            .call(Method::GET, &format!("/api/petitions/{id}/signatures"), None, None)
            .await;
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn full_workflow_appends_history() {
        let app = TestApp::new();
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        let (volunteer, volunteer_token) = app.user(UserRole::Volunteer, "v@example.com").await;
        let (_, stranger) = app.user(UserRole::Volunteer, "s@example.com").await;
        let id = start_petition(&app, &citizen).await;

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/petitions/{id}/assign"),
                Some(&official),
                Some(json!({ "volunteer_id": volunteer.id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["petition"]["status"], "assigned");

        let update_uri = format!("/api/petitions/{id}/volunteer-update");
        let note = json!({ "progress_note": "Met the ward engineer on site" });
        let (status, _) = app
            .call(Method::PUT, &update_uri, Some(&stranger), Some(note.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(Method::PUT, &update_uri, Some(&volunteer_token), Some(note))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["petition"]["status"], "under_review");

        let (status, body) = app
            .call(
                Method::PUT,
                &format!("/api/petitions/{id}/respond"),
                Some(&official),
                Some(json!({ "final_comment": "Approved in the next budget", "close": true })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["petition"]["status"], "closed");
        let response = body["petition"]["official_response"].as_str().unwrap();
        assert!(response.contains("Volunteer note: Met the ward engineer on site"));
        assert!(response.contains("Admin: Approved in the next budget"));

        let (_, body) = app
            .call(Method::GET, &format!("/api/petitions/{id}/history"), None, None)
            .await;
        let statuses: Vec<_> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["status"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(statuses, ["assigned", "under_review", "closed"]);
    }

    #[tokio::test]
    async fn only_creator_or_admin_deletes() {
        let app = TestApp::new();
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let (_, other) = app.user(UserRole::Citizen, "x@example.com").await;
        let (_, admin) = app.user(UserRole::Admin, "a@example.com").await;
        let id = start_petition(&app, &citizen).await;
        let uri = format!("/api/petitions/{id}");

        let (status, _) = app.call(Method::DELETE, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.call(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call(Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn local_petitions_follow_official_location() {
        let app = TestApp::new();
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        start_petition(&app, &citizen).await;

        let (status, body) = app
            .call(Method::GET, "/api/petitions/local", Some(&official), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, _) = app
            .call(Method::GET, "/api/petitions/local", Some(&citizen), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
