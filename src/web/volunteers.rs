use crate::domain::models::{Petition, UserRole, UserSummary};
use crate::domain::permissions::Action;
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::complaints::{filter_from_query, page_of, ComplaintPage, ComplaintQuery};
use crate::web::petitions::{self, PetitionResponse};
use crate::web::extract::{Json, Query};
use crate::web::session::AuthUser;
use crate::web::{normalize_email, success, Success};
use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize)]
pub struct VolunteerList {
    pub count: usize,
    pub data: Vec<UserSummary>,
}

#[derive(Deserialize)]
pub struct AssignByEmail {
    pub petition_id: Uuid,
    pub volunteer_email: String,
}

#[derive(Serialize)]
pub struct AssignedPetitions {
    pub count: usize,
    pub data: Vec<Petition>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list))
        .route("/assign", post(assign))
        .route("/me/complaints", get(my_complaints))
        .route("/me/petitions", get(my_petitions))
        .with_state(state)
}

async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<Json<Success<VolunteerList>>> {
    auth.require(Action::ListVolunteers)?;
    let data: Vec<UserSummary> = state
        .store
        .list_users_by_role(UserRole::Volunteer)
        .await?
        .iter()
        .map(UserSummary::from)
        .collect();
    Ok(success(VolunteerList {
        count: data.len(),
        data,
    }))
}

async fn assign(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(payload): Json<AssignByEmail>,
) -> AppResult<Json<Success<PetitionResponse>>> {
    auth.require(Action::AssignPetition)?;
    let petition = petitions::load(&state, payload.petition_id).await?;
    let volunteer = state
        .store
        .find_user_by_email(&normalize_email(&payload.volunteer_email))
        .await?
        .ok_or(AppError::NotFound("Volunteer"))?;

    let (petition, warning) = petitions::assign_volunteer(&state, &auth, petition, volunteer).await?;
    Ok(success(PetitionResponse {
        message: "Petition assigned to volunteer",
        petition,
        warning,
    }))
}

/// Complaints assigned to the caller; the `assigned_to` query parameter is ignored.
async fn my_complaints(
    State(state): State<SharedState>,
    auth: AuthUser,
    Query(query): Query<ComplaintQuery>,
) -> AppResult<Json<Success<ComplaintPage>>> {
    auth.require(Action::ViewAssignedWork)?;
    let mut filter = filter_from_query(query)?;
    filter.assigned_to = Some(auth.id());
    Ok(success(page_of(&state, filter).await?))
}

async fn my_petitions(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<Json<Success<AssignedPetitions>>> {
    auth.require(Action::ViewAssignedWork)?;
    let data = state.store.list_petitions_assigned(auth.id()).await?;
    Ok(success(AssignedPetitions {
        count: data.len(),
        data,
    }))
}

#[cfg(test)]
mod tests {
    use crate::domain::models::UserRole;
    use crate::web::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn only_admin_lists_volunteers() {
        let app = TestApp::new();
        let (_, admin) = app.user(UserRole::Admin, "admin@example.com").await;
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        app.user(UserRole::Volunteer, "v1@example.com").await;
        app.user(UserRole::Volunteer, "v2@example.com").await;
        app.user(UserRole::Citizen, "c@example.com").await;

        let (status, _) = app.call(Method::GET, "/api/volunteers", Some(&official), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.call(Method::GET, "/api/volunteers", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert!(body["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|v| v["role"] == "volunteer" && v.get("password_hash").is_none()));
    }

    #[tokio::test]
    async fn assign_by_email_shows_up_in_my_petitions() {
        let app = TestApp::new();
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        let (_, volunteer) = app.user(UserRole::Volunteer, "v@example.com").await;
        let (_, other_citizen) = app.user(UserRole::Citizen, "c2@example.com").await;

        let (_, body) = app
            .call(
                Method::POST,
                "/api/petitions",
                Some(&citizen),
                Some(json!({
                    "title": "Repave the market road",
                    "description": "Potholes on the market road damage vehicles every day",
                    "category": "infrastructure",
                    "location": "Bengaluru"
                })),
            )
            .await;
        let petition_id = body["petition"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call(
                Method::POST,
                "/api/volunteers/assign",
                Some(&official),
                Some(json!({ "petition_id": petition_id, "volunteer_email": "c2@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/volunteers/assign",
                Some(&official),
                Some(json!({ "petition_id": petition_id, "volunteer_email": " V@Example.com " })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["petition"]["status"], "assigned");

        let (status, body) = app
            .call(Method::GET, "/api/volunteers/me/petitions", Some(&volunteer), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["id"], petition_id.as_str());

        let (status, _) = app
            .call(Method::GET, "/api/volunteers/me/petitions", Some(&other_citizen), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn my_complaints_only_returns_own_assignments() {
        let app = TestApp::new();
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        let (volunteer, volunteer_token) = app.user(UserRole::Volunteer, "v@example.com").await;
        let (other, _) = app.user(UserRole::Volunteer, "w@example.com").await;

        let mut ids = Vec::new();
        for title in ["Overflowing drain", "Fallen tree branch"] {
            let (_, body) = app
                .call(
                    Method::POST,
                    "/api/complaints",
                    Some(&citizen),
                    Some(json!({
                        "title": title,
                        "description": "Reported near the bus stop on the main road",
                        "category": "sanitation",
                        "location": { "city": "Bengaluru" }
                    })),
                )
                .await;
            ids.push(body["data"]["id"].as_str().unwrap().to_string());
        }

        for (id, assignee) in ids.iter().zip([volunteer.id, other.id]) {
            let (status, _) = app
                .call(
                    Method::PUT,
                    &format!("/api/complaints/{id}/assign"),
                    Some(&official),
                    Some(json!({ "volunteer_id": assignee })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let uri = format!("/api/volunteers/me/complaints?assigned_to={}", other.id);
        let (status, body) = app.call(Method::GET, &uri, Some(&volunteer_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["totalComplaints"], 1);
        assert_eq!(body["data"][0]["id"], ids[0].as_str());
    }
}
