use crate::db::{NewPoll, StoreError};
use crate::domain::models::{Poll, PollStatus};
use crate::domain::permissions::Action;
use crate::error::{AppError, AppResult};
use crate::state::SharedState;
use crate::web::extract::{Json, Path, Query};
use crate::web::session::AuthUser;
use crate::web::{check_len, deserialize_flag, parse_enum, success, Success};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;

#[derive(Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub target_location: String,
    pub status: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Default)]
pub struct PollQuery {
    pub target_location: Option<String>,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub selected_option: String,
}

#[derive(Deserialize, Default)]
pub struct ResultsQuery {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub fresh: bool,
}

#[derive(Serialize)]
pub struct PollResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: Poll,
}

#[derive(Serialize)]
pub struct PollList {
    pub data: Vec<Poll>,
}

#[derive(Serialize)]
pub struct PollSummary {
    pub id: Uuid,
    pub title: String,
    pub options: Vec<String>,
    pub status: PollStatus,
}

#[derive(Serialize)]
pub struct PollResults {
    pub poll: PollSummary,
    pub results: BTreeMap<String, i64>,
    pub percentages: BTreeMap<String, i64>,
    pub total_votes: i64,
}

#[derive(Serialize)]
pub struct ResultsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: PollResults,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(fetch))
        .route("/:id/vote", post(vote))
        .route("/:id/results", get(results))
        .route("/:id/close", put(close))
        .with_state(state)
}

async fn load(state: &SharedState, id: Uuid) -> AppResult<Poll> {
    state
        .store
        .find_poll(id)
        .await?
        .ok_or(AppError::NotFound("Poll"))
}

/// Trims options and rejects blanks, duplicates and out-of-range counts.
fn clean_options(options: Vec<String>) -> AppResult<Vec<String>> {
    let options: Vec<String> = options.into_iter().map(|o| o.trim().to_string()).collect();
    if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
        return Err(AppError::validation(format!(
            "A poll needs between {MIN_OPTIONS} and {MAX_OPTIONS} options"
        )));
    }
    for option in &options {
        check_len("Option", option, 1, 100)?;
    }
    let distinct: HashSet<&str> = options.iter().map(String::as_str).collect();
    if distinct.len() != options.len() {
        return Err(AppError::validation("Poll options must be unique"));
    }
    Ok(options)
}

async fn create(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(payload): Json<CreatePollRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::CreatePoll)?;

    check_len("Title", &payload.title, 10, 200)?;
    check_len("Target location", &payload.target_location, 1, 250)?;
    let options = clean_options(payload.options)?;
    let status = match payload.status.as_deref() {
        Some(raw) => match parse_enum::<PollStatus>("status", raw)? {
            PollStatus::Closed => {
                return Err(AppError::validation("A new poll must be active or draft"))
            }
            status => status,
        },
        None => PollStatus::default(),
    };
    if let Some(end) = payload.end_date {
        if end <= Utc::now() {
            return Err(AppError::validation("End date must be in the future"));
        }
    }

    let poll = state
        .store
        .create_poll(NewPoll {
            title: payload.title.trim().to_string(),
            options,
            created_by: auth.id(),
            target_location: payload.target_location.trim().to_string(),
            status,
            end_date: payload.end_date,
        })
        .await?;
    tracing::info!("Poll {} created by {}", poll.id, auth.id());

    Ok((
        StatusCode::CREATED,
        success(PollResponse {
            message: Some("Poll created successfully"),
            data: poll,
        }),
    ))
}

async fn list(
    State(state): State<SharedState>,
    Query(query): Query<PollQuery>,
) -> AppResult<Json<Success<PollList>>> {
    let location = query
        .target_location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());
    let data = state.store.list_polls(location).await?;
    Ok(success(PollList { data }))
}

async fn fetch(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<PollResponse>>> {
    Ok(success(PollResponse {
        message: None,
        data: load(&state, id).await?,
    }))
}

async fn poll_results(state: &SharedState, poll: Poll, use_cache: bool) -> AppResult<PollResults> {
    let aggregate = state.aggregates.poll_results(&poll, use_cache).await?;
    Ok(PollResults {
        poll: PollSummary {
            id: poll.id,
            title: poll.title,
            options: poll.options,
            status: poll.status,
        },
        results: aggregate.counts,
        percentages: aggregate.percentages,
        total_votes: aggregate.total,
    })
}

async fn vote(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> AppResult<impl IntoResponse> {
    auth.require(Action::VotePoll)?;
    let selected = payload.selected_option.trim();
    if selected.is_empty() {
        return Err(AppError::validation("Selected option is required"));
    }

    let poll = load(&state, id).await?;
    let expired = poll.end_date.is_some_and(|end| end <= Utc::now());
    if poll.status != PollStatus::Active || expired {
        return Err(AppError::validation("This poll is not open for voting"));
    }
    if !poll.options.iter().any(|o| o == selected) {
        return Err(AppError::validation("Invalid option selected"));
    }

    state
        .aggregates
        .record_poll_vote(id, auth.id(), selected)
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => AppError::Conflict("You have already voted on this poll".into()),
            other => other.into(),
        })?;

    let data = poll_results(&state, poll, true).await?;
    Ok((
        StatusCode::CREATED,
        success(ResultsResponse {
            message: Some("Vote submitted successfully"),
            data,
        }),
    ))
}

async fn results(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ResultsQuery>,
) -> AppResult<Json<Success<ResultsResponse>>> {
    let poll = load(&state, id).await?;
    let data = poll_results(&state, poll, !query.fresh).await?;
    Ok(success(ResultsResponse {
        message: None,
        data,
    }))
}

async fn close(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<PollResponse>>> {
    auth.require(Action::ClosePoll)?;
    load(&state, id).await?;
    let poll = state.store.set_poll_status(id, PollStatus::Closed).await?;
    tracing::info!("Poll {} closed by {}", id, auth.id());
    Ok(success(PollResponse {
        message: Some("Poll closed"),
        data: poll,
    }))
}

#[cfg(test)]
mod tests {
    use crate::domain::models::UserRole;
    use crate::web::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use chrono::{Duration, Utc};
    use serde_json::json;

    async fn open_poll(app: &TestApp, token: &str) -> String {
        let (status, body) = app
            .call(
                Method::POST,
                "/api/polls",
                Some(token),
                Some(json!({
                    "title": "Which park needs new benches first?",
                    "options": ["Cubbon Park", "Lalbagh", "Freedom Park"],
                    "target_location": "Bengaluru",
                    "end_date": Utc::now() + Duration::days(7)
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn poll_creation_is_validated() {
        let app = TestApp::new();
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;

        let one_option = json!({
            "title": "Should we extend library hours?",
            "options": ["Yes"],
            "target_location": "Pune"
        });
        let (status, _) = app
            .call(Method::POST, "/api/polls", Some(&official), Some(one_option))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let past = json!({
            "title": "Should we extend library hours?",
            "options": ["Yes", "No"],
            "target_location": "Pune",
            "end_date": Utc::now() - Duration::hours(1)
        });
        let (status, _) = app.call(Method::POST, "/api/polls", Some(&official), Some(past)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let valid = json!({
            "title": "Should we extend library hours?",
            "options": ["Yes", "No"],
            "target_location": "Pune"
        });
        let (status, _) = app.call(Method::POST, "/api/polls", Some(&citizen), Some(valid)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn vote_updates_cached_results() {
        let app = TestApp::new();
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        let (_, first) = app.user(UserRole::Citizen, "first@example.com").await;
        let (_, second) = app.user(UserRole::Citizen, "second@example.com").await;
        let id = open_poll(&app, &official).await;
        let results_uri = format!("/api/polls/{id}/results");
        let vote_uri = format!("/api/polls/{id}/vote");

        let (_, body) = app.call(Method::GET, &results_uri, None, None).await;
        assert_eq!(body["data"]["total_votes"], 0);
        assert_eq!(body["data"]["results"]["Lalbagh"], 0);

        let (status, _) = app
            .call(Method::POST, &vote_uri, Some(&first), Some(json!({ "selected_option": "Lalbagh" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, body) = app.call(Method::GET, &results_uri, None, None).await;
        assert_eq!(body["data"]["total_votes"], 1);
        assert_eq!(body["data"]["results"]["Lalbagh"], 1);
        assert_eq!(body["data"]["percentages"]["Lalbagh"], 100);

        let (status, body) = app
            .call(Method::POST, &vote_uri, Some(&second), Some(json!({ "selected_option": "Cubbon Park" })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["total_votes"], 2);
        assert_eq!(body["data"]["percentages"]["Cubbon Park"], 50);
    }

    #[tokio::test]
    async fn second_vote_conflicts_and_counts_hold() {
        let app = TestApp::new();
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let id = open_poll(&app, &official).await;
        let vote_uri = format!("/api/polls/{id}/vote");

        app.call(Method::POST, &vote_uri, Some(&citizen), Some(json!({ "selected_option": "Lalbagh" })))
            .await;
        let (status, body) = app
            .call(Method::POST, &vote_uri, Some(&citizen), Some(json!({ "selected_option": "Freedom Park" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "You have already voted on this poll");

        let (_, body) = app
            .call(Method::GET, &format!("/api/polls/{id}/results?fresh=true"), None, None)
            .await;
        assert_eq!(body["data"]["total_votes"], 1);
        assert_eq!(body["data"]["results"]["Freedom Park"], 0);
    }

    #[tokio::test]
    async fn unknown_option_and_closed_poll_are_rejected() {
        let app = TestApp::new();
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        let (_, citizen) = app.user(UserRole::Citizen, "c@example.com").await;
        let id = open_poll(&app, &official).await;
        let vote_uri = format!("/api/polls/{id}/vote");

        let (status, _) = app
            .call(Method::POST, &vote_uri, Some(&citizen), Some(json!({ "selected_option": "Nowhere" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(Method::PUT, &format!("/api/polls/{id}/close"), Some(&official), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "closed");

        let (status, _) = app
            .call(Method::POST, &vote_uri, Some(&citizen), Some(json!({ "selected_option": "Lalbagh" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn polls_filter_by_location() {
        let app = TestApp::new();
        let (_, official) = app.user(UserRole::Official, "o@example.com").await;
        open_poll(&app, &official).await;

        let (_, body) = app.call(Method::GET, "/api/polls?target_location=Bengaluru", None, None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = app.call(Method::GET, "/api/polls?target_location=Mysuru", None, None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}
