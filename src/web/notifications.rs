use crate::db::NewNotification;
use crate::domain::models::Notification;
use crate::error::{AppError, AppResult};
use crate::services::mailer::Email;
use crate::state::{AppState, SharedState};
use crate::web::extract::{Json, Path};
use crate::web::session::AuthUser;
use crate::web::{success, Success};
use axum::{
    extract::State,
    routing::{get, put},
    Router,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
pub struct NotificationList {
    pub data: Vec<Notification>,
    pub unread: usize,
}

#[derive(Serialize)]
pub struct NotificationItem {
    pub data: Notification,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list))
        .route("/:id/read", put(mark_read))
        .with_state(state)
}

/// Records an in-app notification. Failures are logged, never surfaced.
pub async fn notify(state: &AppState, user_id: Uuid, title: &str, message: String, link: String) {
    let result = state
        .store
        .create_notification(NewNotification {
            user_id,
            title: title.to_string(),
            message,
            link,
        })
        .await;
    if let Err(e) = result {
        tracing::error!("Failed to store notification for {}: {}", user_id, e);
    }
}

/// Sends an email and returns a warning for the response body if delivery failed.
pub async fn deliver(state: &AppState, email: Email) -> Option<String> {
    let to = email.to.clone();
    match state.mailer.send(email).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!("Email to {} failed: {}", to, e);
            Some("Notification email could not be sent".to_string())
        }
    }
}

async fn list(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<Json<Success<NotificationList>>> {
    let data = state.store.list_notifications(auth.id()).await?;
    let unread = data.iter().filter(|n| !n.read).count();
    Ok(success(NotificationList { data, unread }))
}

async fn mark_read(
    State(state): State<SharedState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Success<NotificationItem>>> {
    let data = state
        .store
        .mark_notification_read(id, auth.id())
        .await?
        .ok_or(AppError::NotFound("Notification"))?;
    Ok(success(NotificationItem { data }))
}
