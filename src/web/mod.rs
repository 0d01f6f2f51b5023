pub mod auth;
pub mod complaints;
pub mod extract;
pub mod notifications;
pub mod petitions;
pub mod polls;
pub mod reports;
pub mod session;
pub mod volunteers;

#[cfg(test)]
mod test_support;

use crate::error::AppError;
use crate::state::SharedState;
use axum::{routing::get, Router};
use extract::Json;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

/// `{"success": true, ...fields of T}`
#[derive(Serialize)]
pub struct Success<T> {
    pub success: bool,
    #[serde(flatten)]
    pub body: T,
}

pub fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

#[derive(Serialize)]
pub struct Message {
    pub message: &'static str,
}

/// Trimmed length check counted in characters.
pub fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AppError> {
    let len = value.trim().chars().count();
    if len < min {
        return Err(AppError::validation(format!(
            "{field} must be at least {min} characters"
        )));
    }
    if len > max {
        return Err(AppError::validation(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    Ok(())
}

/// Parses a wire-format enum value, reporting a 400 that names the field.
pub fn parse_enum<T: DeserializeOwned>(field: &str, raw: &str) -> Result<T, AppError> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_string()))
        .map_err(|_| AppError::validation(format!("Invalid {field}: {}", raw.trim())))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && domain.contains('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

/// Accepts `?fresh=true|1`; anything else means "use the cache".
pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(matches!(raw.as_deref(), Some("true") | Some("1")))
}

async fn health() -> Json<Success<Message>> {
    success(Message {
        message: "Civix API is running",
    })
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/complaints", complaints::router(state.clone()))
        .nest("/petitions", petitions::router(state.clone()))
        .nest("/polls", polls::router(state.clone()))
        .nest("/volunteers", volunteers::router(state.clone()))
        .nest("/reports", reports::router(state.clone()))
        .nest("/notifications", notifications::router(state))
}
