use crate::db::StoreError;
use crate::services::images::ImageError;
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("No token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User not found")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("You are not assigned to this {0}")]
    NotAssigned(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Image must be 5MB or smaller")]
    PayloadTooLarge,

    #[error("Too many requests. Please try again later.")]
    TooManyRequests,

    #[error("Image upload failed")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::MissingToken
            | AppError::InvalidToken
            | AppError::ExpiredToken
            | AppError::RevokedToken
            | AppError::InvalidCredentials
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden | AppError::NotAssigned(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(detail) => tracing::error!("Internal error: {}", detail),
            AppError::Upstream(detail) => tracing::error!("Upstream failure: {}", detail),
            _ => {}
        }

        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AppError::Conflict("Duplicate record".into()),
            StoreError::NotFound => AppError::NotFound("Record"),
            StoreError::StaleStatus => {
                AppError::Conflict("Status was changed by someone else. Reload and try again.".into())
            }
            StoreError::Reassigned => AppError::NotAssigned("record"),
            StoreError::Backend(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::UnsupportedType => AppError::Validation(err.to_string()),
            ImageError::TooLarge => AppError::PayloadTooLarge,
            ImageError::Disabled => AppError::Upstream(err.to_string()),
            ImageError::Upstream(detail) => AppError::Upstream(detail),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(AppError::from(StoreError::Duplicate).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(StoreError::StaleStatus).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(StoreError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(StoreError::Reassigned).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_error_hides_detail() {
        let err = AppError::Internal("connection refused at 10.0.0.3:5432".into());
        assert_eq!(err.to_string(), "Internal server error");
    }
}
