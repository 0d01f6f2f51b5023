use crate::domain::models::{User, UserRole};
use crate::domain::permissions::{permits, Action};
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub role: UserRole,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("bad role")]
    Role,
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Expired => AppError::ExpiredToken,
            _ => AppError::InvalidToken,
        }
    }
}

pub fn sign_session(
    user_id: Uuid,
    role: UserRole,
    key: &[u8],
    ttl: Duration,
) -> Result<String, SessionError> {
    let exp = Utc::now().timestamp() + ttl.as_secs() as i64;
    let payload = format!("{}|{}|{}", user_id, role.as_str(), exp);
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::STANDARD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let pieces: Vec<&str> = payload.split('|').collect();
    let [user_id, role, exp] = pieces.as_slice() else {
        return Err(SessionError::Invalid);
    };
    let user_id = Uuid::parse_str(user_id).map_err(|_| SessionError::Invalid)?;
    let role = UserRole::try_from(*role).map_err(|_| SessionError::Role)?;
    let exp: i64 = exp.parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims { user_id, role, exp })
}

/// Bearer header first, then `x-auth-token`, then the `session` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(val) = headers.get("x-auth-token").and_then(|v| v.to_str().ok()) {
        if !val.trim().is_empty() {
            return Some(val.trim().to_string());
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                match pair.trim().strip_prefix("session=") {
                    Some(rest) if !rest.is_empty() => return Some(rest.to_string()),
                    _ => {}
                }
            }
        }
    }
    None
}

/// Hex SHA-256 of a token. Revocation and reset records store this, never the token.
pub fn token_fingerprint(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// The authenticated caller. The role is read from the user record, not the token,
/// so a role change takes effect on the next request.
pub struct AuthUser {
    pub user: User,
    pub token: String,
    pub claims: SessionClaims,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> UserRole {
        self.user.role
    }

    pub fn require(&self, action: Action) -> Result<(), AppError> {
        if permits(self.user.role, action) {
            Ok(())
        } else {
            tracing::warn!(
                "User {} ({}) denied {:?}",
                self.user.id,
                self.user.role.as_str(),
                action
            );
            Err(AppError::Forbidden)
        }
    }

    /// The assignee a status update must still match when applied, if any.
    pub fn assignment_pin(&self, action: Action) -> Option<Uuid> {
        action
            .requires_assignment(self.user.role)
            .then_some(self.user.id)
    }

    /// Role check plus, for volunteers, that they are the resource's assignee.
    pub fn require_assigned(
        &self,
        action: Action,
        assignee: Option<Uuid>,
        resource: &'static str,
    ) -> Result<(), AppError> {
        self.require(action)?;
        if action.requires_assignment(self.user.role) && assignee != Some(self.user.id) {
            tracing::warn!("Volunteer {} is not assigned to this {}", self.user.id, resource);
            return Err(AppError::NotAssigned(resource));
        }
        Ok(())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(AppError::MissingToken)?;

        let claims = verify_session(&token, &shared_state.session_key).map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            AppError::from(e)
        })?;

        if shared_state
            .store
            .is_token_revoked(&token_fingerprint(&token))
            .await?
        {
            tracing::warn!("Revoked token presented for user {}", claims.user_id);
            return Err(AppError::RevokedToken);
        }

        let user = shared_state
            .store
            .find_user(claims.user_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!("Session for unknown user {}", claims.user_id);
                AppError::Unauthorized
            })?;

        Ok(AuthUser {
            user,
            token,
            claims,
        })
    }
}
