use crate::db::{NewUser, ProfileUpdate, StoreError};
use crate::domain::models::{User, UserRole};
use crate::error::{AppError, AppResult};
use crate::middleware::rate_limit_middleware;
use crate::services::mailer;
use crate::state::SharedState;
use crate::web::extract::Json;
use crate::web::session::{self, AuthUser};
use crate::web::{check_len, is_valid_email, normalize_email, success, Success};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{TimeZone, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

const MIN_PASSWORD_LEN: usize = 6;
const RESET_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    #[serde(default)]
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ProfileRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub token: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct UserResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub user: User,
}

#[derive(Serialize)]
pub struct NoticeResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    let login = Router::new()
        .route("/login", post(login))
        .route_layer(middleware::from_fn_with_state(
            state.login_limiter.clone(),
            rate_limit_middleware,
        ));
    let register = Router::new()
        .route("/register", post(register))
        .route_layer(middleware::from_fn_with_state(
            state.register_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(login)
        .merge(register)
        .route("/logout", post(logout))
        .route("/profile", get(profile).put(update_profile))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .with_state(state)
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> AppResult<Option<(f64, f64)>> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                return Err(AppError::validation("Coordinates are out of range"));
            }
            Ok(Some((lat, lng)))
        }
        _ => Ok(None),
    }
}

fn session_cookie(token: &str, max_age_secs: u64) -> AppResult<HeaderMap> {
    // SECURITY: Secure flag only when served over HTTPS in production
    let secure_flag = if std::env::var("PRODUCTION").is_ok() {
        "; Secure"
    } else {
        ""
    };
    let value = HeaderValue::from_str(&format!(
        "session={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}{secure_flag}"
    ))
    .map_err(|e| AppError::Internal(format!("invalid cookie header: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

async fn register(
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    check_len("Name", &payload.name, 2, 100)?;
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) || email.len() > 150 {
        return Err(AppError::validation("Please provide a valid email"));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password must be at least 6 characters"));
    }
    check_len("Location", &payload.location, 0, 250)?;

    // Admin accounts only come from the bootstrap seed.
    let role = match payload.role.as_deref() {
        None => UserRole::Citizen,
        Some(raw) => match UserRole::try_from(raw) {
            Ok(role) if role != UserRole::Admin => role,
            _ => {
                return Err(AppError::validation(
                    "Role must be citizen, official, or volunteer",
                ))
            }
        },
    };
    let coordinates = check_coordinates(payload.latitude, payload.longitude)?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::validation("User already exists with this email"));
    }

    let user = state
        .store
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            email,
            password_hash: hash_password(&payload.password)?,
            role,
            location: payload.location.trim().to_string(),
            latitude: coordinates.map(|(lat, _)| lat),
            longitude: coordinates.map(|(_, lng)| lng),
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate => AppError::validation("User already exists with this email"),
            other => other.into(),
        })?;

    let token = session::sign_session(user.id, user.role, &state.session_key, state.token_ttl)
        .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;
    tracing::info!("Registered {} user {}", user.role.as_str(), user.id);

    Ok((
        StatusCode::CREATED,
        session_cookie(&token, state.token_ttl.as_secs())?,
        success(AuthResponse {
            message: "User registered successfully",
            token,
            user,
        }),
    ))
}

async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email"));
    }
    if payload.password.is_empty() {
        return Err(AppError::validation("Password is required"));
    }

    let user = match state.store.find_user_by_email(&email).await? {
        Some(user) if verify_password(&payload.password, &user.password_hash) => user,
        _ => {
            tracing::warn!("Failed login for {}", email);
            return Err(AppError::InvalidCredentials);
        }
    };

    let token = session::sign_session(user.id, user.role, &state.session_key, state.token_ttl)
        .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;
    tracing::info!("User {} logged in", user.id);

    Ok((
        session_cookie(&token, state.token_ttl.as_secs())?,
        success(AuthResponse {
            message: "Login successful",
            token,
            user,
        }),
    ))
}

async fn logout(
    State(state): State<SharedState>,
    auth: AuthUser,
) -> AppResult<impl IntoResponse> {
    let expires_at = Utc
        .timestamp_opt(auth.claims.exp, 0)
        .single()
        .unwrap_or_else(Utc::now);
    state
        .store
        .revoke_token(&session::token_fingerprint(&auth.token), expires_at)
        .await?;
    tracing::info!("User {} logged out", auth.id());

    Ok((
        session_cookie("", 0)?,
        success(NoticeResponse {
            message: "Logged out successfully",
            warning: None,
        }),
    ))
}

async fn profile(auth: AuthUser) -> Json<Success<UserResponse>> {
    success(UserResponse {
        message: None,
        user: auth.user,
    })
}

async fn update_profile(
    State(state): State<SharedState>,
    auth: AuthUser,
    Json(payload): Json<ProfileRequest>,
) -> AppResult<Json<Success<UserResponse>>> {
    if let Some(name) = &payload.name {
        check_len("Name", name, 2, 100)?;
    }
    if let Some(location) = &payload.location {
        check_len("Location", location, 0, 250)?;
    }
    let coordinates = check_coordinates(payload.latitude, payload.longitude)?;

    let user = state
        .store
        .update_profile(
            auth.id(),
            ProfileUpdate {
                name: payload.name.map(|n| n.trim().to_string()),
                location: payload.location.map(|l| l.trim().to_string()),
                coordinates,
            },
        )
        .await?;

    Ok(success(UserResponse {
        message: Some("Profile updated successfully"),
        user,
    }))
}

async fn forgot_password(
    State(state): State<SharedState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<Success<NoticeResponse>>> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Please provide a valid email"));
    }

    let mut warning = None;
    // Same answer whether or not the account exists.
    if let Some(user) = state.store.find_user_by_email(&email).await? {
        let mut raw = [0u8; 32];
        OsRng.fill_bytes(&mut raw);
        let token = general_purpose::URL_SAFE_NO_PAD.encode(raw);
        let expires_at = Utc::now() + chrono::Duration::minutes(RESET_TOKEN_TTL_MINUTES);

        state
            .store
            .store_reset_token(user.id, &session::token_fingerprint(&token), expires_at)
            .await?;

        let link = format!("{}/reset-password/{}", state.frontend_url, token);
        if let Err(e) = state
            .mailer
            .send(mailer::password_reset(&user.email, &user.name, &link))
            .await
        {
            tracing::warn!("Password reset email to {} failed: {}", user.id, e);
            warning = Some("Reset email could not be sent".to_string());
        }
    }

    Ok(success(NoticeResponse {
        message: "If that email is registered, a reset link has been sent",
        warning,
    }))
}

async fn reset_password(
    State(state): State<SharedState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<Success<NoticeResponse>>> {
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password must be at least 6 characters"));
    }

    let user_id = state
        .store
        .consume_reset_token(&session::token_fingerprint(payload.token.trim()), Utc::now())
        .await?
        .ok_or_else(|| AppError::validation("Invalid or expired reset token"))?;

    state
        .store
        .set_password_hash(user_id, &hash_password(&payload.password)?)
        .await?;
    tracing::info!("Password reset for user {}", user_id);

    Ok(success(NoticeResponse {
        message: "Password has been reset",
        warning: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::web::test_support::TestApp;
    use axum::http::Method;
    use serde_json::json;

    fn registration(email: &str) -> serde_json::Value {
        json!({
            "name": "Asha Rao",
            "email": email,
            "password": "secret123",
            "location": "Bengaluru"
        })
    }

    #[tokio::test]
    async fn register_then_login() {
        let app = TestApp::new();
        let (status, body) = app
            .call(Method::POST, "/api/auth/register", None, Some(registration("Asha@Example.com")))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["user"]["email"], "asha@example.com");
        assert_eq!(body["user"]["role"], "citizen");
        assert!(body["user"].get("password_hash").is_none());

        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "asha@example.com", "password": "wrong-one" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "asha@example.com", "password": "secret123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = app.call(Method::GET, "/api/auth/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Asha Rao");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let app = TestApp::new();
        app.call(Method::POST, "/api/auth/register", None, Some(registration("asha@example.com")))
            .await;
        let (status, body) = app
            .call(Method::POST, "/api/auth/register", None, Some(registration(" ASHA@example.com")))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "User already exists with this email");
        assert_eq!(
            app.store.list_users_by_role(UserRole::Citizen).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn admin_role_cannot_self_register() {
        let app = TestApp::new();
        let mut body = registration("boss@example.com");
        body["role"] = json!("admin");
        let (status, _) = app.call(Method::POST, "/api/auth/register", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(app.store.find_user_by_email("boss@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::Citizen, "c@example.com").await;

        let (status, _) = app.call(Method::POST, "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.call(Method::GET, "/api/auth/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Token has been revoked");
    }

    #[tokio::test]
    async fn reset_link_sets_new_password_once() {
        let app = TestApp::new();
        app.call(Method::POST, "/api/auth/register", None, Some(registration("asha@example.com")))
            .await;

        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/forgot-password",
                None,
                Some(json!({ "email": "asha@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let html = app.mailer.sent.lock().await.last().unwrap().html.clone();
        let marker = "/reset-password/";
        let start = html.find(marker).unwrap() + marker.len();
        let token: String = html[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();

        let reset = json!({ "token": token, "password": "brand-new" });
        let (status, _) = app
            .call(Method::POST, "/api/auth/reset-password", None, Some(reset.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .call(Method::POST, "/api/auth/reset-password", None, Some(reset))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "asha@example.com", "password": "brand-new" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_email_gets_same_answer() {
        let app = TestApp::new();
        let (status, body) = app
            .call(
                Method::POST,
                "/api/auth/forgot-password",
                None,
                Some(json!({ "email": "nobody@example.com" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("warning").is_none());
        assert!(app.mailer.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn registration_is_rate_limited() {
        let app = TestApp::new();
        for i in 0..3 {
            let (status, _) = app
                .call(
                    Method::POST,
                    "/api/auth/register",
                    None,
                    Some(registration(&format!("user{i}@example.com"))),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = app
            .call(Method::POST, "/api/auth/register", None, Some(registration("late@example.com")))
            .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("secret123").unwrap();
        assert!(verify_password("secret123", &hash));
        assert!(!verify_password("secret124", &hash));
        assert!(!verify_password("secret123", "not-a-hash"));
    }
}
