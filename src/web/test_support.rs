use crate::db::{MemoryStore, NewUser, Store};
use crate::domain::models::{User, UserRole};
use crate::middleware::RateLimiter;
use crate::services::aggregation::AggregationService;
use crate::services::cache::MemoryCache;
use crate::services::images::{ImageError, ImageHost, ImageUpload};
use crate::services::mailer::RecordingMailer;
use crate::state::{AppState, SharedState};
use crate::web::{self, session};
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const SESSION_KEY: &[u8] = b"test-session-key-0123456789abcdef";

pub struct StubImageHost;

#[async_trait]
impl ImageHost for StubImageHost {
    async fn upload(&self, image: ImageUpload) -> Result<String, ImageError> {
        image.validate()?;
        Ok(format!("https://images.test/complaints/{}", image.file_name))
    }
}

pub struct TestApp {
    pub state: SharedState,
    pub store: Arc<MemoryStore>,
    pub mailer: RecordingMailer,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(30)));
        let mailer = RecordingMailer::default();
        let state: SharedState = Arc::new(AppState {
            store: store.clone(),
            aggregates: AggregationService::new(store.clone(), cache),
            images: Arc::new(StubImageHost),
            mailer: Arc::new(mailer.clone()),
            session_key: SESSION_KEY.to_vec(),
            token_ttl: Duration::from_secs(3600),
            frontend_url: "http://localhost:3000".to_string(),
            login_limiter: RateLimiter::login(),
            register_limiter: RateLimiter::register(),
        });
        let router = Router::new()
            .nest("/api", web::routes(state.clone()))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        Self {
            state,
            store,
            mailer,
            router,
        }
    }

    /// Inserts a user directly and returns it with a valid bearer token.
    pub async fn user(&self, role: UserRole, email: &str) -> (User, String) {
        let user = self
            .store
            .create_user(NewUser {
                name: email.split('@').next().unwrap_or("user").to_string(),
                email: email.to_string(),
                password_hash: "unused".to_string(),
                role,
                location: "Bengaluru".to_string(),
                latitude: None,
                longitude: None,
            })
            .await
            .unwrap();
        let token =
            session::sign_session(user.id, user.role, SESSION_KEY, Duration::from_secs(3600)).unwrap();
        (user, token)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn raw(&self, method: Method, uri: &str, token: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }
}
