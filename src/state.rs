use crate::db::Store;
use crate::middleware::RateLimiter;
use crate::services::aggregation::AggregationService;
use crate::services::images::ImageHost;
use crate::services::mailer::Mailer;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub aggregates: AggregationService,
    pub images: Arc<dyn ImageHost>,
    pub mailer: Arc<dyn Mailer>,
    pub session_key: Vec<u8>,
    pub token_ttl: Duration,
    pub frontend_url: String,
    pub login_limiter: RateLimiter,
    pub register_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;
