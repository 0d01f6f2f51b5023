mod config;
mod db;
mod domain;
mod error;
mod middleware;
mod services;
mod state;
mod web;

use crate::config::{CacheBackend, Config};
use crate::db::{seed, MemoryStore, PgStore, Store};
use crate::services::aggregation::AggregationService;
use crate::services::cache::{AggregateCache, MemoryCache, PgCache};
use crate::services::images::{CloudinaryHost, DisabledImageHost, ImageHost};
use crate::services::mailer::{HttpMailer, LogMailer, Mailer};
use crate::state::SharedState;
use axum::{http::HeaderValue, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (store, cache): (Arc<dyn Store>, Arc<dyn AggregateCache>) = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to run database migrations: {}", e);
                    e
                })?;

            let cache: Arc<dyn AggregateCache> = match config.cache_backend {
                CacheBackend::Postgres => Arc::new(PgCache::new(pool.clone(), config.cache_ttl)),
                CacheBackend::Memory => Arc::new(MemoryCache::new(config.cache_ttl)),
            };
            let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
            (store, cache)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let cache: Arc<dyn AggregateCache> = Arc::new(MemoryCache::new(config.cache_ttl));
            (store, cache)
        }
    };

    if let Some(admin) = &config.admin {
        seed::seed_admin(store.as_ref(), admin).await?;
    }

    let images: Arc<dyn ImageHost> = match config.cloudinary.clone() {
        Some(c) => Arc::new(CloudinaryHost::new(c.cloud_name, c.api_key, c.api_secret)),
        None => {
            tracing::warn!("Cloudinary not configured, photo uploads are disabled");
            Arc::new(DisabledImageHost)
        }
    };
    let mailer: Arc<dyn Mailer> = match config.mail.clone() {
        Some(m) => Arc::new(HttpMailer::new(m.api_url, m.api_key, m.from)),
        None => {
            tracing::warn!("Mail API not configured, emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let shared: SharedState = Arc::new(state::AppState {
        aggregates: AggregationService::new(store.clone(), cache),
        store,
        images,
        mailer,
        session_key: config.session_key.clone(),
        token_ttl: config.token_ttl,
        frontend_url: config.frontend_url.clone(),
        login_limiter: middleware::RateLimiter::login(),
        register_limiter: middleware::RateLimiter::register(),
    });

    let scheduler = JobScheduler::new().await?;

    // Polls past their end date stop taking votes.
    let shared_for_polls = shared.clone();
    scheduler
        .add(Job::new_async("0 * * * * *", move |_uuid, _l| {
            let state = shared_for_polls.clone();
            Box::pin(async move {
                match state.store.close_expired_polls(chrono::Utc::now()).await {
                    Ok(0) => {}
                    Ok(closed) => tracing::info!("Closed {} expired polls", closed),
                    Err(e) => tracing::error!("Failed to close expired polls: {}", e),
                }
            })
        })?)
        .await?;

    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                match state.store.purge_expired_tokens(chrono::Utc::now()).await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!("Purged {} expired tokens", removed)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("Failed to purge expired tokens: {}", e),
                }
                let evicted = state.aggregates.cache().purge_expired().await;
                if evicted > 0 {
                    tracing::info!("Evicted {} stale aggregates", evicted);
                }
                state.login_limiter.cleanup().await;
                state.register_limiter.cleanup().await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    tracing::info!("  - Expired poll closing: every minute");
    tracing::info!("  - Token, cache and rate limiter cleanup: hourly");

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", web::routes(shared))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
