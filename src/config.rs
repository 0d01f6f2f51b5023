use anyhow::{anyhow, bail, Context};
use base64::{engine::general_purpose, Engine as _};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub session_key: Vec<u8>,
    pub token_ttl: Duration,
    pub cache_ttl: Duration,
    pub cache_backend: CacheBackend,
    pub cors_origins: Vec<String>,
    pub cloudinary: Option<CloudinaryConfig>,
    pub mail: Option<MailConfig>,
    pub frontend_url: String,
    pub admin: Option<AdminSeed>,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{name} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}

pub fn decode_session_key(raw: &str) -> anyhow::Result<Vec<u8>> {
    let key = general_purpose::STANDARD
        .decode(raw.trim())
        .context("SESSION_KEY must be base64")?;
    if key.len() < 32 {
        bail!("SESSION_KEY must decode to at least 32 bytes");
    }
    Ok(key)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL");

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| {
            let port = var("PORT").unwrap_or_else(|| "5000".to_string());
            format!("0.0.0.0:{port}")
        });

        let session_key = decode_session_key(&var("SESSION_KEY").context("SESSION_KEY missing")?)?;

        let cache_backend = match var("CACHE_BACKEND").as_deref().map(str::to_lowercase).as_deref() {
            Some("memory") => CacheBackend::Memory,
            Some("postgres") if database_url.is_some() => CacheBackend::Postgres,
            Some("postgres") => bail!("CACHE_BACKEND=postgres requires DATABASE_URL"),
            Some(other) => bail!("Unknown CACHE_BACKEND {other:?}"),
            None if database_url.is_some() => CacheBackend::Postgres,
            None => CacheBackend::Memory,
        };

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let cloudinary = match (
            var("CLOUDINARY_CLOUD_NAME"),
            var("CLOUDINARY_API_KEY"),
            var("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let mail = match (var("MAIL_API_URL"), var("MAIL_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(MailConfig {
                api_url,
                api_key,
                from: var("MAIL_FROM").unwrap_or_else(|| "no-reply@civix.local".to_string()),
            }),
            _ => None,
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                email,
                password,
                name: var("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 10)?,
            token_ttl: Duration::from_secs(parse_or::<u64>("TOKEN_TTL_HOURS", 168)? * 3600),
            cache_ttl: Duration::from_secs(parse_or("POLL_RESULTS_CACHE_TTL", 30)?),
            frontend_url: var("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            database_url,
            bind_addr,
            session_key,
            cache_backend,
            cors_origins,
            cloudinary,
            mail,
            admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_must_be_long_enough() {
        let short = general_purpose::STANDARD.encode([7u8; 16]);
        assert!(decode_session_key(&short).is_err());

        let ok = general_purpose::STANDARD.encode([7u8; 32]);
        assert_eq!(decode_session_key(&ok).unwrap().len(), 32);
    }

    #[test]
    fn session_key_must_be_base64() {
        assert!(decode_session_key("not base64 at all!").is_err());
    }
}
