use std::time::Duration;

use serde::Deserialize;

use crate::directory::Limits;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// No URL means the in-process cache.
    pub redis_url: Option<String>,
    pub store_timeout_ms: u64,
    pub living_max: usize,
    pub history_retain: usize,
    /// Base URL of the media server's control API.
    pub live_control_url: String,
    pub jwt: JwtConfig,
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let redis_url = std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "minitube".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "minitube-users".into()),
            ttl_minutes: parsed("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: parsed("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };
        Ok(Self {
            database_url,
            redis_url,
            store_timeout_ms: parsed("STORE_TIMEOUT_MS", 400),
            living_max: parsed("LIVING_MAX", 50),
            history_retain: parsed("HISTORY_RETAIN", 256),
            live_control_url: std::env::var("LIVE_CONTROL_URL")
                .unwrap_or_else(|_| "http://live:8090".into()),
            jwt,
        })
    }

    pub fn limits(&self) -> Limits {
        let call_timeout = Duration::from_millis(self.store_timeout_ms);
        Limits {
            call_timeout,
            repair_timeout: call_timeout * 2,
            living_max: self.living_max,
            history_retain: self.history_retain,
            ..Limits::default()
        }
    }
}
