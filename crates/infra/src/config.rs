//! Process configuration loaded from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-jwt-secret";
const DEV_CALLBACK_SECRET: &str = "dev-callback-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration for the API process.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub callback_secret: String,
    /// Base URL of the analysis worker; requests go to `{worker_url}/analyze`.
    pub worker_url: String,
    /// Externally reachable base URL of this service, used for callback targets.
    pub public_base_url: String,
    /// Postgres stores when set, in-memory otherwise.
    pub database_url: Option<String>,
    /// Local filesystem object storage when set, in-memory otherwise.
    pub storage_dir: Option<PathBuf>,
    pub max_upload_bytes: u64,
    pub max_attempts: u32,
    pub dispatch_timeout: Duration,
    pub stale_job_timeout: Duration,
    pub reaper_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            callback_secret: DEV_CALLBACK_SECRET.to_string(),
            worker_url: "http://127.0.0.1:8000".to_string(),
            public_base_url: "http://127.0.0.1:8080".to_string(),
            database_url: None,
            storage_dir: None,
            max_upload_bytes: 10 * 1024 * 1024,
            max_attempts: 3,
            dispatch_timeout: Duration::from_secs(10),
            stale_job_timeout: Duration::from_secs(1800),
            reaper_interval: Duration::from_secs(60),
        }
    }
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("worker_url", &self.worker_url)
            .field("public_base_url", &self.public_base_url)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("storage_dir", &self.storage_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("max_attempts", &self.max_attempts)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .field("stale_job_timeout", &self.stale_job_timeout)
            .field("reaper_interval", &self.reaper_interval)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using the development secret");
            defaults.jwt_secret.clone()
        });
        let callback_secret = get("CALLBACK_SECRET").unwrap_or_else(|| {
            warn!("CALLBACK_SECRET not set; using the development secret");
            defaults.callback_secret.clone()
        });

        Ok(Self {
            bind_addr: parse_or(&get, "BIND_ADDR", defaults.bind_addr)?,
            jwt_secret,
            callback_secret,
            worker_url: trim_url(get("WORKER_URL").unwrap_or(defaults.worker_url)),
            public_base_url: trim_url(get("PUBLIC_BASE_URL").unwrap_or(defaults.public_base_url)),
            database_url: get("DATABASE_URL"),
            storage_dir: get("STORAGE_DIR").map(PathBuf::from),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            max_attempts: positive(parse_or(&get, "MAX_ATTEMPTS", defaults.max_attempts)?, "MAX_ATTEMPTS")?,
            dispatch_timeout: secs_or(&get, "DISPATCH_TIMEOUT_SECS", defaults.dispatch_timeout)?,
            stale_job_timeout: secs_or(&get, "STALE_JOB_TIMEOUT_SECS", defaults.stale_job_timeout)?,
            reaper_interval: secs_or(&get, "REAPER_INTERVAL_SECS", defaults.reaper_interval)?,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn secs_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs = positive(parse_or(get, key, default.as_secs())?, key)?;
    Ok(Duration::from_secs(secs))
}

fn positive<T: PartialEq + Default + core::fmt::Display>(value: T, key: &'static str) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
