use dotenvy::dotenv;
use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    /// Broker channel for the main notification stream
    pub events_channel: String,
    /// Broker channel for chat; must differ from `events_channel`
    pub chat_channel: String,
    pub heartbeat_interval: Duration,
    pub subscriber_backoff: Duration,
    pub publish_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source. `from_env` passes the process env.
    pub fn from_lookup<F>(get: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&get, "PORT", 8000u16)?;
        let redis_url = get("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".into());
        let database_url =
            get("DATABASE_URL").ok_or_else(|| AppError::Config("DATABASE_URL missing".into()))?;
        let database_max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let jwt_secret =
            get("JWT_SECRET").ok_or_else(|| AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AppError::Config(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }
        let jwt_algorithm = match get("JWT_ALGORITHM") {
            Some(raw) => match Algorithm::from_str(&raw) {
                Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => alg,
                _ => {
                    return Err(AppError::Config(format!(
                        "JWT_ALGORITHM must be HS256, HS384 or HS512, got {raw}"
                    )))
                }
            },
            None => Algorithm::HS256,
        };

        let events_channel = get("EVENTS_CHANNEL").unwrap_or_else(|| "donehr:events".into());
        let chat_channel = get("CHAT_CHANNEL").unwrap_or_else(|| "donehr:chat".into());
        if events_channel == chat_channel {
            return Err(AppError::Config(format!(
                "EVENTS_CHANNEL and CHAT_CHANNEL must differ (both {events_channel})"
            )));
        }

        let heartbeat_interval =
            Duration::from_secs(parse_or(&get, "WS_HEARTBEAT_INTERVAL_SECS", 30u64)?);
        let subscriber_backoff =
            Duration::from_secs(parse_or(&get, "SUBSCRIBER_BACKOFF_SECS", 3u64)?);
        let publish_timeout =
            Duration::from_millis(parse_or(&get, "BROKER_PUBLISH_TIMEOUT_MS", 2000u64)?);
        if heartbeat_interval.is_zero() {
            return Err(AppError::Config(
                "WS_HEARTBEAT_INTERVAL_SECS must be positive".into(),
            ));
        }
        if subscriber_backoff.is_zero() {
            return Err(AppError::Config(
                "SUBSCRIBER_BACKOFF_SECS must be positive".into(),
            ));
        }

        Ok(Self {
            port,
            redis_url,
            database_url,
            database_max_connections,
            jwt_secret,
            jwt_algorithm,
            events_channel,
            chat_channel,
            heartbeat_interval,
            subscriber_backoff,
            publish_timeout,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} is not a valid value: {raw}"))),
        None => Ok(default),
    }
}
