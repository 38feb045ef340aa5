use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub position_ttl: Duration,
    pub expiry_sweep_interval: Duration,
    pub session_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            position_ttl: Duration::from_secs(3600),
            expiry_sweep_interval: Duration::from_secs(60),
            session_buffer_size: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) => parse_log_format(&raw)?,
            Err(_) => defaults.log_format,
        };

        let session_buffer_size =
            parse_or_default("SESSION_BUFFER_SIZE", defaults.session_buffer_size)?;
        if session_buffer_size == 0 {
            return Err(AppError::Internal(
                "invalid SESSION_BUFFER_SIZE: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            position_ttl: Duration::from_secs(parse_or_default(
                "POSITION_TTL_SECS",
                defaults.position_ttl.as_secs(),
            )?),
            expiry_sweep_interval: Duration::from_secs(
                parse_or_default("EXPIRY_SWEEP_SECS", defaults.expiry_sweep_interval.as_secs())?
                    .max(1),
            ),
            session_buffer_size,
        })
    }
}

fn parse_log_format(raw: &str) -> Result<LogFormat, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "compact" | "" => Ok(LogFormat::Compact),
        "json" => Ok(LogFormat::Json),
        other => Err(AppError::Internal(format!(
            "invalid LOG_FORMAT: {other}, expected compact/json"
        ))),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_log_format, Config, LogFormat};

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.position_ttl.as_secs(), 3600);
        assert_eq!(config.log_format, LogFormat::Compact);
    }

    #[test]
    fn log_format_is_case_insensitive() {
        assert_eq!(parse_log_format("JSON").unwrap(), LogFormat::Json);
        assert_eq!(parse_log_format("compact").unwrap(), LogFormat::Compact);
        assert!(parse_log_format("pretty").is_err());
    }
}
