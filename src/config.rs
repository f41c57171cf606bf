//! Runtime settings read from the environment (and `.env` when present).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use axum::http::StatusCode;
use url::Url;

use crate::normalize::FencePolicy;

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_API_KEY_ALIAS: &str = "MY_KEY";
pub const ENV_MODEL: &str = "GEMINI_MODEL";
pub const ENV_BASE_URL: &str = "GEMINI_BASE_URL";
pub const ENV_TEMPERATURE: &str = "GEMINI_TEMPERATURE";
pub const ENV_STOP_SEQUENCES: &str = "GEMINI_STOP_SEQUENCES";
pub const ENV_MODEL_TIMEOUT: &str = "MODEL_TIMEOUT_SECS";
pub const ENV_IMAGE_TIMEOUT: &str = "IMAGE_FETCH_TIMEOUT_SECS";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_MAX_BODY: &str = "MAX_BODY_BYTES";
pub const ENV_FENCE_POLICY: &str = "FENCE_POLICY";
pub const ENV_STRICT_FINDINGS: &str = "STRICT_FINDINGS";
pub const ENV_INVALID_JSON_STATUS: &str = "INVALID_JSON_STATUS";

const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEMPERATURE: f32 = 1.0;
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY (or MY_KEY) is not set")]
    MissingApiKey,
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("could not load .env: {0}")]
    DotEnv(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
    pub model_timeout: Duration,
    pub image_fetch_timeout: Duration,
    pub bind_addr: String,
    pub max_body_bytes: usize,
    pub fence_policy: FencePolicy,
    pub strict_findings: bool,
    /// Status returned when the model reply could not be normalized.
    pub invalid_json_status: StatusCode,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        check_env_file(dotenvy::dotenv())?;
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = var(ENV_API_KEY)
            .or_else(|| var(ENV_API_KEY_ALIAS))
            .ok_or(ConfigError::MissingApiKey)?;

        let base_url = var(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
            field: ENV_BASE_URL,
            reason: e.to_string(),
        })?;

        let stop_sequences = var(ENV_STOP_SEQUENCES)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let fence_policy = match var(ENV_FENCE_POLICY).as_deref().map(str::to_lowercase) {
            None => FencePolicy::default(),
            Some(p) if p == "fixed" => FencePolicy::Fixed,
            Some(p) if p == "guarded" => FencePolicy::Guarded,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: ENV_FENCE_POLICY,
                    reason: format!("expected 'fixed' or 'guarded', got '{}'", other),
                })
            }
        };

        let status_code: u16 = parse_or(&var, ENV_INVALID_JSON_STATUS, 200)?;
        let invalid_json_status =
            StatusCode::from_u16(status_code).map_err(|e| ConfigError::InvalidValue {
                field: ENV_INVALID_JSON_STATUS,
                reason: e.to_string(),
            })?;

        Ok(Self {
            api_key,
            model: var(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url,
            temperature: parse_or(&var, ENV_TEMPERATURE, DEFAULT_TEMPERATURE)?,
            stop_sequences,
            model_timeout: Duration::from_secs(parse_or(
                &var,
                ENV_MODEL_TIMEOUT,
                DEFAULT_MODEL_TIMEOUT_SECS,
            )?),
            image_fetch_timeout: Duration::from_secs(parse_or(
                &var,
                ENV_IMAGE_TIMEOUT,
                DEFAULT_IMAGE_TIMEOUT_SECS,
            )?),
            bind_addr: var(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_body_bytes: parse_or(&var, ENV_MAX_BODY, DEFAULT_MAX_BODY_BYTES)?,
            fence_policy,
            strict_findings: parse_or(&var, ENV_STRICT_FINDINGS, false)?,
            invalid_json_status,
        })
    }
}

/// A missing `.env` is fine; an unreadable or malformed one is not.
fn check_env_file<T>(result: dotenvy::Result<T>) -> Result<(), ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => {
            tracing::debug!("no .env file found");
            Ok(())
        }
        Err(e) => Err(ConfigError::DotEnv(e.to_string())),
    }
}

fn parse_or<T, V>(var: &V, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(field) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field,
                reason: e.to_string(),
            }),
    }
}
