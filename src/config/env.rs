//! Environment variable loading.

use std::fmt::Display;
use std::str::FromStr;

use super::{AuthApiSecret, ConfigError, ServerConfig, parse_auth_api_secrets_json};
use crate::core::tts::{OPENAI_BASE_URL, ProviderProfile};

/// Every variable read by [`load_from_env`].
pub(crate) const CONFIG_ENV_VARS: &[&str] = &[
    "HOST",
    "PORT",
    "AUTH_REQUIRED",
    "AUTH_API_SECRETS_JSON",
    "AUTH_API_SECRET",
    "AUTH_API_SECRET_ID",
    "CORS_ALLOWED_ORIGINS",
    "RATE_LIMIT_REQUESTS_PER_SECOND",
    "RATE_LIMIT_BURST_SIZE",
    "TTS_PROVIDERS_JSON",
    "TTS_ACTIVE_PROVIDER",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "TTS_CACHE_CAPACITY",
    "TTS_MAX_CONCURRENCY",
    "TTS_PLAYBACK_RATE",
    "TTS_PROGRESSIVE_APPEND",
    "VOICE_CACHE_TTL_SECONDS",
];

/// Id of the profile derived from `OPENAI_API_KEY` / `OPENAI_BASE_URL`.
pub(crate) const IMPLICIT_OPENAI_ID: &str = "openai";

/// Non-empty, trimmed value of `name`.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env_var(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::InvalidEnv {
                name,
                message: format!("'{raw}': {e}"),
            })
        })
        .transpose()
}

fn parse_bool_env(name: &'static str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = env_var(name) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidEnv {
            name,
            message: format!("'{raw}' is not a boolean"),
        }),
    }
}

/// Provider profiles from `TTS_PROVIDERS_JSON`, plus the implicit `openai`
/// profile when `OPENAI_API_KEY` or `OPENAI_BASE_URL` is set and no profile
/// already uses that id.
fn load_providers() -> Result<Vec<ProviderProfile>, ConfigError> {
    let mut providers: Vec<ProviderProfile> = match env_var("TTS_PROVIDERS_JSON") {
        Some(json) => serde_json::from_str(&json).map_err(ConfigError::ProvidersJson)?,
        None => Vec::new(),
    };

    let api_key = env_var("OPENAI_API_KEY");
    let base_url = env_var("OPENAI_BASE_URL");
    let has_implicit = providers.iter().any(|p| p.id == IMPLICIT_OPENAI_ID);
    if (api_key.is_some() || base_url.is_some()) && !has_implicit {
        let mut profile = ProviderProfile::new(
            IMPLICIT_OPENAI_ID,
            base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        );
        profile.api_key = api_key;
        providers.insert(0, profile);
    }

    Ok(providers)
}

fn load_auth_secrets() -> Result<Vec<AuthApiSecret>, ConfigError> {
    if let Some(json) = env_var("AUTH_API_SECRETS_JSON") {
        return parse_auth_api_secrets_json(&json);
    }
    Ok(env_var("AUTH_API_SECRET")
        .map(|secret| {
            vec![AuthApiSecret {
                id: env_var("AUTH_API_SECRET_ID").unwrap_or_else(|| "default".to_string()),
                secret,
            }]
        })
        .unwrap_or_default())
}

/// Builds a configuration from defaults overridden by environment variables.
pub fn load_from_env() -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse_env("PORT")? {
        config.port = port;
    }

    config.providers = load_providers()?;
    config.active_provider = env_var("TTS_ACTIVE_PROVIDER");
    if let Some(ttl) = parse_env("VOICE_CACHE_TTL_SECONDS")? {
        config.voice_cache_ttl_seconds = ttl;
    }

    if let Some(capacity) = parse_env("TTS_CACHE_CAPACITY")? {
        config.playback.cache_capacity = capacity;
    }
    if let Some(concurrency) = parse_env("TTS_MAX_CONCURRENCY")? {
        config.playback.max_concurrency = concurrency;
    }
    if let Some(rate) = parse_env("TTS_PLAYBACK_RATE")? {
        config.playback.rate = rate;
    }
    if let Some(progressive) = parse_bool_env("TTS_PROGRESSIVE_APPEND")? {
        config.playback.progressive_append = progressive;
    }

    config.auth_api_secrets = load_auth_secrets()?;
    if let Some(required) = parse_bool_env("AUTH_REQUIRED")? {
        config.auth_required = required;
    }

    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");
    if let Some(rps) = parse_env("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = parse_env("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }

    Ok(config)
}
