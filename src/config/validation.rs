//! Configuration validation logic.

use std::collections::HashSet;

use super::{AuthApiSecret, ConfigError, PlaybackConfig};
use crate::core::tts::openai::{MAX_SPEED, MIN_SPEED};
use crate::core::tts::ProviderProfile;
use crate::utils::validate_base_url;

/// Upper bound on concurrent provider requests per scheduler.
pub const MAX_CONCURRENCY_LIMIT: usize = 16;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

/// Every entry needs a non-empty id and secret; ids are unique.
pub fn validate_auth_api_secrets(secrets: &[AuthApiSecret]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in secrets {
        if entry.id.trim().is_empty() {
            return Err(invalid("API secret id must not be empty"));
        }
        if entry.secret.is_empty() {
            return Err(invalid(format!("API secret '{}' must not be empty", entry.id)));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(invalid(format!("Duplicate API secret id '{}'", entry.id)));
        }
    }
    Ok(())
}

pub fn validate_auth_required(
    required: bool,
    secrets: &[AuthApiSecret],
) -> Result<(), ConfigError> {
    if required && secrets.is_empty() {
        return Err(invalid(
            "Authentication is required but no API secrets are configured \
             (set AUTH_API_SECRETS_JSON or AUTH_API_SECRET)",
        ));
    }
    Ok(())
}

/// Profile ids are unique, base URLs usable, timeouts positive, and the
/// active provider (when named) exists and is enabled.
pub fn validate_providers(
    providers: &[ProviderProfile],
    active: Option<&str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for profile in providers {
        if profile.id.trim().is_empty() {
            return Err(invalid("Provider id must not be empty"));
        }
        if !seen.insert(profile.id.as_str()) {
            return Err(invalid(format!("Duplicate provider id '{}'", profile.id)));
        }
        validate_base_url(&profile.base_url).map_err(|e| {
            invalid(format!(
                "Provider '{}' has an invalid base URL: {e}",
                profile.id
            ))
        })?;
        if profile.timeout_ms == 0 {
            return Err(invalid(format!("Provider '{}' timeout must be positive", profile.id)));
        }
    }

    if let Some(active) = active {
        match providers.iter().find(|p| p.id == active) {
            None => return Err(invalid(format!("Active provider '{active}' is not configured"))),
            Some(profile) if !profile.enabled => {
                return Err(invalid(format!("Active provider '{active}' is disabled")));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

pub fn validate_playback(playback: &PlaybackConfig) -> Result<(), ConfigError> {
    if playback.cache_capacity == 0 {
        return Err(invalid("TTS cache capacity must be at least 1"));
    }
    if playback.max_concurrency == 0 || playback.max_concurrency > MAX_CONCURRENCY_LIMIT {
        return Err(invalid(format!(
            "TTS max concurrency must be between 1 and {MAX_CONCURRENCY_LIMIT}"
        )));
    }
    if !playback.rate.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&playback.rate) {
        return Err(invalid(format!(
            "Playback rate must be between {MIN_SPEED} and {MAX_SPEED}"
        )));
    }
    Ok(())
}

pub fn validate_rate_limits(requests_per_second: u32, burst_size: u32) -> Result<(), ConfigError> {
    if requests_per_second == 0 || burst_size == 0 {
        return Err(invalid("Rate limit values must be positive"));
    }
    Ok(())
}
