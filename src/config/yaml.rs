use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;
use crate::core::tts::ProviderProfile;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override the ones coming from environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// tts:
///   active_provider: "local"
///   voice_cache_ttl_seconds: 600
///   providers:
///     - id: "local"
///       name: "Kokoro"
///       baseUrl: "http://localhost:8880/v1"
///       model: "kokoro"
///       defaultVoice: "af_sky"
///       stream: true
///       preferredMaxChars: 120
///       prefetchWindow: 2
///
/// playback:
///   cache_capacity: 64
///   max_concurrency: 2
///   rate: 1.0
///   progressive_append: true
///
/// auth:
///   required: true
///   api_secrets:
///     - id: "client-a"
///       secret: "your-api-secret"
///
/// security:
///   cors_allowed_origins: "https://example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub tts: Option<TtsYaml>,
    pub playback: Option<PlaybackYaml>,
    pub auth: Option<AuthYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Provider profiles from YAML
///
/// Profiles use the same camelCase keys as `TTS_PROVIDERS_JSON`. A profile
/// whose id is already known from the environment replaces it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub active_provider: Option<String>,
    pub voice_cache_ttl_seconds: Option<u64>,
    pub providers: Vec<ProviderProfile>,
}

/// Playback tuning from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlaybackYaml {
    pub cache_capacity: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub rate: Option<f32>,
    pub progressive_append: Option<bool>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub required: Option<bool>,
    pub api_secrets: Vec<AuthApiSecretYaml>,
    /// Single secret, kept for configurations that predate `api_secrets`
    pub api_secret: Option<String>,
    pub api_secret_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthApiSecretYaml {
    pub id: String,
    pub secret: String,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }
}
