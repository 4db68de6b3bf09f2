//! Configuration module for the narrator server and CLI
//!
//! This module handles configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use waav_narrator::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::cache::DEFAULT_CACHE_CAPACITY;
use crate::core::playback::{DEFAULT_RATE, RuntimeCapabilities};
use crate::core::scheduler::{DEFAULT_MAX_CONCURRENCY, SchedulerConfig};
use crate::core::tts::{DEFAULT_VOICE_CACHE_TTL, ProviderProfile, ProviderRegistry};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {message}")]
    InvalidEnv { name: &'static str, message: String },

    #[error("Invalid AUTH_API_SECRETS_JSON format: {0}")]
    AuthSecretsJson(serde_json::Error),

    #[error("Invalid TTS_PROVIDERS_JSON format: {0}")]
    ProvidersJson(serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// API secret authentication entry with a client identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthApiSecret {
    pub id: String,
    pub secret: String,
}

/// Tuning of the local playback pipeline used by the CLI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackConfig {
    /// Entries kept by the audio cache
    pub cache_capacity: usize,
    /// Concurrent provider requests per scheduler
    pub max_concurrency: usize,
    /// Initial playback rate
    pub rate: f32,
    /// Whether the audio output accepts progressive appends
    pub progressive_append: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            rate: DEFAULT_RATE,
            progressive_append: true,
        }
    }
}

/// Server configuration
///
/// Contains everything needed to run the proxy server and the CLI:
/// - Server settings (host, port)
/// - Provider profiles and the active provider
/// - Playback tuning
/// - Authentication settings
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Providers
    pub providers: Vec<ProviderProfile>,
    /// Id of the profile used when a request names none
    pub active_provider: Option<String>,
    pub voice_cache_ttl_seconds: u64,

    // Playback
    pub playback: PlaybackConfig,

    // Authentication configuration
    pub auth_api_secrets: Vec<AuthApiSecret>,
    pub auth_required: bool,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            providers: Vec::new(),
            active_provider: None,
            voice_cache_ttl_seconds: DEFAULT_VOICE_CACHE_TTL.as_secs(),
            playback: PlaybackConfig::default(),
            auth_api_secrets: Vec::new(),
            auth_required: false,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
        }
    }
}

/// Zeroize provider keys and API secrets when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        for profile in &mut self.providers {
            if let Some(ref mut key) = profile.api_key {
                key.zeroize();
            }
        }
        for secret in &mut self.auth_api_secrets {
            secret.secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only, then validate it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        // .env is loaded in main.rs, so at this point it is part of the environment.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Runs every validation rule on the merged configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_auth_api_secrets(&self.auth_api_secrets)?;
        validation::validate_auth_required(self.auth_required, &self.auth_api_secrets)?;
        validation::validate_providers(&self.providers, self.active_provider.as_deref())?;
        validation::validate_playback(&self.playback)?;
        validation::validate_rate_limits(
            self.rate_limit_requests_per_second,
            self.rate_limit_burst_size,
        )?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns true if at least one API secret entry is configured
    pub fn has_api_secret_auth(&self) -> bool {
        !self.auth_api_secrets.is_empty()
    }

    /// Find the API secret identifier that matches a bearer token
    pub fn find_api_secret_id(&self, token: &str) -> Option<&str> {
        crate::auth::match_api_secret_id(token, &self.auth_api_secrets)
    }

    /// Registry over the configured profiles.
    pub fn provider_registry(&self) -> ProviderRegistry {
        ProviderRegistry::new(self.providers.clone(), self.active_provider.clone())
    }

    pub fn voice_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.voice_cache_ttl_seconds)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            cache_capacity: self.playback.cache_capacity,
            max_concurrency: self.playback.max_concurrency,
        }
    }

    pub fn runtime_capabilities(&self) -> RuntimeCapabilities {
        if self.playback.progressive_append {
            RuntimeCapabilities::progressive()
        } else {
            RuntimeCapabilities::buffered_only()
        }
    }
}

pub(crate) fn parse_auth_api_secrets_json(
    json_str: &str,
) -> Result<Vec<AuthApiSecret>, ConfigError> {
    #[derive(serde::Deserialize)]
    struct AuthApiSecretJson {
        id: String,
        secret: String,
    }

    let secrets: Vec<AuthApiSecretJson> =
        serde_json::from_str(json_str).map_err(ConfigError::AuthSecretsJson)?;

    Ok(secrets
        .into_iter()
        .map(|entry| AuthApiSecret {
            id: entry.id,
            secret: entry.secret,
        })
        .collect())
}
