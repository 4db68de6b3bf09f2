//! Provider profiles.
//!
//! A profile describes one configured remote endpoint: where it lives, how to
//! authenticate, which model and voice to use and how text should be chunked
//! for it. Profiles are read-only to the pipeline; they are supplied by the
//! configuration layer (or any settings store) and selected through
//! [`ProviderRegistry`].

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::base::{TTSError, TTSResult, Voice};
use super::format::ResponseFormat;
use crate::core::text::{
    DEFAULT_ABSOLUTE_MAX_CHARS, DEFAULT_MIN_CHARS_PER_SEGMENT, DEFAULT_PREFERRED_MAX_CHARS,
    SegmentOptions,
};
use crate::utils::url_validation::is_first_party_host;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default number of upcoming segments warmed while one plays.
pub const DEFAULT_PREFETCH_WINDOW: usize = 3;
/// Base URL of the first-party OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// =============================================================================
// Provider Type
// =============================================================================

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderType {
    /// `POST {base}/audio/speech` style APIs (OpenAI and compatible servers).
    #[default]
    #[serde(rename = "openai", alias = "openai-compatible", alias = "openai_compatible")]
    OpenAICompatible,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAICompatible => "openai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openai-compatible" | "openai_compatible" => Some(Self::OpenAICompatible),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Chunking
// =============================================================================

/// Segmentation and prefetch tuning of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChunkingOptions {
    pub preferred_max_chars: usize,
    pub absolute_max_chars: usize,
    pub min_chars_per_segment: usize,
    pub prefetch_window: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            preferred_max_chars: DEFAULT_PREFERRED_MAX_CHARS,
            absolute_max_chars: DEFAULT_ABSOLUTE_MAX_CHARS,
            min_chars_per_segment: DEFAULT_MIN_CHARS_PER_SEGMENT,
            prefetch_window: DEFAULT_PREFETCH_WINDOW,
        }
    }
}

impl ChunkingOptions {
    pub fn segment_options(&self) -> SegmentOptions {
        SegmentOptions::new(
            self.preferred_max_chars,
            self.absolute_max_chars,
            self.min_chars_per_segment,
        )
    }

    pub fn window(&self) -> usize {
        self.prefetch_window.max(1)
    }
}

// =============================================================================
// Provider Profile
// =============================================================================

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub default_voice: String,
    pub enabled: bool,
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    pub response_format: ResponseFormat,
    pub stream: bool,
    #[serde(flatten)]
    pub chunking: ChunkingOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_voices: Option<Vec<Voice>>,
}

impl Default for ProviderProfile {
    fn default() -> Self {
        Self {
            id: "openai".to_string(),
            name: "OpenAI".to_string(),
            provider_type: ProviderType::OpenAICompatible,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: None,
            model: "tts-1".to_string(),
            default_voice: "alloy".to_string(),
            enabled: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            headers: HashMap::new(),
            response_format: ResponseFormat::Mp3,
            stream: false,
            chunking: ChunkingOptions::default(),
            cached_voices: None,
        }
    }
}

impl fmt::Debug for ProviderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("default_voice", &self.default_voice)
            .field("enabled", &self.enabled)
            .field("timeout_ms", &self.timeout_ms)
            .field("response_format", &self.response_format)
            .field("stream", &self.stream)
            .field("chunking", &self.chunking)
            .finish_non_exhaustive()
    }
}

impl ProviderProfile {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_default_voice(mut self, voice: impl Into<String>) -> Self {
        self.default_voice = voice.into();
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn with_chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_ms == 0 {
            Duration::from_millis(DEFAULT_TIMEOUT_MS)
        } else {
            Duration::from_millis(self.timeout_ms)
        }
    }

    /// `base_url` joined with `path` using exactly one slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn has_base_url(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    pub fn is_first_party(&self) -> bool {
        is_first_party_host(&self.base_url)
    }

    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            provider_type: self.provider_type,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            default_voice: self.default_voice.clone(),
            enabled: self.enabled,
            stream: self.stream,
            response_format: self.response_format,
            has_api_key: self.api_key.as_deref().is_some_and(|key| !key.is_empty()),
        }
    }
}

/// Public view of a profile. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub base_url: String,
    pub model: String,
    pub default_voice: String,
    pub enabled: bool,
    pub stream: bool,
    pub response_format: ResponseFormat,
    pub has_api_key: bool,
}

// =============================================================================
// Provider Registry
// =============================================================================

/// Configured profiles plus the id of the active one.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    profiles: Vec<ProviderProfile>,
    active: Option<String>,
}

impl ProviderRegistry {
    /// Builds a registry. Without an explicit `active` id the first enabled
    /// profile becomes active.
    pub fn new(profiles: Vec<ProviderProfile>, active: Option<String>) -> Self {
        let active = active.or_else(|| {
            profiles
                .iter()
                .find(|profile| profile.enabled)
                .map(|profile| profile.id.clone())
        });
        Self { profiles, active }
    }

    pub fn profiles(&self) -> &[ProviderProfile] {
        &self.profiles
    }

    pub fn get(&self, id: &str) -> Option<&ProviderProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    /// The active profile, if it exists and is enabled.
    pub fn active(&self) -> Option<&ProviderProfile> {
        self.active
            .as_deref()
            .and_then(|id| self.get(id))
            .filter(|profile| profile.enabled)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn set_active(&mut self, id: &str) -> TTSResult<()> {
        match self.get(id) {
            Some(profile) if profile.enabled => {
                self.active = Some(id.to_string());
                Ok(())
            }
            Some(_) => Err(TTSError::invalid_provider(format!("Provider '{id}' is disabled"))),
            None => Err(TTSError::invalid_provider(format!("Unknown provider '{id}'"))),
        }
    }

    /// Resolves an explicit id, or the active profile when `id` is `None`.
    pub fn resolve(&self, id: Option<&str>) -> TTSResult<&ProviderProfile> {
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => {
                let profile = self
                    .get(id)
                    .ok_or_else(|| TTSError::invalid_provider(format!("Unknown provider '{id}'")))?;
                if !profile.enabled {
                    return Err(TTSError::invalid_provider(format!("Provider '{id}' is disabled")));
                }
                Ok(profile)
            }
            None => self
                .active()
                .ok_or_else(|| TTSError::invalid_provider("No active TTS provider configured")),
        }
    }
}
