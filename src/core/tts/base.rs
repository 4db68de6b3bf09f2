//! Provider-agnostic synthesis contract.
//!
//! Every remote provider implements [`SynthesisClient`]. The playback engine
//! and the proxy routes only ever talk to this trait, so a new provider type
//! needs an implementation plus an entry in [`super::ProviderType`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use super::format::ResponseFormat;
use super::profile::ProviderProfile;

/// Longest body excerpt kept in error details.
pub const MAX_ERROR_EXCERPT_CHARS: usize = 512;

/// Result type for synthesis operations
pub type TTSResult<T> = Result<T, TTSError>;

// =============================================================================
// Errors
// =============================================================================

/// Error taxonomy shared by adapters, the pipeline and the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TTSErrorCode {
    InvalidRequest,
    InvalidProvider,
    Unauthorized,
    Forbidden,
    RateLimited,
    Timeout,
    NetworkError,
    UpstreamError,
    /// Client-side cancellation. Never produced from an HTTP status.
    Aborted,
}

impl TTSErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::InvalidProvider => "InvalidProvider",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::RateLimited => "RateLimited",
            Self::Timeout => "Timeout",
            Self::NetworkError => "NetworkError",
            Self::UpstreamError => "UpstreamError",
            Self::Aborted => "Aborted",
        }
    }

    /// HTTP status used when no upstream status is known.
    pub fn default_status(&self) -> u16 {
        match self {
            Self::InvalidRequest | Self::InvalidProvider => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::RateLimited => 429,
            Self::Timeout => 504,
            Self::NetworkError | Self::UpstreamError => 502,
            Self::Aborted => 499,
        }
    }

    /// Maps a non-success upstream status onto the taxonomy.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            429 => Self::RateLimited,
            400..=499 => Self::InvalidRequest,
            _ => Self::UpstreamError,
        }
    }
}

impl fmt::Display for TTSErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthesis failure carrying a taxonomy code, an HTTP status and optional
/// diagnostic details.
///
/// `Clone` so one in-flight result can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code} ({status}): {message}")]
pub struct TTSError {
    pub code: TTSErrorCode,
    pub status: u16,
    pub message: String,
    pub details: Option<Value>,
}

impl TTSError {
    pub fn new(code: TTSErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            status: code.default_status(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TTSErrorCode::InvalidRequest, message)
    }

    pub fn invalid_provider(message: impl Into<String>) -> Self {
        Self::new(TTSErrorCode::InvalidProvider, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            TTSErrorCode::Timeout,
            format!("Request timed out after {} ms", after.as_millis()),
        )
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TTSErrorCode::NetworkError, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(TTSErrorCode::UpstreamError, message)
    }

    pub fn aborted() -> Self {
        Self::new(TTSErrorCode::Aborted, "Aborted")
    }

    /// Builds an error from a non-success upstream response, keeping the
    /// upstream status and a body excerpt.
    pub fn from_status(status: u16, body: &str) -> Self {
        let code = TTSErrorCode::from_http_status(status);
        let message = upstream_message(body)
            .unwrap_or_else(|| format!("Provider responded with HTTP {status}"));

        let mut error = Self::new(code, message).with_status(status);
        let excerpt = body_excerpt(body);
        if !excerpt.is_empty() {
            error = error.with_details(json!({ "body": excerpt }));
        }
        error
    }

    pub fn is_aborted(&self) -> bool {
        self.code == TTSErrorCode::Aborted
    }
}

/// Truncates a response body to [`MAX_ERROR_EXCERPT_CHARS`] characters.
pub fn body_excerpt(body: &str) -> String {
    body.trim().chars().take(MAX_ERROR_EXCERPT_CHARS).collect()
}

/// Pulls `error.message` (or a top-level `message`) out of a JSON error body.
fn upstream_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

// =============================================================================
// Request / Response Types
// =============================================================================

/// Parameters of a single synthesis request.
///
/// `None` fields fall back to the provider profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub input: String,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: f32,
    pub response_format: Option<ResponseFormat>,
}

impl SynthesisParams {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            model: None,
            voice: None,
            speed: 1.0,
            response_format: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// A fully received piece of audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub content_type: String,
    pub data: Bytes,
}

impl AudioClip {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Live chunked response of a streamed synthesis request.
///
/// Dropping `chunks` cancels the underlying socket read.
pub struct SynthesisStream {
    pub content_type: Option<String>,
    pub chunks: BoxStream<'static, TTSResult<Bytes>>,
}

impl fmt::Debug for SynthesisStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesisStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// A voice offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "language")]
    pub lang: Option<String>,
}

impl Voice {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lang: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lang: lang.map(str::to_string),
        }
    }

    /// Whether this voice can speak `lang`.
    ///
    /// Compares primary subtags (`en-US` matches `en`); voices without a
    /// language match everything.
    pub fn matches_language(&self, lang: &str) -> bool {
        let Some(own) = self.lang.as_deref() else {
            return true;
        };
        primary_subtag(own).eq_ignore_ascii_case(primary_subtag(lang))
    }
}

fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

/// Filters voices by language, keeping all of them when `lang` is absent.
pub fn filter_voices(voices: &[Voice], lang: Option<&str>) -> Vec<Voice> {
    match lang.map(str::trim).filter(|lang| !lang.is_empty()) {
        Some(lang) => voices
            .iter()
            .filter(|voice| voice.matches_language(lang))
            .cloned()
            .collect(),
        None => voices.to_vec(),
    }
}

/// Result of a provider capability probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
}

// =============================================================================
// Client Trait
// =============================================================================

/// Remote synthesis backend.
///
/// Implementations are stateless with respect to a profile: every call gets
/// the profile it should talk to, so one client serves any number of
/// profiles of its type.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Lightweight capability probe.
    async fn health(&self, profile: &ProviderProfile) -> TTSResult<HealthReport>;

    /// Voices available for `lang` (all voices when `None`).
    async fn list_voices(
        &self,
        profile: &ProviderProfile,
        lang: Option<&str>,
    ) -> TTSResult<Vec<Voice>>;

    /// Buffered synthesis. Resolves once the whole body has arrived.
    async fn synthesize(
        &self,
        profile: &ProviderProfile,
        params: &SynthesisParams,
    ) -> TTSResult<AudioClip>;

    /// Streamed synthesis. Resolves as soon as response headers arrived.
    async fn synthesize_stream(
        &self,
        profile: &ProviderProfile,
        params: &SynthesisParams,
    ) -> TTSResult<SynthesisStream>;
}
