//! OpenAI-compatible synthesis client.
//!
//! Talks to any server exposing the OpenAI Audio Speech API: the first-party
//! API as well as self-hosted compatible servers.
//!
//! # API Reference
//!
//! - Speech: `POST {base}/audio/speech`
//! - Voices: `GET {base}/audio/voices` (optional, not offered by OpenAI itself)
//! - Health: `GET {base}/models`
//! - Speed: 0.25 to 4.0

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use async_stream::stream;
use futures::StreamExt;
use moka::future::Cache;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::config::{
    MODELS_PATH, ModelsResponse, SPEECH_PATH, SpeechRequestBody, VOICES_PATH, VoicesResponse,
    builtin_voices, clamp_speed,
};
use crate::core::tts::base::{
    AudioClip, HealthReport, SynthesisClient, SynthesisParams, SynthesisStream, TTSError,
    TTSResult, Voice, body_excerpt, filter_voices,
};
use crate::core::tts::format::{is_non_audio, resolve_content_type};
use crate::core::tts::profile::ProviderProfile;

/// Default lifetime of a discovered voice list.
pub const DEFAULT_VOICE_CACHE_TTL: Duration = Duration::from_secs(600);

const VOICE_CACHE_CAPACITY: u64 = 256;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

// =============================================================================
// Request Building
// =============================================================================

fn authorized(
    profile: &ProviderProfile,
    request: reqwest::RequestBuilder,
) -> reqwest::RequestBuilder {
    let mut request = request;
    if let Some(key) = profile.api_key.as_deref().filter(|key| !key.is_empty()) {
        request = request.header("Authorization", format!("Bearer {key}"));
    }
    for (name, value) in &profile.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

/// Validates `params` against `profile` and builds the speech body.
fn speech_body<'a>(
    profile: &'a ProviderProfile,
    params: &'a SynthesisParams,
    stream: bool,
) -> TTSResult<SpeechRequestBody<'a>> {
    if params.input.trim().is_empty() {
        return Err(TTSError::invalid_request("Missing input text"));
    }
    if !profile.has_base_url() {
        return Err(TTSError::invalid_provider(format!(
            "Provider '{}' has no base URL",
            profile.id
        )));
    }

    Ok(SpeechRequestBody {
        input: &params.input,
        model: params
            .model
            .as_deref()
            .filter(|model| !model.is_empty())
            .unwrap_or(&profile.model),
        voice: params
            .voice
            .as_deref()
            .filter(|voice| !voice.is_empty())
            .unwrap_or(&profile.default_voice),
        speed: clamp_speed(params.speed),
        response_format: params.response_format.unwrap_or(profile.response_format),
        stream,
    })
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> TTSError {
    if error.is_timeout() {
        TTSError::timeout(timeout)
    } else {
        TTSError::network(format!("Request failed: {error}"))
    }
}

/// Runs `operation` under the profile timeout.
async fn with_timeout<T>(
    timeout: Duration,
    operation: impl Future<Output = TTSResult<T>>,
) -> TTSResult<T> {
    tokio::time::timeout(timeout, operation)
        .await
        .unwrap_or_else(|_| Err(TTSError::timeout(timeout)))
}

fn header_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Turns non-success statuses into taxonomy errors.
async fn ensure_success(response: reqwest::Response) -> TTSResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TTSError::from_status(status.as_u16(), &body))
}

/// Rejects 2xx responses whose content type cannot be audio.
async fn ensure_audio(response: reqwest::Response) -> TTSResult<reqwest::Response> {
    let Some(content_type) = header_content_type(&response).filter(|ct| is_non_audio(ct)) else {
        return Ok(response);
    };
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    Err(TTSError::upstream(format!(
        "Provider returned {content_type} instead of audio"
    ))
    .with_status(502)
    .with_details(serde_json::json!({
        "upstreamStatus": status,
        "contentType": content_type,
        "body": body_excerpt(&body),
    })))
}

// =============================================================================
// OpenAI-Compatible Client
// =============================================================================

/// Synthesis client for OpenAI-compatible HTTP APIs.
///
/// Holds one pooled HTTP client and a TTL cache of discovered voice lists
/// keyed by profile id and base URL.
#[derive(Clone)]
pub struct OpenAICompatibleClient {
    http: reqwest::Client,
    voice_cache: Cache<String, Arc<Vec<Voice>>>,
}

impl OpenAICompatibleClient {
    pub fn new() -> TTSResult<Self> {
        Self::with_voice_cache_ttl(DEFAULT_VOICE_CACHE_TTL)
    }

    pub fn with_voice_cache_ttl(ttl: Duration) -> TTSResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .map_err(|e| TTSError::network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::with_http_client(http, ttl))
    }

    pub fn with_http_client(http: reqwest::Client, voice_cache_ttl: Duration) -> Self {
        let voice_cache = Cache::builder()
            .max_capacity(VOICE_CACHE_CAPACITY)
            .time_to_live(voice_cache_ttl.max(Duration::from_secs(1)))
            .build();

        Self { http, voice_cache }
    }

    /// Drops every memoized voice list.
    pub fn invalidate_voices(&self) {
        self.voice_cache.invalidate_all();
    }

    async fn send_speech(
        &self,
        profile: &ProviderProfile,
        body: &SpeechRequestBody<'_>,
    ) -> TTSResult<reqwest::Response> {
        let timeout = profile.timeout();
        let request = authorized(profile, self.http.post(profile.endpoint(SPEECH_PATH))).json(body);

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let response = ensure_success(response).await?;
        ensure_audio(response).await
    }

    async fn fetch_voices(&self, profile: &ProviderProfile) -> TTSResult<Vec<Voice>> {
        let timeout = profile.timeout();
        with_timeout(timeout, async {
            let response = authorized(profile, self.http.get(profile.endpoint(VOICES_PATH)))
                .send()
                .await
                .map_err(|e| transport_error(e, timeout))?;
            let response = ensure_success(response).await?;
            let parsed: VoicesResponse = response
                .json()
                .await
                .map_err(|e| TTSError::upstream(format!("Invalid voices response: {e}")))?;
            Ok::<_, TTSError>(parsed.voices.into_iter().map(Voice::from).collect::<Vec<_>>())
        })
        .await
    }

    fn voice_cache_key(profile: &ProviderProfile) -> String {
        format!("{}|{}", profile.id, profile.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SynthesisClient for OpenAICompatibleClient {
    async fn health(&self, profile: &ProviderProfile) -> TTSResult<HealthReport> {
        if !profile.has_base_url() {
            return Err(TTSError::invalid_provider(format!(
                "Provider '{}' has no base URL",
                profile.id
            )));
        }

        let timeout = profile.timeout();
        let started = Instant::now();

        let models = with_timeout(timeout, async {
            let response = authorized(profile, self.http.get(profile.endpoint(MODELS_PATH)))
                .send()
                .await
                .map_err(|e| transport_error(e, timeout))?;
            let response = ensure_success(response).await?;
            // Some compatible servers answer with an empty or non-standard body.
            let models = response
                .json::<ModelsResponse>()
                .await
                .ok()
                .map(|parsed| parsed.data.into_iter().map(|model| model.id).collect::<Vec<_>>())
                .filter(|models| !models.is_empty());
            Ok::<_, TTSError>(models)
        })
        .await?;

        let latency_ms = started.elapsed().as_millis() as u64;
        debug!(provider = %profile.id, latency_ms, "Provider health probe succeeded");

        Ok(HealthReport {
            ok: true,
            latency_ms,
            message: None,
            models,
        })
    }

    async fn list_voices(
        &self,
        profile: &ProviderProfile,
        lang: Option<&str>,
    ) -> TTSResult<Vec<Voice>> {
        if let Some(cached) = &profile.cached_voices {
            return Ok(filter_voices(cached, lang));
        }

        let key = Self::voice_cache_key(profile);
        if let Some(voices) = self.voice_cache.get(&key).await {
            return Ok(filter_voices(&voices, lang));
        }

        let discovered = if profile.has_base_url() {
            match self.fetch_voices(profile).await {
                Ok(voices) => voices,
                Err(e) => {
                    debug!(provider = %profile.id, error = %e, "Voice discovery failed");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let voices = if !discovered.is_empty() {
            discovered
        } else if profile.is_first_party() {
            builtin_voices()
        } else {
            return Ok(Vec::new());
        };

        let voices = Arc::new(voices);
        self.voice_cache.insert(key, Arc::clone(&voices)).await;
        Ok(filter_voices(&voices, lang))
    }

    async fn synthesize(
        &self,
        profile: &ProviderProfile,
        params: &SynthesisParams,
    ) -> TTSResult<AudioClip> {
        let body = speech_body(profile, params, false)?;
        let timeout = profile.timeout();
        let fallback = body.response_format.mime_type();

        debug!(
            provider = %profile.id,
            model = body.model,
            voice = body.voice,
            chars = body.input.chars().count(),
            "Requesting buffered synthesis"
        );

        with_timeout(timeout, async {
            let response = self.send_speech(profile, &body).await?;
            let header = header_content_type(&response);
            let data = response
                .bytes()
                .await
                .map_err(|e| transport_error(e, timeout))?;

            if data.is_empty() {
                return Err(TTSError::upstream("Provider returned an empty audio body"));
            }

            let content_type = resolve_content_type(header.as_deref(), &data, fallback);
            Ok::<_, TTSError>(AudioClip::new(content_type, data))
        })
        .await
    }

    async fn synthesize_stream(
        &self,
        profile: &ProviderProfile,
        params: &SynthesisParams,
    ) -> TTSResult<SynthesisStream> {
        let body = speech_body(profile, params, true)?;
        let timeout = profile.timeout();

        debug!(
            provider = %profile.id,
            model = body.model,
            voice = body.voice,
            "Requesting streamed synthesis"
        );

        let response = with_timeout(timeout, self.send_speech(profile, &body)).await?;
        let content_type = header_content_type(&response);
        let provider = profile.id.clone();
        if content_type.is_none() {
            warn!(provider = %provider, "Streamed response carries no content type");
        }

        // The profile timeout bounds the wait for every chunk, not just the headers.
        let mut bytes = Box::pin(response.bytes_stream());
        let chunks = stream! {
            loop {
                match tokio::time::timeout(timeout, bytes.next()).await {
                    Ok(Some(Ok(chunk))) => yield Ok(chunk),
                    Ok(Some(Err(e))) => {
                        yield Err(transport_error(e, timeout));
                        break;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(provider = %provider, "Streamed response stalled");
                        yield Err(TTSError::timeout(timeout));
                        break;
                    }
                }
            }
        }
        .boxed();

        Ok(SynthesisStream {
            content_type,
            chunks,
        })
    }
}
