//! Text-to-speech proxy endpoints.
//!
//! Browser clients cannot hold provider keys, so synthesis goes through
//! these routes: the server resolves the provider profile, attaches the key
//! and relays the audio (or the provider's error) unchanged.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::tts::{
    HealthReport, ProviderSummary, ResponseFormat, SynthesisParams, Voice,
};
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;

/// Body of `POST /api/tts/speech`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    /// Profile id; the active profile when absent
    #[serde(default)]
    pub provider: Option<String>,
    pub input: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    /// Relay the provider's chunked response; defaults to the profile setting
    #[serde(default)]
    pub stream: Option<bool>,
}

impl SpeechRequest {
    fn params(&self) -> SynthesisParams {
        let mut params = SynthesisParams::new(self.input.clone());
        params.model = self.model.clone().filter(|m| !m.trim().is_empty());
        params.voice = self.voice.clone().filter(|v| !v.trim().is_empty());
        if let Some(speed) = self.speed {
            params.speed = speed;
        }
        params.response_format = self.response_format;
        params
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderQuery {
    pub provider: Option<String>,
    pub lang: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VoicesResponse {
    pub provider: String,
    pub voices: Vec<Voice>,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub active: Option<String>,
    pub providers: Vec<ProviderSummary>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub provider: String,
    #[serde(flatten)]
    pub report: HealthReport,
}

fn audio_response(content_type: &str, body: Body) -> AppResult<Response> {
    let content_type = HeaderValue::from_str(content_type)
        .map_err(|e| AppError::Internal(format!("Invalid content type from provider: {e}")))?;
    let mut response = (StatusCode::OK, body).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// `POST /api/tts/speech`: synthesize `input` with the named provider.
///
/// Unreadable bodies are reported as `InvalidRequest` rather than axum's
/// plain-text rejection.
pub async fn synthesize_speech(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) =
        body.map_err(|rejection| AppError::invalid_request(rejection.body_text()))?;
    if request.input.trim().is_empty() {
        return Err(AppError::invalid_request("input is required"));
    }

    let (profile, client) = state.resolve(request.provider.as_deref())?;
    let params = request.params();
    let stream = request.stream.unwrap_or(profile.stream);
    let request_id = Uuid::new_v4();

    tracing::debug!(
        %request_id,
        provider = %profile.id,
        chars = request.input.chars().count(),
        stream,
        "Proxying speech request"
    );

    if stream {
        let opened = client.synthesize_stream(profile, &params).await?;
        let fallback = params
            .response_format
            .unwrap_or(profile.response_format)
            .mime_type();
        let content_type = opened.content_type.unwrap_or_else(|| fallback.to_string());
        return audio_response(&content_type, Body::from_stream(opened.chunks));
    }

    let clip = client.synthesize(profile, &params).await?;
    tracing::debug!(%request_id, bytes = clip.len(), "Speech relayed");
    audio_response(&clip.content_type, Body::from(clip.data))
}

/// `GET /api/tts/voices?provider=&lang=`
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProviderQuery>,
) -> AppResult<Json<VoicesResponse>> {
    let (profile, client) = state.resolve(query.provider.as_deref())?;
    let voices = client.list_voices(profile, query.lang.as_deref()).await?;

    Ok(Json(VoicesResponse {
        provider: profile.id.clone(),
        voices,
    }))
}

/// `GET /api/tts/health?provider=`
///
/// Provider failures are reported as `ok: false` with a 200 status; only an
/// unknown provider is an error.
pub async fn provider_health(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProviderQuery>,
) -> AppResult<Json<HealthResponse>> {
    let (profile, client) = state.resolve(query.provider.as_deref())?;

    let started = Instant::now();
    let report = match client.health(profile).await {
        Ok(report) => report,
        Err(error) => {
            tracing::info!(provider = %profile.id, error = %error, "Provider health check failed");
            HealthReport {
                ok: false,
                latency_ms: started.elapsed().as_millis() as u64,
                message: Some(error.to_string()),
                models: None,
            }
        }
    };

    Ok(Json(HealthResponse {
        provider: profile.id.clone(),
        report,
    }))
}

/// `GET /api/tts/providers`: configured profiles without their secrets.
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        active: state.providers.active().map(|profile| profile.id.clone()),
        providers: state
            .providers
            .profiles()
            .iter()
            .map(|profile| profile.summary())
            .collect(),
    })
}
