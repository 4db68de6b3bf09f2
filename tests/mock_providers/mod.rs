//! In-process provider and audio output doubles shared by the integration
//! tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;

use waav_narrator::core::playback::{
    AudioSink, PlaybackEngine, RuntimeCapabilities, SharedSettings, SinkError, StreamSession,
    settings::SettingsSnapshot,
};
use waav_narrator::core::scheduler::{AudioScheduler, SchedulerConfig};
use waav_narrator::core::tts::{
    AudioClip, HealthReport, ProviderProfile, SynthesisClient, SynthesisParams, SynthesisStream,
    TTSError, TTSResult, Voice, filter_voices,
};

// =============================================================================
// Synthesis client
// =============================================================================

/// Synthesis client answering `audio:<input>` after a configurable delay.
#[derive(Default)]
pub struct MockSynthesisClient {
    delay: Duration,
    chunk_size: usize,
    stream_content_type: Option<String>,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
    stream_calls: AtomicUsize,
    fail_all: Mutex<Option<TTSError>>,
    fail_on: Mutex<HashMap<String, TTSError>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSynthesisClient {
    pub fn new() -> Self {
        Self {
            chunk_size: 4,
            stream_content_type: Some("audio/mpeg".to_string()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_stream_content_type(mut self, content_type: Option<&str>) -> Self {
        self.stream_content_type = content_type.map(str::to_string);
        self
    }

    /// Every request fails with `error`.
    pub fn fail_with(self, error: TTSError) -> Self {
        *self.fail_all.lock() = Some(error);
        self
    }

    /// Requests whose input contains `needle` fail with `error`.
    pub fn fail_on(self, needle: &str, error: TTSError) -> Self {
        self.fail_on.lock().insert(needle.to_string(), error);
        self
    }

    /// Inputs received by `synthesize` and `synthesize_stream`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn stream_call_count(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were in progress at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn audio_for(input: &str) -> Bytes {
        Bytes::from(format!("audio:{input}"))
    }

    fn enter(&self) -> ActiveGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(&self.active)
    }

    fn failure_for(&self, input: &str) -> Option<TTSError> {
        if let Some(error) = self.fail_all.lock().clone() {
            return Some(error);
        }
        self.fail_on
            .lock()
            .iter()
            .find(|(needle, _)| input.contains(needle.as_str()))
            .map(|(_, error)| error.clone())
    }
}

#[async_trait]
impl SynthesisClient for MockSynthesisClient {
    async fn health(&self, _profile: &ProviderProfile) -> TTSResult<HealthReport> {
        if let Some(error) = self.fail_all.lock().clone() {
            return Err(error);
        }
        Ok(HealthReport {
            ok: true,
            latency_ms: 1,
            message: None,
            models: Some(vec!["tts-1".to_string()]),
        })
    }

    async fn list_voices(
        &self,
        _profile: &ProviderProfile,
        lang: Option<&str>,
    ) -> TTSResult<Vec<Voice>> {
        let voices = vec![
            Voice::new("alloy", "Alloy", Some("en-US")),
            Voice::new("kiri", "Kiri", Some("ja-JP")),
        ];
        Ok(filter_voices(&voices, lang))
    }

    async fn synthesize(
        &self,
        _profile: &ProviderProfile,
        params: &SynthesisParams,
    ) -> TTSResult<AudioClip> {
        self.calls.lock().push(params.input.clone());
        let _active = self.enter();
        tokio::time::sleep(self.delay).await;

        if let Some(error) = self.failure_for(&params.input) {
            return Err(error);
        }
        Ok(AudioClip::new("audio/mpeg", Self::audio_for(&params.input)))
    }

    async fn synthesize_stream(
        &self,
        _profile: &ProviderProfile,
        params: &SynthesisParams,
    ) -> TTSResult<SynthesisStream> {
        self.calls.lock().push(params.input.clone());
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        {
            let _active = self.enter();
            tokio::time::sleep(self.delay).await;
        }

        if let Some(error) = self.failure_for(&params.input) {
            return Err(error);
        }

        let audio = Self::audio_for(&params.input);
        let chunks: Vec<TTSResult<Bytes>> = audio
            .chunks(self.chunk_size.max(1))
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(SynthesisStream {
            content_type: self.stream_content_type.clone(),
            chunks: futures::stream::iter(chunks)
                .then(|chunk| async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    chunk
                })
                .boxed(),
        })
    }
}

// =============================================================================
// Audio sink
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlayedClip {
    pub content_type: String,
    pub data: Bytes,
    pub rate: f32,
    /// Whether the clip arrived through a progressive session
    pub streamed: bool,
}

/// Sink that records what would have been heard.
#[derive(Default)]
pub struct RecordingSink {
    played: Arc<Mutex<Vec<PlayedClip>>>,
    play_delay: Duration,
    reject_streams: bool,
    fail_appends_after: Option<usize>,
    stops: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each buffered clip, and the tail of each streamed session, takes
    /// `delay` to play.
    pub fn with_play_delay(mut self, delay: Duration) -> Self {
        self.play_delay = delay;
        self
    }

    /// `open_stream` answers `Unsupported`.
    pub fn rejecting_streams(mut self) -> Self {
        self.reject_streams = true;
        self
    }

    /// Sessions accept `appends` chunks, then answer `Unsupported`.
    pub fn failing_appends_after(mut self, appends: usize) -> Self {
        self.fail_appends_after = Some(appends);
        self
    }

    pub fn played(&self) -> Vec<PlayedClip> {
        self.played.lock().clone()
    }

    pub fn played_audio(&self) -> Vec<Bytes> {
        self.played.lock().iter().map(|clip| clip.data.clone()).collect()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, clip: AudioClip, rate: f32) -> Result<(), SinkError> {
        tokio::time::sleep(self.play_delay).await;
        self.played.lock().push(PlayedClip {
            content_type: clip.content_type,
            data: clip.data,
            rate,
            streamed: false,
        });
        Ok(())
    }

    async fn open_stream(
        &self,
        mime: &str,
        rate: f32,
    ) -> Result<Box<dyn StreamSession>, SinkError> {
        if self.reject_streams {
            return Err(SinkError::Unsupported(mime.to_string()));
        }
        Ok(Box::new(RecordingSession {
            played: Arc::clone(&self.played),
            content_type: mime.to_string(),
            buffer: Vec::new(),
            rate,
            appends_left: self.fail_appends_after,
            finish_delay: self.play_delay,
        }))
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct RecordingSession {
    played: Arc<Mutex<Vec<PlayedClip>>>,
    content_type: String,
    buffer: Vec<u8>,
    rate: f32,
    appends_left: Option<usize>,
    finish_delay: Duration,
}

#[async_trait]
impl StreamSession for RecordingSession {
    async fn append(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        if let Some(left) = self.appends_left.as_mut() {
            if *left == 0 {
                return Err(SinkError::Unsupported(self.content_type.clone()));
            }
            *left -= 1;
        }
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<(), SinkError> {
        tokio::time::sleep(self.finish_delay).await;
        let session = *self;
        session.played.lock().push(PlayedClip {
            content_type: session.content_type,
            data: Bytes::from(session.buffer),
            rate: session.rate,
            streamed: true,
        });
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}

// =============================================================================
// Wiring
// =============================================================================

pub fn profile(id: &str) -> ProviderProfile {
    ProviderProfile::new(id, "http://localhost:8880/v1")
}

pub fn settings_for(profile: ProviderProfile) -> Arc<SharedSettings> {
    Arc::new(SharedSettings::new(SettingsSnapshot {
        provider: Some(profile),
        ..SettingsSnapshot::default()
    }))
}

/// Engine over `client` and `sink` with the default scheduler settings.
pub fn engine(
    client: Arc<MockSynthesisClient>,
    sink: Arc<RecordingSink>,
    settings: Arc<SharedSettings>,
    capabilities: RuntimeCapabilities,
) -> PlaybackEngine {
    let scheduler = Arc::new(AudioScheduler::new(client, SchedulerConfig::default()));
    PlaybackEngine::new(scheduler, sink, settings, capabilities)
}
