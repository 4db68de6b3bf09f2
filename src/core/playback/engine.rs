//! The remote playback engine.
//!
//! [`PlaybackEngine::speak`] turns an utterance into a lazy stream of
//! [`PlaybackEvent`]s. Segments are voiced strictly in order; while one plays
//! the next `prefetch_window` segments are synthesized in the background.
//!
//! Two transports exist:
//!
//! - **buffered**: the whole clip is fetched (or taken from the cache) and
//!   handed to the sink in one piece;
//! - **streamed**: used when the profile asks for it and the runtime can
//!   append progressively. Chunks are fed to a sink session as they arrive.
//!   If the sink refuses the mime type, the rest of the same response is
//!   buffered and played as one clip; the request is never issued twice.
//!
//! Audio that is already cached or in flight always goes through the
//! buffered path, even in streamed mode.

use std::future::Future;
use std::sync::Arc;

use async_stream::stream;
use bytes::BytesMut;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::events::{PlaybackError, PlaybackEvent};
use super::settings::PlaybackSettings;
use super::sink::{AudioSink, RuntimeCapabilities, SinkError, StreamSession};
use crate::core::scheduler::{AudioScheduler, KeyStatus, PendingAudio, SegmentRequest};
use crate::core::text::{Mark, Utterance, build_segments};
use crate::core::tts::format::essence;
use crate::core::tts::{AudioClip, ProviderProfile, resolve_content_type};

/// Receives the anchor mark of each segment right before it is voiced.
pub trait MarkDispatcher: Send + Sync {
    fn dispatch(&self, mark: &Mark);
}

impl<F> MarkDispatcher for F
where
    F: Fn(&Mark) + Send + Sync,
{
    fn dispatch(&self, mark: &Mark) {
        self(mark)
    }
}

/// Sequential, cancellable playback of utterances through a remote provider.
pub struct PlaybackEngine {
    scheduler: Arc<AudioScheduler>,
    sink: Arc<dyn AudioSink>,
    settings: Arc<dyn PlaybackSettings>,
    capabilities: RuntimeCapabilities,
    dispatcher: Option<Arc<dyn MarkDispatcher>>,
    current: Mutex<Option<CancellationToken>>,
}

impl PlaybackEngine {
    pub fn new(
        scheduler: Arc<AudioScheduler>,
        sink: Arc<dyn AudioSink>,
        settings: Arc<dyn PlaybackSettings>,
        capabilities: RuntimeCapabilities,
    ) -> Self {
        Self {
            scheduler,
            sink,
            settings,
            capabilities,
            dispatcher: None,
            current: Mutex::new(None),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn MarkDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn scheduler(&self) -> &Arc<AudioScheduler> {
        &self.scheduler
    }

    pub fn capabilities(&self) -> &RuntimeCapabilities {
        &self.capabilities
    }

    /// Voices `utterance`, yielding one `Boundary` per segment followed by a
    /// single `End`, or an `Error` that ends the stream early.
    ///
    /// With `preload` nothing is played: the first prefetch window is warmed
    /// and the stream ends right away.
    pub fn speak(
        &self,
        utterance: Utterance,
        cancel: CancellationToken,
        preload: bool,
    ) -> BoxStream<'static, PlaybackEvent> {
        if !preload {
            *self.current.lock() = Some(cancel.clone());
        }

        let snapshot = self.settings.snapshot();
        let run = SpeakRun {
            scheduler: Arc::clone(&self.scheduler),
            sink: Arc::clone(&self.sink),
            dispatcher: self.dispatcher.clone(),
            capabilities: self.capabilities.clone(),
            cancel,
        };

        let events = stream! {
            let Some(profile) = snapshot.provider.clone().filter(|profile| profile.enabled) else {
                yield PlaybackEvent::Error(PlaybackError::NoProvider);
                return;
            };
            let profile = Arc::new(profile);
            let voice = snapshot
                .effective_voice()
                .unwrap_or_else(|| profile.default_voice.clone());
            let rate = snapshot.rate;

            let segments = build_segments(&utterance.marks, &profile.chunking.segment_options());
            if segments.is_empty() {
                yield PlaybackEvent::End;
                return;
            }

            let requests: Vec<SegmentRequest> = segments
                .iter()
                .map(|segment| SegmentRequest::new(&profile, &voice, rate, &segment.text))
                .collect();
            let window = profile.chunking.window();

            if preload {
                if run.cancel.is_cancelled() {
                    yield PlaybackEvent::Error(PlaybackError::Aborted);
                    return;
                }
                let started = run.scheduler.prefetch(requests.iter().take(window).cloned());
                debug!(segments = segments.len(), started, "Preloaded utterance");
                yield PlaybackEvent::End;
                return;
            }

            let streamed = profile.stream && run.capabilities.progressive_append;
            debug!(
                provider = %profile.id,
                segments = segments.len(),
                streamed,
                rate,
                "Speaking utterance"
            );

            for (index, (segment, request)) in segments.iter().zip(&requests).enumerate() {
                if run.cancel.is_cancelled() {
                    yield PlaybackEvent::Error(PlaybackError::Aborted);
                    return;
                }

                if let Some(dispatcher) = &run.dispatcher {
                    dispatcher.dispatch(&segment.anchor_mark);
                }
                yield PlaybackEvent::boundary(segment.anchor_mark.name.clone());

                let upcoming = requests.iter().skip(index + 1).take(window).cloned();
                let outcome = if streamed
                    && run.scheduler.status(&request.key) == KeyStatus::Missing
                {
                    run.play_streamed(&profile, request.clone(), upcoming, rate).await
                } else {
                    let pending = run.scheduler.request(request.clone());
                    run.scheduler.prefetch(upcoming);
                    run.play_buffered(pending, rate).await
                };

                if let Err(error) = outcome {
                    if error.is_aborted() {
                        run.sink.stop();
                    } else {
                        warn!(segment = index, error = %error, "Segment playback failed");
                    }
                    yield PlaybackEvent::Error(error);
                    return;
                }
            }

            yield PlaybackEvent::End;
        };
        Box::pin(events)
    }

    /// Halts the current utterance. Safe to call any number of times.
    pub fn stop(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
        self.sink.stop();
        self.scheduler.reset();
    }
}

/// Everything one `speak()` call needs, detached from the engine.
struct SpeakRun {
    scheduler: Arc<AudioScheduler>,
    sink: Arc<dyn AudioSink>,
    dispatcher: Option<Arc<dyn MarkDispatcher>>,
    capabilities: RuntimeCapabilities,
    cancel: CancellationToken,
}

impl SpeakRun {
    /// Awaits `future` unless the call is cancelled first.
    async fn guarded<F: Future>(&self, future: F) -> Result<F::Output, PlaybackError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PlaybackError::Aborted),
            output = future => Ok(output),
        }
    }

    async fn play_clip(&self, clip: AudioClip, rate: f32) -> Result<(), PlaybackError> {
        self.guarded(self.sink.play(clip, rate))
            .await?
            .map_err(sink_error)
    }

    async fn play_buffered(&self, pending: PendingAudio, rate: f32) -> Result<(), PlaybackError> {
        let clip = self.guarded(pending).await??;
        self.play_clip(clip, rate).await
    }

    async fn play_streamed(
        &self,
        profile: &Arc<ProviderProfile>,
        request: SegmentRequest,
        upcoming: impl Iterator<Item = SegmentRequest>,
        rate: f32,
    ) -> Result<(), PlaybackError> {
        // Take our slot before queueing the prefetches behind it.
        let permit = self.scheduler.acquire_permit(&self.cancel).await?;
        self.scheduler.prefetch(upcoming);

        let client = self.scheduler.client();
        let opened = self
            .guarded(client.synthesize_stream(profile, &request.params))
            .await??;

        let mime = opened
            .content_type
            .as_deref()
            .map(essence)
            .filter(|mime| mime.starts_with("audio/"))
            .unwrap_or_else(|| profile.response_format.mime_type().to_string());
        let mut chunks = opened.chunks;

        let mut session: Option<Box<dyn StreamSession>> = None;
        if self.capabilities.supports(&mime) {
            match self.sink.open_stream(&mime, rate).await {
                Ok(opened) => session = Some(opened),
                Err(SinkError::Unsupported(_)) => {
                    debug!(mime = %mime, "Sink rejected stream, buffering response");
                }
                Err(e) => return Err(sink_error(e)),
            }
        }

        // Sessions that stopped accepting data but still hold audible audio.
        let mut retired: Option<Box<dyn StreamSession>> = None;
        let mut received = BytesMut::new();
        let mut fallback = BytesMut::new();

        let result = async {
            loop {
                let Some(chunk) = self.guarded(chunks.next()).await? else {
                    break;
                };
                let chunk = chunk?;
                received.extend_from_slice(&chunk);

                let Some(active) = session.as_mut() else {
                    fallback.extend_from_slice(&chunk);
                    continue;
                };
                let appended = self.guarded(active.append(chunk.clone())).await?;
                match appended {
                    Ok(()) => {}
                    Err(SinkError::Unsupported(reason)) => {
                        warn!(reason = %reason, "Progressive append failed, buffering remainder");
                        retired = session.take();
                        fallback.extend_from_slice(&chunk);
                    }
                    Err(e) => return Err(sink_error(e)),
                }
            }
            Ok::<(), PlaybackError>(())
        }
        .await;

        if let Err(error) = result {
            for open in [session.take(), retired.take()].into_iter().flatten() {
                open.abort();
            }
            return Err(error);
        }
        // The network read is over; playback no longer needs the slot.
        drop(chunks);
        drop(permit);

        if let Some(open) = session.take().or_else(|| retired.take()) {
            self.guarded(open.finish()).await?.map_err(sink_error)?;
        }

        if !fallback.is_empty() {
            let data = fallback.freeze();
            let content_type = resolve_content_type(Some(mime.as_str()), &data, &mime);
            self.play_clip(AudioClip::new(content_type, data), rate).await?;
        }

        if !received.is_empty() {
            self.scheduler
                .store(request.key, AudioClip::new(mime, received.freeze()));
        }
        Ok(())
    }
}

fn sink_error(error: SinkError) -> PlaybackError {
    match error {
        SinkError::Interrupted => PlaybackError::Aborted,
        other => PlaybackError::Output(other.to_string()),
    }
}
