//! Playback control.
//!
//! The controller owns the [`PlaybackState`] machine, picks a
//! [`SpeechEngine`] from an explicit [`EngineRegistry`] and walks a
//! [`SectionSource`] utterance by utterance. It records the last spoken mark
//! so pause, rate and voice changes can restart exactly where the reader
//! left off.

pub mod state;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use state::{Effect, PlaybackCommand, PlaybackState, Transition};

use crate::core::playback::{PlaybackEngine, PlaybackError, PlaybackEvent, SharedSettings};
use crate::core::text::Utterance;

/// Id under which the remote playback engine registers.
pub const REMOTE_ENGINE_ID: &str = "remote";

// =============================================================================
// Engines
// =============================================================================

/// Contract every speech engine fulfils, remote or on-device.
pub trait SpeechEngine: Send + Sync {
    fn id(&self) -> &str;

    /// See [`PlaybackEngine::speak`].
    fn speak(
        &self,
        utterance: Utterance,
        cancel: CancellationToken,
        preload: bool,
    ) -> BoxStream<'static, PlaybackEvent>;

    /// Halts the current utterance. Idempotent.
    fn stop(&self);
}

impl SpeechEngine for PlaybackEngine {
    fn id(&self) -> &str {
        REMOTE_ENGINE_ID
    }

    fn speak(
        &self,
        utterance: Utterance,
        cancel: CancellationToken,
        preload: bool,
    ) -> BoxStream<'static, PlaybackEvent> {
        PlaybackEngine::speak(self, utterance, cancel, preload)
    }

    fn stop(&self) {
        PlaybackEngine::stop(self)
    }
}

/// Engines known to the controller, with one of them selected.
#[derive(Default)]
pub struct EngineRegistry {
    engines: Vec<Arc<dyn SpeechEngine>>,
    selected: RwLock<Option<String>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `engine`, replacing one with the same id. The first registered
    /// engine is selected.
    pub fn register(&mut self, engine: Arc<dyn SpeechEngine>) {
        let id = engine.id().to_string();
        self.engines.retain(|existing| existing.id() != id);
        self.engines.push(engine);

        let mut selected = self.selected.write();
        if selected.is_none() {
            *selected = Some(id);
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn SpeechEngine>) -> Self {
        self.register(engine);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SpeechEngine>> {
        self.engines.iter().find(|engine| engine.id() == id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.engines.iter().map(|engine| engine.id().to_string()).collect()
    }

    pub fn select(&self, id: &str) -> Result<(), PlaybackError> {
        if self.get(id).is_none() {
            return Err(PlaybackError::UnknownEngine(id.to_string()));
        }
        *self.selected.write() = Some(id.to_string());
        Ok(())
    }

    pub fn selected(&self) -> Result<Arc<dyn SpeechEngine>, PlaybackError> {
        let selected = self.selected.read().clone();
        match selected {
            Some(id) => self.get(&id).ok_or(PlaybackError::UnknownEngine(id)),
            None => Err(PlaybackError::UnknownEngine(String::new())),
        }
    }
}

// =============================================================================
// Section Sources
// =============================================================================

/// Supplies utterances in reading order.
#[async_trait]
pub trait SectionSource: Send + Sync {
    async fn current(&self) -> Option<Utterance>;

    /// Advances and returns the new current utterance.
    async fn next(&self) -> Option<Utterance>;

    /// Steps back and returns the new current utterance.
    async fn previous(&self) -> Option<Utterance>;

    /// The utterance after the current one, without moving.
    async fn peek_next(&self) -> Option<Utterance>;
}

/// In-memory list of utterances.
pub struct VecSectionSource {
    utterances: Vec<Utterance>,
    position: Mutex<usize>,
}

impl VecSectionSource {
    pub fn new(utterances: Vec<Utterance>) -> Self {
        Self {
            utterances,
            position: Mutex::new(0),
        }
    }

    pub fn position(&self) -> usize {
        *self.position.lock()
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }
}

#[async_trait]
impl SectionSource for VecSectionSource {
    async fn current(&self) -> Option<Utterance> {
        self.utterances.get(self.position()).cloned()
    }

    async fn next(&self) -> Option<Utterance> {
        let mut position = self.position.lock();
        if *position + 1 >= self.utterances.len() {
            return None;
        }
        *position += 1;
        self.utterances.get(*position).cloned()
    }

    async fn previous(&self) -> Option<Utterance> {
        let mut position = self.position.lock();
        if *position == 0 {
            return None;
        }
        *position -= 1;
        self.utterances.get(*position).cloned()
    }

    async fn peek_next(&self) -> Option<Utterance> {
        self.utterances.get(self.position() + 1).cloned()
    }
}

// =============================================================================
// Controller
// =============================================================================

/// How a play loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerOutcome {
    /// The source ran out of utterances.
    Finished,
    /// Playback was paused or stopped; carries the state at that moment.
    Halted(PlaybackState),
}

pub struct TtsController {
    registry: EngineRegistry,
    settings: Arc<SharedSettings>,
    state: Mutex<PlaybackState>,
    last_mark: Mutex<Option<String>>,
    current: Mutex<Option<CancellationToken>>,
    preload_next: bool,
}

impl TtsController {
    pub fn new(registry: EngineRegistry, settings: Arc<SharedSettings>) -> Self {
        Self {
            registry,
            settings,
            state: Mutex::new(PlaybackState::Stopped),
            last_mark: Mutex::new(None),
            current: Mutex::new(None),
            preload_next: true,
        }
    }

    /// Disables warming the next utterance while one plays.
    pub fn without_preload(mut self) -> Self {
        self.preload_next = false;
        self
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Arc<SharedSettings> {
        &self.settings
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    pub fn last_mark(&self) -> Option<String> {
        self.last_mark.lock().clone()
    }

    /// Starts (or, from a paused state, resumes) playback of `source`.
    ///
    /// Runs until the source is exhausted or playback is paused or stopped
    /// from another task.
    pub async fn play(
        &self,
        source: &dyn SectionSource,
    ) -> Result<ControllerOutcome, PlaybackError> {
        let transition = self.apply(PlaybackCommand::Play);
        self.start(source, transition).await
    }

    pub async fn resume(
        &self,
        source: &dyn SectionSource,
    ) -> Result<ControllerOutcome, PlaybackError> {
        let transition = self.apply(PlaybackCommand::Resume);
        self.start(source, transition).await
    }

    pub fn pause(&self) -> PlaybackState {
        self.command(PlaybackCommand::Pause)
    }

    /// Stops but keeps the last mark for a later resume.
    pub fn stop_pause(&self) -> PlaybackState {
        self.command(PlaybackCommand::StopPause)
    }

    pub fn stop(&self) -> PlaybackState {
        let state = self.command(PlaybackCommand::Stop);
        if let Ok(engine) = self.registry.selected() {
            engine.stop();
        }
        *self.last_mark.lock() = None;
        state
    }

    pub fn forward(&self) -> PlaybackState {
        self.command(PlaybackCommand::Forward)
    }

    pub fn backward(&self) -> PlaybackState {
        self.command(PlaybackCommand::Backward)
    }

    /// Stores the rate and, when playing, restarts from the last mark.
    pub fn set_rate(&self, rate: f32) -> PlaybackState {
        self.settings.set_rate(rate);
        self.command(PlaybackCommand::SetRate)
    }

    pub fn set_voice(&self, voice: Option<String>) -> PlaybackState {
        self.settings.set_voice(voice);
        self.command(PlaybackCommand::SetVoice)
    }

    fn apply(&self, command: PlaybackCommand) -> Transition {
        let mut state = self.state.lock();
        let transition = state.apply(command);
        if *state != transition.next {
            debug!(from = %*state, to = %transition.next, ?command, "Playback state changed");
        }
        *state = transition.next;
        transition
    }

    fn command(&self, command: PlaybackCommand) -> PlaybackState {
        let transition = self.apply(command);
        if matches!(transition.effect, Effect::CancelUtterance | Effect::Halt) {
            self.cancel_current();
        }
        transition.next
    }

    fn cancel_current(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    fn resume_point(&self, utterance: &Utterance) -> Utterance {
        match self.last_mark() {
            Some(mark) => utterance.resume_from(&mark),
            None => utterance.clone(),
        }
    }

    async fn start(
        &self,
        source: &dyn SectionSource,
        transition: Transition,
    ) -> Result<ControllerOutcome, PlaybackError> {
        let (utterance, to_play) = match transition.effect {
            Effect::StartSpeaking => {
                *self.last_mark.lock() = None;
                let utterance = source.current().await;
                (utterance.clone(), utterance)
            }
            Effect::RestartFromMark => {
                let utterance = source.current().await;
                let to_play = utterance.as_ref().map(|u| self.resume_point(u));
                (utterance, to_play)
            }
            _ => return Ok(ControllerOutcome::Halted(transition.next)),
        };

        match (utterance, to_play) {
            (Some(utterance), Some(to_play)) => self.run(source, utterance, to_play).await,
            _ => {
                self.apply(PlaybackCommand::Stop);
                Ok(ControllerOutcome::Finished)
            }
        }
    }

    async fn run(
        &self,
        source: &dyn SectionSource,
        mut utterance: Utterance,
        mut to_play: Utterance,
    ) -> Result<ControllerOutcome, PlaybackError> {
        loop {
            let engine = match self.registry.selected() {
                Ok(engine) => engine,
                Err(e) => {
                    self.apply(PlaybackCommand::Stop);
                    return Err(e);
                }
            };

            let cancel = CancellationToken::new();
            *self.current.lock() = Some(cancel.clone());

            // A command may have landed between two utterances.
            let command = if self.state() == PlaybackState::Playing {
                if self.preload_next {
                    if let Some(next) = source.peek_next().await {
                        spawn_preload(Arc::clone(&engine), next, cancel.child_token());
                    }
                }
                self.speak_one(engine.as_ref(), to_play, &cancel).await?
            } else {
                PlaybackCommand::Interrupted
            };

            let transition = self.apply(command);
            match transition.effect {
                Effect::SpeakNext => match source.next().await {
                    Some(next) => {
                        *self.last_mark.lock() = None;
                        utterance = next;
                        to_play = utterance.clone();
                    }
                    None => {
                        self.apply(PlaybackCommand::Stop);
                        self.current.lock().take();
                        info!("Reached the end of the section source");
                        return Ok(ControllerOutcome::Finished);
                    }
                },
                Effect::SpeakPrevious => {
                    if let Some(previous) = source.previous().await {
                        utterance = previous;
                    }
                    *self.last_mark.lock() = None;
                    to_play = utterance.clone();
                }
                Effect::RestartFromMark => {
                    to_play = self.resume_point(&utterance);
                }
                _ => {
                    self.current.lock().take();
                    return Ok(ControllerOutcome::Halted(transition.next));
                }
            }
        }
    }

    /// Drains one utterance's events, returning how it ended.
    async fn speak_one(
        &self,
        engine: &dyn SpeechEngine,
        utterance: Utterance,
        cancel: &CancellationToken,
    ) -> Result<PlaybackCommand, PlaybackError> {
        let mut events = engine.speak(utterance, cancel.clone(), false);
        let mut ended = PlaybackCommand::UtteranceEnded;

        while let Some(event) = events.next().await {
            match event {
                PlaybackEvent::Boundary { mark } => {
                    *self.last_mark.lock() = Some(mark);
                }
                PlaybackEvent::End => ended = PlaybackCommand::UtteranceEnded,
                PlaybackEvent::Error(PlaybackError::Aborted) => {
                    ended = PlaybackCommand::Interrupted
                }
                PlaybackEvent::Error(error) => {
                    *self.state.lock() = PlaybackState::Stopped;
                    self.current.lock().take();
                    return Err(error);
                }
            }
        }
        Ok(ended)
    }
}

fn spawn_preload(engine: Arc<dyn SpeechEngine>, utterance: Utterance, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut events = engine.speak(utterance, cancel, true);
        while events.next().await.is_some() {}
    });
}
