//! Playback state machine.
//!
//! Transitions are pure: [`PlaybackState::apply`] never performs I/O, it
//! only says which state comes next and what the controller must do.
//! The `*-paused` states are transient: the current utterance is being torn
//! down and the controller decides how to continue once it has ended.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Stopped while remembering the position; resuming restarts from the
    /// last spoken mark.
    StopPaused,
    BackwardPaused,
    ForwardPaused,
    SetratePaused,
    SetvoicePaused,
}

/// Inputs of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Resume,
    Stop,
    /// Stop but keep the position (the reader navigated away).
    StopPause,
    Forward,
    Backward,
    SetRate,
    SetVoice,
    /// The engine finished the utterance.
    UtteranceEnded,
    /// The engine stopped the utterance early because it was cancelled.
    Interrupted,
}

/// What the controller has to do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Start speaking the current utterance from its beginning.
    StartSpeaking,
    /// Cancel the utterance being spoken; the loop decides what follows.
    CancelUtterance,
    /// Speak the current utterance again from the last spoken mark.
    RestartFromMark,
    SpeakNext,
    SpeakPrevious,
    /// Leave the play loop.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: PlaybackState,
    pub effect: Effect,
}

impl Transition {
    fn to(next: PlaybackState, effect: Effect) -> Self {
        Self { next, effect }
    }

    fn stay(state: PlaybackState) -> Self {
        Self::to(state, Effect::None)
    }
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::StopPaused => "stop-paused",
            Self::BackwardPaused => "backward-paused",
            Self::ForwardPaused => "forward-paused",
            Self::SetratePaused => "setrate-paused",
            Self::SetvoicePaused => "setvoice-paused",
        }
    }

    /// States in which the play loop is winding the current utterance down.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BackwardPaused | Self::ForwardPaused | Self::SetratePaused | Self::SetvoicePaused
        )
    }

    /// States from which `Resume` continues at the last mark.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Paused | Self::StopPaused)
    }

    pub fn apply(self, command: PlaybackCommand) -> Transition {
        use Effect as E;
        use PlaybackCommand as C;
        use PlaybackState as S;

        match (self, command) {
            (S::Stopped, C::Play) => Transition::to(S::Playing, E::StartSpeaking),
            (s, C::Play) if s.is_resumable() => Transition::to(S::Playing, E::RestartFromMark),
            (s, C::Play) => Transition::stay(s),

            (S::Playing, C::Pause) => Transition::to(S::Paused, E::CancelUtterance),
            (s, C::Pause) if s.is_transient() => Transition::to(S::Paused, E::None),
            (s, C::Pause) => Transition::stay(s),

            (s, C::Resume) if s.is_resumable() => Transition::to(S::Playing, E::RestartFromMark),
            (s, C::Resume) => Transition::stay(s),

            (S::Stopped, C::Stop) => Transition::stay(S::Stopped),
            (_, C::Stop) => Transition::to(S::Stopped, E::Halt),

            (S::Playing, C::StopPause) => Transition::to(S::StopPaused, E::CancelUtterance),
            (s, C::StopPause) if s.is_transient() || s == S::Paused => {
                Transition::to(S::StopPaused, E::None)
            }
            (s, C::StopPause) => Transition::stay(s),

            (S::Playing, C::Forward) => Transition::to(S::ForwardPaused, E::CancelUtterance),
            (S::Playing, C::Backward) => Transition::to(S::BackwardPaused, E::CancelUtterance),
            (S::Playing, C::SetRate) => Transition::to(S::SetratePaused, E::CancelUtterance),
            (S::Playing, C::SetVoice) => Transition::to(S::SetvoicePaused, E::CancelUtterance),
            (s, C::Forward | C::Backward | C::SetRate | C::SetVoice) => Transition::stay(s),

            (S::Playing, C::UtteranceEnded) => Transition::to(S::Playing, E::SpeakNext),
            (S::Playing, C::Interrupted) => Transition::to(S::Stopped, E::Halt),
            (S::ForwardPaused, C::UtteranceEnded | C::Interrupted) => {
                Transition::to(S::Playing, E::SpeakNext)
            }
            (S::BackwardPaused, C::UtteranceEnded | C::Interrupted) => {
                Transition::to(S::Playing, E::SpeakPrevious)
            }
            (S::SetratePaused | S::SetvoicePaused, C::UtteranceEnded | C::Interrupted) => {
                Transition::to(S::Playing, E::RestartFromMark)
            }
            (s, C::UtteranceEnded | C::Interrupted) => Transition::to(s, E::Halt),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
